//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 设备驱动模块

use core::fmt;

pub mod pci;
pub mod net;

/// 设备初始化错误
///
/// 初始化阶段的错误是致命的：没有网卡就没有网络，调用者不会降级运行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// 总线上没有找到设备
    DeviceNotFound,
    /// 设备槽中是别的设备
    UnexpectedDevice { vendor: u16, device: u16 },
    /// 描述符环大小不满足硬件要求
    BadRingGeometry,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::DeviceNotFound => write!(f, "e1000 not found on PCI bus 0"),
            InitError::UnexpectedDevice { vendor, device } => {
                write!(f, "unexpected PCI device {:04x}:{:04x}", vendor, device)
            }
            InitError::BadRingGeometry => {
                write!(f, "descriptor ring size must be a power of two and a multiple of 8")
            }
        }
    }
}
