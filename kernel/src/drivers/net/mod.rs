//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备驱动
//!
//! `NetDevice` 是协议栈和网卡驱动之间的接口，参考 Linux 的
//! net_device_ops：协议栈只需要发送一帧、阻塞接收一帧和统计信息

use alloc::vec::Vec;
use core::fmt;

pub mod e1000;
#[cfg(any(test, feature = "emulated"))]
pub mod emulated;

pub use e1000::E1000;
#[cfg(any(test, feature = "emulated"))]
pub use emulated::EmulatedE1000;

/// 网络设备统计信息
///
/// 对应 Linux 的 rtnl_link_stats64
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// 接收包数
    pub rx_packets: u64,
    /// 发送包数
    pub tx_packets: u64,
    /// 接收字节数
    pub rx_bytes: u64,
    /// 发送字节数
    pub tx_bytes: u64,
    /// 接收丢弃数
    pub rx_dropped: u64,
    /// 发送丢弃数
    pub tx_dropped: u64,
}

/// 发送错误
///
/// 都是瞬时错误：调用者把它当作丢包，驱动不会重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// 帧超过发送缓冲区
    FrameTooLarge { len: usize, max: usize },
    /// 发送环已满（尾部描述符尚未完成）
    RingFull,
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::FrameTooLarge { len, max } => {
                write!(f, "frame of {} bytes exceeds {} byte limit", len, max)
            }
            TxError::RingFull => write!(f, "tx ring full"),
        }
    }
}

/// 网络设备操作接口
///
/// 所有方法都可以从多个线程并发调用
pub trait NetDevice: Send + Sync {
    /// 硬件地址
    fn mac_address(&self) -> [u8; 6];

    /// 发送一帧，不阻塞
    ///
    /// # 参数
    /// - `frame`: 完整的以太网帧（不含 CRC）
    fn try_transmit(&self, frame: &[u8]) -> Result<(), TxError>;

    /// 阻塞等待下一帧，直到 `stop` 返回 true
    ///
    /// `stop` 在设备锁内、每次检查接收环之前调用；锁顺序为设备锁在外
    ///
    /// # 返回
    /// 收到的帧；`stop` 返回 true 时返回 `None`
    fn wait_for_received_frame_until(&self, stop: &mut dyn FnMut() -> bool) -> Option<Vec<u8>>;

    /// 唤醒所有阻塞在接收上的线程
    fn wake_receivers(&self);

    /// 统计信息快照
    fn stats(&self) -> DeviceStats;

    /// 阻塞等待下一帧
    fn wait_for_received_frame(&self) -> Vec<u8> {
        loop {
            if let Some(frame) = self.wait_for_received_frame_until(&mut || false) {
                return frame;
            }
        }
    }
}
