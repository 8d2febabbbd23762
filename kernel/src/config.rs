//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络子系统配置
//!
//! 常量由 build.rs 根据 Kernel.toml 生成

use core::net::Ipv4Addr;

include!(concat!(env!("OUT_DIR"), "/config.rs"));

/// 页大小，系统调用单次拷贝的上限
pub const PAGE_SIZE: usize = 4096;
