//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux 网络子系统
//!
//! e1000 网卡驱动 + Ethernet/IPv4/UDP/ARP 协议栈：
//! - `drivers::pci` - ECAM 总线扫描，发现并启用网卡
//! - `drivers::net::e1000` - 描述符环管理与中断完成路径
//! - `net` - 帧编解码、ARP 应答、数据报传输与套接字
//! - `sysnet` - 系统调用入口（负数错误码约定）

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod errno;
pub mod sync;
pub mod drivers;
pub mod net;
pub mod sysnet;
