//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络子系统
//!
//! - `ethernet` / `ipv4` / `udp` / `arp`: 无状态的帧编解码
//! - `arp::ArpResponder`: 回应对本机地址的 ARP 请求
//! - `transport`: 数据报发送与阻塞接收
//! - `socket`: 按端口分发的已连接套接字

use core::fmt;

pub mod ethernet;
pub mod ipv4;
pub mod udp;
pub mod arp;
pub mod transport;
pub mod socket;

pub use transport::{SendError, Transport};
pub use udp::UdpDatagram;

/// 主机字节序到网络字节序 (16 位)
#[inline]
pub const fn htons(x: u16) -> u16 {
    x.to_be()
}

/// 网络字节序到主机字节序 (16 位)
#[inline]
pub const fn ntohs(x: u16) -> u16 {
    u16::from_be(x)
}

/// 主机字节序到网络字节序 (32 位)
#[inline]
pub const fn htonl(x: u32) -> u32 {
    x.to_be()
}

/// 网络字节序到主机字节序 (32 位)
#[inline]
pub const fn ntohl(x: u32) -> u32 {
    u32::from_be(x)
}

/// 帧编解码错误
///
/// 都是瞬时错误：接收路径丢弃该帧继续等待，发送路径报告给调用者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// 帧比声明的长度短
    Truncated,
    /// 以太网类型不是 IPv4
    NotIpv4,
    /// IP 协议不是 UDP
    NotUdp,
    /// 以太网类型不是 ARP
    NotArp,
    /// IP 头部带选项
    BadHeaderLength,
    /// IP 总长度与 UDP 长度不一致
    LengthMismatch,
    /// 数据超过调用者的容量
    PayloadTooLarge,
    /// 输出缓冲区放不下整帧
    BufferTooSmall,
    /// IP 或 UDP 校验和错误
    BadChecksum,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CodecError::Truncated => "truncated frame",
            CodecError::NotIpv4 => "not an IPv4 frame",
            CodecError::NotUdp => "not a UDP packet",
            CodecError::NotArp => "not an ARP frame",
            CodecError::BadHeaderLength => "IP header with options",
            CodecError::LengthMismatch => "IP/UDP length mismatch",
            CodecError::PayloadTooLarge => "payload exceeds capacity",
            CodecError::BufferTooSmall => "frame exceeds buffer",
            CodecError::BadChecksum => "bad checksum",
        };
        f.write_str(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order() {
        assert_eq!(htons(0x1234).to_ne_bytes(), [0x12, 0x34]);
        assert_eq!(ntohs(htons(3000)), 3000);
        assert_eq!(htonl(0x0A00_020F).to_ne_bytes(), [10, 0, 2, 15]);
        assert_eq!(ntohl(u32::from_ne_bytes([10, 0, 2, 2])), 0x0A00_0202);
    }
}
