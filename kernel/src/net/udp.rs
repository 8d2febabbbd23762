//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! UDP 协议
//!
//! Ethernet + IPv4 + UDP 帧的编解码，头部位于固定偏移：
//! 以太网 0，IP 14，UDP 34，数据 42
//! 参考: net/ipv4/udp.c, include/uapi/linux/udp.h

use alloc::vec::Vec;
use core::net::Ipv4Addr;

use super::ethernet::{self, EthHdr, EthProtocol, ETH_ALEN, ETH_HLEN};
use super::ipv4::{checksum, IpHdr, IPHDR_LEN, IPPROTO_UDP};
use super::CodecError;
use crate::config::VERIFY_RX_CHECKSUMS;

/// UDP 头部长度
pub const UDP_HLEN: usize = 8;

/// 所有头部的总长度
pub const UDP_FRAME_OVERHEAD: usize = ETH_HLEN + IPHDR_LEN + UDP_HLEN;

/// UDP 最大数据长度
pub const UDP_MAX_DATAGRAM: usize = 65507;

/// UDP 端口号
pub type UdpPort = u16;

/// UDP 头部
///
/// 对应 Linux 的 udphdr，字段为主机字节序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpHdr {
    /// 源端口
    pub source: UdpPort,
    /// 目标端口
    pub dest: UdpPort,
    /// 长度（头部 + 数据）
    pub len: u16,
    /// 校验和
    pub check: u16,
}

impl UdpHdr {
    /// 从字节切片解析 UDP 头部
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = data.get(..UDP_HLEN)?;
        let be16 = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]);

        Some(Self {
            source: be16(0),
            dest: be16(2),
            len: be16(4),
            check: be16(6),
        })
    }

    /// 写入头部
    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.source.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dest.to_be_bytes());
        buf[4..6].copy_from_slice(&self.len.to_be_bytes());
        buf[6..8].copy_from_slice(&self.check.to_be_bytes());
    }
}

/// 解码后的数据报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    /// 源 IP 地址
    pub src: Ipv4Addr,
    /// 源端口
    pub sport: UdpPort,
    /// 目标端口
    pub dport: UdpPort,
    /// 数据
    pub payload: Vec<u8>,
}

/// 构造 Ethernet + IPv4 + UDP 帧
///
/// 以太网地址留空（全 0），由发送方填写
///
/// # 参数
/// - `buf`: 输出缓冲区
/// - `dst` / `dport`: 目标地址和端口
/// - `src` / `sport`: 源地址和端口
/// - `payload`: 数据
///
/// # 返回
/// 帧长度；帧放不进 `buf` 时返回 `BufferTooSmall`，此时 `buf` 不被修改
pub fn encode_udp(
    buf: &mut [u8],
    dst: Ipv4Addr,
    dport: UdpPort,
    src: Ipv4Addr,
    sport: UdpPort,
    payload: &[u8],
) -> Result<usize, CodecError> {
    if payload.len() > UDP_MAX_DATAGRAM {
        return Err(CodecError::PayloadTooLarge);
    }
    let frame_len = UDP_FRAME_OVERHEAD + payload.len();
    if frame_len > buf.len() {
        return Err(CodecError::BufferTooSmall);
    }

    let frame = &mut buf[..frame_len];
    frame.fill(0);

    EthHdr {
        h_dest: [0; ETH_ALEN],
        h_source: [0; ETH_ALEN],
        h_proto: EthProtocol::ETH_P_IP.to_u16(),
    }
    .emit(frame);

    // UDP 段：头部（校验和为 0）+ 数据，再按伪头部计算校验和
    let udp_len = UDP_HLEN + payload.len();
    let segment = &mut frame[ETH_HLEN + IPHDR_LEN..];
    let mut udp = UdpHdr {
        source: sport,
        dest: dport,
        len: udp_len as u16,
        check: 0,
    };
    udp.emit(segment);
    segment[UDP_HLEN..].copy_from_slice(payload);
    udp.check = checksum::udp_checksum(src, dst, segment);
    udp.emit(segment);

    IpHdr::udp(src, dst, udp_len).emit(&mut frame[ETH_HLEN..]);

    Ok(frame_len)
}

/// 解析 Ethernet + IPv4 + UDP 帧
///
/// 是否校验 IP/UDP 校验和由 `verify_rx_checksums` 配置决定（默认不校验）
///
/// # 参数
/// - `frame`: 收到的完整帧
/// - `capacity`: 调用者能接收的最大数据长度
pub fn decode_udp(frame: &[u8], capacity: usize) -> Result<UdpDatagram, CodecError> {
    decode_udp_with(frame, capacity, VERIFY_RX_CHECKSUMS)
}

/// 解析 Ethernet + IPv4 + UDP 帧，显式指定是否校验校验和
pub fn decode_udp_with(
    frame: &[u8],
    capacity: usize,
    verify_checksums: bool,
) -> Result<UdpDatagram, CodecError> {
    if frame.len() < UDP_FRAME_OVERHEAD {
        return Err(CodecError::Truncated);
    }
    if ethernet::ethertype(frame) != Some(EthProtocol::ETH_P_IP.to_u16()) {
        return Err(CodecError::NotIpv4);
    }

    let ip = IpHdr::parse(&frame[ETH_HLEN..]).ok_or(CodecError::Truncated)?;
    if ip.version() != 4 {
        return Err(CodecError::NotIpv4);
    }
    if ip.header_len() != IPHDR_LEN {
        return Err(CodecError::BadHeaderLength);
    }
    if ip.protocol != IPPROTO_UDP {
        return Err(CodecError::NotUdp);
    }

    let udp_start = ETH_HLEN + IPHDR_LEN;
    let udp = UdpHdr::parse(&frame[udp_start..]).ok_or(CodecError::Truncated)?;
    let ulen = udp.len as usize;
    if ip.tot_len as usize != ulen + IPHDR_LEN || ulen < UDP_HLEN {
        return Err(CodecError::LengthMismatch);
    }
    // 最小帧可能带填充，只要求声明的长度不超过帧
    if udp_start + ulen > frame.len() {
        return Err(CodecError::Truncated);
    }

    let segment = &frame[udp_start..udp_start + ulen];
    if verify_checksums
        && (!checksum::verify_ip_checksum(&frame[ETH_HLEN..udp_start])
            || !checksum::verify_udp_checksum(ip.saddr, ip.daddr, segment))
    {
        return Err(CodecError::BadChecksum);
    }

    let payload = &segment[UDP_HLEN..];
    if payload.len() > capacity {
        return Err(CodecError::PayloadTooLarge);
    }

    Ok(UdpDatagram {
        src: ip.saddr,
        sport: udp.source,
        dport: udp.dest,
        payload: payload.to_vec(),
    })
}
