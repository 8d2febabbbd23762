//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv4 协议
//!
//! 只处理固定 20 字节头部、不分片的报文
//! 参考: include/uapi/linux/ip.h

pub mod checksum;

use core::net::Ipv4Addr;

/// IPv4 地址长度
pub const IP_ALEN: usize = 4;

/// IPv4 头部长度
pub const IPHDR_LEN: usize = 20;

/// 版本 4，头部长度 5 个 32 位字
pub const IP_VERSION_IHL: u8 = 0x45;

/// UDP 协议号
pub const IPPROTO_UDP: u8 = 17;

/// IPv4 默认 TTL
pub use crate::config::IP_DEFAULT_TTL;

/// IPv4 头部
///
/// 对应 Linux 的 iphdr，字段保存为主机字节序，`parse` / `emit` 负责转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHdr {
    /// 版本 (4 bits) + 头部长度 (4 bits)
    pub version_ihl: u8,
    /// 服务类型
    pub tos: u8,
    /// 总长度
    pub tot_len: u16,
    /// 标识
    pub id: u16,
    /// 分片标志 + 分片偏移
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    /// 头部校验和
    pub check: u16,
    pub saddr: Ipv4Addr,
    pub daddr: Ipv4Addr,
}

impl IpHdr {
    /// 构造一个承载 `payload_len` 字节的 UDP 报文头部
    pub fn udp(saddr: Ipv4Addr, daddr: Ipv4Addr, payload_len: usize) -> Self {
        Self {
            version_ihl: IP_VERSION_IHL,
            tos: 0,
            tot_len: (IPHDR_LEN + payload_len) as u16,
            id: 0,
            frag_off: 0,
            ttl: IP_DEFAULT_TTL,
            protocol: IPPROTO_UDP,
            check: 0,
            saddr,
            daddr,
        }
    }

    /// 从字节切片解析 IP 头部
    ///
    /// # 返回
    /// 长度不足 20 字节时返回 None，其余字段不做检查
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = data.get(..IPHDR_LEN)?;
        let be16 = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]);

        Some(Self {
            version_ihl: data[0],
            tos: data[1],
            tot_len: be16(2),
            id: be16(4),
            frag_off: be16(6),
            ttl: data[8],
            protocol: data[9],
            check: be16(10),
            saddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            daddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// 写入头部并填写校验和
    ///
    /// # 参数
    /// - `buf`: 至少 20 字节
    pub fn emit(&self, buf: &mut [u8]) {
        let header = &mut buf[..IPHDR_LEN];
        header[0] = self.version_ihl;
        header[1] = self.tos;
        header[2..4].copy_from_slice(&self.tot_len.to_be_bytes());
        header[4..6].copy_from_slice(&self.id.to_be_bytes());
        header[6..8].copy_from_slice(&self.frag_off.to_be_bytes());
        header[8] = self.ttl;
        header[9] = self.protocol;
        // 校验和字段为 0 时计算
        header[10..12].copy_from_slice(&[0, 0]);
        header[12..16].copy_from_slice(&self.saddr.octets());
        header[16..20].copy_from_slice(&self.daddr.octets());

        let check = checksum::ip_checksum(header);
        header[10..12].copy_from_slice(&check.to_be_bytes());
    }

    /// 版本号
    pub fn version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// 头部长度（字节）
    pub fn header_len(&self) -> usize {
        ((self.version_ihl & 0x0F) as usize) * 4
    }
}
