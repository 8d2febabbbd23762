//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ARP 协议
//!
//! 只做应答：对方询问本机 IPv4 地址时回复本机 MAC，不维护缓存
//! 参考: net/ipv4/arp.c, include/uapi/linux/if_arp.h

use core::net::Ipv4Addr;

use log::debug;

use super::ethernet::{self, EthHdr, EthProtocol, MacAddr, ETH_ALEN, ETH_HLEN};
use super::ipv4::IP_ALEN;
use super::CodecError;
use crate::drivers::net::NetDevice;

/// ARP 报文长度 (以太网 + IPv4)
pub const ARP_PLEN: usize = 28;

/// ARP 帧长度
pub const ARP_FRAME_LEN: usize = ETH_HLEN + ARP_PLEN;

/// ARP 硬件类型
///
/// 对应 Linux 的 ARPHRD_* (include/linux/if_arp.h)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpHrd {
    /// 以太网
    ARPHRD_ETHER = 1,
}

/// ARP 操作类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpOp {
    /// ARP 请求
    ARPOP_REQUEST = 1,
    /// ARP 响应
    ARPOP_REPLY = 2,
}

/// ARP 报文
///
/// 对应 Linux 的 arphdr + 以太网/IPv4 地址部分，字段为主机字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// 硬件类型
    pub ar_hrd: u16,
    /// 协议类型
    pub ar_pro: u16,
    /// 硬件地址长度
    pub ar_hln: u8,
    /// 协议地址长度
    pub ar_pln: u8,
    /// 操作类型
    pub ar_op: u16,
    /// 发送方硬件地址
    pub ar_sha: [u8; ETH_ALEN],
    /// 发送方协议地址
    pub ar_sip: Ipv4Addr,
    /// 目标硬件地址
    pub ar_tha: [u8; ETH_ALEN],
    /// 目标协议地址
    pub ar_tip: Ipv4Addr,
}

impl ArpPacket {
    /// 从字节切片解析 ARP 报文
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = data.get(..ARP_PLEN)?;
        let be16 = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]);
        let mac = |at: usize| {
            let mut mac = [0u8; ETH_ALEN];
            mac.copy_from_slice(&data[at..at + ETH_ALEN]);
            mac
        };
        let ip = |at: usize| Ipv4Addr::new(data[at], data[at + 1], data[at + 2], data[at + 3]);

        Some(Self {
            ar_hrd: be16(0),
            ar_pro: be16(2),
            ar_hln: data[4],
            ar_pln: data[5],
            ar_op: be16(6),
            ar_sha: mac(8),
            ar_sip: ip(14),
            ar_tha: mac(18),
            ar_tip: ip(24),
        })
    }

    /// 写入报文
    ///
    /// # 参数
    /// - `buf`: 至少 28 字节
    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.ar_hrd.to_be_bytes());
        buf[2..4].copy_from_slice(&self.ar_pro.to_be_bytes());
        buf[4] = self.ar_hln;
        buf[5] = self.ar_pln;
        buf[6..8].copy_from_slice(&self.ar_op.to_be_bytes());
        buf[8..14].copy_from_slice(&self.ar_sha);
        buf[14..18].copy_from_slice(&self.ar_sip.octets());
        buf[18..24].copy_from_slice(&self.ar_tha);
        buf[24..28].copy_from_slice(&self.ar_tip.octets());
    }

    /// 检查是否为 ARP 请求
    pub fn is_request(&self) -> bool {
        self.ar_op == ArpOp::ARPOP_REQUEST as u16
    }
}

/// 解码后的 ARP 帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpFrame {
    /// 以太网源地址
    pub eth_source: [u8; ETH_ALEN],
    pub packet: ArpPacket,
}

/// 解析 Ethernet + ARP 帧
///
/// 只检查长度和以太网类型
pub fn decode_arp(frame: &[u8]) -> Result<ArpFrame, CodecError> {
    if frame.len() < ARP_FRAME_LEN {
        return Err(CodecError::Truncated);
    }
    let eth = EthHdr::parse(frame).ok_or(CodecError::Truncated)?;
    if eth.protocol() != Some(EthProtocol::ETH_P_ARP) {
        return Err(CodecError::NotArp);
    }
    let packet = ArpPacket::parse(&frame[ETH_HLEN..]).ok_or(CodecError::Truncated)?;

    Ok(ArpFrame {
        eth_source: eth.h_source,
        packet,
    })
}

/// 构造 ARP 应答帧
///
/// 交换发送方和目标：以太网目标为请求的以太网源，发送方硬件地址和
/// 以太网源都填 `my_mac`，发送方协议地址为请求的目标地址
pub fn encode_arp_reply(request: &ArpFrame, my_mac: [u8; ETH_ALEN]) -> [u8; ARP_FRAME_LEN] {
    let mut buf = [0u8; ARP_FRAME_LEN];

    EthHdr {
        h_dest: request.eth_source,
        h_source: my_mac,
        h_proto: EthProtocol::ETH_P_ARP.to_u16(),
    }
    .emit(&mut buf);

    ArpPacket {
        ar_op: ArpOp::ARPOP_REPLY as u16,
        ar_sha: my_mac,
        ar_sip: request.packet.ar_tip,
        ar_tha: request.eth_source,
        ar_tip: request.packet.ar_sip,
        ..request.packet
    }
    .emit(&mut buf[ETH_HLEN..]);

    buf
}

/// ARP 应答者
#[derive(Debug, Clone, Copy)]
pub struct ArpResponder {
    local_ip: Ipv4Addr,
    local_mac: [u8; ETH_ALEN],
}

impl ArpResponder {
    pub const fn new(local_ip: Ipv4Addr, local_mac: [u8; ETH_ALEN]) -> Self {
        Self { local_ip, local_mac }
    }

    /// 处理一帧
    ///
    /// 询问本机地址的请求会得到应答；应答尽力发送，发送环满时丢弃，
    /// 对方会重发请求
    ///
    /// # 返回
    /// 帧是 ARP（无论是否应答）时返回 true，调用者应丢弃该帧
    pub fn handle(&self, dev: &dyn NetDevice, frame: &[u8]) -> bool {
        let request = match decode_arp(frame) {
            Ok(request) => request,
            Err(_) => return false,
        };

        let packet = &request.packet;
        if packet.is_request()
            && packet.ar_pln as usize == IP_ALEN
            && packet.ar_tip == self.local_ip
        {
            let reply = encode_arp_reply(&request, self.local_mac);
            match dev.try_transmit(&reply) {
                Ok(()) => {
                    debug!("arp: replied to {} ({})", packet.ar_sip, MacAddr(&request.eth_source))
                }
                Err(err) => debug!("arp: reply to {} dropped: {}", packet.ar_sip, err),
            }
        } else {
            debug!("arp: ignored op={} tip={}", packet.ar_op, packet.ar_tip);
        }

        true
    }
}

/// 构造一个 ARP 请求帧（广播）
///
/// 接收路径只需要应答，这个函数供对端模拟和测试构造请求
pub fn encode_arp_request(
    sender_mac: [u8; ETH_ALEN],
    sender_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) -> [u8; ARP_FRAME_LEN] {
    let mut buf = [0u8; ARP_FRAME_LEN];

    EthHdr {
        h_dest: ethernet::ETH_BROADCAST,
        h_source: sender_mac,
        h_proto: EthProtocol::ETH_P_ARP.to_u16(),
    }
    .emit(&mut buf);

    ArpPacket {
        ar_hrd: ArpHrd::ARPHRD_ETHER as u16,
        ar_pro: EthProtocol::ETH_P_IP.to_u16(),
        ar_hln: ETH_ALEN as u8,
        ar_pln: IP_ALEN as u8,
        ar_op: ArpOp::ARPOP_REQUEST as u16,
        ar_sha: sender_mac,
        ar_sip: sender_ip,
        ar_tha: [0; ETH_ALEN],
        ar_tip: target_ip,
    }
    .emit(&mut buf[ETH_HLEN..]);

    buf
}
