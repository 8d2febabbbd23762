//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 以太网层
//!
//! 帧头固定位于偏移 0：目标 MAC、源 MAC、以太网类型（大端）

/// 以太网头部长度
pub const ETH_HLEN: usize = 14;

/// 以太网地址长度 (MAC 地址)
pub const ETH_ALEN: usize = 6;

/// 以太网类型字段偏移
const ETH_TYPE_OFFSET: usize = 12;

/// 广播 MAC 地址
pub const ETH_BROADCAST: [u8; ETH_ALEN] = [0xFF; ETH_ALEN];

/// 以太网协议类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum EthProtocol {
    /// IPv4
    ETH_P_IP = 0x0800,
    /// ARP
    ETH_P_ARP = 0x0806,
}

impl EthProtocol {
    /// 从 u16 转换
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0800 => Some(EthProtocol::ETH_P_IP),
            0x0806 => Some(EthProtocol::ETH_P_ARP),
            _ => None,
        }
    }

    /// 转换为 u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// 以太网帧头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHdr {
    /// 目标 MAC 地址
    pub h_dest: [u8; ETH_ALEN],
    /// 源 MAC 地址
    pub h_source: [u8; ETH_ALEN],
    /// 协议类型（主机字节序）
    pub h_proto: u16,
}

impl EthHdr {
    /// 从字节切片解析以太网头部
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = data.get(..ETH_HLEN)?;
        let mut h_dest = [0u8; ETH_ALEN];
        let mut h_source = [0u8; ETH_ALEN];
        h_dest.copy_from_slice(&data[0..6]);
        h_source.copy_from_slice(&data[6..12]);

        Some(Self {
            h_dest,
            h_source,
            h_proto: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// 写入头部
    ///
    /// # 参数
    /// - `buf`: 至少 14 字节
    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.h_dest);
        buf[6..12].copy_from_slice(&self.h_source);
        buf[12..14].copy_from_slice(&self.h_proto.to_be_bytes());
    }

    /// 获取协议类型
    pub fn protocol(&self) -> Option<EthProtocol> {
        EthProtocol::from_u16(self.h_proto)
    }

    /// 检查是否为广播帧
    pub fn is_broadcast(&self) -> bool {
        self.h_dest == ETH_BROADCAST
    }
}

/// 读取帧的以太网类型
///
/// # 返回
/// 帧短于以太网头部时返回 None
pub fn ethertype(frame: &[u8]) -> Option<u16> {
    let bytes = frame.get(ETH_TYPE_OFFSET..ETH_HLEN)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// 改写帧的目标和源 MAC 地址
pub fn set_addresses(frame: &mut [u8], dest: [u8; ETH_ALEN], source: [u8; ETH_ALEN]) {
    frame[0..6].copy_from_slice(&dest);
    frame[6..12].copy_from_slice(&source);
}

/// 格式化 MAC 地址（用于日志）
pub struct MacAddr<'a>(pub &'a [u8; ETH_ALEN]);

impl core::fmt::Display for MacAddr<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let m = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", m[0], m[1], m[2], m[3], m[4], m[5])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_emit() {
        let hdr = EthHdr {
            h_dest: ETH_BROADCAST,
            h_source: [0x52, 0x54, 0x00, 0x12, 0x34, 0x56],
            h_proto: EthProtocol::ETH_P_ARP.to_u16(),
        };
        let mut buf = [0u8; ETH_HLEN];
        hdr.emit(&mut buf);

        assert_eq!(&buf[12..14], &[0x08, 0x06]);
        assert_eq!(ethertype(&buf), Some(0x0806));

        let parsed = EthHdr::parse(&buf).unwrap();
        assert_eq!(parsed, hdr);
        assert!(parsed.is_broadcast());
        assert_eq!(parsed.protocol(), Some(EthProtocol::ETH_P_ARP));
    }

    #[test]
    fn test_short_frame() {
        assert_eq!(ethertype(&[0u8; 13]), None);
        assert!(EthHdr::parse(&[0u8; 13]).is_none());
    }

    #[test]
    fn test_mac_display() {
        let mac = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
        assert_eq!(format!("{}", MacAddr(&mac)), "52:54:00:12:34:56");
    }
}
