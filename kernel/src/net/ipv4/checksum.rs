//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IP 校验和计算
//!
//! 完全遵循 RFC 1071 - Computing the Internet Checksum

use core::net::Ipv4Addr;

/// 部分和：按 16 位大端字累加，奇数长度时末字节低位补零
///
/// # 参数
/// - `data`: 数据
/// - `initial`: 之前的部分和
///
/// # 返回
/// 未折叠的 32 位累加值，可继续传给下一段数据
pub fn partial_checksum(data: &[u8], initial: u32) -> u32 {
    let mut sum = initial;
    let mut words = data.chunks_exact(2);

    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }

    // 处理最后一个字节 (如果长度为奇数)
    if let [last] = words.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }

    sum
}

/// 折叠进位并取反
pub fn finalize_checksum(sum: u32) -> u16 {
    let mut sum = sum;
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// 计算 IP 校验和
///
/// # 参数
/// - `data`: 数据，可以是奇数长度
///
/// # 返回
/// 校验和（按大端写入报文）
pub fn ip_checksum(data: &[u8]) -> u16 {
    finalize_checksum(partial_checksum(data, 0))
}

/// 验证 IP 校验和
///
/// 包含校验和字段在内重新计算，结果为 0 即有效
pub fn verify_ip_checksum(data: &[u8]) -> bool {
    ip_checksum(data) == 0
}

/// 伪头部部分和 (用于 TCP/UDP)
///
/// # 参数
/// - `src_addr`: 源 IP 地址
/// - `dst_addr`: 目标 IP 地址
/// - `protocol`: 协议号
/// - `len`: TCP/UDP 段长度（含头部）
pub fn pseudo_header_sum(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, protocol: u8, len: u16) -> u32 {
    let mut pseudo_header = [0u8; 12];

    pseudo_header[0..4].copy_from_slice(&src_addr.octets());
    pseudo_header[4..8].copy_from_slice(&dst_addr.octets());
    // 保留 (1 字节) + 协议 (1 字节)
    pseudo_header[9] = protocol;
    pseudo_header[10..12].copy_from_slice(&len.to_be_bytes());

    partial_checksum(&pseudo_header, 0)
}

/// UDP 校验和
///
/// # 参数
/// - `segment`: UDP 头部 + 数据，校验和字段为 0 或为待验证的值
///
/// # 返回
/// 按伪头部 + 段计算的校验和；结果为 0 时按 RFC 768 返回 0xFFFF
pub fn udp_checksum(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, segment: &[u8]) -> u16 {
    let sum = pseudo_header_sum(src_addr, dst_addr, super::IPPROTO_UDP, segment.len() as u16);
    match finalize_checksum(partial_checksum(segment, sum)) {
        0 => 0xFFFF,
        csum => csum,
    }
}

/// 验证 UDP 校验和
///
/// 校验和字段为 0 表示发送方没有计算，视为有效
pub fn verify_udp_checksum(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, segment: &[u8]) -> bool {
    if segment.len() >= 8 && segment[6] == 0 && segment[7] == 0 {
        return true;
    }
    let sum = pseudo_header_sum(src_addr, dst_addr, super::IPPROTO_UDP, segment.len() as u16);
    finalize_checksum(partial_checksum(segment, sum)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(ip_checksum(&data), 0x220d);
    }

    #[test]
    fn test_ip_checksum() {
        // 校验和字段为 0 的 IPv4 头部
        let mut header = [
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06,
            0x00, 0x00, 0xc0, 0xa8, 0x01, 0x01, 0xc0, 0xa8, 0x01, 0x02,
        ];
        let csum = ip_checksum(&header);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        assert!(verify_ip_checksum(&header));
    }

    #[test]
    fn test_odd_length() {
        // 奇数长度等价于末尾补一个零字节
        let odd = [0x12, 0x34, 0x56];
        let padded = [0x12, 0x34, 0x56, 0x00];
        assert_eq!(ip_checksum(&odd), ip_checksum(&padded));
        assert_eq!(ip_checksum(&odd), !(0x1234u16 + 0x5600));
    }

    #[test]
    fn test_partial_matches_whole() {
        let data: Vec<u8> = (0..=255u8).collect();
        let split = partial_checksum(&data[100..], partial_checksum(&data[..100], 0));
        assert_eq!(finalize_checksum(split), ip_checksum(&data));
    }

    #[test]
    fn test_inserted_checksum_sums_to_zero() {
        let mut seed = 0x2545_f491u32;
        for len in 0..64usize {
            // 校验和字段放在开头，数据跟在后面（奇数长度时末尾隐含补零）
            let mut buf = vec![0u8; 2 + len];
            for byte in &mut buf[2..] {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                *byte = (seed >> 16) as u8;
            }

            let csum = ip_checksum(&buf);
            buf[..2].copy_from_slice(&csum.to_be_bytes());
            assert_eq!(ip_checksum(&buf), 0, "len {}", len);
            assert!(verify_ip_checksum(&buf), "len {}", len);
        }
    }

    #[test]
    fn test_zeros_and_ones() {
        assert_eq!(ip_checksum(&[0u8; 20]), 0xFFFF);
        assert_eq!(ip_checksum(&[0xFFu8; 20]), 0x0000);
    }

    #[test]
    fn test_udp_checksum_verifies() {
        let src = Ipv4Addr::new(10, 0, 2, 15);
        let dst = Ipv4Addr::new(10, 0, 2, 2);
        let mut segment = [0x07, 0xd0, 0x0b, 0xb8, 0x00, 0x0b, 0x00, 0x00, b'a', b'b', b'c'];
        let csum = udp_checksum(src, dst, &segment);
        segment[6..8].copy_from_slice(&csum.to_be_bytes());
        assert!(verify_udp_checksum(src, dst, &segment));

        segment[8] ^= 0xFF;
        assert!(!verify_udp_checksum(src, dst, &segment));
    }
}
