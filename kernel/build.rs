//! Rux 网络子系统构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 的 [network] / [platform] 配置
//! 2. 校验描述符环几何参数
//! 3. 生成 $OUT_DIR/config.rs

use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// 读取 `[section] key` 整数，缺省时返回 `default`
fn int_or(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn bool_or(config: &toml::Value, section: &str, key: &str, default: bool) -> bool {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

fn str_or<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

/// 解析 "52:54:00:12:34:56" 形式的 MAC 地址
fn parse_mac(key: &str, text: &str) -> [u8; 6] {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 6 {
        panic!("Kernel.toml: {} = \"{}\" 不是合法的 MAC 地址", key, text);
    }

    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(part, 16)
            .unwrap_or_else(|_| panic!("Kernel.toml: {} = \"{}\" 不是合法的 MAC 地址", key, text));
    }
    mac
}

fn parse_ip(key: &str, text: &str) -> Ipv4Addr {
    text.parse()
        .unwrap_or_else(|_| panic!("Kernel.toml: {} = \"{}\" 不是合法的 IPv4 地址", key, text))
}

/// 描述符环大小：2 的幂，且描述符表字节数是 128 的倍数 (E1000 TDLEN/RDLEN 要求)
fn ring_size(key: &str, value: i64) -> usize {
    if value <= 0 || !(value as u64).is_power_of_two() {
        panic!("Kernel.toml: {} = {} 必须是 2 的幂", key, value);
    }
    if (value as usize * 16) % 128 != 0 {
        panic!("Kernel.toml: {} = {} 描述符表大小必须是 128 字节的倍数", key, value);
    }
    value as usize
}

fn mac_literal(mac: [u8; 6]) -> String {
    let bytes: Vec<String> = mac.iter().map(|b| format!("0x{:02x}", b)).collect();
    format!("[{}]", bytes.join(", "))
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let kernel_toml = manifest_dir.join("../Kernel.toml");
    println!("cargo:rerun-if-changed={}", kernel_toml.display());
    println!("cargo:rerun-if-changed=build.rs");

    let config: toml::Value = match fs::read_to_string(&kernel_toml) {
        Ok(content) => toml::from_str(&content).expect("Kernel.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using built-in network defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    let local_ip = parse_ip("local_ip", str_or(&config, "network", "local_ip", "10.0.2.15"));
    let local_mac =
        parse_mac("local_mac", str_or(&config, "network", "local_mac", "52:54:00:12:34:56"));
    let gateway_mac =
        parse_mac("gateway_mac", str_or(&config, "network", "gateway_mac", "52:55:0a:00:02:02"));

    let ttl = int_or(&config, "network", "ip_default_ttl", 100);
    if !(1..=255).contains(&ttl) {
        panic!("Kernel.toml: ip_default_ttl = {} 超出范围", ttl);
    }

    let tx_ring_size = ring_size("tx_ring_size", int_or(&config, "network", "tx_ring_size", 16));
    let rx_ring_size = ring_size("rx_ring_size", int_or(&config, "network", "rx_ring_size", 16));
    let tx_buffer_size = int_or(&config, "network", "tx_buffer_size", 1518);
    let rx_buffer_size = int_or(&config, "network", "rx_buffer_size", 2048);
    if rx_buffer_size != 2048 {
        // RCTL 固定编程为 BSIZE=2048
        panic!("Kernel.toml: rx_buffer_size 只支持 2048");
    }
    if !(64..=16288).contains(&tx_buffer_size) {
        panic!("Kernel.toml: tx_buffer_size = {} 超出范围", tx_buffer_size);
    }

    let frame_capacity = int_or(&config, "network", "frame_capacity", 4096);
    let verify_rx_checksums = bool_or(&config, "network", "verify_rx_checksums", false);
    let socket_table_size = int_or(&config, "network", "udp_socket_table_size", 64);
    let socket_backlog = int_or(&config, "network", "socket_backlog", 16);

    let ecam_base = int_or(&config, "platform", "ecam_base", 0x3000_0000);
    let mmio_base = int_or(&config, "platform", "e1000_mmio_base", 0x4000_0000);
    if mmio_base > u32::MAX as i64 {
        // BAR0 是 32 位的
        panic!("Kernel.toml: e1000_mmio_base 必须位于 4GiB 以下");
    }

    let octets = local_ip.octets();
    let config_code = format!(
        r#"// Rux 网络配置（自动生成）
//
// 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

/// 本机 IPv4 地址
pub const LOCAL_IP: Ipv4Addr = Ipv4Addr::new({}, {}, {}, {});

/// 本机 MAC 地址
pub const LOCAL_MAC: [u8; 6] = {local_mac};

/// 默认对端（网关）MAC 地址
pub const GATEWAY_MAC: [u8; 6] = {gateway_mac};

/// IPv4 默认 TTL
pub const IP_DEFAULT_TTL: u8 = {ttl};

/// 发送描述符环大小
pub const TX_RING_SIZE: usize = {tx_ring_size};

/// 接收描述符环大小
pub const RX_RING_SIZE: usize = {rx_ring_size};

/// 发送缓冲区大小（最大帧长）
pub const TX_BUFFER_SIZE: usize = {tx_buffer_size};

/// 接收缓冲区大小
pub const RX_BUFFER_SIZE: usize = {rx_buffer_size};

/// 组帧缓冲区容量
pub const FRAME_CAPACITY: usize = {frame_capacity};

/// 接收路径是否校验 IP/UDP 校验和
pub const VERIFY_RX_CHECKSUMS: bool = {verify_rx_checksums};

/// UDP 套接字表大小
pub const UDP_SOCKET_TABLE_SIZE: usize = {socket_table_size};

/// 每端口积压队列长度
pub const SOCKET_BACKLOG: usize = {socket_backlog};

/// PCIe ECAM 基地址
pub const ECAM_BASE: usize = {ecam_base:#x};

/// e1000 寄存器 (BAR0) 基地址
pub const E1000_MMIO_BASE: usize = {mmio_base:#x};
"#,
        octets[0], octets[1], octets[2], octets[3],
        local_mac = mac_literal(local_mac),
        gateway_mac = mac_literal(gateway_mac),
    );

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let config_file = out_dir.join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_code {
        fs::write(&config_file, &config_code).expect("写入配置文件失败");
    }
}
