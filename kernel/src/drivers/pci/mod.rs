//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! PCI 配置空间访问层
//!
//! 通过 PCIe ECAM 扫描总线 0，找到网卡后打开 I/O、内存空间和
//! 总线主控，并把 BAR0 编程到固定的 MMIO 地址
//! 参考: Linux kernel drivers/pci/

use log::{debug, info, warn};

use super::InitError;

/// PCI 配置空间寄存器偏移
pub mod offset {
    pub const VENDOR_ID: u8 = 0x00;
    pub const COMMAND: u8 = 0x04;
    pub const BAR0: u8 = 0x10;
}

/// PCI 命令寄存器位
pub mod command {
    pub const IO_SPACE: u16 = 0x0001;
    pub const MEMORY_SPACE: u16 = 0x0002;
    pub const BUS_MASTER: u16 = 0x0004;
}

/// 已知厂商 ID
pub mod vendor {
    pub const INTEL: u16 = 0x8086;
}

/// 网卡设备 ID
pub mod net_device {
    /// 82540EM (QEMU 的 e1000)
    pub const E1000_82540EM: u16 = 0x100E;
}

/// 总线 0 上的设备槽数
pub const MAX_DEVICES: u8 = 32;

/// ECAM 中每个设备槽占用的字节数 (8 个功能 x 4KiB)
pub const ECAM_DEVICE_STRIDE: usize = 1 << 15;

/// BAR 个数
const BAR_COUNT: u8 = 6;

/// 空槽读出的厂商 ID
const VENDOR_NONE: u16 = 0xFFFF;

/// PCI 配置空间访问结构体
#[derive(Debug, Clone, Copy)]
pub struct PCIConfig {
    pub base_addr: usize,
}

impl PCIConfig {
    /// 创建新的 PCI 配置空间访问
    pub const fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }

    /// 总线 0 上第 `device` 个槽的配置空间
    pub const fn for_slot(ecam_base: usize, device: u8) -> Self {
        Self::new(ecam_base + device as usize * ECAM_DEVICE_STRIDE)
    }

    /// 读取 32 位配置空间寄存器
    pub fn read_config_dword(&self, offset: u8) -> u32 {
        // SAFETY: base_addr 指向已映射的 ECAM 窗口，offset 在 4KiB 配置空间内
        unsafe {
            let ptr = (self.base_addr + offset as usize) as *const u32;
            core::ptr::read_volatile(ptr)
        }
    }

    /// 写入 32 位配置空间寄存器
    pub fn write_config_dword(&self, offset: u8, value: u32) {
        // SAFETY: 同 read_config_dword
        unsafe {
            let ptr = (self.base_addr + offset as usize) as *mut u32;
            core::ptr::write_volatile(ptr, value);
        }
    }

    /// 获取厂商 ID
    pub fn vendor_id(&self) -> u16 {
        self.read_config_dword(offset::VENDOR_ID) as u16
    }

    /// 获取设备 ID
    pub fn device_id(&self) -> u16 {
        (self.read_config_dword(offset::VENDOR_ID) >> 16) as u16
    }

    /// 设置命令寄存器
    pub fn set_command(&self, cmd: u16) {
        self.write_config_dword(offset::COMMAND, cmd as u32);
    }

    /// 获取命令寄存器
    pub fn command(&self) -> u16 {
        self.read_config_dword(offset::COMMAND) as u16
    }

    /// 探测 BAR 大小
    ///
    /// 写入全 1 再读回得到地址掩码，随后恢复原值
    ///
    /// # 返回
    /// 读回的掩码
    pub fn probe_bar(&self, bar_index: u8) -> u32 {
        let bar_offset = offset::BAR0 + bar_index * 4;
        let old = self.read_config_dword(bar_offset);
        self.write_config_dword(bar_offset, 0xFFFF_FFFF);
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        let mask = self.read_config_dword(bar_offset);
        self.write_config_dword(bar_offset, old);
        mask
    }

    /// 设置 BAR 基地址
    pub fn set_bar(&self, bar_index: u8, addr: u32) {
        self.write_config_dword(offset::BAR0 + bar_index * 4, addr);
    }
}

/// 扫描总线 0，返回第一个匹配设备所在的槽号
///
/// # 参数
/// - `ecam_base`: ECAM 窗口基地址
/// - `vendor_id` / `device_id`: 要找的设备
pub fn find_device(ecam_base: usize, vendor_id: u16, device_id: u16) -> Result<u8, InitError> {
    for device in 0..MAX_DEVICES {
        let config = PCIConfig::for_slot(ecam_base, device);
        let vendor = config.vendor_id();
        if vendor == VENDOR_NONE {
            continue;
        }

        debug!("pci: slot {} vendor=0x{:04x} device=0x{:04x}", device, vendor, config.device_id());
        if vendor == vendor_id && config.device_id() == device_id {
            return Ok(device);
        }
    }

    warn!("pci: no device {:04x}:{:04x} on bus 0", vendor_id, device_id);
    Err(InitError::DeviceNotFound)
}

/// 启用 e1000 并把 BAR0 映射到 `mmio_base`
///
/// # 参数
/// - `ecam_base`: ECAM 窗口基地址
/// - `slot`: 设备槽号
/// - `mmio_base`: 寄存器窗口地址，必须位于 4GiB 以下
///
/// # 返回
/// 槽中不是 e1000 时返回错误
pub fn enable_e1000(ecam_base: usize, slot: u8, mmio_base: u32) -> Result<(), InitError> {
    let config = PCIConfig::for_slot(ecam_base, slot);
    let vendor = config.vendor_id();
    let device = config.device_id();

    if vendor == VENDOR_NONE {
        return Err(InitError::DeviceNotFound);
    }
    if vendor != vendor::INTEL || device != net_device::E1000_82540EM {
        return Err(InitError::UnexpectedDevice { vendor, device });
    }

    config.set_command(command::IO_SPACE | command::MEMORY_SPACE | command::BUS_MASTER);
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);

    for bar in 0..BAR_COUNT {
        let mask = config.probe_bar(bar);
        debug!("pci: BAR{} mask=0x{:08x}", bar, mask);
    }

    config.set_bar(0, mmio_base);
    info!("pci: e1000 at slot {} mapped to 0x{:x}", slot, mmio_base);
    Ok(())
}

/// 扫描总线并启用 e1000
///
/// # 返回
/// 设备所在的槽号
pub fn probe_e1000(ecam_base: usize, mmio_base: u32) -> Result<u8, InitError> {
    let slot = find_device(ecam_base, vendor::INTEL, net_device::E1000_82540EM)?;
    enable_e1000(ecam_base, slot, mmio_base)?;
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS_PER_SLOT: usize = ECAM_DEVICE_STRIDE / 4;

    /// 用普通内存模拟的 ECAM 窗口，空槽读出全 1
    fn fake_ecam() -> Vec<u32> {
        vec![0xFFFF_FFFF; WORDS_PER_SLOT * MAX_DEVICES as usize]
    }

    fn install(ecam: &mut [u32], slot: usize, vendor: u16, device: u16) {
        let base = slot * WORDS_PER_SLOT;
        ecam[base] = (device as u32) << 16 | vendor as u32;
        ecam[base + 1] = 0;
        for bar in 0..6 {
            ecam[base + 4 + bar] = 0;
        }
    }

    #[test]
    fn test_probe_finds_e1000() {
        let mut ecam = fake_ecam();
        install(&mut ecam, 0, 0x1B36, 0x0008);
        install(&mut ecam, 3, vendor::INTEL, net_device::E1000_82540EM);
        let base = ecam.as_mut_ptr() as usize;

        let slot = probe_e1000(base, 0x4000_0000).unwrap();
        assert_eq!(slot, 3);

        let word = 3 * WORDS_PER_SLOT;
        assert_eq!(PCIConfig::for_slot(base, 3).command(), 7);
        assert_eq!(ecam[word + 4], 0x4000_0000);
        // 其余 BAR 探测后恢复原值
        assert_eq!(ecam[word + 5], 0);
    }

    #[test]
    fn test_probe_empty_bus() {
        let mut ecam = fake_ecam();
        let base = ecam.as_mut_ptr() as usize;
        assert_eq!(probe_e1000(base, 0x4000_0000), Err(InitError::DeviceNotFound));
    }

    #[test]
    fn test_enable_rejects_other_device() {
        let mut ecam = fake_ecam();
        install(&mut ecam, 2, 0x1AF4, 0x1000);
        let base = ecam.as_mut_ptr() as usize;
        assert_eq!(
            enable_e1000(base, 2, 0x4000_0000),
            Err(InitError::UnexpectedDevice { vendor: 0x1AF4, device: 0x1000 })
        );
    }
}
