//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! e1000 寄存器接口
//!
//! 寄存器偏移和位定义参考 Intel 8254x 开发手册 (第 13 章)，
//! 所有访问都经过 `RegisterBus`，真实硬件上是 MMIO，测试中由模拟网卡实现

use alloc::sync::Arc;

use bitflags::bitflags;

/// 寄存器字节偏移
pub mod offset {
    /// Interrupt Cause Read (读清零)
    pub const ICR: usize = 0x000C0;
    /// Interrupt Mask Set
    pub const IMS: usize = 0x000D0;
    /// RX Control
    pub const RCTL: usize = 0x00100;
    /// TX Control
    pub const TCTL: usize = 0x00400;
    /// TX Inter-packet gap
    pub const TIPG: usize = 0x00410;
    /// RX Descriptor Base Address Low
    pub const RDBAL: usize = 0x02800;
    /// RX Descriptor Base Address High
    pub const RDBAH: usize = 0x02804;
    /// RX Descriptor Length
    pub const RDLEN: usize = 0x02808;
    /// RX Descriptor Head
    pub const RDH: usize = 0x02810;
    /// RX Descriptor Tail
    pub const RDT: usize = 0x02818;
    /// RX Delay Timer
    pub const RDTR: usize = 0x02820;
    /// RX Interrupt Absolute Delay Timer
    pub const RADV: usize = 0x0282C;
    /// TX Descriptor Base Address Low
    pub const TDBAL: usize = 0x03800;
    /// TX Descriptor Base Address High
    pub const TDBAH: usize = 0x03804;
    /// TX Descriptor Length
    pub const TDLEN: usize = 0x03808;
    /// TX Descriptor Head
    pub const TDH: usize = 0x03810;
    /// TX Descriptor Tail
    pub const TDT: usize = 0x03818;
    /// Multicast Table Array
    pub const MTA: usize = 0x05200;
    /// Receive Address (RAL0, RAH0)
    pub const RA: usize = 0x05400;
}

/// 多播表项数
pub const MTA_ENTRIES: usize = 128;

/// TCTL.CT 字段偏移
pub const TCTL_CT_SHIFT: u32 = 4;
/// TCTL.COLD 字段偏移
pub const TCTL_COLD_SHIFT: u32 = 12;

/// 冲突门限（手册推荐值）
pub const TCTL_CT_DEFAULT: u32 = 0x10;
/// 全双工冲突距离（手册推荐值）
pub const TCTL_COLD_DEFAULT: u32 = 0x40;

/// TIPG: IPGT=10, IPGR1=8, IPGR2=6
pub const TIPG_DEFAULT: u32 = 10 | (8 << 10) | (6 << 20);

/// RAH 地址有效位
pub const RAH_AV: u32 = 1 << 31;

bitflags! {
    /// TX Control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tctl: u32 {
        const EN  = 0x0000_0002; /* enable tx */
        const PSP = 0x0000_0008; /* pad short packets */
    }
}

bitflags! {
    /// RX Control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rctl: u32 {
        const EN      = 0x0000_0002; /* enable */
        const BAM     = 0x0000_8000; /* broadcast enable */
        const SZ_2048 = 0x0000_0000; /* rx buffer size 2048 */
        const SECRC   = 0x0400_0000; /* strip ethernet CRC */
    }
}

bitflags! {
    /// 中断原因 / 中断屏蔽位 (ICR, IMS)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u32 {
        const TXDW = 1 << 0; /* tx descriptor written back */
        const RXT0 = 1 << 7; /* rx timer interrupt */
    }
}

bitflags! {
    /// 发送描述符命令
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxCmd: u8 {
        const EOP = 0x01; /* end of packet */
        const RS  = 0x08; /* report status */
    }
}

bitflags! {
    /// 发送描述符状态
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxStatus: u8 {
        const DD = 0x01; /* descriptor done */
    }
}

bitflags! {
    /// 接收描述符状态
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxStatus: u8 {
        const DD  = 0x01; /* descriptor done */
        const EOP = 0x02; /* end of packet */
    }
}

/// 寄存器总线
///
/// 驱动只通过这个 trait 读写网卡寄存器，并把缓冲区虚拟地址翻译成设备
/// 可见的 DMA 地址
pub trait RegisterBus: Send + Sync {
    /// 读取 32 位寄存器
    fn read(&self, offset: usize) -> u32;

    /// 写入 32 位寄存器
    fn write(&self, offset: usize, value: u32);

    /// 虚拟地址到 DMA 地址的转换
    ///
    /// 内核使用恒等映射，默认原样返回
    fn dma_address(&self, vaddr: usize) -> u64 {
        vaddr as u64
    }
}

impl<T: RegisterBus + ?Sized> RegisterBus for Arc<T> {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }

    fn dma_address(&self, vaddr: usize) -> u64 {
        (**self).dma_address(vaddr)
    }
}

/// MMIO 寄存器窗口
#[derive(Debug)]
pub struct MmioBus {
    base: usize,
}

impl MmioBus {
    /// 在 `base` 处创建寄存器窗口
    ///
    /// # Safety
    /// `base` 必须是已映射的 e1000 BAR0 窗口（至少 128KiB），并且在
    /// 窗口的整个生命周期内保持有效
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl RegisterBus for MmioBus {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: 构造时保证窗口有效，offset 来自寄存器表
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: 同上
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// 由 MAC 地址得到 (RAL0, RAH0)
///
/// # 返回
/// RAL0 放低 4 字节，RAH0 放高 2 字节并置地址有效位
pub fn receive_address(mac: [u8; 6]) -> (u32, u32) {
    let low = u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]]);
    let high = u16::from_le_bytes([mac[4], mac[5]]) as u32 | RAH_AV;
    (low, high)
}

/// TCTL 初始值：EN | PSP | CT | COLD
pub fn tctl_default() -> u32 {
    (Tctl::EN | Tctl::PSP).bits()
        | (TCTL_CT_DEFAULT << TCTL_CT_SHIFT)
        | (TCTL_COLD_DEFAULT << TCTL_COLD_SHIFT)
}

/// RCTL 初始值：EN | BAM | SZ_2048 | SECRC
pub fn rctl_default() -> u32 {
    (Rctl::EN | Rctl::BAM | Rctl::SZ_2048 | Rctl::SECRC).bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_address() {
        let (ral, rah) = receive_address([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
        assert_eq!(ral, 0x1200_5452);
        assert_eq!(rah, 0x5634 | (1 << 31));
    }

    #[test]
    fn test_control_defaults() {
        assert_eq!(tctl_default(), 0x2 | 0x8 | (0x10 << 4) | (0x40 << 12));
        assert_eq!(rctl_default(), 0x0400_8002);
        assert_eq!(TIPG_DEFAULT, 10 | (8 << 10) | (6 << 20));
    }

    #[test]
    fn test_mmio_bus() {
        let mut window = [0u32; 8];
        let bus = unsafe { MmioBus::new(window.as_mut_ptr() as usize) };
        bus.write(8, 0xdead_beef);
        assert_eq!(bus.read(8), 0xdead_beef);
        assert_eq!(window[2], 0xdead_beef);
        assert_eq!(bus.dma_address(0x1000), 0x1000);
    }
}
