//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 模拟 e1000 网卡
//!
//! 用软件实现网卡的设备侧，供没有硬件时的联调和测试使用：
//! - 寄存器文件，ICR 读清零
//! - 通过驱动编程的 TDBAL/RDBAL 直接"DMA"访问描述符和缓冲区
//! - 发送：驱动写 TDT 后退役描述符（置 DD）并截获帧；关闭自动完成时
//!   由 `complete_tx` 手动退役，用来模拟设备跟不上的情况
//! - 接收：`inject` 把帧写入下一个归设备所有的接收描述符并置 RXT0
//!
//! 只在 DMA 地址等于虚拟地址（恒等映射）时可用。

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use log::{debug, trace};
use spin::Mutex;

use super::e1000::regs::{offset, Interrupts, RegisterBus, Rctl, RxStatus, TxStatus};
use super::e1000::ring::{RxDesc, TxDesc, DESC_SIZE};

/// RCTL.BSIZE = 2048 时每个接收缓冲区的大小
const RX_BUFFER_BYTES: usize = 2048;

/// 设备侧状态
struct DeviceState {
    /// 寄存器文件
    regs: BTreeMap<usize, u32>,
    /// 已交给设备、尚未完成的发送描述符数
    tx_pending: usize,
    /// 写 TDT 时是否立即完成发送
    auto_complete: bool,
    /// 已发出的帧
    transmitted: VecDeque<Vec<u8>>,
}

impl DeviceState {
    fn reg(&self, reg: usize) -> u32 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    fn set_reg(&mut self, reg: usize, value: u32) {
        self.regs.insert(reg, value);
    }

    fn ring_base(&self, low: usize, high: usize) -> usize {
        ((self.reg(high) as u64) << 32 | self.reg(low) as u64) as usize
    }

    fn tx_slots(&self) -> usize {
        self.reg(offset::TDLEN) as usize / DESC_SIZE
    }

    fn rx_slots(&self) -> usize {
        self.reg(offset::RDLEN) as usize / DESC_SIZE
    }

    fn raise(&mut self, cause: Interrupts) {
        let icr = self.reg(offset::ICR) | cause.bits();
        self.set_reg(offset::ICR, icr);
    }

    /// 驱动移动了发送尾指针
    fn tail_written(&mut self, old: u32, new: u32) {
        let slots = self.tx_slots();
        if slots == 0 {
            return;
        }
        self.tx_pending += (new as usize + slots - old as usize) % slots;
        if self.auto_complete {
            self.retire(usize::MAX);
        }
    }

    /// 从 TDH 开始完成最多 `count` 个发送描述符
    fn retire(&mut self, count: usize) -> usize {
        let slots = self.tx_slots();
        let base = self.ring_base(offset::TDBAL, offset::TDBAH);
        let mut done = 0;

        while done < count && self.tx_pending > 0 {
            let head = self.reg(offset::TDH) as usize % slots;
            let desc_ptr = (base + head * DESC_SIZE) as *mut TxDesc;

            // SAFETY: 驱动把 TDBAL/TDLEN 指向了自己分配的描述符表，
            // addr 指向对应槽的发送缓冲区，length 不超过缓冲区大小
            let frame = unsafe {
                let mut desc = core::ptr::read_volatile(desc_ptr);
                let data = desc.addr as usize as *const u8;
                let frame = core::slice::from_raw_parts(data, desc.length as usize).to_vec();
                desc.status |= TxStatus::DD.bits();
                core::ptr::write_volatile(desc_ptr, desc);
                frame
            };

            trace!("emulated: tx head={} len={}", head, frame.len());
            self.transmitted.push_back(frame);
            self.set_reg(offset::TDH, ((head + 1) % slots) as u32);
            self.tx_pending -= 1;
            done += 1;
        }

        if done > 0 {
            self.raise(Interrupts::TXDW);
        }
        done
    }
}

/// 模拟网卡
pub struct EmulatedE1000 {
    state: Mutex<DeviceState>,
}

impl EmulatedE1000 {
    /// 创建处于复位状态的网卡，默认自动完成发送
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState {
                regs: BTreeMap::new(),
                tx_pending: 0,
                auto_complete: true,
                transmitted: VecDeque::new(),
            }),
        }
    }

    /// 设置写 TDT 时是否立即完成发送
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.state.lock().auto_complete = auto_complete;
    }

    /// 手动完成最多 `count` 个发送描述符
    ///
    /// # 返回
    /// 实际完成的个数
    pub fn complete_tx(&self, count: usize) -> usize {
        self.state.lock().retire(count)
    }

    /// 取走所有已发出的帧
    pub fn take_transmitted(&self) -> Vec<Vec<u8>> {
        self.state.lock().transmitted.drain(..).collect()
    }

    /// 读取寄存器当前值，不产生读副作用
    pub fn register(&self, reg: usize) -> u32 {
        self.state.lock().reg(reg)
    }

    /// 中断线是否有效 (ICR & IMS)
    pub fn interrupt_pending(&self) -> bool {
        let state = self.state.lock();
        state.reg(offset::ICR) & state.reg(offset::IMS) != 0
    }

    /// 从线路上收到一帧
    ///
    /// # 返回
    /// 接收未启用、帧过长或没有空闲的接收描述符时丢弃并返回 false
    pub fn inject(&self, frame: &[u8]) -> bool {
        let mut state = self.state.lock();
        let slots = state.rx_slots();

        if slots == 0 || !Rctl::from_bits_truncate(state.reg(offset::RCTL)).contains(Rctl::EN) {
            return false;
        }
        if frame.len() > RX_BUFFER_BYTES {
            return false;
        }

        let head = state.reg(offset::RDH) as usize % slots;
        let tail = state.reg(offset::RDT) as usize % slots;
        if head == tail {
            debug!("emulated: rx ring full, frame dropped");
            return false;
        }

        let base = state.ring_base(offset::RDBAL, offset::RDBAH);
        let desc_ptr = (base + head * DESC_SIZE) as *mut RxDesc;

        // SAFETY: 同 retire，head 位于设备拥有的区间 [RDH, RDT)
        unsafe {
            let mut desc = core::ptr::read_volatile(desc_ptr);
            let data = desc.addr as usize as *mut u8;
            core::ptr::copy_nonoverlapping(frame.as_ptr(), data, frame.len());
            desc.length = frame.len() as u16;
            core::ptr::write_volatile(desc_ptr, desc);
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
            desc.status = (RxStatus::DD | RxStatus::EOP).bits();
            core::ptr::write_volatile(desc_ptr, desc);
        }

        trace!("emulated: rx head={} len={}", head, frame.len());
        state.set_reg(offset::RDH, ((head + 1) % slots) as u32);
        state.raise(Interrupts::RXT0);
        true
    }
}

impl Default for EmulatedE1000 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for EmulatedE1000 {
    fn read(&self, reg: usize) -> u32 {
        let mut state = self.state.lock();
        let value = state.reg(reg);
        if reg == offset::ICR {
            state.set_reg(reg, 0);
        }
        value
    }

    fn write(&self, reg: usize, value: u32) {
        let mut state = self.state.lock();
        let old = state.reg(reg);
        state.set_reg(reg, value);

        match reg {
            offset::TDT => state.tail_written(old, value),
            offset::TDH => state.tx_pending = 0,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icr_read_clears() {
        let emu = EmulatedE1000::new();
        emu.state.lock().raise(Interrupts::RXT0);
        assert_eq!(emu.read(offset::ICR), Interrupts::RXT0.bits());
        assert_eq!(emu.read(offset::ICR), 0);
    }

    #[test]
    fn test_inject_requires_enabled_receiver() {
        let emu = EmulatedE1000::new();
        assert!(!emu.inject(&[0u8; 60]));
        assert!(!emu.interrupt_pending());
    }
}
