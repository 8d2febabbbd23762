//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Intel 82540EM (e1000) 网卡驱动
//!
//! - 初始化：一次性编程发送/接收环、接收地址过滤和中断屏蔽
//! - 发送：非阻塞，尾部描述符未完成即视为环满并丢包
//! - 接收：按环序消费描述符，没有数据时在条件变量上等待
//! - 中断：读 ICR 应答设备并唤醒所有接收者
//!
//! 环和寄存器状态全部由一把 `spin::Mutex` 保护，等待期间不持锁。

pub mod regs;
pub mod ring;

use alloc::vec::Vec;
use core::sync::atomic::{fence, Ordering};

use log::{debug, info, trace, warn};
use spin::relax::{RelaxStrategy, Spin};
use spin::Mutex;

use self::regs::{offset, Interrupts, RegisterBus, RxStatus, TxCmd, TxStatus};
use self::ring::{RingIndex, Ring, RxDesc, TxDesc};
use super::{DeviceStats, NetDevice, TxError};
use crate::config::{RX_BUFFER_SIZE, RX_RING_SIZE, TX_BUFFER_SIZE, TX_RING_SIZE};
use crate::drivers::InitError;
use crate::sync::ConditionVariable;

/// 发送环
pub type TxRing = Ring<TxDesc, TX_RING_SIZE, TX_BUFFER_SIZE>;

/// 接收环
pub type RxRing = Ring<RxDesc, RX_RING_SIZE, RX_BUFFER_SIZE>;

/// 锁内状态
struct Inner<B: RegisterBus> {
    regs: B,
    tx: TxRing,
    rx: RxRing,
    /// 最后一个已消费的接收描述符，与 RDT 保持一致
    rx_last: RingIndex<RX_RING_SIZE>,
    stats: DeviceStats,
}

/// e1000 设备
///
/// `R` 决定接收者等待时的方式：内核传入 `SchedYield` 让出 CPU，
/// 主机测试使用默认的 `Spin`
pub struct E1000<B: RegisterBus, R: RelaxStrategy = Spin> {
    inner: Mutex<Inner<B>>,
    rx_wait: ConditionVariable<R>,
    mac: [u8; 6],
}

impl<B: RegisterBus, R: RelaxStrategy + Send + Sync> E1000<B, R> {
    /// 初始化网卡 [E1000 14.4, 14.5]
    ///
    /// # 参数
    /// - `regs`: 寄存器总线（BAR0 已经由 PCI 层映射）
    /// - `mac`: 本机 MAC 地址，写入接收地址过滤
    ///
    /// # 返回
    /// 分配描述符环失败时返回 `InitError`，调用者应视为致命错误
    pub fn init(regs: B, mac: [u8; 6]) -> Result<Self, InitError> {
        let tx = TxRing::new(&regs)?;
        let rx = RxRing::new(&regs)?;

        // 发送初始化
        let tx_base = regs.dma_address(tx.desc_base());
        regs.write(offset::TDBAL, tx_base as u32);
        regs.write(offset::TDBAH, (tx_base >> 32) as u32);
        regs.write(offset::TDLEN, TxRing::byte_len());
        regs.write(offset::TDH, 0);
        regs.write(offset::TDT, 0);
        regs.write(offset::TCTL, regs::tctl_default());
        regs.write(offset::TIPG, regs::TIPG_DEFAULT);

        // 接收初始化
        let (ral, rah) = regs::receive_address(mac);
        regs.write(offset::RA, ral);
        regs.write(offset::RA + 4, rah);
        for i in 0..regs::MTA_ENTRIES {
            regs.write(offset::MTA + i * 4, 0);
        }

        let rx_base = regs.dma_address(rx.desc_base());
        let rx_last = RingIndex::<RX_RING_SIZE>::last();
        regs.write(offset::RDBAL, rx_base as u32);
        regs.write(offset::RDBAH, (rx_base >> 32) as u32);
        regs.write(offset::RDH, 0);
        regs.write(offset::RDT, rx_last.as_reg());
        regs.write(offset::RDLEN, RxRing::byte_len());
        regs.write(offset::RCTL, regs::rctl_default());

        // 每收到一个包就中断，不做合并
        regs.write(offset::RDTR, 0);
        regs.write(offset::RADV, 0);
        regs.write(offset::IMS, Interrupts::RXT0.bits());

        info!(
            "e1000: rings programmed tx={} rx={} mac={:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            TX_RING_SIZE, RX_RING_SIZE, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                regs,
                tx,
                rx,
                rx_last,
                stats: DeviceStats::default(),
            }),
            rx_wait: ConditionVariable::new(),
            mac,
        })
    }

    /// 发送一帧
    ///
    /// # 参数
    /// - `frame`: 完整以太网帧，最长 `TX_BUFFER_SIZE`
    ///
    /// # 返回
    /// 帧过长或发送环满时返回错误，帧被丢弃
    pub fn try_transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        if frame.len() > TX_BUFFER_SIZE {
            warn!("e1000: frame of {} bytes too large", frame.len());
            self.inner.lock().stats.tx_dropped += 1;
            return Err(TxError::FrameTooLarge { len: frame.len(), max: TX_BUFFER_SIZE });
        }

        let mut inner = self.inner.lock();
        let tail = RingIndex::<TX_RING_SIZE>::wrapping(inner.regs.read(offset::TDT));
        let desc = inner.tx.read(tail);

        if !TxStatus::from_bits_truncate(desc.status).contains(TxStatus::DD) {
            warn!("e1000: tx ring overflow");
            inner.stats.tx_dropped += 1;
            return Err(TxError::RingFull);
        }

        inner.tx.buffer_mut(tail)[..frame.len()].copy_from_slice(frame);
        inner.tx.write(tail, TxDesc {
            addr: desc.addr,
            length: frame.len() as u16,
            cmd: (TxCmd::EOP | TxCmd::RS).bits(),
            status: 0,
            ..TxDesc::default()
        });

        // 描述符和数据必须在移动尾指针之前对设备可见
        fence(Ordering::SeqCst);
        inner.regs.write(offset::TDT, tail.next().as_reg());

        inner.stats.tx_packets += 1;
        inner.stats.tx_bytes += frame.len() as u64;
        Ok(())
    }

    /// 阻塞接收下一帧
    pub fn wait_for_received_frame(&self) -> Vec<u8> {
        NetDevice::wait_for_received_frame(self)
    }

    /// 中断完成路径
    ///
    /// 读 ICR 应答设备（不读设备不会再次中断），并唤醒所有接收者。
    /// 不搬运数据。
    pub fn intr(&self) {
        let inner = self.inner.lock();
        let cause = inner.regs.read(offset::ICR);
        trace!("e1000: intr cause=0x{:x}", cause);
        self.rx_wait.broadcast();
    }

    /// 统计信息快照
    pub fn stats(&self) -> DeviceStats {
        self.inner.lock().stats
    }
}

impl<B: RegisterBus, R: RelaxStrategy + Send + Sync> NetDevice for E1000<B, R> {
    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }

    fn try_transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        E1000::try_transmit(self, frame)
    }

    fn wait_for_received_frame_until(&self, stop: &mut dyn FnMut() -> bool) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();

        loop {
            if stop() {
                return None;
            }

            let index = inner.rx_last.next();
            let status = RxStatus::from_bits_truncate(inner.rx.read(index).status);
            if !status.contains(RxStatus::DD) {
                inner = self.rx_wait.wait(&self.inner, inner);
                continue;
            }

            // 看到 DD 之后再读长度和数据
            fence(Ordering::SeqCst);
            let desc = inner.rx.read(index);
            let len = desc.length as usize;
            let frame = if len <= RX_BUFFER_SIZE {
                Some(inner.rx.buffer(index)[..len].to_vec())
            } else {
                None
            };

            // 把槽还给设备
            inner.rx.write(index, RxDesc { addr: desc.addr, ..RxDesc::default() });
            inner.rx_last = index;
            fence(Ordering::SeqCst);
            inner.regs.write(offset::RDT, index.as_reg());

            match frame {
                Some(frame) => {
                    debug!("e1000: rx index={} len={}", index.get(), len);
                    inner.stats.rx_packets += 1;
                    inner.stats.rx_bytes += len as u64;
                    return Some(frame);
                }
                None => {
                    warn!("e1000: rx index={} bad length {}", index.get(), len);
                    inner.stats.rx_dropped += 1;
                }
            }
        }
    }

    fn wake_receivers(&self) {
        let _inner = self.inner.lock();
        self.rx_wait.broadcast();
    }

    fn stats(&self) -> DeviceStats {
        E1000::stats(self)
    }
}
