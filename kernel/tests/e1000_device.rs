//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! e1000 驱动：MMIO 寄存器窗口和发送环满

#![cfg(feature = "emulated")]

mod common;

use common::{nic, PEER_IP};
use rux_net::config::{LOCAL_MAC, RX_RING_SIZE, TX_BUFFER_SIZE, TX_RING_SIZE};
use rux_net::drivers::net::e1000::regs::{self, offset, MmioBus};
use rux_net::drivers::net::{TxError, E1000};
use rux_net::errno::constants::{EAGAIN, EINVAL, EMSGSIZE};
use rux_net::net::socket::SocketLayer;
use rux_net::net::Transport;
use rux_net::sysnet::sys_send;

/// BAR0 窗口大小
const WINDOW: usize = 128 * 1024;

/// 用一块普通内存充当寄存器窗口
struct FakeWindow {
    words: Vec<u32>,
}

impl FakeWindow {
    fn new() -> Self {
        Self { words: vec![0; WINDOW / 4] }
    }

    fn base(&mut self) -> usize {
        self.words.as_mut_ptr() as usize
    }

    fn reg(&self, reg: usize) -> u32 {
        // SAFETY: reg 在窗口内，驱动对同一地址也只做 volatile 访问
        unsafe { core::ptr::read_volatile(self.words.as_ptr().add(reg / 4)) }
    }
}

#[test]
fn test_init_over_mmio_window() {
    let mut window = FakeWindow::new();
    // SAFETY: 窗口比驱动活得久
    let bus = unsafe { MmioBus::new(window.base()) };
    let nic: E1000<MmioBus> = E1000::init(bus, LOCAL_MAC).unwrap();

    let (ral, rah) = regs::receive_address(LOCAL_MAC);
    assert_eq!(window.reg(offset::RA), ral);
    assert_eq!(window.reg(offset::RA + 4), rah);
    assert_eq!(window.reg(offset::TDLEN), (TX_RING_SIZE * 16) as u32);
    assert_eq!(window.reg(offset::RDLEN), (RX_RING_SIZE * 16) as u32);
    assert_eq!(window.reg(offset::TCTL), regs::tctl_default());
    assert_eq!(window.reg(offset::RCTL), regs::rctl_default());
    assert_eq!(window.reg(offset::TIPG), regs::TIPG_DEFAULT);
    assert_eq!(window.reg(offset::RDT), (RX_RING_SIZE - 1) as u32);
    assert_ne!(window.reg(offset::TDBAL), 0);
    assert_ne!(window.reg(offset::RDBAL), 0);
    // 描述符表 128 字节对齐
    assert_eq!(window.reg(offset::TDBAL) % 128, 0);
    assert_eq!(window.reg(offset::RDBAL) % 128, 0);

    // 没有设备消费，但空环的描述符都可用
    assert_eq!(nic.try_transmit(&[0x55; 60]), Ok(()));
    assert_eq!(window.reg(offset::TDT), 1);
    drop(nic);
}

#[test]
fn test_send_reports_ring_full() {
    let (emu, nic) = nic();
    emu.set_auto_complete(false);
    let net = SocketLayer::new(Transport::new(nic.clone()));

    for _ in 0..TX_RING_SIZE {
        assert_eq!(sys_send(&net, u32::from(PEER_IP), 3000, 2000, b"fill"), 4);
    }
    assert_eq!(sys_send(&net, u32::from(PEER_IP), 3000, 2000, b"full"), -(EAGAIN as isize));
    assert_eq!(nic.stats().tx_dropped, 1);

    // 设备完成一个之后恢复
    assert_eq!(emu.complete_tx(1), 1);
    assert_eq!(sys_send(&net, u32::from(PEER_IP), 3000, 2000, b"again"), 5);
    assert_eq!(emu.take_transmitted().len(), 1);
}

#[test]
fn test_send_rejects_oversize() {
    let (emu, nic) = nic();
    let net = SocketLayer::new(Transport::new(nic.clone()));

    // 能放进一页，但超过最大帧长
    let payload = vec![0u8; TX_BUFFER_SIZE];
    assert_eq!(sys_send(&net, u32::from(PEER_IP), 3000, 2000, &payload), -(EMSGSIZE as isize));
    // 超过一页
    let payload = vec![0u8; 4097];
    assert_eq!(sys_send(&net, u32::from(PEER_IP), 3000, 2000, &payload), -(EINVAL as isize));
    // 端口越界
    assert_eq!(sys_send(&net, u32::from(PEER_IP), 70000, 2000, b"x"), -(EINVAL as isize));

    assert!(emu.take_transmitted().is_empty());
    let frame = vec![0u8; TX_BUFFER_SIZE + 1];
    assert_eq!(
        nic.try_transmit(&frame),
        Err(TxError::FrameTooLarge { len: TX_BUFFER_SIZE + 1, max: TX_BUFFER_SIZE })
    );
}
