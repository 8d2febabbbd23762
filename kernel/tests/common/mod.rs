//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 集成测试公共部分：模拟网卡上的真实驱动、中断线程和对端组帧

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rux_net::config::{GATEWAY_MAC, LOCAL_IP, LOCAL_MAC};
use rux_net::drivers::net::{EmulatedE1000, E1000};
use rux_net::net::ethernet::set_addresses;
use rux_net::net::udp::{encode_udp, UdpPort};

/// 对端（网关）地址
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

pub type Nic = E1000<Arc<EmulatedE1000>>;

/// 在模拟网卡上初始化驱动
pub fn nic() -> (Arc<EmulatedE1000>, Arc<Nic>) {
    let emu = Arc::new(EmulatedE1000::new());
    let nic = Arc::new(E1000::init(emu.clone(), LOCAL_MAC).expect("e1000 init"));
    (emu, nic)
}

/// 对端发给本机的 UDP 帧
pub fn peer_datagram(sport: UdpPort, dport: UdpPort, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    let len = encode_udp(&mut buf, LOCAL_IP, dport, PEER_IP, sport, payload).expect("encode");
    set_addresses(&mut buf, LOCAL_MAC, GATEWAY_MAC);
    buf.truncate(len);
    buf
}

/// 等待设备发出至少一帧
pub fn wait_transmitted(emu: &EmulatedE1000) -> Vec<Vec<u8>> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let frames = emu.take_transmitted();
        if !frames.is_empty() {
            return frames;
        }
        assert!(Instant::now() < deadline, "no frame transmitted");
        thread::yield_now();
    }
}

/// 中断线程：中断线有效时调用驱动的中断入口
pub struct InterruptLine {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptLine {
    pub fn start(emu: Arc<EmulatedE1000>, nic: Arc<Nic>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                if emu.interrupt_pending() {
                    nic.intr();
                } else {
                    thread::sleep(Duration::from_micros(50));
                }
            }
        });
        Self { stop, handle: Some(handle) }
    }
}

impl Drop for InterruptLine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
