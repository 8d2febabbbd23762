//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 数据报传输
//!
//! 发送：编码后交给网卡，失败直接报告，不重试。
//! 接收：循环等待网卡上的下一帧，先分类再分发：ARP 交给应答者并丢弃，
//! 其余按 UDP 解码，解码失败丢弃，直到得到一个有效数据报。

use alloc::sync::Arc;
use alloc::vec;
use core::fmt;
use core::net::Ipv4Addr;

use log::debug;

use super::arp::ArpResponder;
use super::ethernet::{self, ETH_ALEN};
use super::udp::{self, UdpDatagram, UdpPort};
use super::CodecError;
use crate::config::{FRAME_CAPACITY, GATEWAY_MAC, LOCAL_IP};
use crate::drivers::net::{NetDevice, TxError};
use crate::errno::Errno;

/// 发送错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// 帧放不进发送缓冲区
    Encode(CodecError),
    /// 网卡拒绝（过长或发送环满）
    Transmit(TxError),
}

impl From<CodecError> for SendError {
    fn from(err: CodecError) -> Self {
        SendError::Encode(err)
    }
}

impl From<TxError> for SendError {
    fn from(err: TxError) -> Self {
        SendError::Transmit(err)
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Encode(err) => write!(f, "encode failed: {}", err),
            SendError::Transmit(err) => write!(f, "transmit failed: {}", err),
        }
    }
}

impl SendError {
    /// 系统调用错误码：过长为 EMSGSIZE，发送环满为 EAGAIN
    pub fn errno(&self) -> Errno {
        match self {
            SendError::Transmit(TxError::RingFull) => Errno::TryAgain,
            SendError::Encode(_) | SendError::Transmit(TxError::FrameTooLarge { .. }) => {
                Errno::MessageTooLong
            }
        }
    }
}

/// 接收到的一帧的去向
enum Dispatch {
    /// ARP，已交给应答者
    Arp,
    /// 有效数据报
    Datagram(UdpDatagram),
    /// 无效帧，丢弃
    Dropped,
}

/// 数据报传输
pub struct Transport {
    dev: Arc<dyn NetDevice>,
    local_ip: Ipv4Addr,
    local_mac: [u8; ETH_ALEN],
    gateway_mac: [u8; ETH_ALEN],
    arp: ArpResponder,
}

impl Transport {
    /// 使用配置的本机地址和网关创建
    pub fn new(dev: Arc<dyn NetDevice>) -> Self {
        Self::with_addresses(dev, LOCAL_IP, GATEWAY_MAC)
    }

    /// 指定本机 IP 和网关 MAC 创建
    pub fn with_addresses(
        dev: Arc<dyn NetDevice>,
        local_ip: Ipv4Addr,
        gateway_mac: [u8; ETH_ALEN],
    ) -> Self {
        let local_mac = dev.mac_address();
        Self {
            dev,
            local_ip,
            local_mac,
            gateway_mac,
            arp: ArpResponder::new(local_ip, local_mac),
        }
    }

    /// 发送一个数据报
    ///
    /// # 参数
    /// - `dst` / `dport`: 目标地址和端口
    /// - `sport`: 源端口
    /// - `payload`: 数据
    ///
    /// # 返回
    /// 编码失败或网卡拒绝时返回错误，数据报被丢弃
    pub fn send(
        &self,
        dst: Ipv4Addr,
        dport: UdpPort,
        sport: UdpPort,
        payload: &[u8],
    ) -> Result<(), SendError> {
        let mut buf = vec![0u8; FRAME_CAPACITY];
        let len = udp::encode_udp(&mut buf, dst, dport, self.local_ip, sport, payload)
            .map_err(|err| {
                debug!("udp: {} byte payload not encoded: {}", payload.len(), err);
                err
            })?;
        ethernet::set_addresses(&mut buf, self.gateway_mac, self.local_mac);

        self.dev.try_transmit(&buf[..len])?;
        debug!("udp: sent {}:{} <- :{} len={}", dst, dport, sport, payload.len());
        Ok(())
    }

    /// 阻塞接收下一个数据报，数据最长 `FRAME_CAPACITY`
    pub fn receive(&self) -> UdpDatagram {
        self.receive_with_capacity(FRAME_CAPACITY)
    }

    /// 阻塞接收下一个数据报
    ///
    /// ARP 帧和无效帧被吸收，调用者只会看到有效的 UDP 数据报
    pub fn receive_with_capacity(&self, capacity: usize) -> UdpDatagram {
        loop {
            let frame = self.dev.wait_for_received_frame();
            if let Dispatch::Datagram(datagram) = self.dispatch(&frame, capacity) {
                return datagram;
            }
        }
    }

    /// 阻塞接收下一个数据报，直到 `stop` 返回 true
    ///
    /// `stop` 在网卡锁内调用，见 `NetDevice::wait_for_received_frame_until`
    pub fn receive_until(
        &self,
        capacity: usize,
        stop: &mut dyn FnMut() -> bool,
    ) -> Option<UdpDatagram> {
        loop {
            let frame = self.dev.wait_for_received_frame_until(stop)?;
            if let Dispatch::Datagram(datagram) = self.dispatch(&frame, capacity) {
                return Some(datagram);
            }
        }
    }

    /// 分类并分发一帧
    fn dispatch(&self, frame: &[u8], capacity: usize) -> Dispatch {
        if self.arp.handle(self.dev.as_ref(), frame) {
            return Dispatch::Arp;
        }

        match udp::decode_udp(frame, capacity) {
            Ok(datagram) => {
                debug!(
                    "udp: received {}:{} -> :{} len={}",
                    datagram.src, datagram.sport, datagram.dport, datagram.payload.len()
                );
                Dispatch::Datagram(datagram)
            }
            Err(err) => {
                debug!("udp: dropped {} byte frame: {}", frame.len(), err);
                Dispatch::Dropped
            }
        }
    }

    /// 唤醒所有阻塞在接收上的线程
    pub fn wake_receivers(&self) {
        self.dev.wake_receivers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LOCAL_MAC, TX_BUFFER_SIZE};
    use crate::drivers::net::{EmulatedE1000, E1000};

    const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

    fn setup() -> (Arc<EmulatedE1000>, Transport) {
        let emu = Arc::new(EmulatedE1000::new());
        let nic: Arc<E1000<_>> = Arc::new(E1000::init(emu.clone(), LOCAL_MAC).unwrap());
        (emu, Transport::new(nic))
    }

    #[test]
    fn test_send_stamps_ethernet_addresses() {
        let (emu, transport) = setup();
        transport.send(PEER, 3000, 2000, b"hello world!").unwrap();

        let sent = emu.take_transmitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][0..6], &GATEWAY_MAC);
        assert_eq!(&sent[0][6..12], &LOCAL_MAC);

        let datagram = udp::decode_udp_with(&sent[0], FRAME_CAPACITY, true).unwrap();
        assert_eq!(datagram.src, LOCAL_IP);
        assert_eq!(datagram.dport, 3000);
        assert_eq!(datagram.payload, b"hello world!");
    }

    #[test]
    fn test_send_reports_oversize() {
        let (emu, transport) = setup();

        let too_big_for_ring = vec![0u8; TX_BUFFER_SIZE];
        assert_eq!(
            transport.send(PEER, 1, 2, &too_big_for_ring),
            Err(SendError::Transmit(TxError::FrameTooLarge {
                len: TX_BUFFER_SIZE + udp::UDP_FRAME_OVERHEAD,
                max: TX_BUFFER_SIZE,
            }))
        );

        let too_big_for_buffer = vec![0u8; FRAME_CAPACITY];
        assert_eq!(
            transport.send(PEER, 1, 2, &too_big_for_buffer),
            Err(SendError::Encode(CodecError::BufferTooSmall))
        );

        assert!(emu.take_transmitted().is_empty());
    }

    #[test]
    fn test_receive_skips_garbage() {
        let (emu, transport) = setup();

        let mut buf = vec![0u8; 128];
        let len = udp::encode_udp(&mut buf, LOCAL_IP, 2000, PEER, 3000, b"pong").unwrap();

        assert!(emu.inject(&[0u8; 20]));
        assert!(emu.inject(&buf[..len]));

        let datagram = transport.receive();
        assert_eq!(datagram.src, PEER);
        assert_eq!(datagram.sport, 3000);
        assert_eq!(datagram.dport, 2000);
        assert_eq!(datagram.payload, b"pong");
    }
}
