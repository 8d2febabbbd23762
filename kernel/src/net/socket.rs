//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! UDP 套接字
//!
//! 固定大小的套接字表，每个套接字绑定一个本地端口并连接到一个远端。
//! 多个线程可以同时在不同端口上读：某个读者收到不属于自己的数据报时，
//! 把它放进目标端口的积压队列并唤醒其他读者，因此共享的接收环不会
//! 让不同端口之间串包。
//!
//! 锁顺序：网卡锁 -> 积压队列锁；套接字表锁不与其他锁同时持有。

use alloc::collections::{BTreeMap, VecDeque};
use core::net::Ipv4Addr;

use log::debug;
use spin::Mutex;

use super::transport::Transport;
use super::udp::{UdpDatagram, UdpPort};
use crate::config::{FRAME_CAPACITY, SOCKET_BACKLOG, UDP_SOCKET_TABLE_SIZE};
use crate::errno::Errno;

/// UDP Socket 结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSocket {
    /// 本地端口
    pub local_port: Option<UdpPort>,
    /// 远程地址
    pub remote: Option<(Ipv4Addr, UdpPort)>,
}

impl UdpSocket {
    /// 创建新的 UDP Socket
    pub const fn new() -> Self {
        Self {
            local_port: None,
            remote: None,
        }
    }

    /// 绑定端口
    pub fn bind(&mut self, port: UdpPort) {
        self.local_port = Some(port);
    }

    /// 连接到远程地址
    pub fn connect(&mut self, ip: Ipv4Addr, port: UdpPort) {
        self.remote = Some((ip, port));
    }
}

impl Default for UdpSocket {
    fn default() -> Self {
        Self::new()
    }
}

/// 套接字表
struct UdpSocketTable {
    sockets: [Option<UdpSocket>; UDP_SOCKET_TABLE_SIZE],
}

impl UdpSocketTable {
    const fn new() -> Self {
        const NONE: Option<UdpSocket> = None;
        Self {
            sockets: [NONE; UDP_SOCKET_TABLE_SIZE],
        }
    }

    /// 分配 Socket，使用最小的空闲描述符
    fn alloc(&mut self) -> Result<usize, Errno> {
        let fd = self
            .sockets
            .iter()
            .position(Option::is_none)
            .ok_or(Errno::TooManyOpenFiles)?;
        self.sockets[fd] = Some(UdpSocket::new());
        Ok(fd)
    }

    /// 释放 Socket
    fn free(&mut self, fd: usize) -> Result<UdpSocket, Errno> {
        self.sockets
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(Errno::BadFileNumber)
    }

    fn get(&self, fd: usize) -> Result<&UdpSocket, Errno> {
        self.sockets
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Errno::BadFileNumber)
    }

    fn get_mut(&mut self, fd: usize) -> Result<&mut UdpSocket, Errno> {
        self.sockets
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(Errno::BadFileNumber)
    }

    /// 是否有套接字绑定到 `port`
    fn is_bound(&self, port: UdpPort) -> bool {
        self.sockets
            .iter()
            .flatten()
            .any(|socket| socket.local_port == Some(port))
    }
}

/// 按端口分发的套接字层
pub struct SocketLayer {
    transport: Transport,
    table: Mutex<UdpSocketTable>,
    /// 收到但还没有被读走的数据报，按目标端口排队
    pending: Mutex<BTreeMap<UdpPort, VecDeque<UdpDatagram>>>,
}

impl SocketLayer {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            table: Mutex::new(UdpSocketTable::new()),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// 底层传输
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// 分配一个未绑定的套接字
    ///
    /// # 返回
    /// 套接字描述符；表满时返回 EMFILE
    pub fn socket(&self) -> Result<usize, Errno> {
        self.table.lock().alloc()
    }

    /// 绑定本地端口
    pub fn bind(&self, fd: usize, port: UdpPort) -> Result<(), Errno> {
        self.table.lock().get_mut(fd)?.bind(port);
        Ok(())
    }

    /// 设置远端地址
    pub fn connect(&self, fd: usize, ip: Ipv4Addr, port: UdpPort) -> Result<(), Errno> {
        self.table.lock().get_mut(fd)?.connect(ip, port);
        Ok(())
    }

    /// 分配、绑定并连接一个套接字
    ///
    /// # 参数
    /// - `remote_ip` / `remote_port`: 远端
    /// - `local_port`: 本地端口
    pub fn open(
        &self,
        remote_ip: Ipv4Addr,
        remote_port: UdpPort,
        local_port: UdpPort,
    ) -> Result<usize, Errno> {
        let mut table = self.table.lock();
        let fd = table.alloc()?;
        let socket = table.get_mut(fd)?;
        socket.bind(local_port);
        socket.connect(remote_ip, remote_port);
        debug!("udp: fd {} :{} -> {}:{}", fd, local_port, remote_ip, remote_port);
        Ok(fd)
    }

    /// 关闭套接字，丢弃端口上不再有读者的积压数据报
    pub fn close(&self, fd: usize) -> Result<(), Errno> {
        let (socket, still_bound) = {
            let mut table = self.table.lock();
            let socket = table.free(fd)?;
            let still_bound = socket.local_port.map_or(true, |port| table.is_bound(port));
            (socket, still_bound)
        };

        if let (Some(port), false) = (socket.local_port, still_bound) {
            self.pending.lock().remove(&port);
        }
        Ok(())
    }

    /// 向已连接的远端发送
    ///
    /// # 返回
    /// 发送的字节数；未绑定或未连接时返回 ENOTCONN
    pub fn write(&self, fd: usize, payload: &[u8]) -> Result<usize, Errno> {
        let socket = *self.table.lock().get(fd)?;
        let (local_port, (remote_ip, remote_port)) = match (socket.local_port, socket.remote) {
            (Some(local), Some(remote)) => (local, remote),
            _ => return Err(Errno::NotConnected),
        };

        self.transport
            .send(remote_ip, remote_port, local_port, payload)
            .map_err(|err| err.errno())?;
        Ok(payload.len())
    }

    /// 阻塞读取下一个发往本套接字端口的数据报
    ///
    /// 数据超过 `buf` 时截断
    ///
    /// # 返回
    /// 拷贝的字节数；未绑定时返回 EINVAL
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Result<usize, Errno> {
        let port = self
            .table
            .lock()
            .get(fd)?
            .local_port
            .ok_or(Errno::InvalidArgument)?;

        let datagram = self.receive_on(port);
        let n = datagram.payload.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram.payload[..n]);
        Ok(n)
    }

    /// 阻塞接收下一个发往 `port` 的数据报
    pub fn receive_on(&self, port: UdpPort) -> UdpDatagram {
        loop {
            if let Some(datagram) = self.take_pending(port) {
                return datagram;
            }

            let received = self
                .transport
                .receive_until(FRAME_CAPACITY, &mut || self.has_pending(port));

            match received {
                // 别的读者替我们收到了
                None => continue,
                Some(datagram) if datagram.dport == port => return datagram,
                Some(datagram) => self.park(datagram),
            }
        }
    }

    fn take_pending(&self, port: UdpPort) -> Option<UdpDatagram> {
        self.pending.lock().get_mut(&port)?.pop_front()
    }

    fn has_pending(&self, port: UdpPort) -> bool {
        self.pending
            .lock()
            .get(&port)
            .map_or(false, |queue| !queue.is_empty())
    }

    /// 把不属于当前读者的数据报交给它的端口
    fn park(&self, datagram: UdpDatagram) {
        let port = datagram.dport;
        if !self.table.lock().is_bound(port) {
            debug!("udp: no socket on port {}, dropped", port);
            return;
        }

        {
            let mut pending = self.pending.lock();
            let queue = pending.entry(port).or_default();
            if queue.len() >= SOCKET_BACKLOG {
                debug!("udp: backlog full on port {}, oldest dropped", port);
                queue.pop_front();
            }
            queue.push_back(datagram);
        }

        // 积压队列锁已释放，此时再取网卡锁
        self.transport.wake_receivers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LOCAL_MAC;
    use crate::drivers::net::{EmulatedE1000, E1000};
    use crate::net::udp::encode_udp;
    use alloc::sync::Arc;

    const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

    fn setup() -> (Arc<EmulatedE1000>, SocketLayer) {
        let emu = Arc::new(EmulatedE1000::new());
        let nic: Arc<E1000<_>> = Arc::new(E1000::init(emu.clone(), LOCAL_MAC).unwrap());
        (emu, SocketLayer::new(Transport::new(nic)))
    }

    fn datagram_to(dport: UdpPort, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        let len =
            encode_udp(&mut buf, crate::config::LOCAL_IP, dport, PEER, 9999, payload).unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_table_reuses_lowest_fd() {
        let (_emu, sockets) = setup();
        let a = sockets.open(PEER, 1, 100).unwrap();
        let b = sockets.open(PEER, 1, 101).unwrap();
        assert_eq!((a, b), (0, 1));

        sockets.close(a).unwrap();
        assert_eq!(sockets.close(a), Err(Errno::BadFileNumber));
        assert_eq!(sockets.open(PEER, 1, 102).unwrap(), 0);
    }

    #[test]
    fn test_table_full() {
        let (_emu, sockets) = setup();
        for _ in 0..UDP_SOCKET_TABLE_SIZE {
            sockets.socket().unwrap();
        }
        assert_eq!(sockets.socket(), Err(Errno::TooManyOpenFiles));
    }

    #[test]
    fn test_write_requires_connection() {
        let (emu, sockets) = setup();
        let fd = sockets.socket().unwrap();
        assert_eq!(sockets.write(fd, b"x"), Err(Errno::NotConnected));
        assert_eq!(sockets.write(42, b"x"), Err(Errno::BadFileNumber));

        sockets.bind(fd, 2000).unwrap();
        sockets.connect(fd, PEER, 3000).unwrap();
        assert_eq!(sockets.write(fd, b"hello"), Ok(5));
        assert_eq!(emu.take_transmitted().len(), 1);
    }

    #[test]
    fn test_read_parks_other_ports() {
        let (emu, sockets) = setup();
        let a = sockets.open(PEER, 9999, 1000).unwrap();
        let b = sockets.open(PEER, 9999, 2000).unwrap();

        assert!(emu.inject(&datagram_to(2000, b"for b")));
        assert!(emu.inject(&datagram_to(1000, b"for a")));

        let mut buf = [0u8; 64];
        let n = sockets.read(a, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"for a");

        let n = sockets.read(b, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"for b");
    }

    #[test]
    fn test_read_truncates() {
        let (emu, sockets) = setup();
        let fd = sockets.open(PEER, 9999, 1000).unwrap();
        assert!(emu.inject(&datagram_to(1000, b"0123456789")));

        let mut buf = [0u8; 4];
        assert_eq!(sockets.read(fd, &mut buf), Ok(4));
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn test_backlog_drops_oldest() {
        let (_emu, sockets) = setup();
        sockets.open(PEER, 9999, 1000).unwrap();

        for i in 0..(SOCKET_BACKLOG + 2) {
            sockets.park(UdpDatagram {
                src: PEER,
                sport: 9999,
                dport: 1000,
                payload: vec![i as u8],
            });
        }

        assert_eq!(sockets.take_pending(1000).unwrap().payload, vec![2u8]);
    }

    #[test]
    fn test_unbound_port_not_parked() {
        let (_emu, sockets) = setup();
        sockets.park(UdpDatagram {
            src: PEER,
            sport: 9999,
            dport: 4242,
            payload: vec![1],
        });
        assert!(!sockets.has_pending(4242));
    }
}
