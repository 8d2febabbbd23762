//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络系统调用
//!
//! 用户缓冲区已经由系统调用层拷贝进/出内核（单次不超过一页），
//! 这里只负责参数检查和错误码转换：成功返回非负值，失败返回负的 errno

use alloc::sync::Arc;
use core::net::Ipv4Addr;

use log::info;
use spin::Once;

use crate::config::{E1000_MMIO_BASE, ECAM_BASE, LOCAL_IP, LOCAL_MAC, PAGE_SIZE};
use crate::drivers::net::e1000::regs::MmioBus;
use crate::drivers::net::E1000;
use crate::drivers::pci;
use crate::errno::Errno;
use crate::net::socket::SocketLayer;
use crate::net::transport::Transport;
use crate::sync::SchedYield;

/// 网卡（中断入口使用）
static NIC: Once<Arc<E1000<MmioBus, SchedYield>>> = Once::new();

/// 网络协议栈
static NET: Once<SocketLayer> = Once::new();

/// 初始化网络：扫描 PCI、初始化 e1000、建立协议栈
///
/// 找不到网卡或初始化失败时 panic，没有网卡的内核无法提供网络。
/// 接收者等待时通过 `sync::set_yield_hook` 注册的调度器函数让出 CPU，
/// 内核应在此之前注册
pub fn netinit() -> &'static SocketLayer {
    let slot = match pci::probe_e1000(ECAM_BASE, E1000_MMIO_BASE as u32) {
        Ok(slot) => slot,
        Err(err) => panic!("netinit: {}", err),
    };

    // SAFETY: PCI 层刚把 BAR0 映射到 E1000_MMIO_BASE
    let regs = unsafe { MmioBus::new(E1000_MMIO_BASE) };
    let nic: Arc<E1000<MmioBus, SchedYield>> = match E1000::init(regs, LOCAL_MAC) {
        Ok(nic) => Arc::new(nic),
        Err(err) => panic!("netinit: {}", err),
    };

    info!("netinit: e1000 at slot {}, ip {}", slot, LOCAL_IP);
    let nic = NIC.call_once(|| nic).clone();
    install(SocketLayer::new(Transport::new(nic)))
}

/// 安装协议栈（只有第一次调用生效）
pub fn install(net: SocketLayer) -> &'static SocketLayer {
    NET.call_once(|| net)
}

/// 已安装的协议栈
pub fn net() -> Option<&'static SocketLayer> {
    NET.get()
}

/// e1000 中断入口
pub fn e1000_intr() {
    if let Some(nic) = NIC.get() {
        nic.intr();
    }
}

fn to_port(value: u32) -> Result<u16, Errno> {
    u16::try_from(value).map_err(|_| Errno::InvalidArgument)
}

fn to_fd(value: i32) -> Result<usize, Errno> {
    usize::try_from(value).map_err(|_| Errno::BadFileNumber)
}

fn check_len(len: usize) -> Result<(), Errno> {
    if len > PAGE_SIZE {
        Err(Errno::InvalidArgument)
    } else {
        Ok(())
    }
}

fn ret(result: Result<usize, Errno>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(err) => err.as_neg(),
    }
}

/// send(uint32 dst, uint16 dport, uint16 sport, char *buf, int n)
///
/// # 返回
/// 发送的字节数；过长返回 -EMSGSIZE，发送环满返回 -EAGAIN
pub fn sys_send(net: &SocketLayer, dst: u32, dport: u32, sport: u32, buf: &[u8]) -> isize {
    ret(send(net, dst, dport, sport, buf))
}

fn send(net: &SocketLayer, dst: u32, dport: u32, sport: u32, buf: &[u8]) -> Result<usize, Errno> {
    check_len(buf.len())?;
    let (dport, sport) = (to_port(dport)?, to_port(sport)?);
    net.transport()
        .send(Ipv4Addr::from(dst), dport, sport, buf)
        .map_err(|err| err.errno())?;
    Ok(buf.len())
}

/// recv(uint32 *src, uint16 *sport, uint16 *dport, char *buf, int n)
///
/// 阻塞到收到任意端口的数据报，数据超过 `buf` 时截断
pub fn sys_recv(
    net: &SocketLayer,
    src: &mut u32,
    sport: &mut u16,
    dport: &mut u16,
    buf: &mut [u8],
) -> isize {
    ret(recv(net, src, sport, dport, buf))
}

fn recv(
    net: &SocketLayer,
    src: &mut u32,
    sport: &mut u16,
    dport: &mut u16,
    buf: &mut [u8],
) -> Result<usize, Errno> {
    check_len(buf.len())?;
    let datagram = net.transport().receive_with_capacity(PAGE_SIZE);
    let n = datagram.payload.len().min(buf.len());
    buf[..n].copy_from_slice(&datagram.payload[..n]);
    *src = u32::from(datagram.src);
    *sport = datagram.sport;
    *dport = datagram.dport;
    Ok(n)
}

/// connect(uint32 raddr, uint16 lport, uint16 rport)
///
/// # 返回
/// 套接字描述符
pub fn sys_connect(net: &SocketLayer, raddr: u32, lport: u32, rport: u32) -> isize {
    let fd = to_port(lport)
        .and_then(|lport| Ok((lport, to_port(rport)?)))
        .and_then(|(lport, rport)| net.open(Ipv4Addr::from(raddr), rport, lport));
    ret(fd)
}

/// write(int fd, char *buf, int n)
pub fn sys_write(net: &SocketLayer, fd: i32, buf: &[u8]) -> isize {
    ret(check_len(buf.len()).and_then(|()| net.write(to_fd(fd)?, buf)))
}

/// read(int fd, char *buf, int n)
pub fn sys_read(net: &SocketLayer, fd: i32, buf: &mut [u8]) -> isize {
    ret(check_len(buf.len()).and_then(|()| net.read(to_fd(fd)?, buf)))
}

/// close(int fd)
pub fn sys_close(net: &SocketLayer, fd: i32) -> isize {
    ret(to_fd(fd).and_then(|fd| net.close(fd)).map(|()| 0))
}
