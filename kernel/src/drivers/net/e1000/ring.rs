//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! e1000 描述符环
//!
//! 每个环是一块固定容量的区域：N 个描述符 + N 个一一绑定的数据缓冲区。
//! 区域在初始化时分配一次，地址在整个驱动生命周期内不变（设备通过 DMA
//! 访问它们），只通过带检查的 `RingIndex` 访问。

use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error};
use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::regs::{TxStatus, RegisterBus};
use crate::drivers::InitError;

/// 描述符大小（字节）
pub const DESC_SIZE: usize = 16;

/// TDLEN/RDLEN 必须是 128 字节的倍数
const RING_LEN_ALIGN: usize = 128;

/// 发送描述符 [E1000 3.3.3]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TxDesc {
    pub addr: u64,
    pub length: u16,
    pub cso: u8,
    pub cmd: u8,
    pub status: u8,
    pub css: u8,
    pub special: u16,
}

/// 接收描述符 [E1000 3.2.3]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RxDesc {
    /// 数据缓冲区地址
    pub addr: u64,
    /// 设备写入的帧长度
    pub length: u16,
    pub csum: u16,
    pub status: u8,
    pub errors: u8,
    pub special: u16,
}

const _: () = assert!(core::mem::size_of::<TxDesc>() == DESC_SIZE);
const _: () = assert!(core::mem::size_of::<RxDesc>() == DESC_SIZE);

/// 描述符的初始状态
pub trait Descriptor: Copy {
    /// 指向 `dma_addr` 缓冲区、处于初始归属的描述符
    fn armed(dma_addr: u64) -> Self;
}

impl Descriptor for TxDesc {
    /// 发送描述符初始为"已完成"，表示空闲可用
    fn armed(dma_addr: u64) -> Self {
        TxDesc {
            addr: dma_addr,
            status: TxStatus::DD.bits(),
            ..TxDesc::default()
        }
    }
}

impl Descriptor for RxDesc {
    fn armed(dma_addr: u64) -> Self {
        RxDesc {
            addr: dma_addr,
            ..RxDesc::default()
        }
    }
}

/// 环内索引，构造时保证 `< N`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingIndex<const N: usize>(usize);

impl<const N: usize> RingIndex<N> {
    /// 检查后构造索引
    pub fn new(index: usize) -> Option<Self> {
        if index < N {
            Some(Self(index))
        } else {
            None
        }
    }

    /// 由设备寄存器值构造（取模）
    pub fn wrapping(value: u32) -> Self {
        Self(value as usize % N)
    }

    /// 最后一个槽
    pub const fn last() -> Self {
        Self(N - 1)
    }

    /// 下一个槽 (mod N)
    pub fn next(self) -> Self {
        Self((self.0 + 1) % N)
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// 作为寄存器值
    pub fn as_reg(self) -> u32 {
        self.0 as u32
    }
}

/// 一次性分配、清零且对齐的 DMA 区域
struct DmaRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl DmaRegion {
    fn new(size: usize, align: usize) -> Result<Self, InitError> {
        let layout = Layout::from_size_align(size, align).map_err(|_| InitError::BadRingGeometry)?;
        if layout.size() == 0 {
            return Err(InitError::BadRingGeometry);
        }

        // SAFETY: layout 大小非零
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };

        Ok(Self { ptr, layout })
    }

    fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        // SAFETY: ptr 和 layout 来自同一次 alloc_zeroed
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// 描述符环
///
/// - `D`: 描述符类型
/// - `N`: 描述符个数
/// - `BUF`: 每个槽的数据缓冲区大小
pub struct Ring<D: Descriptor, const N: usize, const BUF: usize> {
    descs: DmaRegion,
    buffers: DmaRegion,
    _desc: PhantomData<D>,
}

// SAFETY: 区域由环独占，所有访问都在驱动锁内进行
unsafe impl<D: Descriptor, const N: usize, const BUF: usize> Send for Ring<D, N, BUF> {}

impl<D: Descriptor, const N: usize, const BUF: usize> Ring<D, N, BUF> {
    /// 分配描述符表和缓冲池，并让每个描述符指向自己的缓冲区
    ///
    /// # 参数
    /// - `bus`: 用于把缓冲区地址翻译成 DMA 地址
    ///
    /// # 返回
    /// N 不是 2 的幂或描述符表不是 128 字节的倍数时返回 `BadRingGeometry`
    pub fn new<B: RegisterBus + ?Sized>(bus: &B) -> Result<Self, InitError> {
        if !N.is_power_of_two() || (N * DESC_SIZE) % RING_LEN_ALIGN != 0 || BUF == 0 {
            return Err(InitError::BadRingGeometry);
        }

        let descs = DmaRegion::new(N * DESC_SIZE, RING_LEN_ALIGN)?;
        let buffers = DmaRegion::new(N * BUF, 16)?;
        let ring = Self { descs, buffers, _desc: PhantomData };

        for i in 0..N {
            let index = RingIndex(i);
            let dma = bus.dma_address(ring.buffer_addr(index));
            ring.write(index, D::armed(dma));
        }

        Ok(ring)
    }

    /// 描述符表的虚拟地址
    pub fn desc_base(&self) -> usize {
        self.descs.addr()
    }

    /// 描述符表字节数 (写入 TDLEN/RDLEN)
    pub const fn byte_len() -> u32 {
        (N * DESC_SIZE) as u32
    }

    /// 槽 `index` 的数据缓冲区地址
    pub fn buffer_addr(&self, index: RingIndex<N>) -> usize {
        self.buffers.addr() + index.get() * BUF
    }

    fn desc_ptr(&self, index: RingIndex<N>) -> *mut D {
        // SAFETY: index < N，区域大小为 N * DESC_SIZE
        unsafe { (self.descs.ptr.as_ptr() as *mut D).add(index.get()) }
    }

    /// 读取描述符（设备可能并发写回，必须 volatile）
    pub fn read(&self, index: RingIndex<N>) -> D {
        // SAFETY: 见 desc_ptr
        unsafe { core::ptr::read_volatile(self.desc_ptr(index)) }
    }

    /// 写入描述符
    pub fn write(&self, index: RingIndex<N>, desc: D) {
        // SAFETY: 见 desc_ptr
        unsafe { core::ptr::write_volatile(self.desc_ptr(index), desc) }
    }

    /// 槽 `index` 的数据缓冲区
    pub fn buffer(&self, index: RingIndex<N>) -> &[u8] {
        // SAFETY: 缓冲区位于区域内，长度 BUF
        unsafe { core::slice::from_raw_parts(self.buffer_addr(index) as *const u8, BUF) }
    }

    /// 槽 `index` 的可写数据缓冲区
    pub fn buffer_mut(&mut self, index: RingIndex<N>) -> &mut [u8] {
        // SAFETY: 同 buffer，且 &mut self 保证独占
        unsafe { core::slice::from_raw_parts_mut(self.buffer_addr(index) as *mut u8, BUF) }
    }
}
