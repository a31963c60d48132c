//! # 闪存设备接口层
//!
//! 闪存以**区域**（擦除单元）为单位组织：区域内只能追加写入已擦除的字节，
//! 擦除则把整个区域恢复为全`0xff`。
//! [`FlashDevice`] 就是对读写闪存的抽象，实现了此特质的类型称为**闪存驱动**。
//!
//! `ffs` 只通过（区域索引，区域内偏移）访问闪存驱动。

#![no_std]

extern crate alloc;

mod mem_flash;

use core::any::Any;

pub use self::mem_flash::MemFlash;

/// 擦除后的字节值
pub const ERASED: u8 = 0xff;

/// 区域描述：区域在设备地址空间中的起点与长度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaDesc {
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// 区域索引或访问范围越界
    OutOfBounds,
    /// 目标范围内存在未擦除的字节
    NotErased,
    /// 底层介质报告的错误
    Device,
}

/// 闪存驱动特质
pub trait FlashDevice: Send + Sync + Any {
    fn read(&self, area: u8, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// 只允许写入处于擦除状态的字节
    fn write(&self, area: u8, offset: u32, buf: &[u8]) -> Result<(), FlashError>;

    fn erase(&self, area: u8) -> Result<(), FlashError>;
}

impl AreaDesc {
    #[inline]
    pub const fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }

    /// 连续排列的`count`个等长区域
    pub fn contiguous(count: usize, length: u32) -> alloc::vec::Vec<Self> {
        (0..count as u32)
            .map(|i| Self::new(i * length, length))
            .collect()
    }
}
