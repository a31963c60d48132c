//! 内存中的闪存，供测试与主机工具使用。
//!
//! 与真实闪存一样拒绝覆盖未擦除的字节；
//! 另可设置写入预算，预算耗尽后写入失败，用来模拟掉电。

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{AreaDesc, FlashDevice, FlashError, ERASED};

#[derive(Debug)]
pub struct MemFlash {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    areas: Vec<Vec<u8>>,
    /// 剩余可成功的写入次数，`None`表示不限
    write_budget: Option<usize>,
}

impl MemFlash {
    pub fn new(descs: &[AreaDesc]) -> Self {
        let areas = descs
            .iter()
            .map(|desc| vec![ERASED; desc.length as usize])
            .collect();

        Self {
            inner: Mutex::new(Inner {
                areas,
                write_budget: None,
            }),
        }
    }

    /// 之后只有`budget`次写入能成功
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.inner.lock().write_budget = budget;
    }

    /// 区域内容的拷贝
    pub fn area_bytes(&self, area: u8) -> Option<Vec<u8>> {
        self.inner.lock().areas.get(area as usize).cloned()
    }

    /// 无视擦除状态直接改写字节，用于构造损坏的介质
    pub fn force_write(&self, area: u8, offset: u32, buf: &[u8]) -> Result<(), FlashError> {
        let mut inner = self.inner.lock();
        let dst = inner.range_mut(area, offset, buf.len())?;
        dst.copy_from_slice(buf);
        Ok(())
    }
}

impl FlashDevice for MemFlash {
    fn read(&self, area: u8, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let mut inner = self.inner.lock();
        let src = inner.range_mut(area, offset, buf.len())?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&self, area: u8, offset: u32, buf: &[u8]) -> Result<(), FlashError> {
        let mut inner = self.inner.lock();

        match inner.write_budget {
            Some(0) => {
                log::debug!("write budget exhausted at area={area} offset={offset:#x}");
                return Err(FlashError::Device);
            }
            Some(ref mut budget) => *budget -= 1,
            None => {}
        }

        let dst = inner.range_mut(area, offset, buf.len())?;
        if dst.iter().any(|&b| b != ERASED) {
            log::warn!("overlapping write at area={area} offset={offset:#x}");
            return Err(FlashError::NotErased);
        }
        dst.copy_from_slice(buf);
        Ok(())
    }

    fn erase(&self, area: u8) -> Result<(), FlashError> {
        let mut inner = self.inner.lock();
        let data = inner
            .areas
            .get_mut(area as usize)
            .ok_or(FlashError::OutOfBounds)?;
        data.fill(ERASED);
        Ok(())
    }
}

impl Inner {
    fn range_mut(&mut self, area: u8, offset: u32, len: usize) -> Result<&mut [u8], FlashError> {
        let data = self
            .areas
            .get_mut(area as usize)
            .ok_or(FlashError::OutOfBounds)?;
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(FlashError::OutOfBounds)?;
        data.get_mut(start..end).ok_or(FlashError::OutOfBounds)
    }
}
