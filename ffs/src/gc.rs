//! # 垃圾回收
//!
//! 把源区域中的权威记录依次拷入暂存区域，再把源区域擦除为新的暂存区域。
//! 记录是权威的，当且仅当索引中该ID的位置恰是此记录的位置。
//!
//! 掉电时的状态：
//! - 暂存区域提升之前：什么也没发生；
//! - 拷贝途中：两个区域逻辑ID相同，恢复时保留占用较多的源区域；
//! - 源区域擦除之后：源区域没有区域头，恢复时成为暂存区域。

use alloc::vec::Vec;

use vfs::Error;

use crate::{FlashFileSystem, FlashLoc};

impl FlashFileSystem {
    /// 回收剩余空间最少的区域，返回回收目标的索引
    pub fn gc(&mut self) -> Result<u8, Error> {
        let from = self
            .gc_order()
            .first()
            .copied()
            .ok_or(Error::OutOfSpace)?;
        self.gc_area(from)
    }

    /// 依次回收各区域，直到某个区域有`space`字节剩余
    pub fn gc_until(&mut self, space: u32) -> Result<u8, Error> {
        let logical_ids = self
            .gc_order()
            .into_iter()
            .filter_map(|idx| self.areas.get(idx).map(|area| area.id))
            .collect::<Vec<_>>();

        for logical_id in logical_ids {
            let from = self.areas.find_area(logical_id)?;
            let to = self.gc_area(from)?;
            if self.areas.free_space(to)? >= space {
                return Ok(to);
            }
        }

        log::warn!("no area can hold {space} bytes");
        Err(Error::OutOfSpace)
    }

    /// 非暂存区域按剩余空间升序排列，相同时索引小者在前
    fn gc_order(&self) -> Vec<u8> {
        let mut order = self
            .areas
            .iter()
            .filter(|(_, area)| !area.is_scratch())
            .map(|(idx, area)| (area.free_space(), idx))
            .collect::<Vec<_>>();
        order.sort_unstable();
        order.into_iter().map(|(_, idx)| idx).collect()
    }

    /// 把区域`from`压缩到暂存区域，返回其索引
    pub fn gc_area(&mut self, from: u8) -> Result<u8, Error> {
        let to = self.areas.scratch_idx().ok_or_else(|| {
            log::error!("no scratch area to collect into");
            Error::Corrupt
        })?;

        let area = self.areas.area(from)?.clone();
        if area.is_scratch() {
            return Err(Error::InvalidInput);
        }

        let (objects, end) = self.areas.scan(from)?;
        if end != area.cur && self.areas.tail_is_erased(from, end)? {
            log::error!("area {from} has a hole at {end:#x}, cursor at {:#x}", area.cur);
            return Err(Error::Corrupt);
        }

        let live = objects
            .into_iter()
            .filter(|(offset, object)| {
                self.lookup(object.id()) == Some(FlashLoc::new(from, *offset))
            })
            .collect::<Vec<_>>();

        let live_size: u32 = live.iter().map(|(_, object)| object.size()).sum();
        if live_size > self.areas.free_space(to)? {
            log::warn!("live data of area {from} does not fit the scratch area");
            return Err(Error::OutOfSpace);
        }

        log::info!(
            "gc area {from} (id {}) into {to}: {} live records, {live_size} bytes",
            area.id,
            live.len()
        );

        self.areas
            .format_from_scratch_area(to, area.id, area.gc_seq.wrapping_add(1))?;

        for (offset, object) in live {
            let size = object.size();
            let dst = self.areas.reserve_in(to, size)?;
            let dst = FlashLoc::new(to, dst);
            self.areas.copy(FlashLoc::new(from, offset), dst, size)?;

            let hash = self.index.find(object.id()).ok_or(Error::Corrupt)?;
            self.index.entry_mut(hash)?.loc = dst;
        }

        self.areas.format_area(from, true)?;
        Ok(to)
    }
}
