//! # 区域管理层
//!
//! 记录每个区域的写游标、逻辑ID与回收计数，并且是访问闪存驱动的唯一入口。
//! 区域内只追加写入：游标只增不减，直到区域被擦除。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;

use flash_dev::{AreaDesc, FlashDevice, FlashError, ERASED};
use vfs::Error;

use crate::layout::{DiskArea, DiskObject};
use crate::{FlashLoc, ObjectId, AREA_ID_NONE, AREA_OFFSET_ID, FLASH_BUF_SZ};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    /// 区域在设备地址空间中的起点
    pub offset: u32,
    pub length: u32,
    /// 写游标，其后皆为擦除状态
    pub cur: u32,
    /// 逻辑ID，暂存区域为[`AREA_ID_NONE`]
    pub id: u8,
    pub gc_seq: u8,
}

pub struct AreaManager {
    dev: Arc<dyn FlashDevice>,
    areas: Vec<Area>,
    /// 用作回收目标的暂存区域
    scratch_idx: Option<u8>,
}

impl Area {
    #[inline]
    pub fn free_space(&self) -> u32 {
        self.length - self.cur
    }

    #[inline]
    pub fn is_scratch(&self) -> bool {
        self.id == AREA_ID_NONE
    }
}

impl AreaManager {
    /// 区域数的上限，索引`0xff`留给[`FlashLoc::NONE`]
    pub const MAX_AREAS: usize = AREA_ID_NONE as usize;

    pub fn new(dev: Arc<dyn FlashDevice>, descs: &[AreaDesc]) -> Result<Self, Error> {
        if descs.len() < 2 || descs.len() > Self::MAX_AREAS {
            log::error!("unsupported area count {}", descs.len());
            return Err(Error::InvalidInput);
        }

        let max_len = FlashLoc::OFFSET_MASK + 1;
        if let Some(desc) = descs
            .iter()
            .find(|desc| desc.length < 4 * DiskArea::SIZE as u32 || desc.length > max_len)
        {
            log::error!("unsupported area length {:#x}", desc.length);
            return Err(Error::InvalidInput);
        }

        let areas = descs
            .iter()
            .map(|desc| Area {
                offset: desc.offset,
                length: desc.length,
                cur: 0,
                id: AREA_ID_NONE,
                gc_seq: 0,
            })
            .collect();

        Ok(Self {
            dev,
            areas,
            scratch_idx: None,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn FlashDevice> {
        &self.dev
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: u8) -> Option<&Area> {
        self.areas.get(idx as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Area)> {
        self.areas.iter().enumerate().map(|(i, area)| (i as u8, area))
    }

    #[inline]
    pub fn scratch_idx(&self) -> Option<u8> {
        self.scratch_idx
    }

    pub fn free_space(&self, idx: u8) -> Result<u32, Error> {
        self.area(idx).map(Area::free_space)
    }

    /// 通过逻辑ID查找区域索引
    pub fn find_area(&self, logical_id: u8) -> Result<u8, Error> {
        self.iter()
            .find_map(|(idx, area)| (area.id == logical_id).then_some(idx))
            .ok_or(Error::NotFound)
    }

    /// 首次适配：第一个剩余空间足够的非暂存区域。
    /// 返回预留空间的位置，并推进该区域的游标。
    pub fn reserve_space(&mut self, size: u32) -> Result<(u8, u32), Error> {
        let idx = self
            .iter()
            .find_map(|(idx, area)| {
                (!area.is_scratch() && area.free_space() >= size).then_some(idx)
            })
            .ok_or(Error::OutOfSpace)?;

        self.reserve_in(idx, size).map(|offset| (idx, offset))
    }

    /// 在指定区域预留空间
    pub fn reserve_in(&mut self, idx: u8, size: u32) -> Result<u32, Error> {
        let area = self.area_mut(idx)?;
        if area.is_scratch() || area.free_space() < size {
            return Err(Error::OutOfSpace);
        }

        let offset = area.cur;
        area.cur += size;
        Ok(offset)
    }

    /// 撤销最近一次尚未写入的预留
    pub(crate) fn unreserve(&mut self, idx: u8, offset: u32, size: u32) {
        if let Ok(area) = self.area_mut(idx) {
            if area.cur == offset + size {
                area.cur = offset;
            }
        }
    }

    /// 寻找逻辑ID重复的一对区域，返回（完好者，损坏者）。
    ///
    /// 回收途中掉电会使目标区域与源区域同名；目标区域只含源区域内容的子集，
    /// 所以占用较少的一方是未完成的目标，应当重新用作暂存区域。
    /// 末条记录只拷贝了一部分时两者占用可能相等，此时以回收计数区分。
    /// 没有重复时返回空；重复多于一对则无法修复。
    pub fn find_corrupt_scratch(&self) -> Result<Option<(u8, u8)>, Error> {
        let mut found = None;

        for (i, iarea) in self.iter().filter(|(_, area)| !area.is_scratch()) {
            for (j, jarea) in self.iter().skip(i as usize + 1) {
                if jarea.is_scratch() || jarea.id != iarea.id {
                    continue;
                }
                if found.is_some() {
                    log::error!("more than one duplicate area ID");
                    return Err(Error::Corrupt);
                }

                found = Some(match iarea.cur.cmp(&jarea.cur) {
                    Ordering::Less => (j, i),
                    Ordering::Greater => (i, j),
                    // 目标的回收计数比源区域大一
                    Ordering::Equal if iarea.gc_seq == jarea.gc_seq.wrapping_add(1) => (j, i),
                    Ordering::Equal => (i, j),
                });
            }
        }

        Ok(found)
    }

    /// 最短区域的长度
    pub fn min_length(&self) -> u32 {
        self.areas.iter().map(|area| area.length).min().unwrap_or(0)
    }
}

/* 闪存访问 */

impl AreaManager {
    pub(crate) fn read(&self, idx: u8, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        let area = self.area(idx)?;
        if offset as usize + buf.len() > area.length as usize {
            log::error!("read past the end of area {idx}: offset={offset:#x}");
            return Err(Error::Corrupt);
        }

        self.dev.read(idx, offset, buf).map_err(io_error)
    }

    pub(crate) fn write(&mut self, idx: u8, offset: u32, buf: &[u8]) -> Result<(), Error> {
        let area = self.area(idx)?;
        let end = offset as usize + buf.len();
        if end > area.length as usize {
            log::error!("write past the end of area {idx}: offset={offset:#x}");
            return Err(Error::OutOfSpace);
        }

        self.dev.write(idx, offset, buf).map_err(io_error)?;

        let area = self.area_mut(idx)?;
        area.cur = area.cur.max(end as u32);
        Ok(())
    }

    /// 在区域间拷贝字节，目标位于写游标处
    pub(crate) fn copy(&mut self, from: FlashLoc, to: FlashLoc, len: u32) -> Result<(), Error> {
        let mut buf = [0; FLASH_BUF_SZ];
        let mut done = 0;

        while done < len {
            let chunk = (len - done).min(FLASH_BUF_SZ as u32);
            let buf = &mut buf[..chunk as usize];
            self.read(from.area_idx(), from.offset() + done, buf)?;
            self.write(to.area_idx(), to.offset() + done, buf)?;
            done += chunk;
        }

        Ok(())
    }

    /// `offset`之后一个记录头的范围是否仍处于擦除状态。
    /// 扫描在未擦除的字节上停下，说明那里有一条写了一半的记录。
    pub(crate) fn tail_is_erased(&self, idx: u8, offset: u32) -> Result<bool, Error> {
        let area = self.area(idx)?;
        let len = area.length.saturating_sub(offset) as usize;

        let mut buf = [0; DiskObject::MAX_HEADER_SIZE];
        let buf = &mut buf[..len.min(DiskObject::MAX_HEADER_SIZE)];
        self.read(idx, offset, buf)?;
        Ok(buf.iter().all(|&b| b == ERASED))
    }

    pub(crate) fn read_header(&self, idx: u8) -> Result<DiskArea, Error> {
        let mut buf = [0; DiskArea::SIZE];
        self.read(idx, 0, &mut buf)?;
        DiskArea::decode(&buf)
    }

    /// 读取某一偏移处的记录头。
    ///
    /// 魔数无法识别、记录头未写完或记录越过区域末尾时返回空，
    /// 即认为此处开始是擦除状态。
    pub(crate) fn read_object(&self, idx: u8, offset: u32) -> Result<Option<DiskObject>, Error> {
        let area = self.area(idx)?;
        let remain = area.length.saturating_sub(offset) as usize;
        if remain == 0 {
            return Ok(None);
        }

        let mut buf = [0; DiskObject::MAX_HEADER_SIZE];
        let buf = &mut buf[..remain.min(DiskObject::MAX_HEADER_SIZE)];
        self.read(idx, offset, buf)?;

        let Some(object) = DiskObject::decode(buf) else {
            return Ok(None);
        };

        if object.id() == ObjectId::NONE || object.size() as usize > remain {
            log::warn!("torn record at area={idx} offset={offset:#x}");
            return Ok(None);
        }

        Ok(Some(object))
    }

    /// 依偏移顺序列出区域内物理存在的全部记录，返回记录与扫描的终点
    pub(crate) fn scan(&self, idx: u8) -> Result<(Vec<(u32, DiskObject)>, u32), Error> {
        let mut objects = Vec::new();
        let mut offset = DiskArea::SIZE as u32;

        while let Some(object) = self.read_object(idx, offset)? {
            log::trace!("area={idx} offset={offset:#x} object={object:?}");
            let size = object.size();
            objects.push((offset, object));
            offset += size;
        }

        Ok((objects, offset))
    }
}

/* 格式化 */

impl AreaManager {
    /// 擦除区域并写入新的区域头
    pub fn format_area(&mut self, idx: u8, is_scratch: bool) -> Result<(), Error> {
        self.dev.erase(idx).map_err(io_error)?;

        let area = self.area_mut(idx)?;
        area.cur = 0;
        let disk_area = if is_scratch {
            area.id = AREA_ID_NONE;
            DiskArea::scratch(area.length)
        } else {
            DiskArea::new(area.length, area.id, area.gc_seq)
        };

        log::debug!("format area {idx}: id={:#x} scratch={is_scratch}", area.id);
        self.write(idx, 0, &disk_area.encode()?)?;

        if is_scratch {
            self.scratch_idx = Some(idx);
        }
        Ok(())
    }

    /// 把暂存区域提升为逻辑ID为`id`的活动区域。
    ///
    /// 暂存区域头的回收计数与ID字节仍处于擦除状态，直接写入即可，无需擦除。
    pub fn format_from_scratch_area(&mut self, idx: u8, id: u8, gc_seq: u8) -> Result<(), Error> {
        let area = self.area(idx)?;
        if !area.is_scratch() {
            return Err(Error::InvalidInput);
        }

        let offset = AREA_OFFSET_ID - 2;
        self.write(idx, offset, &[gc_seq, 0, id])?;

        let area = self.area_mut(idx)?;
        area.id = id;
        area.gc_seq = gc_seq;
        if self.scratch_idx == Some(idx) {
            self.scratch_idx = None;
        }
        Ok(())
    }

    pub(crate) fn set_scratch_idx(&mut self, idx: Option<u8>) {
        self.scratch_idx = idx;
    }

    pub(crate) fn set_cursor(&mut self, idx: u8, cur: u32) -> Result<(), Error> {
        self.area_mut(idx)?.cur = cur;
        Ok(())
    }

    pub(crate) fn set_logical(
        &mut self,
        idx: u8,
        id: u8,
        gc_seq: u8,
        cur: u32,
    ) -> Result<(), Error> {
        let area = self.area_mut(idx)?;
        area.id = id;
        area.gc_seq = gc_seq;
        area.cur = cur;
        Ok(())
    }
}

impl AreaManager {
    pub(crate) fn area(&self, idx: u8) -> Result<&Area, Error> {
        self.areas.get(idx as usize).ok_or_else(|| {
            log::error!("no area with index {idx}");
            Error::Corrupt
        })
    }

    fn area_mut(&mut self, idx: u8) -> Result<&mut Area, Error> {
        self.areas.get_mut(idx as usize).ok_or_else(|| {
            log::error!("no area with index {idx}");
            Error::Corrupt
        })
    }
}

fn io_error(err: FlashError) -> Error {
    log::error!("flash driver failed: {err:?}");
    Error::Io
}

#[cfg(test)]
mod tests {
    use flash_dev::MemFlash;

    use super::*;

    fn manager(count: usize, length: u32) -> AreaManager {
        let descs = AreaDesc::contiguous(count, length);
        AreaManager::new(Arc::new(MemFlash::new(&descs)), &descs).unwrap()
    }

    #[test]
    fn rejects_bad_descs() {
        let descs = AreaDesc::contiguous(1, 4096);
        let dev = Arc::new(MemFlash::new(&descs));
        assert_eq!(Err(Error::InvalidInput), AreaManager::new(dev, &descs).map(|_| ()));

        let descs = AreaDesc::contiguous(2, 32);
        let dev = Arc::new(MemFlash::new(&descs));
        assert_eq!(Err(Error::InvalidInput), AreaManager::new(dev, &descs).map(|_| ()));
    }

    #[test]
    fn free_space_after_format() {
        let mut areas = manager(2, 4096);
        areas.format_area(0, true).unwrap();
        areas.set_logical(1, 0, 0, 0).unwrap();
        areas.format_area(1, false).unwrap();

        for idx in 0..2 {
            assert_eq!(4096 - DiskArea::SIZE as u32, areas.free_space(idx).unwrap());
        }
        assert_eq!(Some(0), areas.scratch_idx());
        assert!(areas.read_header(0).unwrap().is_scratch());
        assert_eq!(0, areas.read_header(1).unwrap().id);
    }

    #[test]
    fn reserve_first_fit() {
        let mut areas = manager(3, 256);
        areas.format_area(0, true).unwrap();
        for idx in 1..3 {
            areas.set_logical(idx, idx - 1, 0, 0).unwrap();
            areas.format_area(idx, false).unwrap();
        }

        assert_eq!(Ok((1, 24)), areas.reserve_space(200));
        let free = areas.free_space(1).unwrap();
        assert_eq!(256 - 224, free);

        // 区域1放不下，落到区域2
        assert_eq!(Ok((2, 24)), areas.reserve_space(100));
        assert_eq!(Ok((1, 224)), areas.reserve_space(free));
        assert_eq!(Err(Error::OutOfSpace), areas.reserve_space(200));

        assert_eq!(Ok(2), areas.find_area(1));
        assert_eq!(Err(Error::NotFound), areas.find_area(5));
    }

    #[test]
    fn corrupt_scratch() {
        let mut areas = manager(4, 256);
        for idx in 0..4 {
            areas.set_logical(idx, idx, 0, 100).unwrap();
        }
        assert_eq!(Ok(None), areas.find_corrupt_scratch());

        areas.set_logical(3, 1, 0, 40).unwrap();
        assert_eq!(Ok(Some((1, 3))), areas.find_corrupt_scratch());

        areas.set_logical(3, 1, 0, 140).unwrap();
        assert_eq!(Ok(Some((3, 1))), areas.find_corrupt_scratch());

        // 相等时回收计数小者为源区域
        areas.set_logical(3, 1, 0, 100).unwrap();
        areas.set_logical(1, 1, 1, 100).unwrap();
        assert_eq!(Ok(Some((3, 1))), areas.find_corrupt_scratch());
        areas.set_logical(1, 1, 0, 100).unwrap();
        areas.set_logical(3, 1, 1, 100).unwrap();
        assert_eq!(Ok(Some((1, 3))), areas.find_corrupt_scratch());
        areas.set_logical(1, 1, 0xff, 100).unwrap();
        areas.set_logical(3, 1, 0, 100).unwrap();
        assert_eq!(Ok(Some((1, 3))), areas.find_corrupt_scratch());

        // 无从区分时保留靠前的区域
        areas.set_logical(1, 1, 0, 100).unwrap();
        areas.set_logical(3, 1, 0, 100).unwrap();
        assert_eq!(Ok(Some((1, 3))), areas.find_corrupt_scratch());

        areas.set_logical(2, 0, 0, 100).unwrap();
        assert_eq!(Err(Error::Corrupt), areas.find_corrupt_scratch());
    }

    #[test]
    fn scratch_areas_are_not_duplicates() {
        let mut areas = manager(3, 256);
        areas.set_logical(0, AREA_ID_NONE, 0, 24).unwrap();
        areas.set_logical(1, AREA_ID_NONE, 0, 24).unwrap();
        areas.set_logical(2, 0, 0, 24).unwrap();
        assert_eq!(Ok(None), areas.find_corrupt_scratch());
    }

    #[test]
    fn promote_scratch() {
        let mut areas = manager(2, 256);
        areas.format_area(1, true).unwrap();
        areas.format_from_scratch_area(1, 4, 3).unwrap();

        let header = areas.read_header(1).unwrap();
        assert!(header.magic_is_set());
        assert_eq!((4, 3), (header.id, header.gc_seq));
        assert_eq!(None, areas.scratch_idx());
        assert_eq!(DiskArea::SIZE as u32, areas.get(1).unwrap().cur);
    }
}
