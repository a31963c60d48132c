//! 文件系统上下文：格式化或恢复时创建，卸载时销毁

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use flash_dev::{AreaDesc, FlashDevice};
use vfs::Error;

use crate::area::{Area, AreaManager};
use crate::cache::CacheManager;
use crate::file::File;
use crate::hash::HashIndex;
use crate::id::IdAllocator;
use crate::inode::{InodeEntry, InodeHandle};
use crate::layout::DiskObject;
use crate::pool::Pool;
use crate::{FfsConfig, FlashLoc, ObjectId, BLOCK_MAX_DATA_SZ_MAX};

pub struct FlashFileSystem {
    pub(crate) areas: AreaManager,
    pub(crate) index: HashIndex,
    pub(crate) inodes: Pool<InodeEntry>,
    pub(crate) files: Pool<File>,
    pub(crate) cache: CacheManager,
    pub(crate) ids: IdAllocator,
    /// 格式化或恢复完成后必定存在
    pub(crate) root: Option<InodeHandle>,
    config: FfsConfig,
    block_max_data: u16,
}

impl FlashFileSystem {
    /// 尚未载入任何对象的上下文
    pub(crate) fn unmounted(
        dev: Arc<dyn FlashDevice>,
        descs: &[AreaDesc],
        config: FfsConfig,
    ) -> Result<Self, Error> {
        let areas = AreaManager::new(dev, descs)?;
        let block_max_data = (areas.min_length() / 2).min(BLOCK_MAX_DATA_SZ_MAX as u32) as u16;

        Ok(Self {
            areas,
            index: HashIndex::new(config.num_hash_entries()),
            inodes: Pool::new(config.num_inodes),
            files: Pool::new(config.num_files),
            cache: CacheManager::new(config.num_cache_inodes),
            ids: IdAllocator::new(),
            root: None,
            config,
            block_max_data,
        })
    }

    /// 卸载，交还闪存驱动以便再次恢复
    pub fn unmount(self) -> Arc<dyn FlashDevice> {
        if !self.files.is_empty() {
            log::warn!("unmount with {} open files", self.files.len());
        }
        log::info!("unmount: {} objects indexed", self.index.len());
        self.areas.device().clone()
    }

    #[inline]
    pub fn config(&self) -> &FfsConfig {
        &self.config
    }

    /// 单个数据块可容纳的最大数据量
    #[inline]
    pub fn block_max_data_size(&self) -> u16 {
        self.block_max_data
    }

    pub(crate) fn root(&self) -> Result<InodeHandle, Error> {
        self.root.ok_or(Error::Corrupt)
    }
}

/* 写入记录 */

impl FlashFileSystem {
    /// 预留空间；没有区域放得下时回收后再试
    pub(crate) fn reserve_space(&mut self, size: u32) -> Result<(u8, u32), Error> {
        match self.areas.reserve_space(size) {
            Err(Error::OutOfSpace) => {
                log::debug!("no area fits {size} bytes, collecting garbage");
                let idx = self.gc_until(size)?;
                self.areas.reserve_in(idx, size).map(|offset| (idx, offset))
            }
            result => result,
        }
    }

    /// 把记录头与其后的文件名或数据一次写入新预留的空间
    pub(crate) fn write_record(&mut self, header: &[u8], body: &[u8]) -> Result<FlashLoc, Error> {
        let mut record = Vec::with_capacity(header.len() + body.len());
        record.extend_from_slice(header);
        record.extend_from_slice(body);

        let size = record.len() as u32;
        let (idx, offset) = self.reserve_space(size)?;
        if let Err(err) = self.areas.write(idx, offset, &record) {
            self.areas.unreserve(idx, offset, size);
            return Err(err);
        }

        Ok(FlashLoc::new(idx, offset))
    }

    pub(crate) fn read_flash(&self, loc: FlashLoc, buf: &mut [u8]) -> Result<(), Error> {
        self.areas.read(loc.area_idx(), loc.offset(), buf)
    }
}

/* 内省 */

impl FlashFileSystem {
    #[inline]
    pub fn area(&self, idx: u8) -> Option<&Area> {
        self.areas.get(idx)
    }

    #[inline]
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    #[inline]
    pub fn scratch_area_idx(&self) -> Option<u8> {
        self.areas.scratch_idx()
    }

    #[inline]
    pub fn find_area(&self, logical_id: u8) -> Result<u8, Error> {
        self.areas.find_area(logical_id)
    }

    #[inline]
    pub fn free_space(&self, idx: u8) -> Result<u32, Error> {
        self.areas.free_space(idx)
    }

    /// 区域内物理存在的全部记录，按偏移排列
    pub fn scan_area(&self, idx: u8) -> Result<Vec<(FlashLoc, DiskObject)>, Error> {
        let (objects, _) = self.areas.scan(idx)?;
        Ok(objects
            .into_iter()
            .map(|(offset, object)| (FlashLoc::new(idx, offset), object))
            .collect())
    }

    /// 对象当前版本的位置，包括已删除 inode 的删除记录
    pub fn lookup(&self, id: ObjectId) -> Option<FlashLoc> {
        let handle = self.index.find(id)?;
        self.index.entry(handle).ok().map(|entry| entry.loc)
    }

    pub fn index_snapshot(&self) -> BTreeMap<ObjectId, FlashLoc> {
        self.index
            .iter()
            .map(|(_, entry)| (entry.id, entry.loc))
            .collect()
    }
}
