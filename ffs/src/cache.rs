//! # 文件缓存
//!
//! 沿块链回溯需要逐块读闪存，缓存为最近访问的若干文件保存
//! 解析好的块列表与各块在文件中的偏移。缓存不是权威数据，随时可以重建。

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use vfs::Error;

use crate::hash::HashHandle;
use crate::inode::InodeHandle;
use crate::FlashFileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CachedBlock {
    pub hash: HashHandle,
    /// 块首在文件中的偏移
    pub file_offset: u32,
    pub data_len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileCache {
    pub inode: InodeHandle,
    /// 自首至尾
    pub blocks: Vec<CachedBlock>,
    pub size: u32,
}

pub(crate) struct CacheManager {
    capacity: usize,
    /// 队首最久未用
    entries: VecDeque<FileCache>,
}

impl FileCache {
    /// 含有`offset`处字节的块
    pub fn locate(&self, offset: u32) -> Option<usize> {
        if offset >= self.size {
            return None;
        }
        let idx = self
            .blocks
            .partition_point(|block| block.file_offset + block.data_len as u32 <= offset);
        (idx < self.blocks.len()).then_some(idx)
    }
}

impl CacheManager {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    /// 命中时移到队尾
    pub fn get(&mut self, inode: InodeHandle) -> Option<&FileCache> {
        let pos = self.entries.iter().position(|cache| cache.inode == inode)?;
        let cache = self.entries.remove(pos)?;
        self.entries.push_back(cache);
        self.entries.back()
    }

    pub fn insert(&mut self, cache: FileCache) {
        if self.capacity == 0 {
            return;
        }

        self.invalidate(cache.inode);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(cache);
    }

    pub fn invalidate(&mut self, inode: InodeHandle) {
        self.entries.retain(|cache| cache.inode != inode);
    }
}

impl FlashFileSystem {
    /// 文件的块列表，未命中时沿块链重建
    pub(crate) fn file_cache(&mut self, inode: InodeHandle) -> Result<FileCache, Error> {
        if let Some(cache) = self.cache.get(inode) {
            return Ok(cache.clone());
        }

        let mut blocks = Vec::new();
        let mut size = 0;
        for block in self.block_chain(inode)? {
            blocks.push(CachedBlock {
                hash: block.hash,
                file_offset: size,
                data_len: block.data_len,
            });
            size += block.data_len as u32;
        }

        let cache = FileCache {
            inode,
            blocks,
            size,
        };
        self.cache.insert(cache.clone());
        Ok(cache)
    }

    pub(crate) fn file_size(&mut self, inode: InodeHandle) -> Result<u32, Error> {
        self.file_cache(inode).map(|cache| cache.size)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::hash::{HashEntry, HashIndex, Owner};
    use crate::inode::{InodeEntry, InodeKind};
    use crate::pool::Pool;
    use crate::{FlashLoc, ObjectId};

    fn handles(n: usize) -> (Vec<InodeHandle>, Vec<HashHandle>) {
        let mut index = HashIndex::new(n);
        let mut inodes = Pool::new(n);
        let mut inode_handles = vec![];
        let mut hash_handles = vec![];

        for i in 0..n as u32 {
            let id = ObjectId::new(0x8000_0000 + i);
            let hash = index
                .insert(HashEntry::new(id, FlashLoc::NONE, Owner::Block))
                .unwrap();
            let inode = inodes
                .alloc(InodeEntry {
                    hash,
                    parent: None,
                    kind: InodeKind::File { last_block: None },
                    refcnt: 1,
                })
                .unwrap();
            hash_handles.push(hash);
            inode_handles.push(inode);
        }
        (inode_handles, hash_handles)
    }

    fn cached(hash: HashHandle, file_offset: u32, data_len: u16) -> CachedBlock {
        CachedBlock {
            hash,
            file_offset,
            data_len,
        }
    }

    #[test]
    fn locate_offsets() {
        let (inodes, hashes) = handles(3);
        let cache = FileCache {
            inode: inodes[0],
            blocks: vec![
                cached(hashes[0], 0, 100),
                cached(hashes[1], 100, 50),
                cached(hashes[2], 150, 10),
            ],
            size: 160,
        };

        assert_eq!(Some(0), cache.locate(0));
        assert_eq!(Some(0), cache.locate(99));
        assert_eq!(Some(1), cache.locate(100));
        assert_eq!(Some(2), cache.locate(159));
        assert_eq!(None, cache.locate(160));
    }

    #[test]
    fn evicts_least_recently_used() {
        let (inodes, _) = handles(3);
        let empty = |inode| FileCache {
            inode,
            blocks: vec![],
            size: 0,
        };

        let mut manager = CacheManager::new(2);
        manager.insert(empty(inodes[0]));
        manager.insert(empty(inodes[1]));
        assert!(manager.get(inodes[0]).is_some());

        manager.insert(empty(inodes[2]));
        assert!(manager.get(inodes[1]).is_none());
        assert!(manager.get(inodes[0]).is_some());
        assert!(manager.get(inodes[2]).is_some());

        manager.invalidate(inodes[0]);
        assert!(manager.get(inodes[0]).is_none());

        let mut disabled = CacheManager::new(0);
        disabled.insert(empty(inodes[0]));
        assert!(disabled.get(inodes[0]).is_none());
    }
}
