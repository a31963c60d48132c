//! # 对象哈希索引
//!
//! 对象ID到其最新版本所在闪存位置的映射。
//! 按`id % HASH_SIZE`分桶，桶内为单链表，链表节点来自定长对象池。

use vfs::Error;

use crate::inode::InodeHandle;
use crate::pool::{Handle, Pool};
use crate::{FlashLoc, ObjectId, HASH_SIZE};

pub type HashHandle = Handle<HashEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub id: ObjectId,
    /// 当前版本所在位置；尚未写入时为[`FlashLoc::NONE`]
    pub loc: FlashLoc,
    pub owner: Owner,
    next: Option<HashHandle>,
}

/// 索引项代表的对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Block,
    Inode(InodeHandle),
    /// 已删除的 inode，指向其删除记录
    Tombstone,
}

pub struct HashIndex {
    buckets: [Option<HashHandle>; HASH_SIZE],
    entries: Pool<HashEntry>,
}

impl HashEntry {
    pub fn new(id: ObjectId, loc: FlashLoc, owner: Owner) -> Self {
        Self {
            id,
            loc,
            owner,
            next: None,
        }
    }
}

impl HashIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: [None; HASH_SIZE],
            entries: Pool::new(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 还能插入的项数
    #[inline]
    pub fn available(&self) -> usize {
        self.entries.capacity() - self.entries.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// 插入到桶头，不检查重复
    pub fn insert(&mut self, mut entry: HashEntry) -> Result<HashHandle, Error> {
        let bucket = entry.id.bucket();
        entry.next = self.buckets[bucket];

        let handle = self.entries.alloc(entry)?;
        self.buckets[bucket] = Some(handle);
        Ok(handle)
    }

    pub fn remove(&mut self, handle: HashHandle) -> Option<HashEntry> {
        let entry = self.entries.get(handle)?;
        let bucket = entry.id.bucket();
        let next = entry.next;

        let mut prev = None;
        let mut cur = self.buckets[bucket];
        while let Some(h) = cur {
            if h == handle {
                break;
            }
            prev = Some(h);
            cur = self.entries.get(h).and_then(|e| e.next);
        }

        match prev {
            None => self.buckets[bucket] = next,
            Some(prev) => {
                if let Some(prev) = self.entries.get_mut(prev) {
                    prev.next = next;
                }
            }
        }

        self.entries.free(handle)
    }

    pub fn find(&self, id: ObjectId) -> Option<HashHandle> {
        let mut cur = self.buckets[id.bucket()];
        while let Some(h) = cur {
            let entry = self.entries.get(h)?;
            if entry.id == id {
                return Some(h);
            }
            cur = entry.next;
        }
        None
    }

    /// 查找存活的 inode；ID不属于 inode 命名空间时报[`Error::WrongType`]
    pub fn find_inode(&self, id: ObjectId) -> Result<InodeHandle, Error> {
        if !id.is_inode() {
            return Err(Error::WrongType);
        }

        let handle = self.find(id).ok_or(Error::NotFound)?;
        match self.entries.get(handle).map(|entry| entry.owner) {
            Some(Owner::Inode(inode)) => Ok(inode),
            Some(Owner::Block) => Err(Error::WrongType),
            Some(Owner::Tombstone) | None => Err(Error::NotFound),
        }
    }

    pub fn find_block(&self, id: ObjectId) -> Result<HashHandle, Error> {
        if !id.is_block() {
            return Err(Error::WrongType);
        }

        self.find(id).ok_or(Error::NotFound)
    }

    /// 句柄失效说明内存结构已不一致
    pub fn entry(&self, handle: HashHandle) -> Result<&HashEntry, Error> {
        self.entries.get(handle).ok_or_else(|| {
            log::error!("dangling hash entry {handle:?}");
            Error::Corrupt
        })
    }

    pub fn entry_mut(&mut self, handle: HashHandle) -> Result<&mut HashEntry, Error> {
        self.entries.get_mut(handle).ok_or_else(|| {
            log::error!("dangling hash entry {handle:?}");
            Error::Corrupt
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (HashHandle, &HashEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(raw: u32, offset: u32) -> HashEntry {
        HashEntry::new(ObjectId::new(raw), FlashLoc::new(0, offset), Owner::Block)
    }

    #[test]
    fn same_bucket_chain() {
        let mut index = HashIndex::new(8);
        // 三者同桶
        let a = index.insert(block(0x8000_0000, 24)).unwrap();
        let b = index.insert(block(0x8000_0100, 48)).unwrap();
        let c = index.insert(block(0x8000_0200, 72)).unwrap();

        assert_eq!(Some(b), index.find(ObjectId::new(0x8000_0100)));
        assert_eq!(Some(b), index.remove(b).map(|_| b));
        assert_eq!(None, index.find(ObjectId::new(0x8000_0100)));
        assert_eq!(Some(a), index.find(ObjectId::new(0x8000_0000)));
        assert_eq!(Some(c), index.find(ObjectId::new(0x8000_0200)));

        index.remove(c);
        index.remove(a);
        assert_eq!(8, index.available());
        assert_eq!(None, index.find(ObjectId::new(0x8000_0000)));
    }

    #[test]
    fn namespaces() {
        let mut index = HashIndex::new(4);
        let file = ObjectId::new(0x1000_0001);
        index
            .insert(HashEntry::new(file, FlashLoc::new(1, 24), Owner::Tombstone))
            .unwrap();
        let blk = index.insert(block(0x8000_0001, 48)).unwrap();

        assert_eq!(Err(Error::NotFound), index.find_inode(file));
        assert_eq!(Err(Error::WrongType), index.find_inode(ObjectId::new(0x8000_0001)));
        assert_eq!(Err(Error::WrongType), index.find_block(file));
        assert_eq!(Ok(blk), index.find_block(ObjectId::new(0x8000_0001)));
        assert_eq!(Err(Error::NotFound), index.find_block(ObjectId::new(0x8000_0002)));
    }

    #[test]
    fn exhaustion() {
        let mut index = HashIndex::new(1);
        index.insert(block(0x8000_0000, 24)).unwrap();
        assert!(index.is_full());
        assert_eq!(0, index.available());
        assert_eq!(Err(Error::OutOfMemory), index.insert(block(0x8000_0001, 48)));
        assert_eq!(1, index.len());
        assert!(index.find(ObjectId::new(0x8000_0001)).is_none());
    }
}
