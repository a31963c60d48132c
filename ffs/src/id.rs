use core::fmt;
use core::ops::Range;

use derive_more::{From, Into};
use vfs::Error;

use crate::{AREA_ID_NONE, HASH_SIZE};

/// 对象ID。ID空间按范围划分为目录、文件与数据块三类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    pub const DIR: Range<u32> = 0..0x1000_0000;
    pub const FILE: Range<u32> = 0x1000_0000..0x8000_0000;
    pub const BLOCK: Range<u32> = 0x8000_0000..0xffff_ffff;

    pub const ROOT_DIR: Self = Self(0);
    pub const NONE: Self = Self(0xffff_ffff);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn is_dir(self) -> bool {
        Self::DIR.contains(&self.0)
    }

    pub fn is_file(self) -> bool {
        Self::FILE.contains(&self.0)
    }

    pub fn is_inode(self) -> bool {
        self.is_dir() || self.is_file()
    }

    pub fn is_block(self) -> bool {
        Self::BLOCK.contains(&self.0)
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub(crate) fn bucket(self) -> usize {
        self.0 as usize % HASH_SIZE
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// 闪存位置：高8位为区域索引，低24位为区域内偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
#[repr(transparent)]
pub struct FlashLoc(u32);

impl FlashLoc {
    pub const OFFSET_BITS: u32 = 24;
    pub const OFFSET_MASK: u32 = (1 << Self::OFFSET_BITS) - 1;

    pub const NONE: Self = Self::new(AREA_ID_NONE, 0);

    pub const fn new(area_idx: u8, offset: u32) -> Self {
        Self(((area_idx as u32) << Self::OFFSET_BITS) | (offset & Self::OFFSET_MASK))
    }

    pub const fn area_idx(self) -> u8 {
        (self.0 >> Self::OFFSET_BITS) as u8
    }

    pub const fn offset(self) -> u32 {
        self.0 & Self::OFFSET_MASK
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for FlashLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {:#x})", self.area_idx(), self.offset())
    }
}

/// 各命名空间下一个可用的ID。挂载期间只增不减，不会复用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IdAllocator {
    next_dir: u32,
    next_file: u32,
    next_block: u32,
}

impl IdAllocator {
    /// 刚格式化的文件系统：根目录已占用ID 0
    pub fn new() -> Self {
        Self {
            next_dir: ObjectId::ROOT_DIR.0 + 1,
            next_file: ObjectId::FILE.start,
            next_block: ObjectId::BLOCK.start,
        }
    }

    /// 恢复时登记闪存上出现过的ID
    pub fn observe(&mut self, id: ObjectId) {
        let next = id.0.saturating_add(1);
        if id.is_dir() {
            self.next_dir = self.next_dir.max(next);
        } else if id.is_file() {
            self.next_file = self.next_file.max(next);
        } else if id.is_block() {
            self.next_block = self.next_block.max(next);
        }
    }

    pub fn alloc_dir(&mut self) -> Result<ObjectId, Error> {
        Self::alloc(&mut self.next_dir, ObjectId::DIR)
    }

    pub fn alloc_file(&mut self) -> Result<ObjectId, Error> {
        Self::alloc(&mut self.next_file, ObjectId::FILE)
    }

    pub fn alloc_block(&mut self) -> Result<ObjectId, Error> {
        Self::alloc(&mut self.next_block, ObjectId::BLOCK)
    }

    fn alloc(next: &mut u32, range: Range<u32>) -> Result<ObjectId, Error> {
        if !range.contains(&*next) {
            log::error!("object ID space {range:#x?} exhausted");
            return Err(Error::OutOfMemory);
        }

        let id = ObjectId(*next);
        *next += 1;
        Ok(id)
    }
}
