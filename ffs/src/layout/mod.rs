//! # 磁盘数据结构层
//!
//! 每个区域的布局：
//! 区域头 | 记录 | 记录 | ... | 擦除状态的剩余空间
//!
//! 记录分为 inode 记录与数据块记录，由开头的魔数区分，紧密排列、没有对齐填充。
//! 扫描遇到无法识别的魔数时，即认为区域的剩余部分尚未写入。

mod area;
pub use area::DiskArea;

mod inode;
pub use inode::{DiskInode, InodeFlag};

mod block;
pub use block::DiskBlock;

use crate::{ObjectId, BLOCK_MAGIC, INODE_MAGIC};

/// 区域内的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskObject {
    Inode(DiskInode),
    Block(DiskBlock),
}

impl DiskObject {
    /// 能容纳任意记录头的长度
    pub const MAX_HEADER_SIZE: usize = DiskBlock::SIZE;

    /// 依据魔数解析记录头。
    /// 魔数无法识别或字节不足时返回空。
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let magic = u32::from_le_bytes(buf.get(..4)?.try_into().ok()?);
        match magic {
            INODE_MAGIC => DiskInode::decode(buf.get(..DiskInode::SIZE)?)
                .ok()
                .map(Self::Inode),
            BLOCK_MAGIC => DiskBlock::decode(buf.get(..DiskBlock::SIZE)?)
                .ok()
                .map(Self::Block),
            _ => None,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Self::Inode(inode) => inode.id(),
            Self::Block(block) => block.id(),
        }
    }

    pub fn seq(&self) -> u32 {
        match self {
            Self::Inode(inode) => inode.seq,
            Self::Block(block) => block.seq,
        }
    }

    /// 记录总长：记录头 + 文件名或数据
    pub fn size(&self) -> u32 {
        match self {
            Self::Inode(inode) => inode.record_size(),
            Self::Block(block) => block.record_size(),
        }
    }
}
