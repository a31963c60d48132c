//! # 块链
//!
//! 文件数据是一条反向链接的数据块链：每块记下前一块的ID，
//! inode 只缓存尾部。索引总是指向同一块ID的最新版本，
//! 所以沿链回溯时被覆盖的范围自然取到序号最大的版本。

use alloc::vec::Vec;

use vfs::Error;

use crate::hash::HashHandle;
use crate::inode::{InodeHandle, InodeKind};
use crate::layout::DiskBlock;
use crate::{FlashFileSystem, FlashLoc, ObjectId};

/// 从闪存读出的数据块当前版本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: HashHandle,
    pub id: ObjectId,
    pub seq: u32,
    pub inode_id: ObjectId,
    pub prev: Option<HashHandle>,
    pub data_len: u16,
}

impl FlashFileSystem {
    pub(crate) fn read_disk_block(&self, loc: FlashLoc) -> Result<DiskBlock, Error> {
        let mut buf = [0; DiskBlock::SIZE];
        self.read_flash(loc, &mut buf)?;
        DiskBlock::decode(&buf)
    }

    pub(crate) fn read_block(&self, hash: HashHandle) -> Result<Block, Error> {
        let entry = self.index.entry(hash)?;
        let disk = self.read_disk_block(entry.loc)?;
        if disk.id() != entry.id {
            log::error!("block {} points at a record of {}", entry.id, disk.id());
            return Err(Error::Corrupt);
        }

        let prev = if disk.prev_id().is_none() {
            None
        } else {
            let prev = self.index.find_block(disk.prev_id()).map_err(|_| {
                log::error!("block {} lost its predecessor {}", entry.id, disk.prev_id());
                Error::Corrupt
            })?;
            Some(prev)
        };

        Ok(Block {
            hash,
            id: entry.id,
            seq: disk.seq,
            inode_id: disk.inode_id(),
            prev,
            data_len: disk.data_len,
        })
    }

    /// 读取块内`offset`起的数据
    pub(crate) fn read_block_data(
        &self,
        hash: HashHandle,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<(), Error> {
        let loc = self.index.entry(hash)?.loc;
        let data = FlashLoc::new(
            loc.area_idx(),
            loc.offset() + DiskBlock::SIZE as u32 + offset,
        );
        self.read_flash(data, buf)
    }

    pub(crate) fn last_block(&self, inode: InodeHandle) -> Result<Option<HashHandle>, Error> {
        match self.inode_entry(inode)?.kind {
            InodeKind::File { last_block } => Ok(last_block),
            InodeKind::Directory(_) => Err(Error::IsADirectory),
        }
    }

    /// 接到块链尾部
    pub(crate) fn insert_block(
        &mut self,
        inode: InodeHandle,
        block: &mut Block,
    ) -> Result<(), Error> {
        let InodeKind::File { last_block } = &mut self.inode_entry_mut(inode)?.kind else {
            return Err(Error::IsADirectory);
        };

        block.prev = *last_block;
        *last_block = Some(block.hash);
        Ok(())
    }

    /// 自首至尾的整条块链
    pub(crate) fn block_chain(&self, inode: InodeHandle) -> Result<Vec<Block>, Error> {
        let mut chain = Vec::new();
        let mut cur = self.last_block(inode)?;

        while let Some(hash) = cur {
            // 环
            if chain.len() > self.index.len() {
                log::error!("block chain of {} loops", self.inode_id(inode)?);
                return Err(Error::Corrupt);
            }
            let block = self.read_block(hash)?;
            cur = block.prev;
            chain.push(block);
        }

        chain.reverse();
        Ok(chain)
    }

    /// 自尾至首把块链移出索引
    pub(crate) fn delete_block_list_from_ram(
        &mut self,
        last: Option<HashHandle>,
    ) -> Result<(), Error> {
        let mut cur = last;
        while let Some(hash) = cur {
            cur = self.read_block(hash)?.prev;
            self.index.remove(hash);
        }
        Ok(())
    }
}
