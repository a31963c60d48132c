//! # 写入
//!
//! 覆盖已有范围时，为涉及的每个块写下新版本（ID、前驱与长度不变，序号加一）；
//! 超出文件末尾的部分按最大块长切分，追加为新块。

use alloc::vec;

use vfs::Error;

use crate::block::Block;
use crate::hash::{HashEntry, HashHandle, Owner};
use crate::inode::InodeHandle;
use crate::layout::DiskBlock;
use crate::{FlashFileSystem, ObjectId};

impl FlashFileSystem {
    /// 从`offset`起写入`data`；`offset`不得超过文件长度
    pub(crate) fn write_to_file(
        &mut self,
        inode: InodeHandle,
        offset: u32,
        data: &[u8],
    ) -> Result<(), Error> {
        let result = self.write_to_file_inner(inode, offset, data);
        self.cache.invalidate(inode);
        result
    }

    fn write_to_file_inner(
        &mut self,
        inode: InodeHandle,
        offset: u32,
        mut data: &[u8],
    ) -> Result<(), Error> {
        let cache = self.file_cache(inode)?;
        if offset > cache.size {
            return Err(Error::InvalidInput);
        }

        // 追加的块须一次放得下，否则什么也不写
        let max_data = self.block_max_data_size() as usize;
        let tail = data.len() - data.len().min((cache.size - offset) as usize);
        let new_blocks = tail.div_ceil(max_data);
        if new_blocks > self.index.available() {
            log::warn!("{new_blocks} more blocks do not fit the index");
            return Err(Error::OutOfMemory);
        }

        let mut pos = offset;
        if let Some(first) = cache.locate(pos) {
            for block in &cache.blocks[first..] {
                if data.is_empty() {
                    break;
                }

                let start = pos - block.file_offset;
                let len = (block.data_len as u32 - start).min(data.len() as u32);
                let (chunk, rest) = data.split_at(len as usize);
                self.overwrite_block(block.hash, start, chunk)?;

                pos += len;
                data = rest;
            }
        }

        for chunk in data.chunks(max_data) {
            self.append_block(inode, chunk)?;
        }

        Ok(())
    }

    /// 写下块的新版本，替换块内`start`起的数据
    fn overwrite_block(&mut self, hash: HashHandle, start: u32, chunk: &[u8]) -> Result<(), Error> {
        let (id, loc) = {
            let entry = self.index.entry(hash)?;
            (entry.id, entry.loc)
        };
        let old = self.read_disk_block(loc)?;

        let mut payload = vec![0; old.data_len as usize];
        self.read_block_data(hash, 0, &mut payload)?;
        payload[start as usize..start as usize + chunk.len()].copy_from_slice(chunk);

        let disk = DiskBlock::new(
            id,
            old.seq.wrapping_add(1),
            old.inode_id(),
            old.prev_id(),
            old.data_len,
        );
        let loc = self.write_record(&disk.encode()?, &payload)?;
        self.index.entry_mut(hash)?.loc = loc;

        log::trace!("block {id} seq={} rewritten at {loc}", disk.seq);
        Ok(())
    }

    /// 新建数据块并接到块链尾部
    fn append_block(&mut self, inode: InodeHandle, chunk: &[u8]) -> Result<(), Error> {
        if self.index.is_full() {
            return Err(Error::OutOfMemory);
        }

        let inode_id = self.inode_id(inode)?;
        let prev_id = match self.last_block(inode)? {
            Some(prev) => self.index.entry(prev)?.id,
            None => ObjectId::NONE,
        };

        let id = self.ids.alloc_block()?;
        let disk = DiskBlock::new(id, 0, inode_id, prev_id, chunk.len() as u16);
        let loc = self.write_record(&disk.encode()?, chunk)?;

        let hash = self.index.insert(HashEntry::new(id, loc, Owner::Block))?;
        let mut block = Block {
            hash,
            id,
            seq: 0,
            inode_id,
            prev: None,
            data_len: disk.data_len,
        };
        self.insert_block(inode, &mut block)?;

        log::trace!("block {id} appended to {inode_id} at {loc}");
        Ok(())
    }
}
