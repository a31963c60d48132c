//! # 恢复
//!
//! 挂载时扫描全部区域，重建哈希索引与 inode 树：
//! 1. 读区域头，处理回收途中掉电留下的重名区域，确定唯一的暂存区域；
//! 2. 扫描记录，每个ID取序号最大的版本；
//! 3. 把存活的 inode 挂到父目录下，清除不可达的 inode 与无主的数据块，
//!    并为每个文件找出块链尾部。

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use flash_dev::{AreaDesc, FlashDevice};
use vfs::Error;

use crate::hash::{HashEntry, HashHandle, Owner};
use crate::inode::{InodeEntry, InodeHandle, InodeKind};
use crate::layout::{DiskArea, DiskBlock, DiskObject};
use crate::{FfsConfig, FlashFileSystem, FlashLoc, ObjectId, AREA_ID_NONE, AREA_VER};

/// 某个ID目前见到的最新版本
struct Found {
    loc: FlashLoc,
    object: DiskObject,
}

/// 区域头的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AreaState {
    Uninit,
    Scratch,
    Active,
}

impl FlashFileSystem {
    pub fn restore_full(
        dev: Arc<dyn FlashDevice>,
        descs: &[AreaDesc],
        config: FfsConfig,
    ) -> Result<Self, Error> {
        let mut fs = Self::unmounted(dev, descs, config)?;

        let states = fs.read_area_headers()?;
        let mut scanned = vec![vec![]; states.len()];
        for (idx, state) in states.iter().enumerate() {
            if *state == AreaState::Uninit {
                continue;
            }
            let idx = idx as u8;
            let (objects, end) = fs.areas.scan(idx)?;
            fs.areas.set_cursor(idx, end)?;
            scanned[idx as usize] = objects;
        }

        // 以扫描终点比较占用：残缺的拷贝不会比源区域长
        if let Some((good, bad)) = fs.areas.find_corrupt_scratch()? {
            log::warn!("interrupted gc: area {good} kept, area {bad} becomes scratch");
            fs.areas.format_area(bad, true)?;
            scanned[bad as usize].clear();
        }
        fs.skip_torn_records(&states)?;

        fs.settle_scratch_area(&states)?;

        let mut found = BTreeMap::new();
        for (idx, objects) in scanned.into_iter().enumerate() {
            if fs.areas.area(idx as u8)?.is_scratch() {
                continue;
            }
            for (offset, object) in objects {
                fs.ids.observe(object.id());
                Self::keep_newest(&mut found, FlashLoc::new(idx as u8, offset), object)?;
            }
        }

        let blocks = fs.build_index(found)?;
        fs.build_tree()?;
        fs.build_block_chains(blocks)?;

        log::info!(
            "restored {} areas: {} inodes, {} index entries, scratch area {:?}",
            fs.areas.len(),
            fs.inodes.len(),
            fs.index.len(),
            fs.areas.scratch_idx()
        );
        Ok(fs)
    }

    /// 扫描停在未擦除的字节上时，那里是一条写了一半的记录。
    /// 游标移到区域末尾，区域不再写入，等回收时丢弃残缺的部分。
    fn skip_torn_records(&mut self, states: &[AreaState]) -> Result<(), Error> {
        for (idx, state) in states.iter().enumerate() {
            let idx = idx as u8;
            let area = self.areas.area(idx)?;
            if *state == AreaState::Uninit || self.areas.tail_is_erased(idx, area.cur)? {
                continue;
            }

            log::warn!("area {idx} ends with a torn record at {:#x}", area.cur);
            let length = area.length;
            self.areas.set_cursor(idx, length)?;
        }
        Ok(())
    }

    fn read_area_headers(&mut self) -> Result<Vec<AreaState>, Error> {
        let mut states = Vec::with_capacity(self.areas.len());

        for idx in 0..self.areas.len() as u8 {
            let length = self.areas.area(idx)?.length;
            let header = match self.areas.read_header(idx) {
                Ok(header) if header.magic_is_set() => Some(header),
                Ok(_) | Err(Error::Corrupt) => None,
                Err(err) => return Err(err),
            };

            // 区域头与区域描述不符
            if let Some(header) = &header {
                if header.ver != AREA_VER || header.length != length {
                    log::error!(
                        "area {idx}: header v{} of {:#x} bytes does not match the layout",
                        header.ver,
                        header.length
                    );
                    return Err(Error::Corrupt);
                }
            }

            let state = match header {
                None => {
                    self.areas.set_logical(idx, AREA_ID_NONE, 0, 0)?;
                    AreaState::Uninit
                }
                Some(header) if header.is_scratch() => {
                    self.areas.set_logical(idx, AREA_ID_NONE, 0, 0)?;
                    AreaState::Scratch
                }
                Some(header) => {
                    self.areas.set_logical(idx, header.id, header.gc_seq, 0)?;
                    AreaState::Active
                }
            };
            log::debug!("area {idx}: {state:?}");
            states.push(state);
        }

        if states.iter().all(|&state| state == AreaState::Uninit) {
            log::error!("no file system detected");
            return Err(Error::Corrupt);
        }
        Ok(states)
    }

    /// 留下恰好一个暂存区域：多余的暂存区域与未初始化的区域编为新的活动区域
    fn settle_scratch_area(&mut self, states: &[AreaState]) -> Result<(), Error> {
        let mut scratches = vec![];
        let mut uninit = vec![];
        for (idx, area) in self.areas.iter() {
            if !area.is_scratch() {
                continue;
            }
            match states[idx as usize] {
                AreaState::Uninit => uninit.push(idx),
                _ => scratches.push(idx),
            }
        }

        let largest = |areas: &[u8], fs: &Self| {
            areas
                .iter()
                .copied()
                .fold(None::<(u8, u32)>, |best, idx| {
                    let length = fs.areas.get(idx).map_or(0, |area| area.length);
                    match best {
                        Some((_, best_len)) if best_len >= length => best,
                        _ => Some((idx, length)),
                    }
                })
                .map(|(idx, _)| idx)
        };

        let scratch = match largest(&scratches, self) {
            Some(idx) => idx,
            None => {
                let idx = largest(&uninit, self).ok_or_else(|| {
                    log::error!("no scratch area");
                    Error::Corrupt
                })?;
                uninit.retain(|&i| i != idx);
                idx
            }
        };

        // 暂存区域必须为空
        let area = self.areas.area(scratch)?;
        if states[scratch as usize] != AreaState::Scratch || area.cur != DiskArea::SIZE as u32 {
            self.areas.format_area(scratch, true)?;
        }

        for idx in scratches.into_iter().chain(uninit) {
            if idx == scratch {
                continue;
            }
            let id = self.unused_logical_id()?;
            log::warn!("area {idx} joins as logical area {id}");
            self.areas.set_logical(idx, id, 0, 0)?;
            self.areas.format_area(idx, false)?;
        }
        self.areas.set_scratch_idx(Some(scratch));

        let scratch_len = self.areas.area(scratch)?.length;
        if self
            .areas
            .iter()
            .any(|(idx, area)| idx != scratch && area.length > scratch_len)
        {
            log::error!("scratch area {scratch} is smaller than an active area");
            return Err(Error::Corrupt);
        }
        Ok(())
    }

    fn unused_logical_id(&self) -> Result<u8, Error> {
        (0..AREA_ID_NONE)
            .find(|&id| self.areas.find_area(id).is_err())
            .ok_or(Error::Corrupt)
    }

    /// 序号大者胜出；同一序号出现在两处说明介质自相矛盾
    fn keep_newest(
        found: &mut BTreeMap<ObjectId, Found>,
        loc: FlashLoc,
        object: DiskObject,
    ) -> Result<(), Error> {
        let id = object.id();
        let valid = match &object {
            DiskObject::Inode(_) => id.is_inode(),
            DiskObject::Block(_) => id.is_block(),
        };
        if !valid {
            log::error!("record at {loc} carries an ID of the wrong type: {id}");
            return Err(Error::Corrupt);
        }

        match found.get(&id) {
            Some(old) if old.object.seq() > object.seq() => {}
            Some(old) if old.object.seq() == object.seq() => {
                if old.loc != loc {
                    log::error!("{id} seq={} found at {} and {loc}", object.seq(), old.loc);
                    return Err(Error::Corrupt);
                }
            }
            _ => {
                found.insert(id, Found { loc, object });
            }
        }
        Ok(())
    }

    /// 把每个ID的最新版本登记到索引，返回待挂链的数据块
    fn build_index(
        &mut self,
        found: BTreeMap<ObjectId, Found>,
    ) -> Result<Vec<(HashHandle, DiskBlock)>, Error> {
        let mut blocks = vec![];

        for (id, Found { loc, object }) in found {
            match object {
                DiskObject::Inode(disk) if disk.is_deleted() => {
                    self.index
                        .insert(HashEntry::new(id, loc, Owner::Tombstone))?;
                }
                DiskObject::Inode(_) => {
                    let hash = self
                        .index
                        .insert(HashEntry::new(id, loc, Owner::Tombstone))?;
                    let inode = self.inodes.alloc(InodeEntry {
                        hash,
                        parent: None,
                        kind: InodeKind::for_id(id),
                        refcnt: 0,
                    })?;
                    self.index.entry_mut(hash)?.owner = Owner::Inode(inode);
                }
                DiskObject::Block(disk) => {
                    let hash = self.index.insert(HashEntry::new(id, loc, Owner::Block))?;
                    blocks.push((hash, disk));
                }
            }
        }

        Ok(blocks)
    }

    /// 挂接父子关系，清除从根目录不可达的 inode
    fn build_tree(&mut self) -> Result<(), Error> {
        let root = self.index.find_inode(ObjectId::ROOT_DIR).map_err(|_| {
            log::error!("root directory missing");
            Error::Corrupt
        })?;
        if !self.inode_entry(root)?.kind.is_dir() {
            return Err(Error::Corrupt);
        }
        self.root = Some(root);

        for inode in self.inodes.handles() {
            if inode == root {
                continue;
            }
            let parent_id = self.read_inode(inode)?.parent_id;
            let parent = match self.index.find_inode(parent_id) {
                Ok(parent) if self.inode_entry(parent)?.kind.is_dir() => parent,
                _ => continue,
            };

            match self.add_child(parent, inode) {
                Err(Error::AlreadyExists) => {
                    log::error!("two entries share a name under {parent_id}");
                    return Err(Error::Corrupt);
                }
                result => result?,
            }
        }

        // 从根目录可达者各持父目录的一个引用
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let entry = self.inode_entry_mut(dir)?;
            entry.refcnt = 1;
            if let InodeKind::Directory(children) = &entry.kind {
                stack.extend_from_slice(children);
            }
        }

        let orphans = self
            .inodes
            .iter()
            .filter(|(_, entry)| entry.refcnt == 0)
            .map(|(inode, entry)| (inode, entry.hash))
            .collect::<Vec<_>>();
        for (inode, hash) in orphans {
            log::debug!("dropping orphan inode {}", self.index.entry(hash)?.id);
            self.inodes.free(inode);
            self.index.remove(hash);
        }

        Ok(())
    }

    /// 为每个文件找出块链尾部：没有被其他块指为前驱的那一块
    fn build_block_chains(&mut self, blocks: Vec<(HashHandle, DiskBlock)>) -> Result<(), Error> {
        let mut files: BTreeMap<ObjectId, (InodeHandle, Vec<(HashHandle, DiskBlock)>)> =
            BTreeMap::new();

        for (hash, disk) in blocks {
            let owner = match self.index.find_inode(disk.inode_id()) {
                Ok(inode) if !self.inode_entry(inode)?.kind.is_dir() => inode,
                _ => {
                    log::debug!("dropping block {} of missing file {}", disk.id(), disk.inode_id());
                    self.index.remove(hash);
                    continue;
                }
            };
            files
                .entry(disk.inode_id())
                .or_insert_with(|| (owner, vec![]))
                .1
                .push((hash, disk));
        }

        for (file_id, (inode, blocks)) in files {
            let by_id = blocks
                .iter()
                .map(|(hash, disk)| (disk.id(), (*hash, disk.prev_id())))
                .collect::<BTreeMap<_, _>>();
            let prevs = blocks
                .iter()
                .map(|(_, disk)| disk.prev_id())
                .collect::<BTreeSet<_>>();

            let tails = by_id
                .keys()
                .filter(|id| !prevs.contains(id))
                .copied()
                .collect::<Vec<_>>();
            let Some(&last) = tails.last() else {
                log::error!("block chain of {file_id} has no tail");
                return Err(Error::Corrupt);
            };
            if tails.len() > 1 {
                log::warn!("block chain of {file_id} forks, keeping tail {last}");
            }

            let mut on_chain = BTreeSet::new();
            let mut cur = last;
            while !cur.is_none() {
                let Some(&(_, prev)) = by_id.get(&cur) else {
                    log::error!("block chain of {file_id} breaks at {cur}");
                    return Err(Error::Corrupt);
                };
                if !on_chain.insert(cur) {
                    log::error!("block chain of {file_id} loops at {cur}");
                    return Err(Error::Corrupt);
                }
                cur = prev;
            }

            for (id, (hash, _)) in &by_id {
                if !on_chain.contains(id) {
                    log::warn!("dropping block {id} off the chain of {file_id}");
                    self.index.remove(*hash);
                }
            }

            if let InodeKind::File { last_block } = &mut self.inode_entry_mut(inode)?.kind {
                *last_block = by_id.get(&last).map(|&(hash, _)| hash);
            }
        }

        Ok(())
    }
}
