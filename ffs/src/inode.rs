//! # inode 树
//!
//! 内存中的目录树。子节点按文件名字节序排列，文件名本身不驻留内存，
//! 比较时从闪存读出。
//!
//! 引用计数：父目录的子节点表持有一个引用，每个打开的文件句柄各持有一个。
//! 计数归零时释放内存对象；根目录永不释放。

use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::mem;

use vfs::Error;

use crate::hash::{HashEntry, HashHandle, Owner};
use crate::layout::DiskInode;
use crate::pool::Handle;
use crate::{FlashFileSystem, FlashLoc, ObjectId, FILENAME_MAX_LEN};

pub type InodeHandle = Handle<InodeEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeEntry {
    pub hash: HashHandle,
    pub parent: Option<InodeHandle>,
    pub kind: InodeKind,
    pub refcnt: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InodeKind {
    /// 按文件名排序的子节点
    Directory(Vec<InodeHandle>),
    File {
        /// 块链尾部
        last_block: Option<HashHandle>,
    },
}

/// 从闪存读出的 inode 当前版本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub entry: InodeHandle,
    pub id: ObjectId,
    pub seq: u32,
    pub parent_id: ObjectId,
    pub filename: Vec<u8>,
}

impl InodeKind {
    /// 由ID所在的命名空间决定
    pub fn for_id(id: ObjectId) -> Self {
        if id.is_dir() {
            Self::Directory(vec![])
        } else {
            Self::File { last_block: None }
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}

/* 读写 inode 记录 */

impl FlashFileSystem {
    pub(crate) fn inode_entry(&self, inode: InodeHandle) -> Result<&InodeEntry, Error> {
        self.inodes.get(inode).ok_or_else(|| {
            log::error!("dangling inode {inode:?}");
            Error::Corrupt
        })
    }

    pub(crate) fn inode_entry_mut(&mut self, inode: InodeHandle) -> Result<&mut InodeEntry, Error> {
        self.inodes.get_mut(inode).ok_or_else(|| {
            log::error!("dangling inode {inode:?}");
            Error::Corrupt
        })
    }

    /// inode 的ID与当前版本的位置
    pub(crate) fn inode_loc(&self, inode: InodeHandle) -> Result<(ObjectId, FlashLoc), Error> {
        let entry = self.index.entry(self.inode_entry(inode)?.hash)?;
        Ok((entry.id, entry.loc))
    }

    pub(crate) fn inode_id(&self, inode: InodeHandle) -> Result<ObjectId, Error> {
        self.inode_loc(inode).map(|(id, _)| id)
    }

    pub(crate) fn read_disk_inode(&self, loc: FlashLoc) -> Result<DiskInode, Error> {
        let mut buf = [0; DiskInode::SIZE];
        self.read_flash(loc, &mut buf)?;
        DiskInode::decode(&buf)
    }

    pub(crate) fn read_filename(&self, inode: InodeHandle) -> Result<Vec<u8>, Error> {
        let (_, loc) = self.inode_loc(inode)?;
        let disk = self.read_disk_inode(loc)?;

        let mut name = vec![0; disk.filename_len as usize];
        let name_loc = FlashLoc::new(loc.area_idx(), loc.offset() + DiskInode::SIZE as u32);
        self.read_flash(name_loc, &mut name)?;
        Ok(name)
    }

    pub(crate) fn read_inode(&self, inode: InodeHandle) -> Result<Inode, Error> {
        let (id, loc) = self.inode_loc(inode)?;
        let disk = self.read_disk_inode(loc)?;
        if disk.id() != id {
            log::error!("inode {id} points at a record of {}", disk.id());
            return Err(Error::Corrupt);
        }

        Ok(Inode {
            entry: inode,
            id,
            seq: disk.seq,
            parent_id: disk.parent_id(),
            filename: self.read_filename(inode)?,
        })
    }

    /// 写下新 inode 的首个版本，并挂到`parent`之下
    pub(crate) fn new_inode(
        &mut self,
        id: ObjectId,
        parent: Option<InodeHandle>,
        filename: &[u8],
    ) -> Result<InodeHandle, Error> {
        check_filename(filename, parent.is_none())?;
        if self.index.is_full() || self.inodes.is_full() {
            return Err(Error::OutOfMemory);
        }

        let parent_id = match parent {
            Some(parent) => self.inode_id(parent)?,
            None => ObjectId::NONE,
        };

        let disk = DiskInode::new(id, 0, parent_id, filename.len() as u8);
        let loc = self.write_record(&disk.encode()?, filename)?;

        let hash = self
            .index
            .insert(HashEntry::new(id, loc, Owner::Tombstone))?;
        let entry = InodeEntry {
            hash,
            parent: None,
            kind: InodeKind::for_id(id),
            refcnt: 1,
        };
        let inode = match self.inodes.alloc(entry) {
            Ok(inode) => inode,
            Err(err) => {
                self.index.remove(hash);
                return Err(err);
            }
        };
        self.index.entry_mut(hash)?.owner = Owner::Inode(inode);

        if let Some(parent) = parent {
            self.add_child(parent, inode)?;
        }

        log::debug!("new inode {id} under {parent_id} at {loc}");
        Ok(inode)
    }

    /// 写下新版本以更换父目录或文件名
    pub(crate) fn write_inode(
        &mut self,
        inode: InodeHandle,
        parent_id: ObjectId,
        filename: &[u8],
    ) -> Result<(), Error> {
        check_filename(filename, false)?;
        let (id, loc) = self.inode_loc(inode)?;
        let old = self.read_disk_inode(loc)?;

        let disk = DiskInode::new(id, old.seq.wrapping_add(1), parent_id, filename.len() as u8);
        let loc = self.write_record(&disk.encode()?, filename)?;

        let hash = self.inode_entry(inode)?.hash;
        self.index.entry_mut(hash)?.loc = loc;
        Ok(())
    }

    /// 写下删除记录，索引项转为墓碑
    pub(crate) fn write_deletion(&mut self, inode: InodeHandle) -> Result<(), Error> {
        let (id, loc) = self.inode_loc(inode)?;
        let disk = self.read_disk_inode(loc)?.deletion();
        let loc = self.write_record(&disk.encode()?, &[])?;

        let hash = self.inode_entry(inode)?.hash;
        let entry = self.index.entry_mut(hash)?;
        entry.loc = loc;
        entry.owner = Owner::Tombstone;

        log::debug!("inode {id} deleted at {loc}");
        Ok(())
    }
}

/* 目录树 */

impl FlashFileSystem {
    /// 二分查找子节点；`Err`为应插入的位置
    fn search_children(
        &self,
        children: &[InodeHandle],
        name: &[u8],
    ) -> Result<Result<usize, usize>, Error> {
        let (mut lo, mut hi) = (0, children.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.read_filename(children[mid])?.as_slice().cmp(name) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    pub(crate) fn children(&self, dir: InodeHandle) -> Result<&[InodeHandle], Error> {
        match &self.inode_entry(dir)?.kind {
            InodeKind::Directory(children) => Ok(children),
            InodeKind::File { .. } => Err(Error::NotADirectory),
        }
    }

    pub(crate) fn find_child(
        &self,
        dir: InodeHandle,
        name: &[u8],
    ) -> Result<Option<InodeHandle>, Error> {
        let children = self.children(dir)?;
        Ok(self
            .search_children(children, name)?
            .ok()
            .map(|pos| children[pos]))
    }

    /// 按文件名有序插入；重名报[`Error::AlreadyExists`]
    pub(crate) fn add_child(
        &mut self,
        parent: InodeHandle,
        child: InodeHandle,
    ) -> Result<(), Error> {
        let name = self.read_filename(child)?;
        let pos = match self.search_children(self.children(parent)?, &name)? {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(pos) => pos,
        };

        if let InodeKind::Directory(children) = &mut self.inode_entry_mut(parent)?.kind {
            children.insert(pos, child);
        }
        self.inode_entry_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// 从父目录摘下，不释放
    pub(crate) fn remove_child(&mut self, child: InodeHandle) -> Result<(), Error> {
        let Some(parent) = self.inode_entry_mut(child)?.parent.take() else {
            return Ok(());
        };

        if let InodeKind::Directory(children) = &mut self.inode_entry_mut(parent)?.kind {
            children.retain(|&c| c != child);
        }
        Ok(())
    }

    /// 当前目录是否为`ancestor`自身或其后代
    pub(crate) fn is_descendant(
        &self,
        mut inode: InodeHandle,
        ancestor: InodeHandle,
    ) -> Result<bool, Error> {
        loop {
            if inode == ancestor {
                return Ok(true);
            }
            match self.inode_entry(inode)?.parent {
                Some(parent) => inode = parent,
                None => return Ok(false),
            }
        }
    }
}

/* 引用计数 */

impl FlashFileSystem {
    pub(crate) fn inc_refcnt(&mut self, inode: InodeHandle) -> Result<(), Error> {
        let entry = self.inode_entry_mut(inode)?;
        entry.refcnt = entry.refcnt.checked_add(1).ok_or(Error::OutOfMemory)?;
        Ok(())
    }

    pub(crate) fn dec_refcnt(&mut self, inode: InodeHandle) -> Result<(), Error> {
        let root = self.root;
        let entry = self.inode_entry_mut(inode)?;
        entry.refcnt = entry.refcnt.saturating_sub(1);

        if entry.refcnt == 0 && root != Some(inode) {
            self.delete_from_ram(inode)?;
        }
        Ok(())
    }

    /// 释放内存对象。
    /// 文件连同块链一并移出索引；目录的子节点各减一次引用。
    /// 墓碑保留在索引中，使删除记录在回收时得以保留。
    pub(crate) fn delete_from_ram(&mut self, inode: InodeHandle) -> Result<(), Error> {
        let mut entry = self.inodes.free(inode).ok_or(Error::Corrupt)?;
        self.cache.invalidate(inode);

        match &mut entry.kind {
            InodeKind::File { last_block } => self.delete_block_list_from_ram(*last_block)?,
            InodeKind::Directory(children) => {
                for child in mem::take(children) {
                    self.inode_entry_mut(child)?.parent = None;
                    self.dec_refcnt(child)?;
                }
            }
        }

        if self.index.entry(entry.hash)?.owner != Owner::Tombstone {
            self.index.remove(entry.hash);
        }
        Ok(())
    }
}

fn check_filename(filename: &[u8], is_root: bool) -> Result<(), Error> {
    let valid = if is_root {
        filename.is_empty()
    } else {
        !filename.is_empty() && filename.len() <= FILENAME_MAX_LEN && !filename.contains(&b'/')
    };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput)
    }
}
