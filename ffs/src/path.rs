//! # 路径层
//!
//! 路径为以`/`开头的绝对路径，空分量被忽略。

use alloc::string::String;
use alloc::vec::Vec;

use vfs::{DirEntry, DirEntryType, Error, Stat};

use crate::inode::{InodeHandle, InodeKind};
use crate::{FlashFileSystem, FILENAME_MAX_LEN};

fn components(path: &str) -> Result<Vec<&[u8]>, Error> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Error::InvalidInput);
    };

    rest.split('/')
        .filter(|name| !name.is_empty())
        .map(|name| {
            if name.len() > FILENAME_MAX_LEN {
                Err(Error::InvalidInput)
            } else {
                Ok(name.as_bytes())
            }
        })
        .collect()
}

impl FlashFileSystem {
    pub(crate) fn lookup_path(&self, path: &str) -> Result<InodeHandle, Error> {
        let mut inode = self.root()?;
        for name in components(path)? {
            inode = self.find_child(inode, name)?.ok_or(Error::NotFound)?;
        }
        Ok(inode)
    }

    /// 父目录与最后一个分量；根目录没有父目录
    pub(crate) fn lookup_parent<'a>(
        &self,
        path: &'a str,
    ) -> Result<(InodeHandle, &'a [u8]), Error> {
        let mut names = components(path)?;
        let name = names.pop().ok_or(Error::InvalidInput)?;

        let mut parent = self.root()?;
        for dir in names {
            parent = self.find_child(parent, dir)?.ok_or(Error::NotFound)?;
        }
        if !self.inode_entry(parent)?.kind.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok((parent, name))
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), Error> {
        let (parent, name) = self.lookup_parent(path)?;
        if self.find_child(parent, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let id = self.ids.alloc_dir()?;
        self.new_inode(id, Some(parent), name)?;
        Ok(())
    }

    /// 删除文件或目录（连同其下的一切）；打开的文件在关闭前仍可读写
    pub fn unlink(&mut self, path: &str) -> Result<(), Error> {
        let inode = self.lookup_path(path)?;
        self.unlink_inode(inode)
    }

    pub(crate) fn unlink_inode(&mut self, inode: InodeHandle) -> Result<(), Error> {
        if Some(inode) == self.root {
            return Err(Error::InvalidInput);
        }

        self.write_deletion(inode)?;
        self.remove_child(inode)?;
        self.cache.invalidate(inode);
        self.dec_refcnt(inode)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let src = self.lookup_path(from)?;
        if Some(src) == self.root {
            return Err(Error::InvalidInput);
        }

        let (parent, name) = self.lookup_parent(to)?;
        let src_is_dir = self.inode_entry(src)?.kind.is_dir();
        if src_is_dir && self.is_descendant(parent, src)? {
            return Err(Error::InvalidInput);
        }

        if let Some(dst) = self.find_child(parent, name)? {
            if dst == src {
                return Ok(());
            }

            match (src_is_dir, &self.inode_entry(dst)?.kind) {
                (false, InodeKind::File { .. }) => {}
                (true, InodeKind::Directory(children)) if children.is_empty() => {}
                (true, InodeKind::Directory(_)) => return Err(Error::DirectoryNotEmpty),
                (false, InodeKind::Directory(_)) => return Err(Error::IsADirectory),
                (true, InodeKind::File { .. }) => return Err(Error::NotADirectory),
            }
            self.unlink_inode(dst)?;
        }

        let parent_id = self.inode_id(parent)?;
        self.write_inode(src, parent_id, name)?;
        self.remove_child(src)?;
        self.add_child(parent, src)
    }

    /// 按文件名排序的目录项
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, Error> {
        let dir = self.lookup_path(path)?;
        self.children(dir)?
            .iter()
            .map(|&child| {
                let inode = self.read_inode(child)?;
                let ty = if inode.id.is_dir() {
                    DirEntryType::Directory
                } else {
                    DirEntryType::Regular
                };
                Ok(DirEntry {
                    inode: inode.id.raw() as u64,
                    ty,
                    name: String::from_utf8_lossy(&inode.filename).into_owned(),
                })
            })
            .collect()
    }

    pub fn stat(&mut self, path: &str) -> Result<Stat, Error> {
        let inode = self.lookup_path(path)?;
        let block_size = self.block_max_data_size() as u64;

        if let InodeKind::Directory(children) = &self.inode_entry(inode)?.kind {
            return Ok(Stat {
                mode: DirEntryType::Directory,
                block_size,
                blocks: 0,
                size: children.len() as u64,
            });
        }

        let cache = self.file_cache(inode)?;
        Ok(Stat {
            mode: DirEntryType::Regular,
            block_size,
            blocks: cache.blocks.len() as u64,
            size: cache.size as u64,
        })
    }
}
