//! # 文件句柄层

use enumflags2::{bitflags, BitFlags};
use vfs::Error;

use crate::inode::InodeHandle;
use crate::pool::Handle;
use crate::FlashFileSystem;

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFlag {
    Read = 0x01,
    Write = 0x02,
    /// 每次写入都落在文件末尾
    Append = 0x04,
    /// 以空文件取代已有文件
    Truncate = 0x08,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    inode: InodeHandle,
    offset: u32,
    access: BitFlags<AccessFlag>,
}

pub type Fd = Handle<File>;

fn check_access(access: BitFlags<AccessFlag>) -> Result<(), Error> {
    use AccessFlag::*;

    if !access.intersects(Read | Write) {
        return Err(Error::InvalidInput);
    }
    if access.intersects(Append | Truncate) && !access.contains(Write) {
        return Err(Error::InvalidInput);
    }
    if access.contains(Append | Truncate) {
        return Err(Error::InvalidInput);
    }
    Ok(())
}

impl FlashFileSystem {
    /// 打开文件；以写方式打开不存在的文件时创建之
    pub fn open(&mut self, path: &str, access: BitFlags<AccessFlag>) -> Result<Fd, Error> {
        check_access(access)?;
        if self.files.is_full() {
            return Err(Error::OutOfMemory);
        }

        let inode = match self.lookup_path(path) {
            Ok(inode) if self.inode_entry(inode)?.kind.is_dir() => {
                return Err(Error::IsADirectory);
            }
            Ok(inode) if access.contains(AccessFlag::Truncate) => {
                let (parent, name) = self.lookup_parent(path)?;
                self.unlink_inode(inode)?;
                self.create_file(parent, name)?
            }
            Ok(inode) => inode,
            Err(Error::NotFound) if access.contains(AccessFlag::Write) => {
                let (parent, name) = self.lookup_parent(path)?;
                self.create_file(parent, name)?
            }
            Err(err) => return Err(err),
        };

        let offset = if access.contains(AccessFlag::Append) {
            self.file_size(inode)?
        } else {
            0
        };

        self.inc_refcnt(inode)?;
        match self.files.alloc(File {
            inode,
            offset,
            access,
        }) {
            Ok(fd) => Ok(fd),
            Err(err) => {
                self.dec_refcnt(inode)?;
                Err(err)
            }
        }
    }

    fn create_file(&mut self, parent: InodeHandle, name: &[u8]) -> Result<InodeHandle, Error> {
        let id = self.ids.alloc_file()?;
        self.new_inode(id, Some(parent), name)
    }

    fn file(&self, fd: Fd) -> Result<&File, Error> {
        self.files.get(fd).ok_or(Error::InvalidInput)
    }

    fn file_mut(&mut self, fd: Fd) -> Result<&mut File, Error> {
        self.files.get_mut(fd).ok_or(Error::InvalidInput)
    }

    /// 从当前位置读取，返回读到的字节数；位于末尾时为0
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, Error> {
        let File {
            inode,
            offset,
            access,
        } = self.file(fd)?.clone();
        if !access.contains(AccessFlag::Read) {
            return Err(Error::PermissionDenied);
        }

        let cache = self.file_cache(inode)?;
        let mut pos = offset;
        let mut done = 0;

        if let Some(first) = cache.locate(pos) {
            for block in &cache.blocks[first..] {
                if done == buf.len() {
                    break;
                }

                let start = pos - block.file_offset;
                let len = (block.data_len as u32 - start).min((buf.len() - done) as u32);
                self.read_block_data(block.hash, start, &mut buf[done..done + len as usize])?;

                pos += len;
                done += len as usize;
            }
        }

        self.file_mut(fd)?.offset = pos;
        Ok(done)
    }

    /// 在当前位置写入，覆盖已有数据或延长文件
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize, Error> {
        let File {
            inode,
            mut offset,
            access,
        } = self.file(fd)?.clone();
        if !access.contains(AccessFlag::Write) {
            return Err(Error::PermissionDenied);
        }

        if access.contains(AccessFlag::Append) {
            offset = self.file_size(inode)?;
        }
        self.write_to_file(inode, offset, data)?;

        self.file_mut(fd)?.offset = offset + data.len() as u32;
        Ok(data.len())
    }

    /// 定位到`offset`，不能越过文件末尾
    pub fn seek(&mut self, fd: Fd, offset: u32) -> Result<(), Error> {
        if offset > self.len(fd)? {
            return Err(Error::InvalidInput);
        }
        self.file_mut(fd)?.offset = offset;
        Ok(())
    }

    pub fn tell(&self, fd: Fd) -> Result<u32, Error> {
        self.file(fd).map(|file| file.offset)
    }

    pub fn len(&mut self, fd: Fd) -> Result<u32, Error> {
        let inode = self.file(fd)?.inode;
        self.file_size(inode)
    }

    pub fn close(&mut self, fd: Fd) -> Result<(), Error> {
        let file = self.files.free(fd).ok_or(Error::InvalidInput)?;
        self.dec_refcnt(file.inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_combinations() {
        use AccessFlag::*;

        assert_eq!(Ok(()), check_access(Read.into()));
        assert_eq!(Ok(()), check_access(Write | Append));
        assert_eq!(Ok(()), check_access(Read | Write | Truncate));
        assert_eq!(Err(Error::InvalidInput), check_access(BitFlags::empty()));
        assert_eq!(Err(Error::InvalidInput), check_access(Read | Append));
        assert_eq!(Err(Error::InvalidInput), check_access(Write | Append | Truncate));
    }
}
