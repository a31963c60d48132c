use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use enumflags2::{bitflags, BitFlags};
use vfs::Error;

use crate::ObjectId;

/// inode 记录（文件或目录），后接文件名
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = 0x925f_8bc0_u32)]
pub struct DiskInode {
    id: u32,
    /// 序号大者取代序号小者
    pub seq: u32,
    parent_id: u32,
    flags: u16,
    _reserved8: u8,
    pub filename_len: u8,
    // XXX: ECC for inode header and filename.
}

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeFlag {
    /// 删除记录：此版本之后对象不复存在
    Deleted = 0b0000_0001,
}

impl DiskInode {
    pub const SIZE: usize = 20;

    pub fn new(id: ObjectId, seq: u32, parent_id: ObjectId, filename_len: u8) -> Self {
        Self {
            id: id.into(),
            seq,
            parent_id: parent_id.into(),
            flags: 0,
            _reserved8: 0,
            filename_len,
        }
    }

    /// 取代`self`的删除记录
    pub fn deletion(&self) -> Self {
        Self {
            seq: self.seq.wrapping_add(1),
            flags: BitFlags::from_flag(InodeFlag::Deleted).bits(),
            filename_len: 0,
            ..self.clone()
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id.into()
    }

    #[inline]
    pub fn parent_id(&self) -> ObjectId {
        self.parent_id.into()
    }

    pub fn flags(&self) -> BitFlags<InodeFlag> {
        BitFlags::from_bits_truncate(self.flags)
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags().contains(InodeFlag::Deleted)
    }

    pub fn record_size(&self) -> u32 {
        Self::SIZE as u32 + self.filename_len as u32
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        Self::read(&mut Cursor::new(buf)).map_err(|_| Error::Corrupt)
    }

    pub fn encode(&self) -> Result<[u8; Self::SIZE], Error> {
        let mut buf = [0; Self::SIZE];
        self.write(&mut Cursor::new(&mut buf[..]))
            .map_err(|_| Error::Corrupt)?;
        Ok(buf)
    }
}
