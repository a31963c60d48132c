use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use vfs::Error;

use crate::ObjectId;

/// 数据块记录，后接`data_len`字节数据
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = 0x53ba_23b9_u32)]
pub struct DiskBlock {
    id: u32,
    /// 序号大者取代序号小者
    pub seq: u32,
    inode_id: u32,
    /// 文件中的前一块；首块为[`ObjectId::NONE`]
    prev_id: u32,
    _reserved16: u16,
    pub data_len: u16,
    // XXX: ECC for block header and contents.
}

impl DiskBlock {
    pub const SIZE: usize = 24;

    pub fn new(
        id: ObjectId,
        seq: u32,
        inode_id: ObjectId,
        prev_id: ObjectId,
        data_len: u16,
    ) -> Self {
        Self {
            id: id.into(),
            seq,
            inode_id: inode_id.into(),
            prev_id: prev_id.into(),
            _reserved16: 0,
            data_len,
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id.into()
    }

    #[inline]
    pub fn inode_id(&self) -> ObjectId {
        self.inode_id.into()
    }

    #[inline]
    pub fn prev_id(&self) -> ObjectId {
        self.prev_id.into()
    }

    pub fn record_size(&self) -> u32 {
        Self::SIZE as u32 + self.data_len as u32
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
