use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use vfs::Error;

use crate::{AREA_ID_NONE, AREA_MAGIC, AREA_VER};

/// 区域头，位于每个区域的开头
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct DiskArea {
    /// [`AREA_MAGIC`]
    pub magic: [u32; 4],
    /// 区域总长，字节
    pub length: u32,
    pub ver: u8,
    /// 区域成为回收目标的次数
    pub gc_seq: u8,
    _reserved8: u8,
    /// 暂存区域为[`AREA_ID_NONE`]
    pub id: u8,
    // XXX: ECC for area header.
}

impl DiskArea {
    pub const SIZE: usize = 24;

    pub fn new(length: u32, id: u8, gc_seq: u8) -> Self {
        Self {
            magic: AREA_MAGIC,
            length,
            ver: AREA_VER,
            gc_seq,
            _reserved8: 0,
            id,
        }
    }

    /// 暂存区域头：回收计数、保留字节与ID保持擦除状态，提升时直接写入
    pub fn scratch(length: u32) -> Self {
        Self {
            magic: AREA_MAGIC,
            length,
            ver: AREA_VER,
            gc_seq: AREA_ID_NONE,
            _reserved8: AREA_ID_NONE,
            id: AREA_ID_NONE,
        }
    }

    #[inline]
    pub fn magic_is_set(&self) -> bool {
        self.magic == AREA_MAGIC
    }

    #[inline]
    pub fn is_scratch(&self) -> bool {
        self.magic_is_set() && self.id == AREA_ID_NONE
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
