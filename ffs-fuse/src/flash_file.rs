use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use flash_dev::{AreaDesc, FlashDevice, FlashError, ERASED};
use send_wrapper::SendWrapper;

/// 以主机文件为介质的闪存驱动，区域布局由`descs`给出
#[derive(Debug)]
pub struct FlashFile {
    inner: SendWrapper<RefCell<File>>,
    descs: Vec<AreaDesc>,
}

impl FlashFile {
    pub fn new(fd: File, descs: Vec<AreaDesc>) -> Self {
        Self {
            inner: SendWrapper::new(RefCell::new(fd)),
            descs,
        }
    }

    /// 访问范围在镜像中的起点
    fn locate(&self, area: u8, offset: u32, len: usize) -> Result<u64, FlashError> {
        let desc = self.descs.get(area as usize).ok_or(FlashError::OutOfBounds)?;
        if offset as usize + len > desc.length as usize {
            return Err(FlashError::OutOfBounds);
        }
        Ok(desc.offset as u64 + offset as u64)
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(buf)
    }

    fn write_at(&self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)
    }
}

fn device_error(err: io::Error) -> FlashError {
    log::error!("image I/O failed: {err}");
    FlashError::Device
}

impl FlashDevice for FlashFile {
    fn read(&self, area: u8, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let pos = self.locate(area, offset, buf.len())?;
        self.read_at(pos, buf).map_err(device_error)
    }

    fn write(&self, area: u8, offset: u32, buf: &[u8]) -> Result<(), FlashError> {
        let pos = self.locate(area, offset, buf.len())?;

        let mut old = vec![0; buf.len()];
        self.read_at(pos, &mut old).map_err(device_error)?;
        if old.iter().any(|&b| b != ERASED) {
            log::warn!("overlapping write at area={area} offset={offset:#x}");
            return Err(FlashError::NotErased);
        }

        self.write_at(pos, buf).map_err(device_error)
    }

    fn erase(&self, area: u8) -> Result<(), FlashError> {
        let desc = self.descs.get(area as usize).ok_or(FlashError::OutOfBounds)?;
        let erased = vec![ERASED; desc.length as usize];
        self.write_at(desc.offset as u64, &erased)
            .map_err(device_error)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;

    use super::*;

    #[test]
    fn erased_only_writes() {
        let path = std::env::temp_dir().join(format!("ffs-flash-file-{}.img", std::process::id()));
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        fd.set_len(256).unwrap();

        let flash = FlashFile::new(fd, AreaDesc::contiguous(2, 128));
        flash.erase(0).unwrap();
        flash.erase(1).unwrap();

        flash.write(1, 10, &[1, 2, 3]).unwrap();
        assert_eq!(Err(FlashError::NotErased), flash.write(1, 12, &[4]));
        assert_eq!(Err(FlashError::OutOfBounds), flash.write(1, 127, &[0, 0]));
        assert_eq!(Err(FlashError::OutOfBounds), flash.erase(2));

        let mut buf = [0; 4];
        flash.read(1, 10, &mut buf).unwrap();
        assert_eq!([1, 2, 3, ERASED], buf);
        flash.read(0, 10, &mut buf).unwrap();
        assert_eq!([ERASED; 4], buf);

        flash.erase(1).unwrap();
        flash.write(1, 12, &[4]).unwrap();

        drop(flash);
        std::fs::remove_file(path).unwrap();
    }
}
