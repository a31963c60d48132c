#![allow(dead_code)]

use std::sync::Arc;

use enumflags2::BitFlags;
use ffs::{AccessFlag, AreaDesc, Error, FfsConfig, FlashFileSystem};
use flash_dev::MemFlash;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 等长区域组成的内存闪存
pub struct TestFlash {
    pub flash: Arc<MemFlash>,
    pub descs: Vec<AreaDesc>,
    pub config: FfsConfig,
}

impl TestFlash {
    pub fn new(count: usize, length: u32) -> Self {
        init_log();
        let descs = AreaDesc::contiguous(count, length);
        Self {
            flash: Arc::new(MemFlash::new(&descs)),
            descs,
            config: FfsConfig::default(),
        }
    }

    pub fn format(&self) -> FlashFileSystem {
        FlashFileSystem::format_full(self.flash.clone(), &self.descs, self.config).unwrap()
    }

    pub fn restore(&self) -> Result<FlashFileSystem, Error> {
        FlashFileSystem::restore_full(self.flash.clone(), &self.descs, self.config)
    }

    /// 卸载后重新挂载
    pub fn remount(&self, fs: FlashFileSystem) -> FlashFileSystem {
        let dev = fs.unmount();
        FlashFileSystem::restore_full(dev, &self.descs, self.config).unwrap()
    }
}

/// 以空文件取代原有内容后写入
pub fn write_file(fs: &mut FlashFileSystem, path: &str, data: &[u8]) -> Result<(), Error> {
    let fd = fs.open(path, AccessFlag::Write | AccessFlag::Truncate)?;
    let result = fs.write(fd, data);
    fs.close(fd)?;
    result.map(|_| ())
}

/// 在开头覆盖写入
pub fn overwrite_file(fs: &mut FlashFileSystem, path: &str, data: &[u8]) -> Result<(), Error> {
    let fd = fs.open(path, BitFlags::from_flag(AccessFlag::Write))?;
    let result = fs.write(fd, data);
    fs.close(fd)?;
    result.map(|_| ())
}

pub fn read_file(fs: &mut FlashFileSystem, path: &str) -> Result<Vec<u8>, Error> {
    let fd = fs.open(path, AccessFlag::Read.into())?;
    let mut data = vec![0; fs.len(fd)? as usize];
    let n = fs.read(fd, &mut data)?;
    fs.close(fd)?;
    assert_eq!(data.len(), n);
    Ok(data)
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

pub fn names(fs: &FlashFileSystem, path: &str) -> Vec<String> {
    fs.read_dir(path)
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}
