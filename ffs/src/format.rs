use alloc::sync::Arc;

use flash_dev::{AreaDesc, FlashDevice};
use vfs::Error;

use crate::{FfsConfig, FlashFileSystem, ObjectId};

impl FlashFileSystem {
    /// 格式化整个设备并写入根目录。
    ///
    /// 最长的区域（并列时取靠前者）用作暂存区域，其余区域依次编号。
    pub fn format_full(
        dev: Arc<dyn FlashDevice>,
        descs: &[AreaDesc],
        config: FfsConfig,
    ) -> Result<Self, Error> {
        let mut fs = Self::unmounted(dev, descs, config)?;

        let scratch = fs
            .areas
            .iter()
            .fold(None::<(u8, u32)>, |best, (idx, area)| match best {
                Some((_, length)) if length >= area.length => best,
                _ => Some((idx, area.length)),
            })
            .map(|(idx, _)| idx)
            .ok_or(Error::InvalidInput)?;

        let mut next_id = 0;
        for idx in 0..fs.areas.len() as u8 {
            if idx == scratch {
                fs.areas.format_area(idx, true)?;
            } else {
                fs.areas.set_logical(idx, next_id, 0, 0)?;
                fs.areas.format_area(idx, false)?;
                next_id += 1;
            }
        }

        let root = fs.new_inode(ObjectId::ROOT_DIR, None, &[])?;
        fs.root = Some(root);

        log::info!(
            "formatted {} areas, scratch area {scratch}, block size {}",
            fs.areas.len(),
            fs.block_max_data_size()
        );
        Ok(fs)
    }
}

#[cfg(test)]
mod tests {
    use flash_dev::MemFlash;

    use super::*;
    use crate::layout::{DiskArea, DiskInode, DiskObject};

    #[test]
    fn largest_area_is_scratch() {
        let descs = [
            AreaDesc::new(0, 1024),
            AreaDesc::new(1024, 2048),
            AreaDesc::new(3072, 2048),
            AreaDesc::new(5120, 512),
        ];
        let dev = Arc::new(MemFlash::new(&descs));
        let fs = FlashFileSystem::format_full(dev, &descs, FfsConfig::default()).unwrap();

        assert_eq!(Some(1), fs.scratch_area_idx());
        assert_eq!(Ok(0), fs.find_area(0));
        assert_eq!(Ok(2), fs.find_area(1));
        assert_eq!(Ok(3), fs.find_area(2));
        assert_eq!(256, fs.block_max_data_size());

        // 根目录写在第一个活动区域
        let records = fs.scan_area(0).unwrap();
        assert_eq!(1, records.len());
        let DiskObject::Inode(root) = &records[0].1 else {
            panic!("root is not an inode: {records:?}");
        };
        assert_eq!(ObjectId::ROOT_DIR, root.id());
        assert_eq!(ObjectId::NONE, root.parent_id());
        assert_eq!(
            1024 - (DiskArea::SIZE + DiskInode::SIZE) as u32,
            fs.free_space(0).unwrap()
        );
    }

    #[test]
    fn rejects_single_area() {
        let descs = [AreaDesc::new(0, 4096)];
        let dev = Arc::new(MemFlash::new(&descs));
        assert_eq!(
            Err(Error::InvalidInput),
            FlashFileSystem::format_full(dev, &descs, FfsConfig::default()).map(|_| ())
        );
    }
}
