mod cli;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, Geometry};
use ffs::{AccessFlag, AreaDesc, FfsConfig, FlashDevice, FlashFileSystem};
use ffs_fuse::FlashFile;
use typed_bytesize::ByteSizeIec;
use vfs::DirEntryType;

fn main() -> io::Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Pack {
            source,
            out,
            geometry,
        } => pack(&source, &out, &geometry),
        Command::Ls {
            image,
            geometry,
            path,
        } => ls(&image, &geometry, &path),
        Command::Cat {
            image,
            geometry,
            path,
        } => cat(&image, &geometry, &path),
    }
}

fn fs_error(err: vfs::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

impl Geometry {
    fn descs(&self) -> Vec<AreaDesc> {
        let area_len = ByteSizeIec::kib(self.area_kib).0;
        AreaDesc::contiguous(self.areas, area_len as u32)
    }

    fn image_len(&self) -> u64 {
        ByteSizeIec::kib(self.area_kib).0 * self.areas as u64
    }
}

fn pack(source: &Path, out: &Path, geometry: &Geometry) -> io::Result<()> {
    println!("source={source:?}\nout={out:?}");

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(out)?;
    fd.set_len(geometry.image_len())?;

    let descs = geometry.descs();
    let dev: Arc<dyn FlashDevice> = Arc::new(FlashFile::new(fd, descs.clone()));
    let mut fs =
        FlashFileSystem::format_full(dev, &descs, FfsConfig::default()).map_err(fs_error)?;

    copy_dir(&mut fs, source, "")?;
    fs.unmount();
    Ok(())
}

/// 把主机目录`host`下的一切复制到`path`之下
fn copy_dir(fs: &mut FlashFileSystem, host: &Path, path: &str) -> io::Result<()> {
    let mut entries = fs::read_dir(host)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skip non UTF-8 name {:?}", entry.file_name());
            continue;
        };
        let target = format!("{path}/{name}");

        if entry.file_type()?.is_dir() {
            log::info!("dir={target:?}");
            fs.mkdir(&target).map_err(fs_error)?;
            copy_dir(fs, &entry.path(), &target)?;
        } else {
            let data = fs::read(entry.path())?;
            log::info!("file={target:?} size={}", data.len());

            let fd = fs
                .open(&target, AccessFlag::Write | AccessFlag::Truncate)
                .map_err(fs_error)?;
            fs.write(fd, &data).map_err(fs_error)?;
            fs.close(fd).map_err(fs_error)?;
        }
    }

    Ok(())
}

fn mount(image: &Path, geometry: &Geometry) -> io::Result<FlashFileSystem> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    let descs = geometry.descs();
    let dev: Arc<dyn FlashDevice> = Arc::new(FlashFile::new(fd, descs.clone()));
    FlashFileSystem::restore_full(dev, &descs, FfsConfig::default()).map_err(fs_error)
}

fn ls(image: &Path, geometry: &Geometry, path: &str) -> io::Result<()> {
    let mut fs = mount(image, geometry)?;

    for entry in fs.read_dir(path).map_err(fs_error)? {
        let full = format!("{}/{}", path.trim_end_matches('/'), entry.name);
        let stat = fs.stat(&full).map_err(fs_error)?;
        let ty = match entry.ty {
            DirEntryType::Directory => 'd',
            DirEntryType::Regular => '-',
        };
        println!("{ty} {:#010x} {:>8} {}", entry.inode, stat.size, entry.name);
    }

    Ok(())
}

fn cat(image: &Path, geometry: &Geometry, path: &str) -> io::Result<()> {
    let mut fs = mount(image, geometry)?;

    let fd = fs.open(path, AccessFlag::Read.into()).map_err(fs_error)?;
    let mut buf = vec![0; fs.block_max_data_size() as usize];
    let mut stdout = io::stdout().lock();
    loop {
        let n = fs.read(fd, &mut buf).map_err(fs_error)?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n])?;
    }
    fs.close(fd).map_err(fs_error)
}
