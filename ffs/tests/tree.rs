mod common;

use common::*;
use enumflags2::BitFlags;
use ffs::layout::DiskObject;
use ffs::{AccessFlag, AreaDesc, Error, FfsConfig, FlashFileSystem};
use vfs::DirEntryType;

fn fresh() -> (TestFlash, FlashFileSystem) {
    let tf = TestFlash::new(3, 8192);
    let fs = tf.format();
    (tf, fs)
}

#[test]
fn mkdir_and_read_dir() {
    let (tf, mut fs) = fresh();

    fs.mkdir("/usr").unwrap();
    fs.mkdir("/usr/bin").unwrap();
    fs.mkdir("/boot").unwrap();
    write_file(&mut fs, "/usr/readme", b"hello").unwrap();

    assert_eq!(Err(Error::AlreadyExists), fs.mkdir("/usr"));
    assert_eq!(Err(Error::NotFound), fs.mkdir("/opt/x"));
    assert_eq!(Err(Error::NotADirectory), fs.mkdir("/usr/readme/x"));
    assert_eq!(Err(Error::InvalidInput), fs.mkdir("/"));
    assert_eq!(Err(Error::InvalidInput), fs.mkdir("relative"));

    let entries = fs.read_dir("/usr").unwrap();
    assert_eq!(2, entries.len());
    assert_eq!(("bin", DirEntryType::Directory), (&*entries[0].name, entries[0].ty));
    assert_eq!(("readme", DirEntryType::Regular), (&*entries[1].name, entries[1].ty));
    assert_eq!(Err(Error::NotADirectory), fs.read_dir("/usr/readme"));

    let stat = fs.stat("/usr/readme").unwrap();
    assert_eq!((DirEntryType::Regular, 5, 1), (stat.mode, stat.size, stat.blocks));
    assert_eq!(DirEntryType::Directory, fs.stat("//usr///bin/").unwrap().mode);

    let fs = tf.remount(fs);
    assert_eq!(vec!["boot", "usr"], names(&fs, "/"));
    assert_eq!(vec!["bin", "readme"], names(&fs, "/usr"));
}

#[test]
fn open_flags() {
    let (_tf, mut fs) = fresh();

    assert_eq!(
        Err(Error::NotFound),
        fs.open("/f", AccessFlag::Read.into()).map(|_| ())
    );
    assert_eq!(
        Err(Error::IsADirectory),
        fs.open("/", AccessFlag::Read.into()).map(|_| ())
    );
    assert_eq!(
        Err(Error::InvalidInput),
        fs.open("/f", AccessFlag::Read | AccessFlag::Append).map(|_| ())
    );

    let fd = fs.open("/f", BitFlags::from_flag(AccessFlag::Write)).unwrap();
    fs.write(fd, b"0123456789").unwrap();
    let mut buf = [0; 4];
    assert_eq!(Err(Error::PermissionDenied), fs.read(fd, &mut buf));
    fs.close(fd).unwrap();

    let fd = fs.open("/f", AccessFlag::Read.into()).unwrap();
    assert_eq!(Err(Error::PermissionDenied), fs.write(fd, b"x"));
    fs.close(fd).unwrap();

    // 追加
    let fd = fs.open("/f", AccessFlag::Write | AccessFlag::Append).unwrap();
    assert_eq!(10, fs.tell(fd).unwrap());
    fs.write(fd, b"ab").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(b"0123456789ab".to_vec(), read_file(&mut fs, "/f").unwrap());

    // 截断
    let fd = fs.open("/f", AccessFlag::Write | AccessFlag::Truncate).unwrap();
    assert_eq!(0, fs.len(fd).unwrap());
    fs.write(fd, b"new").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(b"new".to_vec(), read_file(&mut fs, "/f").unwrap());
}

#[test]
fn seek_and_overwrite() {
    let (tf, mut fs) = fresh();
    let max = fs.block_max_data_size() as usize;
    let mut expect = pattern(max * 2 + 100, 9);

    let fd = fs.open("/data", AccessFlag::Read | AccessFlag::Write).unwrap();
    fs.write(fd, &expect).unwrap();
    assert_eq!(expect.len() as u32, fs.tell(fd).unwrap());
    assert_eq!(Err(Error::InvalidInput), fs.seek(fd, expect.len() as u32 + 1));

    // 横跨两块的覆盖，再越过末尾
    let patch = pattern(max + 200, 3);
    let at = max - 50;
    fs.seek(fd, at as u32).unwrap();
    fs.write(fd, &patch).unwrap();
    expect.splice(at.., patch.iter().copied());
    assert_eq!(expect.len() as u32, fs.len(fd).unwrap());

    fs.seek(fd, 10).unwrap();
    let mut buf = vec![0; 30];
    assert_eq!(30, fs.read(fd, &mut buf).unwrap());
    assert_eq!(expect[10..40], buf[..]);
    assert_eq!(40, fs.tell(fd).unwrap());
    fs.close(fd).unwrap();

    assert_eq!(Err(Error::InvalidInput), fs.tell(fd));
    assert_eq!(expect, read_file(&mut fs, "/data").unwrap());

    let mut fs = tf.remount(fs);
    assert_eq!(expect, read_file(&mut fs, "/data").unwrap());
    let stat = fs.stat("/data").unwrap();
    assert_eq!(expect.len() as u64, stat.size);
    // 越过末尾的50字节成为新的一块
    assert_eq!(4, stat.blocks);
}

#[test]
fn unlink_open_file() {
    let (tf, mut fs) = fresh();
    fs.mkdir("/d").unwrap();
    write_file(&mut fs, "/d/f", b"still here").unwrap();

    let fd = fs.open("/d/f", AccessFlag::Read | AccessFlag::Write).unwrap();
    fs.unlink("/d/f").unwrap();
    assert!(names(&fs, "/d").is_empty());
    assert_eq!(Err(Error::NotFound), fs.stat("/d/f").map(|_| ()));

    // 关闭前仍可读写
    let mut buf = [0; 10];
    assert_eq!(10, fs.read(fd, &mut buf).unwrap());
    assert_eq!(b"still here", &buf);
    fs.write(fd, b"!").unwrap();
    assert_eq!(11, fs.len(fd).unwrap());

    // 同名新文件互不干扰
    write_file(&mut fs, "/d/f", b"other").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(b"other".to_vec(), read_file(&mut fs, "/d/f").unwrap());

    fs.unlink("/d").unwrap();
    assert_eq!(Err(Error::InvalidInput), fs.unlink("/"));
    assert_eq!(Err(Error::NotFound), fs.unlink("/d"));

    let fs = tf.remount(fs);
    assert!(names(&fs, "/").is_empty());
}

#[test]
fn rename_cases() {
    let (tf, mut fs) = fresh();
    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/sub").unwrap();
    fs.mkdir("/empty").unwrap();
    fs.mkdir("/full").unwrap();
    write_file(&mut fs, "/full/x", b"x").unwrap();
    write_file(&mut fs, "/f", b"f").unwrap();
    write_file(&mut fs, "/g", b"g").unwrap();

    assert_eq!(Err(Error::DirectoryNotEmpty), fs.rename("/a", "/full"));
    assert_eq!(Err(Error::IsADirectory), fs.rename("/f", "/empty"));
    assert_eq!(Err(Error::NotADirectory), fs.rename("/a", "/f"));
    assert_eq!(Err(Error::InvalidInput), fs.rename("/a", "/a/sub/a"));
    assert_eq!(Ok(()), fs.rename("/a", "/a"));
    assert_eq!(Err(Error::NotFound), fs.rename("/nope", "/b"));

    // 文件取代文件
    fs.rename("/f", "/g").unwrap();
    assert_eq!(b"f".to_vec(), read_file(&mut fs, "/g").unwrap());

    // 目录取代空目录，换名同时换父目录
    fs.rename("/a", "/empty").unwrap();
    fs.rename("/g", "/empty/sub/g2").unwrap();
    assert_eq!(Ok(()), fs.rename("/full/x", "/full/x"));

    let mut fs = tf.remount(fs);
    assert_eq!(vec!["empty", "full"], names(&fs, "/"));
    assert_eq!(vec!["sub"], names(&fs, "/empty"));
    assert_eq!(vec!["g2"], names(&fs, "/empty/sub"));
    assert_eq!(b"f".to_vec(), read_file(&mut fs, "/empty/sub/g2").unwrap());
}

#[test]
fn pools_are_bounded() {
    let mut tf = TestFlash::new(2, 4096);
    tf.config = FfsConfig {
        num_inodes: 3,
        num_blocks: 4,
        num_files: 1,
        num_cache_inodes: 0,
    };
    let mut fs = tf.format();

    fs.mkdir("/a").unwrap();
    let fd = fs.open("/f", BitFlags::from_flag(AccessFlag::Write)).unwrap();
    assert_eq!(
        Err(Error::OutOfMemory),
        fs.open("/f", AccessFlag::Read.into()).map(|_| ())
    );

    // 失败的创建不在闪存上留下记录
    let records = fs.scan_area(1).unwrap().len();
    assert_eq!(Err(Error::OutOfMemory), fs.mkdir("/b"));
    assert_eq!(records, fs.scan_area(1).unwrap().len());

    fs.write(fd, &pattern(100, 0)).unwrap();
    fs.close(fd).unwrap();
    assert_eq!(pattern(100, 0), read_file(&mut fs, "/f").unwrap());
}

#[test]
fn failed_write_leaves_nothing() {
    let mut tf = TestFlash::new(2, 8192);
    tf.config = FfsConfig {
        num_inodes: 2,
        num_blocks: 2,
        num_files: 1,
        num_cache_inodes: 0,
    };
    let mut fs = tf.format();
    let max = fs.block_max_data_size() as usize;
    assert_eq!(2048, max);

    // 三块只剩两个索引项
    assert_eq!(
        Err(Error::OutOfMemory),
        write_file(&mut fs, "/f", &pattern(3 * max, 0))
    );
    assert!(read_file(&mut fs, "/f").unwrap().is_empty());
    assert!(fs
        .scan_area(1)
        .unwrap()
        .iter()
        .all(|(_, object)| matches!(object, DiskObject::Inode(_))));

    overwrite_file(&mut fs, "/f", &pattern(2 * max, 1)).unwrap();
    let mut fs = tf.remount(fs);
    assert_eq!(pattern(2 * max, 1), read_file(&mut fs, "/f").unwrap());
}

#[test]
fn restore_rejects_wrong_layout() {
    let tf = TestFlash::new(2, 4096);
    let mut fs = tf.format();
    write_file(&mut fs, "/f", b"keep me").unwrap();
    drop(fs.unmount());

    let wrong = TestFlash {
        flash: tf.flash.clone(),
        descs: AreaDesc::contiguous(2, 2048),
        config: tf.config,
    };
    assert_eq!(Err(Error::Corrupt), wrong.restore().map(|_| ()));

    let mut fs = tf.restore().unwrap();
    assert_eq!(b"keep me".to_vec(), read_file(&mut fs, "/f").unwrap());
}

#[test]
fn restore_rejects_blank_flash() {
    let tf = TestFlash::new(2, 4096);
    assert_eq!(Err(Error::Corrupt), tf.restore().map(|_| ()));
}

#[test]
fn newest_version_wins() {
    let tf = TestFlash::new(2, 4096);
    let mut fs = tf.format();
    write_file(&mut fs, "/f", b"first").unwrap();
    overwrite_file(&mut fs, "/f", b"again").unwrap();
    fs.rename("/f", "/moved").unwrap();

    let mut fs = tf.remount(fs);
    assert_eq!(vec!["moved"], names(&fs, "/"));
    assert_eq!(b"again".to_vec(), read_file(&mut fs, "/moved").unwrap());
}

#[test]
fn same_seq_in_two_places_is_corrupt() {
    let tf = TestFlash::new(3, 1024);
    let mut fs = tf.format();
    write_file(&mut fs, "/f", &[]).unwrap();
    drop(fs.unmount());

    // `/f`的记录紧跟根目录之后
    let area = tf.flash.area_bytes(1).unwrap();
    let record = &area[24 + 20..24 + 20 + 21];
    tf.flash.force_write(2, 24, record).unwrap();

    assert_eq!(Err(Error::Corrupt), tf.restore().map(|_| ()));
}
