//! # ffs
//!
//! 面向裸 NOR/NAND 闪存的日志结构文件系统。
//!
//! 文件与目录都是只追加的记录：修改一个对象就是写下它序号更大的新版本，
//! 旧版本留在原地，等所在区域被垃圾回收时才被丢弃。
//! 掉电后重新扫描全部区域，每个对象取序号最大的版本，即可恢复一致的视图。

#![no_std]

extern crate alloc;

/* ffs 的整体架构，自上而下 */

// 文件句柄层：打开、读写、定位
mod file;
pub use file::{AccessFlag, Fd, File};

// 路径层：路径解析与目录操作
mod path;

// 写入：追加新块或覆盖旧块
mod write;

// 文件缓存：加速块链上的定位
mod cache;

// 垃圾回收、恢复与格式化
mod format;
mod gc;
mod restore;

// 内存对象层：inode 树与块链
mod block;
mod inode;
pub use block::Block;
pub use inode::{Inode, InodeEntry, InodeKind};

// 对象哈希索引
mod hash;
pub use hash::{HashEntry, HashIndex, Owner};

// 定长对象池
mod pool;
pub use pool::{Handle, Pool};

// 区域管理层
mod area;
pub use area::{Area, AreaManager};

// 磁盘数据结构层
pub mod layout;

mod config;
mod control;
mod id;
pub use config::FfsConfig;
pub use control::FlashFileSystem;
pub use id::{FlashLoc, ObjectId};

pub use flash_dev::{AreaDesc, FlashDevice};
pub use vfs::Error;

pub const AREA_MAGIC: [u32; 4] = [0xb98a_31e2, 0x7fb0_428c, 0xace0_8253, 0xb185_fc8e];
pub const BLOCK_MAGIC: u32 = 0x53ba_23b9;
pub const INODE_MAGIC: u32 = 0x925f_8bc0;

/// 暂存区域的逻辑ID
pub const AREA_ID_NONE: u8 = 0xff;
pub const AREA_VER: u8 = 0;
/// 区域头中逻辑ID字节的偏移
pub const AREA_OFFSET_ID: u32 = 23;

/// 哈希桶数
pub const HASH_SIZE: usize = 256;

pub const BLOCK_MAX_DATA_SZ_MAX: u16 = 2048;
pub const FILENAME_MAX_LEN: usize = 255;

/// 闪存间拷贝所用缓冲区的大小
const FLASH_BUF_SZ: usize = 256;
