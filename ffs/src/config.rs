/// 内存池的容量，格式化与恢复时确定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfsConfig {
    /// 同时驻留内存的 inode 数
    pub num_inodes: usize,
    /// 数据块索引项数
    pub num_blocks: usize,
    /// 同时打开的文件数
    pub num_files: usize,
    /// 缓存块链的文件数，为0时不缓存
    pub num_cache_inodes: usize,
}

impl FfsConfig {
    /// 哈希索引容量：每个 inode 与数据块各占一项
    #[inline]
    pub fn num_hash_entries(&self) -> usize {
        self.num_inodes + self.num_blocks
    }
}

impl Default for FfsConfig {
    fn default() -> Self {
        Self {
            num_inodes: 1024,
            num_blocks: 4096,
            num_files: 4,
            num_cache_inodes: 4,
        }
    }
}
