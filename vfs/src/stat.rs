use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub mode: DirEntryType,
    /// Largest payload of one data block
    pub block_size: u64,
    /// Data blocks in the chain
    pub blocks: u64,
    /// File size
    pub size: u64,
}
