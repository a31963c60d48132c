use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    AlreadyExists,
    NotFound,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    InvalidInput,
    PermissionDenied,
    /// 没有区域能容纳请求的空间，垃圾回收也无济于事
    OutOfSpace,
    /// 内存池耗尽
    OutOfMemory,
    /// 介质上的数据自相矛盾
    Corrupt,
    /// ID 不属于预期的命名空间
    WrongType,
    /// 闪存驱动报告错误
    Io,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AlreadyExists => "entry already exists",
            Self::NotFound => "entry not found",
            Self::IsADirectory => "is a directory",
            Self::NotADirectory => "not a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::InvalidInput => "invalid input",
            Self::PermissionDenied => "permission denied",
            Self::OutOfSpace => "out of flash space",
            Self::OutOfMemory => "out of memory",
            Self::Corrupt => "corrupt file system",
            Self::WrongType => "object of wrong type",
            Self::Io => "flash I/O error",
        };
        f.write_str(msg)
    }
}
