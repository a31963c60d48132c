mod flash_file;

pub use self::flash_file::FlashFile;
