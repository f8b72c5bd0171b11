use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Mask selecting the file type bits of a mode.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// Device id used when none is given (all bits of an odc field set).
pub const DEFAULT_DEV: u64 = 0o777777;
/// Regular file, `rw-r--r--`.
pub const DEFAULT_MODE: u32 = 0o100644;

/// File type encoded in the high bits of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown(u32),
}

impl FileKind {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileKind::Regular,
            S_IFDIR => FileKind::Directory,
            S_IFLNK => FileKind::Symlink,
            S_IFCHR => FileKind::CharDevice,
            S_IFBLK => FileKind::BlockDevice,
            S_IFIFO => FileKind::Fifo,
            S_IFSOCK => FileKind::Socket,
            other => FileKind::Unknown(other),
        }
    }

    pub fn type_bits(&self) -> u32 {
        match self {
            FileKind::Regular => S_IFREG,
            FileKind::Directory => S_IFDIR,
            FileKind::Symlink => S_IFLNK,
            FileKind::CharDevice => S_IFCHR,
            FileKind::BlockDevice => S_IFBLK,
            FileKind::Fifo => S_IFIFO,
            FileKind::Socket => S_IFSOCK,
            FileKind::Unknown(bits) => *bits,
        }
    }

    /// Only regular files carry a streamed body.
    pub fn has_body(&self) -> bool {
        matches!(self, FileKind::Regular)
    }
}

/// Caller-supplied entry metadata.
///
/// Every field except the name is optional; unset fields are filled in when
/// the entry is admitted by [`Pack::entry`](super::Pack::entry).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub file_size: Option<u64>,
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub dev: Option<u64>,
    pub ino: Option<u64>,
    pub nlink: Option<u32>,
    pub rdev: Option<u64>,
    pub mtime: Option<SystemTime>,
}

impl Header {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A regular file header declaring `size` bytes of streamed content.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name).with_size(size)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name).with_mode(FileKind::Directory.type_bits() | 0o755)
    }

    pub fn symlink(name: impl Into<String>) -> Self {
        Self::new(name).with_mode(FileKind::Symlink.type_bits() | 0o777)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    pub fn with_dev(mut self, dev: u64) -> Self {
        self.dev = Some(dev);
        self
    }

    pub fn with_ino(mut self, ino: u64) -> Self {
        self.ino = Some(ino);
        self
    }

    pub fn with_nlink(mut self, nlink: u32) -> Self {
        self.nlink = Some(nlink);
        self
    }

    pub fn with_rdev(mut self, rdev: u64) -> Self {
        self.rdev = Some(rdev);
        self
    }

    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Fill unset fields with their defaults.
    ///
    /// `next_ino` is only consulted when no inode number was given.
    pub fn resolve(self, next_ino: impl FnOnce() -> u64) -> EntryHeader {
        EntryHeader {
            dev: self.dev.unwrap_or(DEFAULT_DEV),
            ino: self.ino.unwrap_or_else(next_ino),
            mode: self.mode.unwrap_or(DEFAULT_MODE),
            uid: self.uid.unwrap_or(0),
            gid: self.gid.unwrap_or(0),
            nlink: self.nlink.unwrap_or(1),
            rdev: self.rdev.unwrap_or(0),
            mtime: unix_seconds(self.mtime.unwrap_or_else(SystemTime::now)),
            file_size: self.file_size.unwrap_or(0),
            name: self.name,
        }
    }
}

/// Fully resolved entry metadata, as handed to a header codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub rdev: u64,
    /// Seconds since the Unix epoch
    pub mtime: u64,
    pub file_size: u64,
    pub name: String,
}

impl EntryHeader {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// The header of the end-of-archive marker record.
    pub fn trailer() -> Self {
        Self {
            dev: 0,
            ino: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 1,
            rdev: 0,
            mtime: 0,
            file_size: 0,
            name: TRAILER_NAME.to_string(),
        }
    }
}

/// Name carried by the end-of-archive record.
pub const TRAILER_NAME: &str = "TRAILER!!!";

fn unix_seconds(time: SystemTime) -> u64 {
    // Times before the epoch cannot be represented in any cpio variant
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Content handed to [`Pack::entry`](super::Pack::entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Bytes known up front; the entry completes inside the admission call.
    Immediate(Bytes),
    /// Content arrives later through the returned sink.
    Streamed,
}

impl From<Bytes> for Content {
    fn from(value: Bytes) -> Self {
        Content::Immediate(value)
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Content::Immediate(Bytes::from(value))
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Content::Immediate(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for Content {
    fn from(value: &[u8; N]) -> Self {
        Content::Immediate(Bytes::copy_from_slice(value))
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Immediate(Bytes::from(value))
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Immediate(Bytes::copy_from_slice(value.as_bytes()))
    }
}
