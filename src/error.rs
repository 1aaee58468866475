use std::fmt::Display;

#[derive(Debug)]
pub enum Error {
    /// Path is not absolute or has no final component
    InvalidPath(String),
    /// Source and destination of a link are the same path
    IdenticalPaths(String),
    /// Path component longer than a directory record can hold
    NameTooLong(String),
    NotFound(String),
    ParentNotFound(String),
    /// No recoverable directory record carries the name
    DeletedNotFound(String),
    AlreadyExists(String),
    /// Resource needed by a restore has been reclaimed
    Conflict(String),
    IsDirectory(String),
    /// No free inode or block left
    NoSpace(&'static str),
    /// File needs more blocks than direct and single indirect pointers address
    FileTooLarge,
    OutOfBounds,
    /// Malformed on-disk structure
    Corrupted(String),
    /// Image uses a layout this engine does not handle
    Unsupported(String),
    Io(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(p) => write!(f, "invalid disk path {p}"),
            Self::IdenticalPaths(p) => write!(f, "identical paths found: {p}"),
            Self::NameTooLong(n) => write!(f, "name too long: {n}"),
            Self::NotFound(p) => write!(f, "{p} not found"),
            Self::ParentNotFound(p) => write!(f, "parent directory of {p} not found"),
            Self::DeletedNotFound(p) => write!(f, "{p} not found as deleted file"),
            Self::AlreadyExists(p) => write!(f, "{p} already exists"),
            Self::Conflict(m) => write!(f, "{m}"),
            Self::IsDirectory(p) => write!(f, "{p} refers to a directory"),
            Self::NoSpace(kind) => write!(f, "no free {kind} found"),
            Self::FileTooLarge => write!(f, "file exceeds single indirect capacity"),
            Self::OutOfBounds => write!(f, "out of bounds"),
            Self::Corrupted(m) => write!(f, "corrupted image: {m}"),
            Self::Unsupported(m) => write!(f, "unsupported image: {m}"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<Error> for libc::c_int {
    fn from(value: Error) -> Self {
        match value {
            Error::InvalidPath(_) | Error::IdenticalPaths(_) => libc::EINVAL,
            Error::NameTooLong(_) => libc::ENAMETOOLONG,
            Error::NotFound(_) | Error::ParentNotFound(_) | Error::DeletedNotFound(_) => {
                libc::ENOENT
            }
            Error::AlreadyExists(_) | Error::Conflict(_) => libc::EEXIST,
            Error::IsDirectory(_) => libc::EISDIR,
            Error::NoSpace(_) => libc::ENOSPC,
            Error::FileTooLarge => libc::EFBIG,
            Error::OutOfBounds | Error::Corrupted(_) => libc::EIO,
            Error::Unsupported(_) => libc::EINVAL,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}
