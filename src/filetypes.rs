mod blocks;
mod directory;
mod directory_child;
mod helpers;
mod path;

pub(crate) use directory::read_children_lenient;
pub(crate) use directory_child::{set_rec_len, set_type_tag};
pub use helpers::{min_rec_len, padded_name_len, timestamp_now};

#[cfg(test)]
pub(crate) use directory::read_children;

use crate::structs::FileType;

/// Decoded directory record together with its position in the block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChild {
    pub(crate) inode: u32,
    pub(crate) rec_len: u16,
    pub(crate) file_type: FileType,
    pub(crate) name: Vec<u8>,
    /// Byte offset of the record inside its block
    pub(crate) offset: usize,
}

/// Live record found by name
#[derive(Debug, Clone)]
pub struct FoundEntry {
    pub(crate) child: DirectoryChild,
}

/// Absorbed record still carrying its inode number and name.
/// It lies inside the span of the live record at `host`, starting at `offset`,
/// and would span `rec_len` bytes once split back out.
#[derive(Debug, Clone)]
pub struct DeletedEntry {
    pub(crate) block: u32,
    pub(crate) host: usize,
    pub(crate) child: DirectoryChild,
    pub(crate) rec_len: usize,
}

/// Components of an absolute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTokens {
    pub(crate) tokens: Vec<String>,
}

impl DirectoryChild {
    pub fn inode(&self) -> u32 {
        self.inode
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }
}

impl FoundEntry {
    pub fn inode(&self) -> u32 {
        self.child.inode
    }

    pub fn file_type(&self) -> FileType {
        self.child.file_type
    }
}

impl DeletedEntry {
    pub fn inode(&self) -> u32 {
        self.child.inode
    }

    pub fn file_type(&self) -> FileType {
        self.child.file_type
    }
}
