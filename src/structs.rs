mod bitmap;
mod block;
mod inode;
mod superblock;

use std::io::{Read, Seek, Write};
use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};

use crate::Error;

pub const BLOCK_SIZE: usize = 1024;
pub const SECTOR_SIZE: usize = 512;
pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const GROUP_DESCRIPTOR_BLOCK: u32 = 2;
pub const MAGIC_SIGNATURE: u16 = 0xEF53;

pub const ROOT_INODE: u32 = 2;
pub const GOOD_OLD_FIRST_INODE: u32 = 11;
pub const GOOD_OLD_INODE_SIZE: u16 = 128;

pub const DIRECT_BLOCKS: usize = 12;
pub const INDIRECT_SLOT: usize = 12;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / std::mem::size_of::<u32>();
pub const MAX_FILE_BLOCKS: usize = DIRECT_BLOCKS + POINTERS_PER_BLOCK;

pub const MODE_TYPE_MASK: u16 = 0xF000;
pub const MODE_FIFO: u16 = 0x1000;
pub const MODE_CHAR_DEVICE: u16 = 0x2000;
pub const MODE_DIRECTORY: u16 = 0x4000;
pub const MODE_BLOCK_DEVICE: u16 = 0x6000;
pub const MODE_REGULAR: u16 = 0x8000;
pub const MODE_SYMLINK: u16 = 0xA000;
pub const MODE_SOCKET: u16 = 0xC000;

pub const DIRENT_TYPE_MASK: u8 = 0x7;
pub const DIRENT_HEADER_SIZE: usize = std::mem::size_of::<DirEntryHeader>();
pub const MAX_NAME_LENGTH: usize = 255;

/// Record stored at a fixed position derived from its number
pub(crate) trait PermanentIndexed: Sized {
    /// Byte offset of record `index` within the image
    fn position(superblock: &Superblock, group: &GroupDescriptor, index: u32) -> Result<u64, Error>;
    fn load<D: Read + Seek>(
        block_device: &mut D,
        superblock: &Superblock,
        group: &GroupDescriptor,
        index: u32,
    ) -> Result<Self, Error>;
    fn flush<D: Write + Seek>(
        &self,
        block_device: &mut D,
        superblock: &Superblock,
        group: &GroupDescriptor,
        index: u32,
    ) -> Result<(), Error>;
}

/// Leading part of the ext2 superblock, as stored at byte 1024 of the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Superblock {
    /// Total count of inodes in the filesystem
    pub inodes_count: u32,
    /// Total count of blocks in the filesystem
    pub blocks_count: u32,
    pub r_blocks_count: u32,
    /// Count of free blocks in the filesystem
    pub free_blocks_count: u32,
    /// Count of free inodes in the filesystem
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    /// Block size is `1024 << log_block_size`
    pub log_block_size: u32,
    pub log_frag_size: u32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    pub mtime: u32,
    pub wtime: u32,
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    /// Magic signature
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    pub creator_os: u32,
    pub rev_level: u32,
    pub def_resuid: u16,
    pub def_resgid: u16,
    /// First non-reserved inode (revision 1 and later)
    pub first_ino: u32,
    /// Size of an inode record (revision 1 and later)
    pub inode_size: u16,
    pub block_group_nr: u16,
}

/// Descriptor of the single block group, stored at the start of block 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct GroupDescriptor {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    /// Count of directories in use
    pub used_dirs_count: u16,
    #[doc(hidden)]
    pub __padding_1: u16,
    #[doc(hidden)]
    pub __reserved: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Inode {
    /// File type (top nibble) and permissions
    pub mode: u16,
    pub uid: u16,
    /// File size in bytes
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    /// Deletion timestamp in seconds (zero if live)
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    /// Occupied 512-byte sectors, indirect block included
    pub blocks: u32,
    pub flags: u32,
    pub osd1: u32,
    /// Slots 0..12 are direct, slot 12 single indirect, 13 and 14 unused
    pub block: [u32; 15],
    pub generation: u32,
    pub file_acl: u32,
    pub dir_acl: u32,
    pub faddr: u32,
    pub osd2: [u32; 3],
}

/// Fixed part of a directory record; name bytes follow it directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DirEntryHeader {
    /// Referenced inode, zero for an unused record
    pub inode: u32,
    /// Distance from this record's start to the next one's
    pub rec_len: u16,
    pub name_len: u8,
    /// File type in the low three bits
    pub file_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block's index
    pub(crate) index: u32,
    /// Raw data as bytes
    pub(crate) data: Vec<u8>,
}

pub trait AsBitmap {
    /// Human-readable name of the tracked resource
    const RESOURCE: &'static str;
}

/// Allocation bitmap, bit `n - 1` tracks resource `n`
#[derive(Debug, Clone)]
pub struct Bitmap<T: AsBitmap> {
    /// Bits mapping to resource numbers, in on-disk byte order
    pub(crate) bitfield: Vec<u8>,
    /// Number of valid resource numbers
    pub(crate) count: u32,
    /// Block holding the bitmap
    pub(crate) position: u32,
    #[doc(hidden)]
    __type: PhantomData<T>,
}

/// Entry type as tagged in a directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    RegularFile,
    Directory,
    CharDevice,
    BlockDevice,
    NamedPipe,
    Socket,
    Symlink,
}

impl FileType {
    pub fn from_tag(tag: u8) -> Self {
        match tag & DIRENT_TYPE_MASK {
            1 => Self::RegularFile,
            2 => Self::Directory,
            3 => Self::CharDevice,
            4 => Self::BlockDevice,
            5 => Self::NamedPipe,
            6 => Self::Socket,
            7 => Self::Symlink,
            _ => Self::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::RegularFile => 1,
            Self::Directory => 2,
            Self::CharDevice => 3,
            Self::BlockDevice => 4,
            Self::NamedPipe => 5,
            Self::Socket => 6,
            Self::Symlink => 7,
        }
    }

    pub fn from_mode(mode: u16) -> Self {
        match mode & MODE_TYPE_MASK {
            MODE_REGULAR => Self::RegularFile,
            MODE_DIRECTORY => Self::Directory,
            MODE_CHAR_DEVICE => Self::CharDevice,
            MODE_BLOCK_DEVICE => Self::BlockDevice,
            MODE_FIFO => Self::NamedPipe,
            MODE_SOCKET => Self::Socket,
            MODE_SYMLINK => Self::Symlink,
            _ => Self::Unknown,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::RegularFile => 'f',
            Self::Directory => 'd',
            Self::Symlink => 'l',
            Self::CharDevice => 'c',
            Self::BlockDevice => 'b',
            Self::NamedPipe => 'p',
            Self::Socket => 's',
            Self::Unknown => '?',
        }
    }
}
