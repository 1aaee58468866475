use std::fmt::Display;
use std::io::{Read, Seek, SeekFrom, Write};

use super::*;
use crate::Error;

const BLOCKS_PER_GROUP: u32 = 8192;
const STATE_CLEAN: u16 = 1;
const ERRORS_CONTINUE: u16 = 1;
const DYNAMIC_REVISION: u32 = 1;

impl Superblock {
    /// Superblock of a fresh single-group filesystem with every resource free
    pub fn new(blocks_count: u32, inodes_count: u32) -> Self {
        Self {
            inodes_count,
            blocks_count,
            free_blocks_count: blocks_count,
            free_inodes_count: inodes_count,
            first_data_block: 1,
            blocks_per_group: BLOCKS_PER_GROUP,
            frags_per_group: BLOCKS_PER_GROUP,
            inodes_per_group: inodes_count,
            max_mnt_count: u16::MAX,
            magic: MAGIC_SIGNATURE,
            state: STATE_CLEAN,
            errors: ERRORS_CONTINUE,
            rev_level: DYNAMIC_REVISION,
            first_ino: GOOD_OLD_FIRST_INODE,
            inode_size: GOOD_OLD_INODE_SIZE,
            ..Self::zeroed()
        }
    }

    /// Size of one inode table record in bytes
    pub fn inode_size(&self) -> u16 {
        if self.rev_level >= DYNAMIC_REVISION && self.inode_size != 0 {
            self.inode_size
        } else {
            GOOD_OLD_INODE_SIZE
        }
    }

    /// First inode number available to regular allocation
    pub fn first_inode(&self) -> u32 {
        if self.rev_level >= DYNAMIC_REVISION && self.first_ino != 0 {
            self.first_ino
        } else {
            GOOD_OLD_FIRST_INODE
        }
    }

    pub(crate) fn load<D: Read + Seek>(block_device: &mut D) -> Result<Self, Error> {
        block_device.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
        let mut raw = [0u8; std::mem::size_of::<Self>()];
        block_device.read_exact(&mut raw)?;
        let superblock: Self = bytemuck::pod_read_unaligned(&raw);
        superblock.validate()?;
        Ok(superblock)
    }

    pub(crate) fn flush<D: Write + Seek>(&self, block_device: &mut D) -> Result<(), Error> {
        block_device.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
        block_device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        let magic = self.magic;
        if magic != MAGIC_SIGNATURE {
            return Err(Error::Unsupported(format!(
                "bad magic signature {magic:#06x}"
            )));
        }
        if self.log_block_size != 0 {
            let size = BLOCK_SIZE << self.log_block_size;
            return Err(Error::Unsupported(format!(
                "block size {size} is not {BLOCK_SIZE}"
            )));
        }
        let bits_per_block = (BLOCK_SIZE * 8) as u32;
        if self.blocks_count > bits_per_block || self.inodes_count > bits_per_block {
            return Err(Error::Unsupported("more than one block group".into()));
        }
        let inode_size = self.inode_size();
        if (inode_size as usize) < std::mem::size_of::<Inode>() {
            return Err(Error::Unsupported(format!("inode size {inode_size}")));
        }
        Ok(())
    }
}

impl GroupDescriptor {
    /// Descriptor placing the bitmaps and the inode table right after itself
    pub fn new(superblock: &Superblock) -> Self {
        Self {
            block_bitmap: GROUP_DESCRIPTOR_BLOCK + 1,
            inode_bitmap: GROUP_DESCRIPTOR_BLOCK + 2,
            inode_table: GROUP_DESCRIPTOR_BLOCK + 3,
            free_blocks_count: superblock.free_blocks_count as u16,
            free_inodes_count: superblock.free_inodes_count as u16,
            used_dirs_count: 0,
            ..Self::zeroed()
        }
    }

    /// First block past the inode table
    pub fn metadata_end(&self, superblock: &Superblock) -> u32 {
        let table_bytes = superblock.inodes_count as usize * superblock.inode_size() as usize;
        self.inode_table + table_bytes.div_ceil(BLOCK_SIZE) as u32
    }

    pub(crate) fn load<D: Read + Seek>(block_device: &mut D) -> Result<Self, Error> {
        block_device.seek(SeekFrom::Start(
            GROUP_DESCRIPTOR_BLOCK as u64 * BLOCK_SIZE as u64,
        ))?;
        let mut raw = [0u8; std::mem::size_of::<Self>()];
        block_device.read_exact(&mut raw)?;
        Ok(bytemuck::pod_read_unaligned(&raw))
    }

    pub(crate) fn flush<D: Write + Seek>(&self, block_device: &mut D) -> Result<(), Error> {
        block_device.seek(SeekFrom::Start(
            GROUP_DESCRIPTOR_BLOCK as u64 * BLOCK_SIZE as u64,
        ))?;
        block_device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }
}

impl Display for Superblock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Inodes: {}", self.inodes_count)?;
        writeln!(f, "Blocks: {}", self.blocks_count)?;
        writeln!(f, "Free inodes: {}", self.free_inodes_count)?;
        writeln!(f, "Free blocks: {}", self.free_blocks_count)?;
        write!(
            f,
            "Revision: {} (inode size {}, first inode {})",
            self.rev_level,
            self.inode_size(),
            self.first_inode()
        )
    }
}

impl Display for GroupDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Block group:")?;
        writeln!(f, "    block bitmap: {}", self.block_bitmap)?;
        writeln!(f, "    inode bitmap: {}", self.inode_bitmap)?;
        writeln!(f, "    inode table: {}", self.inode_table)?;
        writeln!(f, "    free blocks: {}", self.free_blocks_count)?;
        writeln!(f, "    free inodes: {}", self.free_inodes_count)?;
        write!(f, "    used dirs: {}", self.used_dirs_count)
    }
}
