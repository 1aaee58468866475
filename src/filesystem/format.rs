use std::io::{Seek, SeekFrom, Write};

use log::info;

use super::cache::Cache;
use super::{BlockDevice, Filesystem};
use crate::filetypes::timestamp_now;
use crate::structs::*;
use crate::Error;

/// Blocks needed past the metadata: root and lost+found
const DATA_BLOCKS_REQUIRED: u32 = 2;

impl Filesystem {
    /// Write a fresh single-group filesystem holding the root directory and
    /// lost+found onto `device`
    pub fn format(
        device: Box<dyn BlockDevice>,
        blocks_count: u32,
        inodes_count: u32,
    ) -> Result<Self, Error> {
        let mut device = device;
        let superblock = Superblock::new(blocks_count, inodes_count);
        superblock.validate()?;
        let group = GroupDescriptor::new(&superblock);
        let metadata_end = group.metadata_end(&superblock);
        if metadata_end + DATA_BLOCKS_REQUIRED > blocks_count {
            return Err(Error::Unsupported(format!(
                "{blocks_count} blocks cannot hold {inodes_count} inodes"
            )));
        }
        if inodes_count < superblock.first_inode() {
            return Err(Error::Unsupported(format!(
                "{inodes_count} inodes leave none for regular use"
            )));
        }
        info!("Formatting image with {blocks_count} blocks and {inodes_count} inodes");
        device.seek(SeekFrom::Start(0))?;
        device.write_all(&vec![0u8; blocks_count as usize * BLOCK_SIZE])?;

        let mut fs = Self {
            inodes: Bitmap::<Inode>::new(&superblock, &group),
            blocks: Bitmap::<Block>::new(&superblock, &group),
            superblock,
            group,
            device,
            cache: Cache::default(),
        };
        for block in 1..metadata_end {
            fs.mark_block_used(block)?;
        }
        // Bit for a block number past the end of the image
        fs.mark_block_used(blocks_count)?;
        for inode in 1..fs.superblock.first_inode() {
            fs.mark_inode_used(inode)?;
        }

        let root = Inode::new(MODE_DIRECTORY | 0o755, timestamp_now());
        fs.flush_inode(ROOT_INODE, &root)?;
        fs.insert_entry(ROOT_INODE, ROOT_INODE, b".", FileType::Directory)?;
        fs.insert_entry(ROOT_INODE, ROOT_INODE, b"..", FileType::Directory)?;
        fs.group.used_dirs_count = 1;
        fs.create_directory("/lost+found")?;
        fs.flush()?;
        Ok(fs)
    }
}
