use std::fmt::Debug;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use log::{debug, info};

use crate::structs::*;
use crate::Error;

mod allocator;
mod cache;
mod checker;
mod format;
mod operations;

use cache::Cache;
pub use checker::{CheckReport, Counter, Repair};

pub trait BlockDevice: Read + Write + Seek + Debug {}

impl BlockDevice for std::fs::File {}

impl BlockDevice for Cursor<Vec<u8>> {}

/// Exclusive session over one ext2 image.
///
/// Superblock, group descriptor and both bitmaps are held in memory; blocks and
/// inodes are read through a write-back [`Cache`]. Nothing reaches the device
/// before [`Self::flush`] or [`Self::close`].
#[derive(Debug)]
pub struct Filesystem {
    pub(crate) superblock: Superblock,
    pub(crate) group: GroupDescriptor,
    pub(crate) inodes: Bitmap<Inode>,
    pub(crate) blocks: Bitmap<Block>,
    pub(crate) device: Box<dyn BlockDevice>,
    pub(crate) cache: Cache,
}

impl Filesystem {
    /// Load filesystem from a block device
    pub fn open(device: Box<dyn BlockDevice>) -> Result<Self, Error> {
        let mut device = device;
        let superblock = Superblock::load(&mut device)?;
        let length = device.seek(SeekFrom::End(0))?;
        let required = superblock.blocks_count as u64 * BLOCK_SIZE as u64;
        if length < required {
            return Err(Error::Corrupted(format!(
                "image holds {length} bytes, superblock expects {required}"
            )));
        }
        let group = GroupDescriptor::load(&mut device)?;
        let mut bitmaps = (
            Bitmap::<Inode>::new(&superblock, &group),
            Bitmap::<Block>::new(&superblock, &group),
        );
        bitmaps.0.load(&mut device)?;
        bitmaps.1.load(&mut device)?;
        info!(
            "Opened image with {} blocks and {} inodes",
            superblock.blocks_count, superblock.inodes_count
        );
        Ok(Self {
            superblock,
            group,
            inodes: bitmaps.0,
            blocks: bitmaps.1,
            device,
            cache: Cache::default(),
        })
    }

    /// Write every modified structure back to the block device
    pub fn flush(&mut self) -> Result<(), Error> {
        info!("Flushing filesystem to disk");
        self.flush_cache()?;
        self.superblock.flush(&mut self.device)?;
        self.group.flush(&mut self.device)?;
        self.inodes.flush(&mut self.device)?;
        self.blocks.flush(&mut self.device)?;
        self.device.flush()?;
        Ok(())
    }

    /// Flush and release the image, handing back its device
    pub fn close(mut self) -> Result<Box<dyn BlockDevice>, Error> {
        self.flush()?;
        Ok(self.device)
    }

    fn flush_cache(&mut self) -> Result<(), Error> {
        debug!("Flushing cache to disk");
        for (&index, line) in self.cache.inodes.iter_mut() {
            if line.modified {
                line.value
                    .flush(&mut self.device, &self.superblock, &self.group, index)?;
                line.modified = false;
            }
        }
        for (&index, line) in self.cache.blocks.iter_mut() {
            if line.modified {
                line.value
                    .flush(&mut self.device, &self.superblock, &self.group, index)?;
                line.modified = false;
            }
        }
        Ok(())
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn group(&self) -> &GroupDescriptor {
        &self.group
    }

    pub fn inode_bitmap(&self) -> &Bitmap<Inode> {
        &self.inodes
    }

    pub fn block_bitmap(&self) -> &Bitmap<Block> {
        &self.blocks
    }

    /// Load inode with index, regardless of its bitmap state
    pub fn load_inode(&mut self, index: u32) -> Result<Inode, Error> {
        if let Some(inode) = self.cache.get_inode(index) {
            return Ok(inode);
        }
        debug!("Load inode {index}");
        let inode = Inode::load(&mut self.device, &self.superblock, &self.group, index)?;
        self.cache.insert_inode(index, inode);
        Ok(inode)
    }

    /// Load block with index.
    /// If `empty` is true, skip loading data and return zero-initialized block
    pub fn load_block(&mut self, index: u32, empty: bool) -> Result<Block, Error> {
        Block::position(&self.superblock, &self.group, index)?;
        if empty {
            debug!("Load empty block {index}");
            let block = Block::with_index(index);
            self.cache.set_block(&block);
            return Ok(block);
        }
        if let Some(block) = self.cache.get_block(index) {
            return Ok(block);
        }
        debug!("Load block {index}");
        let block = Block::load(&mut self.device, &self.superblock, &self.group, index)?;
        self.cache.insert_block(&block);
        Ok(block)
    }

    /// Flush inode
    pub(crate) fn flush_inode(&mut self, index: u32, inode: &Inode) -> Result<(), Error> {
        Inode::position(&self.superblock, &self.group, index)?;
        debug!("Flush inode {index}");
        self.cache.set_inode(index, inode);
        Ok(())
    }

    /// Flush block
    pub(crate) fn flush_block(&mut self, block: &Block) -> Result<(), Error> {
        Block::position(&self.superblock, &self.group, block.index)?;
        debug!("Flush block {}", block.index);
        self.cache.set_block(block);
        Ok(())
    }
}
