use std::fmt::Display;
use std::io::{Read, Seek, SeekFrom, Write};

use super::*;
use crate::Error;

const BITS_IN_BYTE: u32 = u8::BITS;

impl<T: AsBitmap> Bitmap<T> {
    /// Return empty bitmap tracking `count` resources, stored in block `position`
    pub(crate) fn empty(count: u32, position: u32) -> Self {
        Self {
            bitfield: vec![0; Self::size(count)],
            count,
            position,
            __type: PhantomData,
        }
    }

    /// Calculate size in bytes needed to hold `count` bits
    pub(crate) fn size(count: u32) -> usize {
        count.div_ceil(BITS_IN_BYTE) as usize
    }

    fn locate(&self, number: u32) -> Result<(usize, u8), Error> {
        if number == 0 || number > self.count {
            return Err(Error::OutOfBounds);
        }
        let bit = number - 1;
        Ok(((bit / BITS_IN_BYTE) as usize, 1u8 << (bit % BITS_IN_BYTE)))
    }

    /// Modify occupancy of resource `number`
    pub(crate) fn set(&mut self, number: u32, value: bool) -> Result<(), Error> {
        let (row, mask) = self.locate(number)?;
        if value {
            self.bitfield[row] |= mask;
        } else {
            self.bitfield[row] &= !mask;
        }
        Ok(())
    }

    /// Get occupancy of resource `number`
    pub fn get(&self, number: u32) -> Result<bool, Error> {
        let (row, mask) = self.locate(number)?;
        Ok(self.bitfield[row] & mask != 0)
    }

    /// First free resource number not below `start`
    pub(crate) fn next_free(&self, start: u32) -> Option<u32> {
        (start.max(1)..=self.count).find(|&number| matches!(self.get(number), Ok(false)))
    }

    /// Count of clear bits over all valid resource numbers
    pub fn free_count(&self) -> u32 {
        (1..=self.count)
            .filter(|&number| matches!(self.get(number), Ok(false)))
            .count() as u32
    }

    /// Load bitmap from block device
    pub(crate) fn load<D: Read + Seek>(&mut self, block_device: &mut D) -> Result<(), Error> {
        block_device.seek(SeekFrom::Start(self.offset()))?;
        block_device.read_exact(&mut self.bitfield)?;
        Ok(())
    }

    /// Flush bitmap to block device
    pub(crate) fn flush<D: Write + Seek>(&self, block_device: &mut D) -> Result<(), Error> {
        block_device.seek(SeekFrom::Start(self.offset()))?;
        block_device.write_all(&self.bitfield)?;
        Ok(())
    }

    fn offset(&self) -> u64 {
        self.position as u64 * BLOCK_SIZE as u64
    }
}

impl AsBitmap for Inode {
    const RESOURCE: &'static str = "inode";
}

impl Bitmap<Inode> {
    pub fn new(superblock: &Superblock, group: &GroupDescriptor) -> Self {
        Self::empty(superblock.inodes_count, group.inode_bitmap)
    }
}

impl Bitmap<Block> {
    pub fn new(superblock: &Superblock, group: &GroupDescriptor) -> Self {
        Self::empty(superblock.blocks_count, group.block_bitmap)
    }
}

impl<T: AsBitmap> Display for Bitmap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bitmap:", T::RESOURCE)?;
        for number in 1..=self.count {
            if (number - 1) % BITS_IN_BYTE == 0 {
                write!(f, " ")?;
            }
            let bit = matches!(self.get(number), Ok(true));
            write!(f, "{}", bit as u8)?;
        }
        Ok(())
    }
}
