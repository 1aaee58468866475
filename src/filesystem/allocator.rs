use log::{debug, warn};

use super::Filesystem;
use crate::filetypes::timestamp_now;
use crate::structs::*;
use crate::Error;

impl Filesystem {
    /// Get number of first free inode at or above the first usable one,
    /// mark it, and reset its record to a fresh inode of type `mode`
    pub(crate) fn acquire_inode(&mut self, mode: u16) -> Result<u32, Error> {
        if self.superblock.free_inodes_count == 0 {
            return Err(Error::NoSpace(Inode::RESOURCE));
        }
        let Some(index) = self.inodes.next_free(self.superblock.first_inode()) else {
            return Err(Error::NoSpace(Inode::RESOURCE));
        };
        debug!("Acquire inode {index}");
        self.mark_inode_used(index)?;
        self.flush_inode(index, &Inode::new(mode, timestamp_now()))?;
        Ok(index)
    }

    /// Get number of first free block, mark it and zero-fill it
    pub(crate) fn acquire_block(&mut self) -> Result<u32, Error> {
        if self.superblock.free_blocks_count == 0 {
            return Err(Error::NoSpace(Block::RESOURCE));
        }
        let Some(index) = self.blocks.next_free(1) else {
            return Err(Error::NoSpace(Block::RESOURCE));
        };
        if index >= self.superblock.blocks_count {
            return Err(Error::NoSpace(Block::RESOURCE));
        }
        debug!("Acquire block {index}");
        self.mark_block_used(index)?;
        self.load_block(index, true)?;
        Ok(index)
    }

    /// Release inode at index, leaving its record intact
    pub(crate) fn release_inode(&mut self, index: u32) -> Result<(), Error> {
        if !self.inodes.get(index)? {
            warn!("Inode {index} already free");
            return Ok(());
        }
        debug!("Release inode {index}");
        self.inodes.set(index, false)?;
        self.superblock.free_inodes_count = self.superblock.free_inodes_count.saturating_add(1);
        self.group.free_inodes_count = self.group.free_inodes_count.saturating_add(1);
        Ok(())
    }

    /// Release block at index, leaving its content intact
    pub(crate) fn release_block(&mut self, index: u32) -> Result<(), Error> {
        if !self.blocks.get(index)? {
            warn!("Block {index} already free");
            return Ok(());
        }
        debug!("Release block {index}");
        self.blocks.set(index, false)?;
        self.superblock.free_blocks_count = self.superblock.free_blocks_count.saturating_add(1);
        self.group.free_blocks_count = self.group.free_blocks_count.saturating_add(1);
        Ok(())
    }

    /// Mark a released inode as used again without touching its record
    pub(crate) fn restore_inode(&mut self, index: u32) -> Result<(), Error> {
        debug!("Restore inode {index}");
        if !self.mark_inode_used(index)? {
            warn!("Inode {index} already in use");
        }
        Ok(())
    }

    /// Mark a released block as used again without touching its content
    pub(crate) fn restore_block(&mut self, index: u32) -> Result<(), Error> {
        debug!("Restore block {index}");
        if !self.mark_block_used(index)? {
            warn!("Block {index} already in use");
        }
        Ok(())
    }

    /// Set inode bit and take it off the free counters; false if it was set
    pub(crate) fn mark_inode_used(&mut self, index: u32) -> Result<bool, Error> {
        if self.inodes.get(index)? {
            return Ok(false);
        }
        self.inodes.set(index, true)?;
        self.superblock.free_inodes_count = self.superblock.free_inodes_count.saturating_sub(1);
        self.group.free_inodes_count = self.group.free_inodes_count.saturating_sub(1);
        Ok(true)
    }

    /// Set block bit and take it off the free counters; false if it was set
    pub(crate) fn mark_block_used(&mut self, index: u32) -> Result<bool, Error> {
        if self.blocks.get(index)? {
            return Ok(false);
        }
        self.blocks.set(index, true)?;
        self.superblock.free_blocks_count = self.superblock.free_blocks_count.saturating_sub(1);
        self.group.free_blocks_count = self.group.free_blocks_count.saturating_sub(1);
        Ok(true)
    }

    /// Fail unless the bitmaps hold at least this many free inodes and blocks
    pub(crate) fn ensure_free(&self, inodes: u32, blocks: u32) -> Result<(), Error> {
        let first = self.superblock.first_inode();
        let free_inodes = (first..=self.superblock.inodes_count)
            .filter(|&index| matches!(self.inodes.get(index), Ok(false)))
            .count() as u32;
        if free_inodes < inodes {
            return Err(Error::NoSpace(Inode::RESOURCE));
        }
        let free_blocks = (1..self.superblock.blocks_count)
            .filter(|&index| matches!(self.blocks.get(index), Ok(false)))
            .count() as u32;
        if free_blocks < blocks {
            return Err(Error::NoSpace(Block::RESOURCE));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::filesystem::tests::*;
    use crate::structs::*;
    use crate::Error;

    #[test]
    fn acquire_and_release_inode() {
        let mut fs = fresh();
        let first = fs.acquire_inode(MODE_REGULAR).unwrap();
        assert_eq![first, 12];
        let second = fs.acquire_inode(MODE_REGULAR).unwrap();
        assert_eq![second, 13];
        assert![fs.release_inode(first).is_ok()];
        assert![fs.release_inode(first).is_ok()];
        assert_counters_consistent(&fs);
        assert_eq![fs.acquire_inode(MODE_SYMLINK).unwrap(), first];
        let inode = fs.load_inode(first).unwrap();
        assert_eq![inode.kind(), FileType::Symlink];
        assert_eq![inode.links_count, 0];
        assert_eq![inode.osd1, 1];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn acquire_decrements_by_one_and_zeroes() {
        let mut fs = fresh();
        let before = fs.superblock.free_blocks_count;
        let index = fs.acquire_block().unwrap();
        assert_eq![fs.superblock.free_blocks_count, before - 1];
        assert_eq![fs.group.free_blocks_count as u32, before - 1];
        let mut block = fs.load_block(index, false).unwrap();
        block.write_bytes(0, b"junk").unwrap();
        fs.flush_block(&block).unwrap();
        fs.release_block(index).unwrap();
        assert_eq![fs.load_block(index, false).unwrap().data[0], b'j'];
        let again = fs.acquire_block().unwrap();
        assert_eq![again, index];
        let block = fs.load_block(again, false).unwrap();
        assert![block.data.iter().all(|&b| b == 0)];
    }

    #[test]
    fn never_returns_a_used_number() {
        let mut fs = fresh();
        let mut seen = Vec::new();
        while let Ok(index) = fs.acquire_block() {
            assert![!seen.contains(&index)];
            seen.push(index);
        }
        assert_eq![fs.superblock.free_blocks_count, 0];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn exhaustion_leaves_state_unchanged() {
        let mut fs = fresh();
        while fs.acquire_inode(MODE_REGULAR).is_ok() {}
        let bitfield = fs.inodes.bitfield.clone();
        let counters = (fs.superblock.free_inodes_count, fs.group.free_inodes_count);
        let acquired = fs.acquire_inode(MODE_REGULAR);
        assert![matches!(acquired, Err(Error::NoSpace(_)))];
        assert_eq![fs.inodes.bitfield, bitfield];
        assert_eq![fs.superblock.free_inodes_count, counters.0];
        assert_eq![fs.group.free_inodes_count, counters.1];
    }

    #[test]
    fn zero_counter_fails_even_with_clear_bits() {
        let mut fs = fresh();
        fs.superblock.free_blocks_count = 0;
        let bitfield = fs.blocks.bitfield.clone();
        assert![matches!(fs.acquire_block(), Err(Error::NoSpace(_)))];
        assert_eq![fs.blocks.bitfield, bitfield];
    }

    #[test]
    fn restore_keeps_content() {
        let mut fs = fresh();
        let index = fs.acquire_inode(MODE_REGULAR).unwrap();
        let mut inode = fs.load_inode(index).unwrap();
        inode.size = 4242;
        fs.flush_inode(index, &inode).unwrap();
        fs.release_inode(index).unwrap();
        fs.restore_inode(index).unwrap();
        fs.restore_inode(index).unwrap();
        assert![fs.inodes.get(index).unwrap()];
        assert_eq![fs.load_inode(index).unwrap().size, 4242];
        assert_counters_consistent(&fs);
    }
}
