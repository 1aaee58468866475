use log::debug;

use crate::filesystem::Filesystem;
use crate::structs::*;
use crate::Error;

const SECTORS_PER_BLOCK: u32 = (BLOCK_SIZE / SECTOR_SIZE) as u32;

impl Filesystem {
    /// Physical block holding logical block `position` of inode `index`,
    /// zero when it is not allocated
    pub fn block_for(&mut self, index: u32, position: usize) -> Result<u32, Error> {
        let inode = self.load_inode(index)?;
        if position < DIRECT_BLOCKS {
            return Ok(inode.block[position]);
        }
        if position >= MAX_FILE_BLOCKS {
            return Ok(0);
        }
        match inode.indirect() {
            Some(indirect) => self
                .load_block(indirect, false)?
                .pointer(position - DIRECT_BLOCKS),
            None => Ok(0),
        }
    }

    /// Data blocks of inode `index` in logical order, up to the first hole
    pub fn data_blocks(&mut self, index: u32) -> Result<Vec<u32>, Error> {
        let inode = self.load_inode(index)?;
        let mut blocks = Vec::new();
        for &block in &inode.block[..DIRECT_BLOCKS] {
            if block == 0 {
                return Ok(blocks);
            }
            blocks.push(block);
        }
        if let Some(indirect) = inode.indirect() {
            let table = self.load_block(indirect, false)?;
            for slot in 0..POINTERS_PER_BLOCK {
                match table.pointer(slot)? {
                    0 => break,
                    block => blocks.push(block),
                }
            }
        }
        Ok(blocks)
    }

    /// Indirect block of inode `index`, counted only once every direct slot is used
    pub fn indirect_block(&mut self, index: u32) -> Result<Option<u32>, Error> {
        let inode = self.load_inode(index)?;
        if inode.block[..DIRECT_BLOCKS].contains(&0) {
            return Ok(None);
        }
        Ok(inode.indirect())
    }

    /// Every block owned by inode `index`: data blocks, then the indirect block
    pub fn occupied_blocks(&mut self, index: u32) -> Result<Vec<u32>, Error> {
        let mut blocks = self.data_blocks(index)?;
        blocks.extend(self.indirect_block(index)?);
        Ok(blocks)
    }

    /// Most recently appended data block of inode `index`
    pub fn last_used_block(&mut self, index: u32) -> Result<Option<u32>, Error> {
        let inode = self.load_inode(index)?;
        let direct = &inode.block[..DIRECT_BLOCKS];
        match direct.iter().position(|&block| block == 0) {
            Some(0) => return Ok(None),
            Some(slot) => return Ok(Some(direct[slot - 1])),
            None => {}
        }
        let mut last = direct[DIRECT_BLOCKS - 1];
        if let Some(indirect) = inode.indirect() {
            let table = self.load_block(indirect, false)?;
            for slot in 0..POINTERS_PER_BLOCK {
                match table.pointer(slot)? {
                    0 => break,
                    block => last = block,
                }
            }
        }
        Ok(Some(last))
    }

    /// Allocate a new data block at the end of inode `index` and grow its size
    /// and sector count by one block
    pub fn append_block(&mut self, index: u32) -> Result<u32, Error> {
        let mut inode = self.load_inode(index)?;
        let number = if let Some(slot) = inode.block[..DIRECT_BLOCKS]
            .iter()
            .position(|&block| block == 0)
        {
            let number = self.acquire_block()?;
            inode.block[slot] = number;
            number
        } else {
            self.append_indirect(&mut inode)?
        };
        inode.size = inode.size.saturating_add(BLOCK_SIZE as u32);
        inode.blocks += SECTORS_PER_BLOCK;
        self.flush_inode(index, &inode)?;
        debug!("Appended block {number} to inode {index}");
        Ok(number)
    }

    fn append_indirect(&mut self, inode: &mut Inode) -> Result<u32, Error> {
        let (mut table, slot, fresh) = match inode.indirect() {
            Some(indirect) => {
                let table = self.load_block(indirect, false)?;
                let mut free_slot = None;
                for slot in 0..POINTERS_PER_BLOCK {
                    if table.pointer(slot)? == 0 {
                        free_slot = Some(slot);
                        break;
                    }
                }
                let Some(slot) = free_slot else {
                    return Err(Error::FileTooLarge);
                };
                (table, slot, false)
            }
            None => {
                let indirect = self.acquire_block()?;
                (self.load_block(indirect, false)?, 0, true)
            }
        };
        let number = match self.acquire_block() {
            Ok(number) => number,
            Err(e) => {
                if fresh {
                    self.release_block(table.index)?;
                }
                return Err(e);
            }
        };
        if fresh {
            inode.block[INDIRECT_SLOT] = table.index;
            inode.blocks += SECTORS_PER_BLOCK;
        }
        table.set_pointer(slot, number)?;
        self.flush_block(&table)?;
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use crate::filesystem::tests::*;
    use crate::structs::*;
    use crate::Error;

    #[test]
    fn direct_then_indirect() {
        let mut fs = fresh();
        let index = fs.acquire_inode(MODE_REGULAR).unwrap();
        assert_eq![fs.last_used_block(index).unwrap(), None];
        let mut appended = Vec::new();
        for _ in 0..14 {
            appended.push(fs.append_block(index).unwrap());
        }
        let inode = fs.load_inode(index).unwrap();
        assert_eq![inode.size, 14 * BLOCK_SIZE as u32];
        assert_eq![inode.blocks, 15 * 2];
        let indirect = inode.indirect().unwrap();
        assert![!appended.contains(&indirect)];
        for (position, &block) in appended.iter().enumerate() {
            assert_eq![fs.block_for(index, position).unwrap(), block];
        }
        assert_eq![fs.block_for(index, 14).unwrap(), 0];
        assert_eq![fs.block_for(index, MAX_FILE_BLOCKS).unwrap(), 0];
        assert_eq![fs.data_blocks(index).unwrap(), appended];
        assert_eq![fs.last_used_block(index).unwrap(), Some(appended[13])];
        assert_eq![fs.indirect_block(index).unwrap(), Some(indirect)];
        assert_eq![fs.occupied_blocks(index).unwrap().len(), 15];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn empty_indirect_falls_back_to_last_direct() {
        let mut fs = fresh();
        let index = fs.acquire_inode(MODE_REGULAR).unwrap();
        for _ in 0..DIRECT_BLOCKS {
            fs.append_block(index).unwrap();
        }
        let last_direct = fs.last_used_block(index).unwrap();
        let mut inode = fs.load_inode(index).unwrap();
        assert_eq![last_direct, Some(inode.block[DIRECT_BLOCKS - 1])];
        inode.block[INDIRECT_SLOT] = fs.acquire_block().unwrap();
        fs.flush_inode(index, &inode).unwrap();
        assert_eq![fs.last_used_block(index).unwrap(), last_direct];
        assert_eq![fs.data_blocks(index).unwrap().len(), DIRECT_BLOCKS];
    }

    #[test]
    fn capacity_is_capped() {
        let mut fs = fresh_sized(512, 32);
        let index = fs.acquire_inode(MODE_REGULAR).unwrap();
        for _ in 0..MAX_FILE_BLOCKS {
            fs.append_block(index).unwrap();
        }
        let free = fs.superblock.free_blocks_count;
        assert![matches!(fs.append_block(index), Err(Error::FileTooLarge))];
        assert_eq![fs.superblock.free_blocks_count, free];
        assert_eq![fs.data_blocks(index).unwrap().len(), MAX_FILE_BLOCKS];
    }

    #[test]
    fn failed_indirect_append_releases_indirect() {
        let mut fs = fresh();
        let index = fs.acquire_inode(MODE_REGULAR).unwrap();
        for _ in 0..DIRECT_BLOCKS {
            fs.append_block(index).unwrap();
        }
        while fs.superblock.free_blocks_count > 1 {
            fs.acquire_block().unwrap();
        }
        assert![matches!(fs.append_block(index), Err(Error::NoSpace(_)))];
        assert_eq![fs.superblock.free_blocks_count, 1];
        assert_eq![fs.load_inode(index).unwrap().indirect(), None];
        assert_counters_consistent(&fs);
    }
}
