use std::fmt::Display;
use std::io::SeekFrom;

use super::*;

impl Inode {
    /// Freshly allocated inode of the given type, no links and no blocks
    pub fn new(mode: u16, now: u32) -> Self {
        Self {
            mode,
            atime: now,
            ctime: now,
            mtime: now,
            osd1: 1,
            ..Self::zeroed()
        }
    }

    pub fn kind(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == FileType::Directory
    }

    /// Pointer stored in the single indirect slot, if any
    pub fn indirect(&self) -> Option<u32> {
        match self.block[INDIRECT_SLOT] {
            0 => None,
            block => Some(block),
        }
    }
}

impl PermanentIndexed for Inode {
    fn position(
        superblock: &Superblock,
        group: &GroupDescriptor,
        index: u32,
    ) -> Result<u64, Error> {
        if index == 0 || index > superblock.inodes_count {
            return Err(Error::OutOfBounds);
        }
        Ok(group.inode_table as u64 * BLOCK_SIZE as u64
            + (index as u64 - 1) * superblock.inode_size() as u64)
    }

    fn load<D: Read + Seek>(
        block_device: &mut D,
        superblock: &Superblock,
        group: &GroupDescriptor,
        index: u32,
    ) -> Result<Self, Error> {
        let position = Self::position(superblock, group, index)?;
        block_device.seek(SeekFrom::Start(position))?;
        let mut inode_raw = [0u8; std::mem::size_of::<Self>()];
        block_device.read_exact(&mut inode_raw)?;
        Ok(bytemuck::pod_read_unaligned(&inode_raw))
    }

    fn flush<D: Write + Seek>(
        &self,
        block_device: &mut D,
        superblock: &Superblock,
        group: &GroupDescriptor,
        index: u32,
    ) -> Result<(), Error> {
        let position = Self::position(superblock, group, index)?;
        block_device.seek(SeekFrom::Start(position))?;
        block_device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }
}

impl Display for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "type: {} size: {} links: {} blocks: {} dtime: {}",
            self.kind().symbol(),
            self.size,
            self.links_count,
            self.blocks,
            self.dtime
        )?;
        write!(f, "Blocks:")?;
        for block in self.block.iter().take_while(|&&block| block != 0) {
            write!(f, " {block}")?;
        }
        Ok(())
    }
}
