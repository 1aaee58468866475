use std::fmt::Display;
use std::io::SeekFrom;

use bytemuck::Pod;

use super::*;

impl AsBitmap for Block {
    const RESOURCE: &'static str = "block";
}

impl Block {
    /// Zero-initialized block with index
    pub fn with_index(index: u32) -> Self {
        Self {
            index,
            data: vec![0; BLOCK_SIZE],
        }
    }

    fn range(&self, position: usize, length: usize) -> Result<std::ops::Range<usize>, Error> {
        match position.checked_add(length) {
            Some(end) if end <= self.data.len() => Ok(position..end),
            _ => Err(Error::OutOfBounds),
        }
    }

    /// Deserialize any plain data stored at `position`
    pub fn read<T: Pod>(&self, position: usize) -> Result<T, Error> {
        let range = self.range(position, std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(&self.data[range]))
    }

    /// Serialize any plain data to bytes at `position`
    pub fn write<T: Pod>(&mut self, position: usize, data: &T) -> Result<(), Error> {
        let data_raw = bytemuck::bytes_of(data);
        let range = self.range(position, data_raw.len())?;
        self.data[range].copy_from_slice(data_raw);
        Ok(())
    }

    pub fn read_bytes(&self, position: usize, length: usize) -> Result<&[u8], Error> {
        let range = self.range(position, length)?;
        Ok(&self.data[range])
    }

    pub fn write_bytes(&mut self, position: usize, data: &[u8]) -> Result<(), Error> {
        let range = self.range(position, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    /// Block number stored in pointer slot `slot` of an indirect block
    pub fn pointer(&self, slot: usize) -> Result<u32, Error> {
        self.read::<u32>(slot * std::mem::size_of::<u32>())
    }

    pub fn set_pointer(&mut self, slot: usize, value: u32) -> Result<(), Error> {
        self.write(slot * std::mem::size_of::<u32>(), &value)
    }
}

impl PermanentIndexed for Block {
    fn position(superblock: &Superblock, _: &GroupDescriptor, index: u32) -> Result<u64, Error> {
        if index == 0 || index >= superblock.blocks_count {
            return Err(Error::OutOfBounds);
        }
        Ok(index as u64 * BLOCK_SIZE as u64)
    }

    fn load<D: Read + Seek>(
        block_device: &mut D,
        superblock: &Superblock,
        group: &GroupDescriptor,
        index: u32,
    ) -> Result<Self, Error> {
        let position = Self::position(superblock, group, index)?;
        block_device.seek(SeekFrom::Start(position))?;
        let mut block_raw = vec![0u8; BLOCK_SIZE];
        block_device.read_exact(&mut block_raw)?;
        Ok(Self {
            data: block_raw,
            index,
        })
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
        block_device.write_all(&self.data)?;
        Ok(())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Block {}:", self.index)?;
        for (row, chunk) in self.data.chunks(32).enumerate() {
            if chunk.iter().all(|&byte| byte == 0) {
                continue;
            }
            write!(f, "{:04x}:", row * 32)?;
            for byte in chunk {
                write!(f, " {byte:02x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_is_bounds_checked() {
        let mut block = Block::with_index(7);
        let header = DirEntryHeader {
            inode: 12,
            rec_len: 1012,
            name_len: 3,
            file_type: FileType::RegularFile.tag(),
        };
        block.write(12, &header).unwrap();
        assert_eq![&block.data[12..16], &12u32.to_le_bytes()];
        assert_eq![block.read::<DirEntryHeader>(12).unwrap(), header];
        assert![block.read::<DirEntryHeader>(BLOCK_SIZE - 4).is_err()];
        assert![block.write_bytes(BLOCK_SIZE - 1, b"ab").is_err()];
        assert![block.read_bytes(usize::MAX, 2).is_err()];
    }

    #[test]
    fn pointer_slots() {
        let mut block = Block::with_index(30);
        block.set_pointer(0, 55).unwrap();
        block.set_pointer(POINTERS_PER_BLOCK - 1, 77).unwrap();
        assert_eq![block.pointer(0).unwrap(), 55];
        assert_eq![block.pointer(1).unwrap(), 0];
        assert_eq![block.pointer(POINTERS_PER_BLOCK - 1).unwrap(), 77];
        assert![block.pointer(POINTERS_PER_BLOCK).is_err()];
    }
}
