use crate::structs::*;
use crate::Error;

use super::helpers::min_rec_len;
use super::DirectoryChild;

impl DirectoryChild {
    /// Decode the record starting at `offset` of `block`, checking that its
    /// header and name lie inside the block
    pub fn read(block: &Block, offset: usize) -> Result<Self, Error> {
        let header: DirEntryHeader = block.read(offset)?;
        let name = block
            .read_bytes(offset + DIRENT_HEADER_SIZE, header.name_len as usize)?
            .to_vec();
        Ok(Self {
            inode: header.inode,
            rec_len: header.rec_len,
            file_type: FileType::from_tag(header.file_type),
            name,
            offset,
        })
    }

    /// Encode header and name at the record's offset in `block`
    pub fn write(&self, block: &mut Block) -> Result<(), Error> {
        let header = DirEntryHeader {
            inode: self.inode,
            rec_len: self.rec_len,
            name_len: self.name.len() as u8,
            file_type: self.file_type.tag(),
        };
        block.write(self.offset, &header)?;
        block.write_bytes(self.offset + DIRENT_HEADER_SIZE, &self.name)
    }

    /// Smallest record length holding this record's name
    pub fn min_len(&self) -> usize {
        min_rec_len(self.name.len())
    }

    pub fn is_self_or_parent(&self) -> bool {
        self.name == b"." || self.name == b".."
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Overwrite only the type bits of the record at `offset`
pub(crate) fn set_type_tag(block: &mut Block, offset: usize, kind: FileType) -> Result<(), Error> {
    let mut header: DirEntryHeader = block.read(offset)?;
    header.file_type = (header.file_type & !DIRENT_TYPE_MASK) | kind.tag();
    block.write(offset, &header)
}

/// Overwrite only the record length of the record at `offset`
pub(crate) fn set_rec_len(block: &mut Block, offset: usize, rec_len: usize) -> Result<(), Error> {
    let mut header: DirEntryHeader = block.read(offset)?;
    header.rec_len = rec_len as u16;
    block.write(offset, &header)
}
