use log::{debug, warn};

use super::helpers::min_rec_len;
use super::{set_rec_len, DeletedEntry, DirectoryChild, FoundEntry};
use crate::filesystem::Filesystem;
use crate::structs::*;
use crate::Error;

/// Walk the record chain of a directory block.
/// Returns the records read before the chain ended or broke, and the
/// problem that broke it, if any.
fn walk_children(block: &Block) -> (Vec<DirectoryChild>, Option<Error>) {
    let mut children = Vec::new();
    let mut offset = 0;
    while offset < BLOCK_SIZE {
        let child = match DirectoryChild::read(block, offset) {
            Ok(child) => child,
            Err(_) => return (children, Some(malformed(block.index, offset))),
        };
        // Unused tail of a block nothing was written into yet
        if child.rec_len == 0 && child.inode == 0 {
            break;
        }
        let rec_len = child.rec_len as usize;
        if rec_len < DIRENT_HEADER_SIZE
            || offset + rec_len > BLOCK_SIZE
            || DIRENT_HEADER_SIZE + child.name.len() > rec_len
        {
            return (children, Some(malformed(block.index, offset)));
        }
        offset += rec_len;
        children.push(child);
    }
    (children, None)
}

fn malformed(block: u32, offset: usize) -> Error {
    Error::Corrupted(format!(
        "malformed directory record at {offset} in block {block}"
    ))
}

/// Every record of a directory block, in chain order
pub(crate) fn read_children(block: &Block) -> Result<Vec<DirectoryChild>, Error> {
    match walk_children(block) {
        (children, None) => Ok(children),
        (_, Some(e)) => Err(e),
    }
}

/// Records of a directory block up to the first malformed one
pub(crate) fn read_children_lenient(block: &Block) -> Vec<DirectoryChild> {
    let (children, problem) = walk_children(block);
    if let Some(e) = problem {
        warn!("Skipping rest of directory block {}: {e}", block.index);
    }
    children
}

pub(crate) fn check_name(name: &[u8]) -> Result<(), Error> {
    let shown = String::from_utf8_lossy(name);
    if name.is_empty() || name.contains(&b'/') {
        return Err(Error::InvalidPath(shown.into_owned()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::NameTooLong(shown.into_owned()));
    }
    Ok(())
}

/// Place `entry` into the free tail of `block`, either over an unused record
/// reaching the block end or into the slack of the last record.
/// Returns false when the tail is too short.
fn insert_in_block(block: &mut Block, entry: &DirectoryChild) -> Result<bool, Error> {
    let needed = entry.min_len();
    let mut offset = 0;
    while offset < BLOCK_SIZE {
        let header: DirEntryHeader = block.read(offset)?;
        let rec_len = header.rec_len as usize;
        if header.inode == 0 && (rec_len == 0 || offset + rec_len == BLOCK_SIZE) {
            let span = BLOCK_SIZE - offset;
            if span < needed {
                return Ok(false);
            }
            let placed = DirectoryChild {
                rec_len: span as u16,
                offset,
                ..entry.clone()
            };
            placed.write(block)?;
            return Ok(true);
        }
        if rec_len < DIRENT_HEADER_SIZE || offset + rec_len > BLOCK_SIZE {
            return Err(malformed(block.index, offset));
        }
        if offset + rec_len == BLOCK_SIZE {
            let own = min_rec_len(header.name_len as usize);
            if rec_len.saturating_sub(own) < needed {
                return Ok(false);
            }
            set_rec_len(block, offset, own)?;
            let placed = DirectoryChild {
                rec_len: (BLOCK_SIZE - offset - own) as u16,
                offset: offset + own,
                ..entry.clone()
            };
            placed.write(block)?;
            return Ok(true);
        }
        offset += rec_len;
    }
    Ok(false)
}

/// Absorbed record named `name` inside the span of `host`.
/// Stray bytes only count when their stored length could hold their name.
fn find_absorbed(
    block: &Block,
    host: &DirectoryChild,
    name: &[u8],
    inodes_count: u32,
) -> Option<(usize, DirectoryChild)> {
    let end = host.offset + host.rec_len as usize;
    let mut position = host.offset + host.min_len();
    while position + min_rec_len(name.len()) <= end {
        if let Ok(candidate) = DirectoryChild::read(block, position) {
            if candidate.inode != 0
                && candidate.inode <= inodes_count
                && candidate.rec_len as usize >= candidate.min_len()
                && candidate.name == name
            {
                return Some((end - position, candidate));
            }
        }
        position += 4;
    }
    None
}

impl Filesystem {
    /// Link inode `child` into directory `parent` under `name`
    pub fn insert_entry(
        &mut self,
        child: u32,
        parent: u32,
        name: &[u8],
        kind: FileType,
    ) -> Result<(), Error> {
        check_name(name)?;
        let entry = DirectoryChild {
            inode: child,
            rec_len: 0,
            file_type: kind,
            name: name.to_vec(),
            offset: 0,
        };
        let placed = match self.last_used_block(parent)? {
            Some(index) => {
                let mut block = self.load_block(index, false)?;
                let placed = insert_in_block(&mut block, &entry)?;
                if placed {
                    self.flush_block(&block)?;
                }
                placed
            }
            None => false,
        };
        if !placed {
            let index = self.append_block(parent)?;
            let mut block = self.load_block(index, false)?;
            if !insert_in_block(&mut block, &entry)? {
                return Err(malformed(index, 0));
            }
            self.flush_block(&block)?;
        }
        let mut inode = self.load_inode(child)?;
        inode.links_count = inode.links_count.saturating_add(1);
        self.flush_inode(child, &inode)?;
        debug!(
            "Inserted {} -> inode {child} into directory {parent}",
            entry.name_lossy()
        );
        Ok(())
    }

    /// Unlink record `name` pointing at `child` from directory `parent`.
    /// The record is absorbed by its predecessor and stays readable.
    /// The first record of a block has no predecessor: its inode number is
    /// zeroed instead, so it cannot be restored later.
    pub fn delete_entry(&mut self, child: u32, parent: u32, name: &[u8]) -> Result<(), Error> {
        for index in self.data_blocks(parent)? {
            let mut block = self.load_block(index, false)?;
            let children = read_children(&block)?;
            let Some(position) = children
                .iter()
                .position(|record| record.inode == child && record.name == name)
            else {
                continue;
            };
            let record = &children[position];
            if position == 0 {
                let mut header: DirEntryHeader = block.read(record.offset)?;
                header.inode = 0;
                block.write(record.offset, &header)?;
            } else {
                let previous = &children[position - 1];
                let merged = previous.rec_len as usize + record.rec_len as usize;
                set_rec_len(&mut block, previous.offset, merged)?;
            }
            self.flush_block(&block)?;
            let mut inode = self.load_inode(child)?;
            inode.links_count = inode.links_count.saturating_sub(1);
            self.flush_inode(child, &inode)?;
            debug!(
                "Deleted {} -> inode {child} from directory {parent}",
                record.name_lossy()
            );
            return Ok(());
        }
        Err(Error::NotFound(String::from_utf8_lossy(name).into_owned()))
    }

    /// First live record of directory `parent` called `name`
    pub fn find_by_name(&mut self, parent: u32, name: &[u8]) -> Result<Option<FoundEntry>, Error> {
        for index in self.data_blocks(parent)? {
            let block = self.load_block(index, false)?;
            for child in read_children(&block)? {
                if child.inode != 0 && child.name == name {
                    return Ok(Some(FoundEntry { child }));
                }
            }
        }
        Ok(None)
    }

    /// Absorbed record called `name` still readable inside directory `parent`
    pub fn find_deleted(
        &mut self,
        parent: u32,
        name: &[u8],
    ) -> Result<Option<DeletedEntry>, Error> {
        let inodes_count = self.superblock.inodes_count;
        for index in self.data_blocks(parent)? {
            let block = self.load_block(index, false)?;
            for host in read_children(&block)? {
                if let Some((rec_len, child)) = find_absorbed(&block, &host, name, inodes_count) {
                    return Ok(Some(DeletedEntry {
                        block: index,
                        host: host.offset,
                        child,
                        rec_len,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Split an absorbed record called `name` back out of its host
    pub fn restore_entry(&mut self, parent: u32, name: &[u8]) -> Result<DeletedEntry, Error> {
        let Some(deleted) = self.find_deleted(parent, name)? else {
            let shown = String::from_utf8_lossy(name);
            return Err(Error::DeletedNotFound(shown.into_owned()));
        };
        let mut block = self.load_block(deleted.block, false)?;
        let host_len = deleted.child.offset - deleted.host;
        set_rec_len(&mut block, deleted.host, host_len)?;
        set_rec_len(&mut block, deleted.child.offset, deleted.rec_len)?;
        self.flush_block(&block)?;
        let mut inode = self.load_inode(deleted.inode())?;
        inode.links_count = inode.links_count.saturating_add(1);
        self.flush_inode(deleted.inode(), &inode)?;
        debug!(
            "Restored {} -> inode {} in directory {parent}",
            deleted.child.name_lossy(),
            deleted.inode()
        );
        Ok(deleted)
    }

    /// Live records of directory `parent`
    pub fn list(&mut self, parent: u32) -> Result<Vec<DirectoryChild>, Error> {
        let mut children = Vec::new();
        for index in self.data_blocks(parent)? {
            let block = self.load_block(index, false)?;
            let records = read_children(&block)?;
            children.extend(records.into_iter().filter(|child| child.inode != 0));
        }
        Ok(children)
    }
}
