use std::collections::BTreeSet;
use std::fmt::Display;

use log::{info, warn};

use super::Filesystem;
use crate::filetypes::{read_children_lenient, set_type_tag, DirectoryChild};
use crate::structs::*;
use crate::Error;

/// Where a free-resource counter is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Superblock,
    Group,
}

/// One inconsistency found and fixed in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    FreeInodesCount { counter: Counter, off_by: u32 },
    FreeBlocksCount { counter: Counter, off_by: u32 },
    EntryType { inode: u32 },
    InodeBitmap { inode: u32 },
    DeletionTime { inode: u32 },
    BlockBitmap { inode: u32, blocks: u32 },
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub repairs: Vec<Repair>,
}

impl Repair {
    /// Number of inconsistencies this repair stands for
    pub fn count(&self) -> u32 {
        match self {
            Self::FreeInodesCount { off_by, .. } | Self::FreeBlocksCount { off_by, .. } => *off_by,
            Self::BlockBitmap { blocks, .. } => *blocks,
            _ => 1,
        }
    }
}

impl CheckReport {
    pub fn total(&self) -> u32 {
        self.repairs.iter().map(Repair::count).sum()
    }

    fn push(&mut self, repair: Repair) {
        info!("{repair}");
        self.repairs.push(repair);
    }
}

impl Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Superblock => write!(f, "superblock's"),
            Self::Group => write!(f, "block group's"),
        }
    }
}

impl Display for Repair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FreeInodesCount { counter, off_by } => write!(
                f,
                "Fixed: {counter} free inodes counter was off by {off_by} compared to the bitmap"
            ),
            Self::FreeBlocksCount { counter, off_by } => write!(
                f,
                "Fixed: {counter} free blocks counter was off by {off_by} compared to the bitmap"
            ),
            Self::EntryType { inode } => {
                write!(f, "Fixed: Entry type vs inode mismatch: inode [{inode}]")
            }
            Self::InodeBitmap { inode } => write!(f, "Fixed: inode [{inode}] not marked as in-use"),
            Self::DeletionTime { inode } => {
                write!(f, "Fixed: valid inode marked for deletion: [{inode}]")
            }
            Self::BlockBitmap { inode, blocks } => write!(
                f,
                "Fixed: {blocks} in-use data blocks not marked in data bitmap for inode: [{inode}]"
            ),
        }
    }
}

impl Display for CheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total() {
            0 => write!(f, "No file system inconsistencies detected!"),
            total => write!(f, "{total} file system inconsistencies repaired!"),
        }
    }
}

impl Filesystem {
    /// Reconcile free counters with the bitmaps, then walk the directory tree
    /// from the root and fix every referenced inode
    pub fn check(&mut self) -> Result<CheckReport, Error> {
        info!("Checking filesystem");
        let mut report = CheckReport::default();
        self.check_counters(&mut report);
        self.check_tree(&mut report)?;
        info!("Check finished with {} repairs", report.total());
        Ok(report)
    }

    fn check_counters(&mut self, report: &mut CheckReport) {
        let free_inodes = self.inodes.free_count();
        if self.superblock.free_inodes_count != free_inodes {
            let off_by = self.superblock.free_inodes_count.abs_diff(free_inodes);
            self.superblock.free_inodes_count = free_inodes;
            report.push(Repair::FreeInodesCount {
                counter: Counter::Superblock,
                off_by,
            });
        }
        if self.group.free_inodes_count as u32 != free_inodes {
            let off_by = (self.group.free_inodes_count as u32).abs_diff(free_inodes);
            self.group.free_inodes_count = free_inodes as u16;
            report.push(Repair::FreeInodesCount {
                counter: Counter::Group,
                off_by,
            });
        }
        let free_blocks = self.blocks.free_count();
        if self.superblock.free_blocks_count != free_blocks {
            let off_by = self.superblock.free_blocks_count.abs_diff(free_blocks);
            self.superblock.free_blocks_count = free_blocks;
            report.push(Repair::FreeBlocksCount {
                counter: Counter::Superblock,
                off_by,
            });
        }
        if self.group.free_blocks_count as u32 != free_blocks {
            let off_by = (self.group.free_blocks_count as u32).abs_diff(free_blocks);
            self.group.free_blocks_count = free_blocks as u16;
            report.push(Repair::FreeBlocksCount {
                counter: Counter::Group,
                off_by,
            });
        }
    }

    fn check_tree(&mut self, report: &mut CheckReport) -> Result<(), Error> {
        let mut pending = vec![ROOT_INODE];
        let mut visited = BTreeSet::from([ROOT_INODE]);
        while let Some(directory) = pending.pop() {
            let inode = self.load_inode(directory)?;
            for index in self.reachable_blocks(directory, &inode).0 {
                let mut block = self.load_block(index, false)?;
                let mut modified = false;
                for child in read_children_lenient(&block) {
                    if child.inode == 0 {
                        continue;
                    }
                    if child.inode > self.superblock.inodes_count {
                        warn!(
                            "Entry {} in directory {directory} points past the inode table",
                            child.name_lossy()
                        );
                        continue;
                    }
                    let kind = self.check_entry(&child, report)?;
                    if kind != FileType::Unknown && kind != child.file_type {
                        set_type_tag(&mut block, child.offset, kind)?;
                        modified = true;
                        report.push(Repair::EntryType { inode: child.inode });
                    }
                    if kind == FileType::Directory
                        && !child.is_self_or_parent()
                        && visited.insert(child.inode)
                    {
                        pending.push(child.inode);
                    }
                }
                if modified {
                    self.flush_block(&block)?;
                }
            }
        }
        Ok(())
    }

    /// Apply the inode rules to a referenced inode, returning its type
    fn check_entry(
        &mut self,
        child: &DirectoryChild,
        report: &mut CheckReport,
    ) -> Result<FileType, Error> {
        let index = child.inode;
        let mut inode = self.load_inode(index)?;
        let kind = inode.kind();
        if kind == FileType::Unknown {
            warn!("Inode {index} of {} has no known type", child.name_lossy());
        }
        if !self.inodes.get(index)? {
            self.mark_inode_used(index)?;
            report.push(Repair::InodeBitmap { inode: index });
        }
        if inode.dtime != 0 {
            inode.dtime = 0;
            self.flush_inode(index, &inode)?;
            report.push(Repair::DeletionTime { inode: index });
        }
        let (data, indirect) = self.reachable_blocks(index, &inode);
        let mut blocks = 0;
        for block in data.into_iter().chain(indirect) {
            if self.mark_block_used(block)? {
                blocks += 1;
            }
        }
        if blocks > 0 {
            report.push(Repair::BlockBitmap {
                inode: index,
                blocks,
            });
        }
        Ok(kind)
    }

    /// Data blocks and indirect block of an inode, skipping numbers outside the image
    fn reachable_blocks(&mut self, index: u32, inode: &Inode) -> (Vec<u32>, Option<u32>) {
        let blocks_count = self.superblock.blocks_count;
        let in_range = move |block: u32| block < blocks_count;
        let mut data = Vec::new();
        for &block in &inode.block[..DIRECT_BLOCKS] {
            if block == 0 {
                return (data, None);
            }
            if in_range(block) {
                data.push(block);
            } else {
                warn!("Inode {index} points at block {block} outside the image");
            }
        }
        let Some(indirect) = inode.indirect() else {
            return (data, None);
        };
        if !in_range(indirect) {
            warn!("Inode {index} has indirect block {indirect} outside the image");
            return (data, None);
        }
        let table = match self.load_block(indirect, false) {
            Ok(table) => table,
            Err(e) => {
                warn!("Cannot read indirect block {indirect} of inode {index}: {e}");
                return (data, Some(indirect));
            }
        };
        for slot in 0..POINTERS_PER_BLOCK {
            match table.pointer(slot) {
                Ok(0) | Err(_) => break,
                Ok(block) if in_range(block) => data.push(block),
                Ok(block) => warn!("Inode {index} points at block {block} outside the image"),
            }
        }
        (data, Some(indirect))
    }
}
