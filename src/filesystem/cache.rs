use std::collections::BTreeMap;

use crate::structs::{Block, Inode};

/// Write-back cache of inodes and blocks touched during a session
#[derive(Debug, Default)]
pub struct Cache {
    pub(super) inodes: BTreeMap<u32, CacheLine<Inode>>,
    pub(super) blocks: BTreeMap<u32, CacheLine<Block>>,
}

#[derive(Debug)]
pub struct CacheLine<T: Clone> {
    pub(super) value: T,
    pub(super) modified: bool,
}

impl Cache {
    pub fn get_inode(&self, index: u32) -> Option<Inode> {
        self.inodes.get(&index).map(|line| line.value)
    }

    pub fn get_block(&self, index: u32) -> Option<Block> {
        self.blocks.get(&index).map(|line| line.value.clone())
    }

    /// Remember an inode as read from the device
    pub fn insert_inode(&mut self, index: u32, inode: Inode) {
        self.inodes.insert(index, CacheLine::new(&inode, false));
    }

    /// Remember a block as read from the device
    pub fn insert_block(&mut self, block: &Block) {
        let line = CacheLine::new(block, false);
        self.blocks.insert(block.index, line);
    }

    pub fn set_inode(&mut self, index: u32, inode: &Inode) {
        if let Some(line) = self.inodes.get_mut(&index) {
            line.update(inode);
        } else {
            self.inodes.insert(index, CacheLine::new(inode, true));
        }
    }

    pub fn set_block(&mut self, block: &Block) {
        if let Some(line) = self.blocks.get_mut(&block.index) {
            line.update(block);
        } else {
            self.blocks.insert(block.index, CacheLine::new(block, true));
        }
    }
}

impl<T: Clone + PartialEq> CacheLine<T> {
    pub fn new(value: &T, modified: bool) -> Self {
        Self {
            value: value.clone(),
            modified,
        }
    }

    pub fn update(&mut self, value: &T) {
        if &self.value != value {
            self.modified = true;
            self.value = value.clone()
        }
    }
}
