use std::io::Read;

use log::info;

use super::Filesystem;
use crate::filetypes::{timestamp_now, PathTokens};
use crate::structs::*;
use crate::Error;

const FILE_PERMISSIONS: u16 = 0o644;
const DIRECTORY_PERMISSIONS: u16 = 0o755;
const SYMLINK_PERMISSIONS: u16 = 0o777;

impl Filesystem {
    /// Parent directory and final name of a path that must not exist yet
    fn locate_new(&mut self, path: &str) -> Result<(u32, String), Error> {
        let tokens = PathTokens::parse(path)?;
        let Some(name) = tokens.last() else {
            return Err(Error::AlreadyExists(path.to_owned()));
        };
        let name = name.to_owned();
        let Some(parent) = self.resolve_dir(&tokens.parent())? else {
            return Err(Error::ParentNotFound(path.to_owned()));
        };
        if self.find_by_name(parent, name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists(path.to_owned()));
        }
        Ok((parent, name))
    }

    /// Copy everything `source` yields into a new regular file at `dst`
    pub fn create_file(&mut self, source: &mut dyn Read, dst: &str) -> Result<u32, Error> {
        let (parent, name) = self.locate_new(dst)?;
        let mut content = Vec::new();
        source.read_to_end(&mut content)?;
        let blocks = content.len().div_ceil(BLOCK_SIZE);
        if blocks > MAX_FILE_BLOCKS {
            return Err(Error::FileTooLarge);
        }
        let indirect = (blocks > DIRECT_BLOCKS) as u32;
        self.ensure_free(1, blocks as u32 + indirect)?;

        let index = self.acquire_inode(MODE_REGULAR | FILE_PERMISSIONS)?;
        self.insert_entry(index, parent, name.as_bytes(), FileType::RegularFile)?;
        for chunk in content.chunks(BLOCK_SIZE) {
            let number = self.append_block(index)?;
            let mut block = self.load_block(number, false)?;
            block.write_bytes(0, chunk)?;
            self.flush_block(&block)?;
        }
        let mut inode = self.load_inode(index)?;
        inode.size = content.len() as u32;
        self.flush_inode(index, &inode)?;
        info!(
            "Created {dst} as inode {index} holding {} bytes",
            content.len()
        );
        Ok(index)
    }

    /// Make `dst` a hard link to `src`, or a symbolic link holding `src` when
    /// `symbolic` is set
    pub fn create_link(&mut self, src: &str, dst: &str, symbolic: bool) -> Result<u32, Error> {
        let source = PathTokens::parse(src)?;
        let Some((target, kind)) = self.resolve(&source)? else {
            return Err(Error::NotFound(src.to_owned()));
        };
        let (parent, name) = self.locate_new(dst)?;

        if !symbolic {
            if kind == FileType::Directory || self.load_inode(target)?.is_directory() {
                return Err(Error::IsDirectory(src.to_owned()));
            }
            self.insert_entry(target, parent, name.as_bytes(), kind)?;
            info!("Linked {dst} to inode {target}");
            return Ok(target);
        }

        if src.len() > BLOCK_SIZE {
            return Err(Error::NameTooLong(src.to_owned()));
        }
        self.ensure_free(1, 1)?;
        let index = self.acquire_inode(MODE_SYMLINK | SYMLINK_PERMISSIONS)?;
        self.insert_entry(index, parent, name.as_bytes(), FileType::Symlink)?;
        let number = self.append_block(index)?;
        let mut block = self.load_block(number, false)?;
        block.write_bytes(0, src.as_bytes())?;
        self.flush_block(&block)?;
        let mut inode = self.load_inode(index)?;
        inode.size = src.len() as u32;
        self.flush_inode(index, &inode)?;
        info!("Created symbolic link {dst} -> {src} as inode {index}");
        Ok(index)
    }

    /// Create an empty directory at `path`
    pub fn create_directory(&mut self, path: &str) -> Result<u32, Error> {
        let (parent, name) = self.locate_new(path)?;
        self.ensure_free(1, 1)?;
        let index = self.acquire_inode(MODE_DIRECTORY | DIRECTORY_PERMISSIONS)?;
        self.insert_entry(index, parent, name.as_bytes(), FileType::Directory)?;
        self.insert_entry(index, index, b".", FileType::Directory)?;
        self.insert_entry(parent, index, b"..", FileType::Directory)?;
        self.group.used_dirs_count = self.group.used_dirs_count.saturating_add(1);
        info!("Created directory {path} as inode {index}");
        Ok(index)
    }

    /// Unlink the file or symbolic link at `path`, releasing its inode and
    /// blocks once no link is left
    pub fn remove(&mut self, path: &str) -> Result<(), Error> {
        let tokens = PathTokens::parse(path)?;
        let Some((index, kind)) = self.resolve(&tokens)? else {
            return Err(Error::NotFound(path.to_owned()));
        };
        if kind == FileType::Directory || self.load_inode(index)?.is_directory() {
            return Err(Error::IsDirectory(path.to_owned()));
        }
        let Some(parent) = self.resolve_dir(&tokens.parent())? else {
            return Err(Error::ParentNotFound(path.to_owned()));
        };
        let Some(name) = tokens.last() else {
            return Err(Error::InvalidPath(path.to_owned()));
        };
        self.delete_entry(index, parent, name.as_bytes())?;

        let mut inode = self.load_inode(index)?;
        if inode.links_count == 0 {
            for block in self.occupied_blocks(index)? {
                self.release_block(block)?;
            }
            self.release_inode(index)?;
            inode.dtime = timestamp_now();
            self.flush_inode(index, &inode)?;
        }
        info!(
            "Removed {path}, inode {index} has {} links left",
            inode.links_count
        );
        Ok(())
    }

    /// Bring back a removed file or symbolic link at `path` while its entry,
    /// inode and blocks are still unclaimed
    pub fn restore(&mut self, path: &str) -> Result<u32, Error> {
        let tokens = PathTokens::parse(path)?;
        let Some(name) = tokens.last() else {
            return Err(Error::InvalidPath(path.to_owned()));
        };
        let Some(parent) = self.resolve_dir(&tokens.parent())? else {
            return Err(Error::ParentNotFound(path.to_owned()));
        };
        if self.find_by_name(parent, name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists(path.to_owned()));
        }
        let Some(deleted) = self.find_deleted(parent, name.as_bytes())? else {
            return Err(Error::DeletedNotFound(path.to_owned()));
        };
        let index = deleted.inode();
        if deleted.file_type() == FileType::Directory || self.load_inode(index)?.is_directory() {
            return Err(Error::IsDirectory(path.to_owned()));
        }
        if self.inodes.get(index)? {
            return Err(Error::Conflict(format!("inode of {path} is already taken")));
        }
        // The pointer table is only trusted while its block is still free
        if let Some(indirect) = self.indirect_block(index)? {
            if self.blocks.get(indirect)? {
                return Err(Error::Conflict(format!(
                    "indirect block {indirect} of {path} is already taken"
                )));
            }
        }
        let blocks = self.occupied_blocks(index)?;
        for &block in &blocks {
            if self.blocks.get(block)? {
                return Err(Error::Conflict(format!(
                    "block {block} of {path} is already taken"
                )));
            }
        }

        self.restore_entry(parent, name.as_bytes())?;
        let mut inode = self.load_inode(index)?;
        if inode.links_count > 0 {
            for block in blocks {
                self.restore_block(block)?;
            }
            self.restore_inode(index)?;
            inode.dtime = 0;
            self.flush_inode(index, &inode)?;
        }
        info!("Restored {path} as inode {index}");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::tests::*;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn read_file(fs: &mut Filesystem, index: u32) -> Vec<u8> {
        let size = fs.load_inode(index).unwrap().size as usize;
        let mut data = Vec::new();
        for block in fs.data_blocks(index).unwrap() {
            data.extend_from_slice(&fs.load_block(block, false).unwrap().data);
        }
        data.truncate(size);
        data
    }

    fn resolve(fs: &mut Filesystem, path: &str) -> Option<(u32, FileType)> {
        fs.resolve(&PathTokens::parse(path).unwrap()).unwrap()
    }

    fn copy(fs: &mut Filesystem, len: usize, path: &str) -> Result<u32, Error> {
        fs.create_file(&mut content(len).as_slice(), path)
    }

    #[test]
    fn copy_small_file() {
        let mut fs = fresh();
        let data = content(1500);
        let free = fs.superblock.free_blocks_count;
        let index = fs.create_file(&mut data.as_slice(), "/foo.txt").unwrap();
        let mut fs = reopen(fs);
        let found = resolve(&mut fs, "/foo.txt");
        assert_eq![found, Some((index, FileType::RegularFile))];
        let inode = fs.load_inode(index).unwrap();
        assert_eq![inode.size, 1500];
        assert_eq![inode.links_count, 1];
        assert_eq![inode.kind(), FileType::RegularFile];
        assert_eq![fs.data_blocks(index).unwrap().len(), 2];
        assert_eq![inode.indirect(), None];
        assert_eq![fs.superblock.free_blocks_count, free - 2];
        assert_eq![read_file(&mut fs, index), data];
        assert_counters_consistent(&fs);
        assert_directories_tile(&mut fs);
    }

    #[test]
    fn copy_file_through_indirect_block() {
        let mut fs = fresh();
        let data = content(20 * BLOCK_SIZE + 7);
        let free = fs.superblock.free_blocks_count;
        let path = "/lost+found/big";
        let index = fs.create_file(&mut data.as_slice(), path).unwrap();
        assert_eq![fs.superblock.free_blocks_count, free - 22];
        let inode = fs.load_inode(index).unwrap();
        assert_eq![inode.blocks, 22 * 2];
        assert_eq![read_file(&mut fs, index), data];
        assert_eq![fs.check().unwrap().total(), 0];
    }

    #[test]
    fn copy_rejections() {
        let mut fs = fresh();
        copy(&mut fs, 1, "/a").unwrap();
        let copied = copy(&mut fs, 1, "/a");
        assert![matches![copied, Err(Error::AlreadyExists(_))]];
        let copied = copy(&mut fs, 1, "/missing/a");
        assert![matches![copied, Err(Error::ParentNotFound(_))]];
        let copied = copy(&mut fs, 1, "/a/b");
        assert![matches![copied, Err(Error::ParentNotFound(_))]];
        assert![matches![copy(&mut fs, 1, "a"), Err(Error::InvalidPath(_))]];
        let free = fs.superblock.free_blocks_count;
        let copied = copy(&mut fs, 200 * BLOCK_SIZE, "/huge");
        assert![matches![copied, Err(Error::NoSpace(_))]];
        assert_eq![fs.superblock.free_blocks_count, free];
        let copied = copy(&mut fs, (MAX_FILE_BLOCKS + 1) * BLOCK_SIZE, "/huge");
        assert![matches![copied, Err(Error::FileTooLarge)]];
        assert_eq![resolve(&mut fs, "/huge"), None];
    }

    #[test]
    fn make_directory() {
        let mut fs = fresh();
        let free = fs.superblock.free_blocks_count;
        let dirs = fs.group.used_dirs_count;
        let index = fs.create_directory("/bar").unwrap();
        assert_eq![fs.superblock.free_blocks_count, free - 1];
        assert_eq![fs.group.used_dirs_count, dirs + 1];
        let children = fs.list(index).unwrap();
        assert_eq![children.len(), 2];
        assert_eq![children[0].name(), b"."];
        assert_eq![children[0].inode(), index];
        assert_eq![children[1].name(), b".."];
        assert_eq![children[1].inode(), ROOT_INODE];
        assert_eq![fs.load_inode(index).unwrap().links_count, 2];
        assert_eq![fs.load_inode(ROOT_INODE).unwrap().links_count, 4];

        fs.create_directory("/bar/baz").unwrap();
        let made = fs.create_directory("/bar");
        assert![matches![made, Err(Error::AlreadyExists(_))]];
        let made = fs.create_directory("/");
        assert![matches![made, Err(Error::AlreadyExists(_))]];
        let mut fs = reopen(fs);
        let found = resolve(&mut fs, "/bar/baz").map(|found| found.1);
        assert_eq![found, Some(FileType::Directory)];
        assert_counters_consistent(&fs);
        assert_directories_tile(&mut fs);
        assert_eq![fs.check().unwrap().total(), 0];
    }

    #[test]
    fn missing_parents_are_reported() {
        let mut fs = fresh();
        let file = copy(&mut fs, 1, "/file").unwrap();
        let free = fs.superblock.free_inodes_count;
        let made = fs.create_directory("/missing/dir");
        assert![matches![made, Err(Error::ParentNotFound(_))]];
        let made = fs.create_directory("/file/dir");
        assert![matches![made, Err(Error::ParentNotFound(_))]];
        let linked = fs.create_link("/file", "/missing/link", false);
        assert![matches![linked, Err(Error::ParentNotFound(_))]];
        let linked = fs.create_link("/file", "/file/link", false);
        assert![matches![linked, Err(Error::ParentNotFound(_))]];
        let linked = fs.create_link("/file", "/file/link", true);
        assert![matches![linked, Err(Error::ParentNotFound(_))]];
        assert_eq![fs.superblock.free_inodes_count, free];
        assert_eq![fs.load_inode(file).unwrap().links_count, 1];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn symbolic_link() {
        let mut fs = fresh();
        copy(&mut fs, 10, "/foo.txt").unwrap();
        let free = fs.superblock.free_blocks_count;
        let index = fs.create_link("/foo.txt", "/link", true).unwrap();
        assert_eq![fs.superblock.free_blocks_count, free - 1];
        assert_eq![resolve(&mut fs, "/link"), Some((index, FileType::Symlink))];
        let inode = fs.load_inode(index).unwrap();
        assert_eq![inode.size, 8];
        assert_eq![inode.kind(), FileType::Symlink];
        let blocks = fs.data_blocks(index).unwrap();
        assert_eq![blocks.len(), 1];
        let block = fs.load_block(blocks[0], false).unwrap();
        assert_eq![block.read_bytes(0, 8).unwrap(), b"/foo.txt"];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn symbolic_link_remove_then_restore() {
        let mut fs = fresh();
        copy(&mut fs, 1, "/x").unwrap();
        let index = fs.create_link("/x", "/l", true).unwrap();
        let free = fs.superblock.free_blocks_count;

        fs.remove("/l").unwrap();
        assert_eq![resolve(&mut fs, "/l"), None];
        assert![!fs.inodes.get(index).unwrap()];
        assert_eq![fs.superblock.free_blocks_count, free + 1];
        assert_counters_consistent(&fs);

        let mut fs = reopen(fs);
        assert_eq![fs.restore("/l").unwrap(), index];
        assert_eq![resolve(&mut fs, "/l"), Some((index, FileType::Symlink))];
        let inode = fs.load_inode(index).unwrap();
        assert_eq![inode.kind(), FileType::Symlink];
        assert_eq![inode.size, 2];
        assert_eq![inode.links_count, 1];
        assert_eq![inode.dtime, 0];
        assert_eq![read_file(&mut fs, index), b"/x"];
        assert_eq![fs.superblock.free_blocks_count, free];
        assert_counters_consistent(&fs);
        assert_eq![fs.check().unwrap().total(), 0];
    }

    #[test]
    fn hard_link() {
        let mut fs = fresh();
        let file = copy(&mut fs, 10, "/foo.txt").unwrap();
        let inodes = fs.superblock.free_inodes_count;
        let linked = fs.create_link("/foo.txt", "/lost+found/same", false);
        assert_eq![linked.unwrap(), file];
        assert_eq![fs.superblock.free_inodes_count, inodes];
        assert_eq![fs.load_inode(file).unwrap().links_count, 2];
        let found = resolve(&mut fs, "/lost+found/same");
        assert_eq![found, Some((file, FileType::RegularFile))];

        let linked = fs.create_link("/lost+found", "/dir", false);
        assert![matches![linked, Err(Error::IsDirectory(_))]];
        let linked = fs.create_link("/nothing", "/dir", false);
        assert![matches![linked, Err(Error::NotFound(_))]];
        let linked = fs.create_link("/foo.txt", "/lost+found/same", true);
        assert![matches![linked, Err(Error::AlreadyExists(_))]];

        fs.remove("/foo.txt").unwrap();
        assert![fs.inodes.get(file).unwrap()];
        assert_eq![fs.load_inode(file).unwrap().links_count, 1];
        assert_eq![fs.load_inode(file).unwrap().dtime, 0];
        assert![matches![fs.restore("/foo.txt"), Err(Error::Conflict(_))]];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn hard_links_in_one_directory() {
        let mut fs = fresh();
        let file = copy(&mut fs, 6, "/a").unwrap();
        fs.create_link("/a", "/b", false).unwrap();
        assert_eq![fs.load_inode(file).unwrap().links_count, 2];

        fs.remove("/b").unwrap();
        assert_eq![resolve(&mut fs, "/a"), Some((file, FileType::RegularFile))];
        assert_eq![resolve(&mut fs, "/b"), None];
        let inode = fs.load_inode(file).unwrap();
        assert_eq![inode.links_count, 1];
        assert_eq![inode.dtime, 0];
        assert![fs.inodes.get(file).unwrap()];
        assert_eq![read_file(&mut fs, file), content(6)];
        assert_directories_tile(&mut fs);

        fs.remove("/a").unwrap();
        assert_eq![resolve(&mut fs, "/a"), None];
        assert![!fs.inodes.get(file).unwrap()];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn remove_then_restore() {
        let mut fs = fresh();
        let data = content(14 * BLOCK_SIZE);
        let index = fs.create_file(&mut data.as_slice(), "/foo.txt").unwrap();
        copy(&mut fs, 3, "/after").unwrap();
        let before = fs.load_inode(index).unwrap();
        let free_blocks = fs.superblock.free_blocks_count;

        fs.remove("/foo.txt").unwrap();
        assert_eq![resolve(&mut fs, "/foo.txt"), None];
        assert![!fs.inodes.get(index).unwrap()];
        assert_eq![fs.superblock.free_blocks_count, free_blocks + 15];
        assert_ne![fs.load_inode(index).unwrap().dtime, 0];
        assert_counters_consistent(&fs);
        assert_directories_tile(&mut fs);

        let mut fs = reopen(fs);
        assert_eq![fs.restore("/foo.txt").unwrap(), index];
        let found = resolve(&mut fs, "/foo.txt");
        assert_eq![found, Some((index, FileType::RegularFile))];
        let after = fs.load_inode(index).unwrap();
        assert_eq![after.links_count, before.links_count];
        assert_eq![after.dtime, 0];
        assert_eq![after.size, before.size];
        assert_eq![read_file(&mut fs, index), data];
        assert_eq![fs.superblock.free_blocks_count, free_blocks];
        assert_counters_consistent(&fs);
        assert_directories_tile(&mut fs);
        assert_eq![fs.check().unwrap().total(), 0];
        let restored = fs.restore("/foo.txt");
        assert![matches![restored, Err(Error::AlreadyExists(_))]];
    }

    #[test]
    fn restore_after_reuse_fails_cleanly() {
        let mut fs = fresh();
        copy(&mut fs, 2000, "/first").unwrap();
        copy(&mut fs, 10, "/second").unwrap();
        fs.remove("/first").unwrap();
        // takes the released inode and its first block
        copy(&mut fs, 10, "/lost+found/new").unwrap();
        let free = fs.superblock.free_blocks_count;
        assert![matches![fs.restore("/first"), Err(Error::Conflict(_))]];
        assert_eq![fs.superblock.free_blocks_count, free];
        assert_eq![resolve(&mut fs, "/first"), None];

        let third = copy(&mut fs, 10, "/third").unwrap();
        fs.remove("/second").unwrap();
        fs.remove("/third").unwrap();
        // takes the inode of /second and the block of /third
        copy(&mut fs, 2000, "/lost+found/again").unwrap();
        assert![!fs.inodes.get(third).unwrap()];
        assert![matches![fs.restore("/third"), Err(Error::Conflict(_))]];
        assert![!fs.inodes.get(third).unwrap()];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn reused_indirect_block_is_a_conflict() {
        let mut fs = fresh();
        let index = copy(&mut fs, 14 * BLOCK_SIZE, "/foo.txt").unwrap();
        fs.remove("/foo.txt").unwrap();
        let indirect = fs.load_inode(index).unwrap().indirect().unwrap();
        // someone else now keeps unrelated bytes there
        fs.restore_block(indirect).unwrap();
        let mut table = fs.load_block(indirect, false).unwrap();
        table.data.fill(0xff);
        fs.flush_block(&table).unwrap();
        let free = fs.superblock.free_blocks_count;

        let restored = fs.restore("/foo.txt");
        assert![matches![restored, Err(Error::Conflict(_))]];
        assert_eq![resolve(&mut fs, "/foo.txt"), None];
        assert![!fs.inodes.get(index).unwrap()];
        assert_eq![fs.superblock.free_blocks_count, free];
        assert_counters_consistent(&fs);
    }

    #[test]
    fn remove_rejections() {
        let mut fs = fresh();
        let removed = fs.remove("/lost+found");
        assert![matches![removed, Err(Error::IsDirectory(_))]];
        assert![matches![fs.remove("/"), Err(Error::IsDirectory(_))]];
        assert![matches![fs.remove("/ghost"), Err(Error::NotFound(_))]];
        let restored = fs.restore("/ghost");
        assert![matches![restored, Err(Error::DeletedNotFound(_))]];
        let restored = fs.restore("/ghost/file");
        assert![matches![restored, Err(Error::ParentNotFound(_))]];
        let restored = fs.restore("/lost+found");
        assert![matches![restored, Err(Error::AlreadyExists(_))]];
    }

    #[test]
    fn deleted_directories_stay_deleted() {
        let mut fs = fresh();
        fs.create_directory("/gone").unwrap();
        copy(&mut fs, 1, "/kept").unwrap();
        let gone = resolve(&mut fs, "/gone").unwrap().0;
        fs.delete_entry(gone, ROOT_INODE, b"gone").unwrap();
        assert![matches![fs.restore("/gone"), Err(Error::IsDirectory(_))]];
    }
}
