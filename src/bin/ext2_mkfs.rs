use std::fs::File;

use ext2fs::{cli, Error, Filesystem};

const USAGE: &str = "<image file name> <blocks> [inodes]";
const BLOCKS_PER_INODE: u32 = 4;

fn parse(value: &str) -> u32 {
    value.parse().unwrap_or_else(|_| cli::usage(USAGE))
}

fn format(image: &str, blocks: u32, inodes: u32) -> Result<(), Error> {
    let device = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    Filesystem::format(Box::new(device), blocks, inodes)?.close()?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (image, blocks, inodes) = match args.as_slice() {
        [image, blocks] => {
            let blocks = parse(blocks);
            (image, blocks, blocks / BLOCKS_PER_INODE)
        }
        [image, blocks, inodes] => (image, parse(blocks), parse(inodes)),
        _ => cli::usage(USAGE),
    };
    if let Err(e) = format(image, blocks, inodes) {
        cli::fail(e);
    }
    println!("Formatted {image}: {blocks} blocks, {inodes} inodes");
}
