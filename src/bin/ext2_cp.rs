use std::fs::File;

use ext2fs::cli;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [image, source, destination] = args.as_slice() else {
        cli::usage("<image file name> <source file> <dest path>");
    };
    if let Err(e) = cli::require_absolute(destination) {
        cli::fail(e);
    }
    let mut source = File::open(source).unwrap_or_else(|e| cli::fail(e.into()));
    cli::run(image, |fs| fs.create_file(&mut source, destination));
}
