use ext2fs::{cli, Error};

const USAGE: &str = "<image file name> [-s] <source path> <dest path>";

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (image, source, destination, symbolic) = match args.as_slice() {
        [image, source, destination] => (image, source, destination, false),
        [image, flag, source, destination] if flag == "-s" => (image, source, destination, true),
        _ => cli::usage(USAGE),
    };
    for path in [source, destination] {
        if let Err(e) = cli::require_absolute(path) {
            cli::fail(e);
        }
    }
    if source == destination {
        cli::fail(Error::IdenticalPaths(source.to_owned()));
    }
    cli::run(image, |fs| fs.create_link(source, destination, symbolic));
}
