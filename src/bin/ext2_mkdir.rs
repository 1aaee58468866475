use ext2fs::cli;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [image, path] = args.as_slice() else {
        cli::usage("<image file name> <path>");
    };
    if let Err(e) = cli::require_absolute(path) {
        cli::fail(e);
    }
    cli::run(image, |fs| fs.create_directory(path).map(|_| ()));
}
