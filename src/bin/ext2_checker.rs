use ext2fs::cli;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [image] = args.as_slice() else {
        cli::usage("<image file name>");
    };
    let report = cli::run(image, |fs| fs.check());
    for repair in &report.repairs {
        println!("{repair}");
    }
    println!("{report}");
}
