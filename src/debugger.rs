use std::io::Write;

use ext2fs::filetypes::PathTokens;
use ext2fs::{cli, Filesystem};

fn prompt(separator: &str) -> Option<Vec<String>> {
    let mut line = String::new();
    print!("{separator}");
    std::io::stdout().flush().ok()?;
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.split_whitespace().map(str::to_string).collect()),
    }
}

fn execute(fs: &mut Filesystem, cmd: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if cmd.is_empty() {
        return Ok(());
    }
    match cmd[0].as_str() {
        "s" => println!["{}\n{}", fs.superblock(), fs.group()],
        "b" => {
            if cmd.len() == 2 {
                println!["{}", fs.load_block(cmd[1].parse()?, false)?];
            } else {
                println!["{}", fs.block_bitmap()]
            }
        }
        "i" => {
            if cmd.len() == 2 {
                println!["{}", fs.load_inode(cmd[1].parse()?)?];
            } else {
                println!["{}", fs.inode_bitmap()]
            }
        }
        "d" => {
            let path = PathTokens::parse(cmd.get(1).map_or("/", String::as_str))?;
            let Some(directory) = fs.resolve_dir(&path)? else {
                return Err(ext2fs::Error::NotFound(path.to_string()).into());
            };
            for child in fs.list(directory)? {
                println![
                    "{} {:>5} {}",
                    child.file_type().symbol(),
                    child.inode(),
                    child.name_lossy()
                ];
            }
        }
        _ => eprintln!("commands: s | b [block] | i [inode] | d [path]"),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [image] = args.as_slice() else {
        cli::usage("<image file name>");
    };
    let mut fs = cli::open_image(image).unwrap_or_else(|e| cli::fail(e));
    while let Some(cmd) = prompt(">> ") {
        if let Err(e) = execute(&mut fs, &cmd) {
            eprintln!("{e}");
        }
    }
}
