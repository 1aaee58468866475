//! Pieces shared by the command line front ends

use std::fs::File;
use std::process::exit;

use log::error;

use crate::{Error, Filesystem};

/// Print the expected arguments and exit with `EINVAL`
pub fn usage(arguments: &str) -> ! {
    let program = std::env::args().next().unwrap_or_default();
    eprintln!("{program} {arguments}");
    exit(libc::EINVAL)
}

/// Report `error` and exit with its errno
pub fn fail(error: Error) -> ! {
    eprintln!("{error}");
    let code = libc::c_int::from(error);
    exit(code)
}

pub fn require_absolute(path: &str) -> Result<(), Error> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(Error::InvalidPath(path.to_owned()))
    }
}

/// Open an existing image for reading and writing
pub fn open_image(path: &str) -> Result<Filesystem, Error> {
    let device = File::options().read(true).write(true).open(path)?;
    Filesystem::open(Box::new(device))
}

/// Run `operation` against the image at `image`.
/// The image is written back only if the operation succeeds; on failure the
/// process exits with the error's errno.
pub fn run<T>(image: &str, operation: impl FnOnce(&mut Filesystem) -> Result<T, Error>) -> T {
    let result = open_image(image).and_then(|mut fs| {
        let value = operation(&mut fs)?;
        fs.close()?;
        Ok(value)
    });
    match result {
        Ok(value) => value,
        Err(e) => {
            error!("Operation on {image} failed, image left untouched");
            fail(e)
        }
    }
}
