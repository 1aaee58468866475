pub mod cli;
pub mod error;
pub mod filesystem;
pub mod filetypes;
pub mod structs;

pub use error::Error;
pub use filesystem::Filesystem;
