use std::time::{SystemTime, UNIX_EPOCH};

use crate::structs::DIRENT_HEADER_SIZE;

/// Current time in seconds, as stored in inode timestamps
pub fn timestamp_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or_default()
}

/// Name length rounded up to the next multiple of 4
pub fn padded_name_len(name_len: usize) -> usize {
    name_len.div_ceil(4) * 4
}

/// Smallest record length able to hold a name of `name_len` bytes
pub fn min_rec_len(name_len: usize) -> usize {
    DIRENT_HEADER_SIZE + padded_name_len(name_len)
}
