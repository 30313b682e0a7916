//! Windows has no POSIX modes; these helpers only open and create.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn set_dir_mode_0700(_path: &Path) -> io::Result<()> {
    Ok(())
}
