//! OS-specific file helpers behind one API.

mod atomic;

#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

#[cfg(unix)]
pub use unix::{open_log_file_secure_append, set_dir_mode_0700};

#[cfg(not(unix))]
pub use windows::{open_log_file_secure_append, set_dir_mode_0700};

pub use atomic::{is_atomic_temp_name, write_atomic_0600};
