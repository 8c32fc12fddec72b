//! Cross-cutting helpers: filesystem copies, platform queries and progress output.

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, copy_dir_without_vcs, is_dir_empty, move_dir};
pub use platform::{command_exists, get_home_dir, host_goarch, host_goos, resolve_path};
pub use progress::ProgressBar;
