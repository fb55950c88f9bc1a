//! Utility modules.

pub mod debug;
pub mod path;

pub use debug::{init_logging, DEBUG_ENV, LOG_ENV};
pub use path::script_dir;
