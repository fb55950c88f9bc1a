//! Path helpers.

use std::io;
use std::path::{Path, PathBuf};

/// The directory holding `input`, with symlinks resolved.
///
/// The input itself is resolved first, so a symlinked script grants the
/// directory of its target.
pub fn script_dir(input: &Path) -> io::Result<PathBuf> {
    let resolved = std::fs::canonicalize(input)?;
    match resolved.parent() {
        Some(parent) => Ok(parent.to_path_buf()),
        None => Ok(resolved),
    }
}
