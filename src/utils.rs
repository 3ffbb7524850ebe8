//! Small filesystem and hashing helpers shared across the engine

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Hash arbitrary data using SHA-256
///
/// Returns the hash as a 64-character hexadecimal string. This is the
/// content-addressing function for the snapshot store: identical bytes
/// always map to the same pool location.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Escape a relative file path into a flat reference filename
///
/// Reference documents live in a single directory per checkpoint, so path
/// separators are replaced with underscores. The original path is preserved
/// inside the reference document itself.
pub fn escape_ref_name(path: &str) -> String {
    path.replace(['/', '\\'], "_")
}

/// Get Unix permission bits from metadata
#[cfg(unix)]
pub fn permissions_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Get permission bits from metadata (non-Unix approximation)
#[cfg(not(unix))]
pub fn permissions_of(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Set Unix permission bits on a path
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Set permission bits on a path (non-Unix approximation)
#[cfg(not(unix))]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Write a file atomically via a temporary sibling and rename
///
/// Used for documents that are fully rewritten on every mutation, so a
/// crash mid-write cannot leave a truncated document behind.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
