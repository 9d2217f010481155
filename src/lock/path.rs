use crate::error::{LockError, Result};
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Longest readable prefix kept from a lock name (the hash provides uniqueness)
const MAX_READABLE_LEN: usize = 32;

/// Derive the lock file path for a lock name inside the lock cache directory
pub fn derive_lock_path(name: &str) -> Result<PathBuf> {
    Ok(get_lock_cache_dir()?.join(lock_file_name(name)?))
}

/// Build the lock file name for a lock name: `{readable}.{hash}.lock`
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`, so any name maps to
/// a single path component. The hash covers the original name, so names
/// that sanitize to the same text still get different files.
pub fn lock_file_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(LockError::Other("Lock name must not be empty".to_string()));
    }

    let readable: String = name
        .chars()
        .take(MAX_READABLE_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Ok(format!("{}.{}.lock", readable, &hash[..8]))
}

/// Get the platform-specific cache directory for lock files.
///
/// Returns an error if the cache directory cannot be determined
/// (e.g., on systems without a home directory or with permission issues).
/// Callers can pass an explicit lock file instead.
pub fn get_lock_cache_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "interlock").ok_or_else(|| {
        LockError::Other(
            "Failed to determine lock cache directory. \
                 Try specifying an explicit lock file."
                .to_string(),
        )
    })?;

    let cache_dir = proj_dirs.cache_dir().join("locks");

    // Create directory if it doesn't exist
    if !cache_dir.exists() {
        fs::create_dir_all(&cache_dir).map_err(|e| {
            LockError::Other(format!(
                "Failed to create lock cache directory {}: {}",
                cache_dir.display(),
                e
            ))
        })?;
    }

    Ok(cache_dir)
}
