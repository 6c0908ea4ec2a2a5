//! File-backed cache of a built engine configuration.
//!
//! The cache is a staleness heuristic, not a correctness-preserving store:
//! an invalid or unreadable file simply means the configuration is rebuilt
//! from scratch. There is no invalidation protocol and no protection against
//! concurrent writers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::mapping::EngineConfiguration;

/// Minimum plausible size of a serialized configuration. Anything smaller is
/// treated as a truncated write.
const MIN_CACHE_FILE_LEN: u64 = 5 * 1024;

/// An error writing or deleting the cache file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigCacheError {
    /// A filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration could not be serialized.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Caches a built [EngineConfiguration] in a file.
///
/// The cached file is only considered valid while it is at least 5 KiB and
/// no older than the mapping-definitions file it was derived from (callers
/// typically pass their own binary, via `std::env::current_exe()`, or a
/// mapping source file).
pub struct ConfigurationFileCache {
    cache_file: PathBuf,
    definitions_file: PathBuf,
}

impl ConfigurationFileCache {
    /// Creates a cache over the given file, invalidated by the definitions
    /// file's modification time.
    pub fn new(cache_file: impl Into<PathBuf>, definitions_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
            definitions_file: definitions_file.into(),
        }
    }

    /// The cache file path.
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Whether the cache file exists, is plausibly complete and is no older
    /// than the definitions file.
    pub fn is_valid(&self) -> bool {
        let Ok(cache_meta) = fs::metadata(&self.cache_file) else {
            return false;
        };
        if cache_meta.len() < MIN_CACHE_FILE_LEN {
            return false;
        }

        let (Ok(cache_mtime), Ok(defs_mtime)) = (
            cache_meta.modified(),
            fs::metadata(&self.definitions_file).and_then(|m| m.modified()),
        ) else {
            return false;
        };
        cache_mtime >= defs_mtime
    }

    /// Loads the cached configuration, or `None` when the cache is invalid or
    /// unreadable. Callers fall back to rebuilding from scratch.
    pub fn load(&self) -> Option<EngineConfiguration> {
        if !self.is_valid() {
            debug!("configuration cache at {:?} is not valid", self.cache_file);
            return None;
        }

        let raw = match fs::read(&self.cache_file) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("discarding unreadable configuration cache: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(configuration) => Some(configuration),
            Err(e) => {
                warn!("discarding undeserializable configuration cache: {e}");
                None
            }
        }
    }

    /// Serializes the configuration to the cache file, replacing any previous
    /// content.
    pub fn save(&self, configuration: &EngineConfiguration) -> Result<(), ConfigCacheError> {
        let json = serde_json::to_vec_pretty(configuration)?;
        fs::write(&self.cache_file, json)?;
        Ok(())
    }

    /// Deletes the cache file if it exists.
    pub fn delete(&self) -> Result<(), ConfigCacheError> {
        if self.cache_file.exists() {
            fs::remove_file(&self.cache_file)?;
        }
        Ok(())
    }
}
