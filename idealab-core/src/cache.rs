//! On-disk cache of research envelopes.
//!
//! One pretty-printed JSON file per key under the cache directory. Keys are
//! `"{domain}_{sha256}"` where the digest covers the trimmed, lowercased
//! request fields the domain cares about. An entry whose file is older than
//! the TTL, or that no longer parses, is treated as absent.
//!
//! There is no locking: writes replace whole files and the last writer wins.

use crate::config::CacheConfig;
use crate::domains::ResearchDomain;
use crate::error::CacheError;
use crate::persistence;
use crate::types::ResearchRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Separator between normalized fields before hashing.
const FIELD_SEPARATOR: &str = "|";

/// File-per-key envelope cache with a time-to-live.
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            enabled: true,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            dir: config.resolve_dir(),
            ttl: Duration::from_secs(config.ttl_secs),
            enabled: config.enabled,
        }
    }

    /// A cache that never hits and never writes.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key of `request` for domain `D`.
    pub fn key<D: ResearchDomain>(request: &ResearchRequest) -> String {
        let fields: Vec<&str> = D::CACHE_KEY_FIELDS
            .iter()
            .map(|name| request.field(name))
            .collect();
        Self::key_for(D::NAME, &fields)
    }

    /// `"{domain}_{hex sha256}"` of the normalized `fields`.
    pub fn key_for(domain: &str, fields: &[&str]) -> String {
        let normalized = fields
            .iter()
            .map(|f| f.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR);
        format!("{}_{:x}", domain, Sha256::digest(normalized.as_bytes()))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn is_stale(&self, path: &Path) -> bool {
        let age = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        // A file from the future is fresh.
        age.is_some_and(|age| age > self.ttl)
    }

    /// The record stored under `key`, if present, fresh and readable.
    pub fn get<R: DeserializeOwned>(&self, key: &str) -> Option<R> {
        if !self.enabled {
            return None;
        }
        let path = self.path(key);
        if !path.exists() {
            return None;
        }
        if self.is_stale(&path) {
            debug!(key, "Cache entry expired");
            return None;
        }
        match persistence::load_json(&path) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Store `record` under `key`, replacing any previous entry.
    pub fn put<R: Serialize>(&self, key: &str, record: &R) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(record).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;
        let path = self.path(key);
        persistence::atomic_write(&path, json.as_bytes()).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(key, "Cached research result");
        Ok(())
    }

    /// Delete expired entries and leftover temp files. Returns how many were removed.
    pub fn prune(&self) -> Result<usize, CacheError> {
        self.remove_where(|cache, path| persistence::is_temp_file(path) || cache.is_stale(path))
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.remove_where(|_, _| true)
    }

    fn remove_where(&self, doomed: impl Fn(&Self, &Path) -> bool) -> Result<usize, CacheError> {
        if !self.enabled {
            return Ok(0);
        }
        let io_error = |source: std::io::Error| CacheError::Io {
            path: self.dir.display().to_string(),
            source,
        };
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(io_error)?.path();
            let is_entry = path.extension().is_some_and(|ext| ext == "json");
            if !(is_entry || persistence::is_temp_file(&path)) || !doomed(self, &path) {
                continue;
            }
            std::fs::remove_file(&path).map_err(|source| CacheError::Io {
                path: path.display().to_string(),
                source,
            })?;
            removed += 1;
        }
        debug!(dir = %self.dir.display(), removed, "Cache entries removed");
        Ok(removed)
    }
}
