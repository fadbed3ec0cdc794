//! Single-file JSON storage.
//!
//! All rules live in one JSON object (`service → template`), rewritten in
//! full after every mutation. The in-memory cache is authoritative: a failed
//! write still leaves the cache updated and the error is returned to the caller.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use super::{Storage, StorageError};
use crate::rules::{normalize_service, Rule};

/// JSON file backed rule storage.
#[derive(Debug)]
pub struct JsonStorage {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, String>>,
}

impl JsonStorage {
    /// Create storage for `path`. Nothing is read until [`Storage::reload`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create storage and load the file if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let storage = Self::new(path);
        storage.reload()?;
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the cache to disk. Callers hold the write lock.
    fn dump(&self, cache: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        cache.serialize(&mut serializer)?;

        // Write-then-rename so readers never observe a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = ?self.path, rules = cache.len(), "Rules saved");
        Ok(())
    }
}

impl Storage for JsonStorage {
    fn set(&self, service: &str, location_template: &str) -> Result<(), StorageError> {
        let service = normalize_service(service);
        if service.is_empty() {
            return Err(StorageError::InvalidService(service.to_string()));
        }
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(service.to_string(), location_template.to_string());
        self.dump(&cache)
    }

    fn get(&self, service: &str) -> Option<String> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(normalize_service(service)).cloned()
    }

    fn remove(&self, service: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.remove(normalize_service(service)).is_none() {
            return Ok(());
        }
        self.dump(&cache)
    }

    fn all(&self) -> Result<Vec<Rule>, StorageError> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cache
            .iter()
            .map(|(service, template)| Rule::new(service.clone(), template.clone()))
            .collect())
    }

    fn reload(&self) -> Result<(), StorageError> {
        // Held from read to swap so a concurrent set is either on disk or applied after.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = ?self.path, "Rules file not found, nothing to load");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let raw: BTreeMap<String, String> = serde_json::from_slice(&data)?;
        let mut loaded = BTreeMap::new();
        for (service, template) in raw {
            let normalized = normalize_service(&service);
            if normalized.is_empty() {
                tracing::warn!(path = ?self.path, service = %service, "Skipping rule with empty service name");
                continue;
            }
            loaded.insert(normalized.to_string(), template);
        }

        let count = loaded.len();
        *cache = loaded;
        tracing::info!(path = ?self.path, rules = count, "Rules loaded");
        Ok(())
    }
}
