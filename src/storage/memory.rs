//! Non-persistent storage.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::{Storage, StorageError};
use crate::rules::{normalize_service, Rule};

/// Rules kept only in memory. `reload` is a no-op.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    rules: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build storage pre-filled with `(service, template)` pairs.
    pub fn with_rules<I, S, T>(rules: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<String>,
    {
        let storage = Self::new();
        {
            let mut map = storage.rules.write().unwrap_or_else(PoisonError::into_inner);
            for (service, template) in rules {
                map.insert(normalize_service(service.as_ref()).to_string(), template.into());
            }
        }
        storage
    }
}

impl Storage for MemoryStorage {
    fn set(&self, service: &str, location_template: &str) -> Result<(), StorageError> {
        let service = normalize_service(service);
        if service.is_empty() {
            return Err(StorageError::InvalidService(service.to_string()));
        }
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service.to_string(), location_template.to_string());
        Ok(())
    }

    fn get(&self, service: &str) -> Option<String> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(normalize_service(service))
            .cloned()
    }

    fn remove(&self, service: &str) -> Result<(), StorageError> {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(normalize_service(service));
        Ok(())
    }

    fn all(&self) -> Result<Vec<Rule>, StorageError> {
        Ok(self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(service, template)| Rule::new(service.clone(), template.clone()))
            .collect())
    }

    fn reload(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud() {
        let storage = MemoryStorage::with_rules([("/a/", "x")]);
        assert_eq!(storage.get("a").as_deref(), Some("x"));
        storage.set("a", "y").unwrap();
        assert_eq!(storage.all().unwrap(), vec![Rule::new("a", "y")]);
        storage.remove("a").unwrap();
        assert!(storage.all().unwrap().is_empty());
    }
}
