use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::PersistenceError;

/// Whole-document storage keyed by asset.
///
/// `save_raw` must be all-or-nothing: after a failure the previous document
/// for the key is still the stored one.
pub trait PersistenceStore: Send + Sync {
    fn load_raw(&self, asset_key: &str) -> Result<Option<Value>, PersistenceError>;
    fn save_raw(&self, asset_key: &str, document: &Value) -> Result<(), PersistenceError>;
}

pub trait AssetExistenceChecker: Send + Sync {
    fn exists(&self, file_path: &str) -> bool;
}

/// Source length lookup, only used to seed a default timeline.
pub trait AssetDurationLookup: Send + Sync {
    fn duration_seconds(&self, asset_key: &str) -> Option<f64>;
}

/// In-process store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    assets: Mutex<HashMap<String, Option<f64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, asset_key: impl Into<String>, document: Value) {
        self.documents.lock().insert(asset_key.into(), document);
    }

    pub fn get(&self, asset_key: &str) -> Option<Value> {
        self.documents.lock().get(asset_key).cloned()
    }

    pub fn register_asset(&self, path: impl Into<String>, duration_seconds: Option<f64>) {
        self.assets.lock().insert(path.into(), duration_seconds);
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceStore for MemoryStore {
    fn load_raw(&self, asset_key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.get(asset_key))
    }

    fn save_raw(&self, asset_key: &str, document: &Value) -> Result<(), PersistenceError> {
        self.insert(asset_key, document.clone());
        Ok(())
    }
}

impl AssetExistenceChecker for MemoryStore {
    fn exists(&self, file_path: &str) -> bool {
        self.assets.lock().contains_key(file_path)
    }
}

impl AssetDurationLookup for MemoryStore {
    fn duration_seconds(&self, asset_key: &str) -> Option<f64> {
        self.assets.lock().get(asset_key).copied().flatten()
    }
}

/// Checks clip paths against the local filesystem, relative paths resolved
/// against `base` when set.
#[derive(Debug, Clone, Default)]
pub struct FsAssetChecker {
    base: Option<PathBuf>,
}

impl FsAssetChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl AssetExistenceChecker for FsAssetChecker {
    fn exists(&self, file_path: &str) -> bool {
        !file_path.is_empty() && self.resolve(file_path).is_file()
    }
}
