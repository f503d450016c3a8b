use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{AssetDurationLookup, AssetExistenceChecker, LoadError, PersistenceStore};

/// Per-load policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Check every clip's `file_path` with the context's asset checker.
    pub validate_assets: bool,
    /// Skip and count bad clips instead of failing the whole load.
    pub allow_partial_load: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            validate_assets: true,
            allow_partial_load: true,
        }
    }
}

impl LoadOptions {
    pub fn strict() -> Self {
        Self {
            allow_partial_load: false,
            ..Self::default()
        }
    }
}

/// Caller-owned cancellation signal, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a load or save talks to. Passed explicitly into every call.
#[derive(Clone)]
pub struct LoaderContext {
    store: Arc<dyn PersistenceStore>,
    assets: Option<Arc<dyn AssetExistenceChecker>>,
    durations: Option<Arc<dyn AssetDurationLookup>>,
    cancel: CancelFlag,
}

impl LoaderContext {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            assets: None,
            durations: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_asset_checker(mut self, checker: Arc<dyn AssetExistenceChecker>) -> Self {
        self.assets = Some(checker);
        self
    }

    pub fn with_duration_lookup(mut self, lookup: Arc<dyn AssetDurationLookup>) -> Self {
        self.durations = Some(lookup);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &dyn PersistenceStore {
        self.store.as_ref()
    }

    pub fn asset_checker(&self) -> Option<&dyn AssetExistenceChecker> {
        self.assets.as_deref()
    }

    pub fn duration_lookup(&self) -> Option<&dyn AssetDurationLookup> {
        self.durations.as_deref()
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), LoadError> {
        if self.cancel.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}
