//! Storage collaborators and the robust timeline loader.

use std::path::PathBuf;

mod context;
pub use context::*;
mod db;
pub use db::*;
mod error;
pub use error::*;
mod loader;
pub use loader::*;
mod report;
pub use report::*;
mod store;
pub use store::*;

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("timeline_core")
}

/// Database used when the caller does not name one.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("timelines.db")
}
