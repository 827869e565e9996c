pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{AccessLevel, ConnectionInfo, RootContext, StorageTarget};
pub use core::{
    EntryOutcome, EntryStatus, FingerprintPolicy, FolderScanner, SyncConfig, SyncEngine,
    SyncReport,
};
pub use error::{Result, SyncError};
pub use storage::{create_provider, Provider, Storage};
