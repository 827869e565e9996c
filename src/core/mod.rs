//! 核心同步逻辑

pub mod engine;
pub mod fingerprint;
pub mod path;
pub mod scanner;

pub use engine::{EntryOutcome, EntryStatus, SyncConfig, SyncEngine, SyncReport};
pub use fingerprint::FingerprintPolicy;
pub use scanner::{FileEntry, FolderScanner, Manifest};
