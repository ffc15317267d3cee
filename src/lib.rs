//! AeroBridge - encrypted-config storage adapter
//!
//! Exposes a remote storage backend to a file manager through a small
//! contract (`ls`, `cat`, `mkdir`, `rm`, `mv`, `save`, `touch`). Remote
//! definitions live in an INI config that is sealed with Argon2id and
//! AES-256-GCM at rest.

pub mod adapter;
pub mod config_store;
pub mod crypto;
pub mod mover;
pub mod providers;
pub mod resolver;
pub mod staging;

pub use adapter::{Adapter, AdapterOptions, FileEntry, FileManager};
pub use config_store::{ConfigError, ConfigStore};
pub use providers::{EntryKind, ProviderError, RemoteEntry, RemoteFs};
pub use staging::{StagingConfig, UploadStager, DEFAULT_SPILL_THRESHOLD};
