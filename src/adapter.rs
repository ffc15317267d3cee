//! File-manager adapter
//!
//! Binds one remote connection and exposes the uniform file-manager contract
//! on top of it: `ls`, `cat`, `mkdir`, `rm`, `mv`, `save`, `touch`. Each call
//! runs to completion on the caller's task and translates into one or more
//! remote operations; nothing is cached between calls and nothing is retried.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::config_store::ConfigStore;
use crate::mover;
use crate::providers::{
    default_remote, normalize_path, open_remote, EntryKind, ObjectInfo, ObjectReader, ProviderError,
    RemoteEntry, RemoteFs,
};
use crate::resolver::resolve_entry;
use crate::staging::{StagingConfig, UploadStager};

/// Listing unit handed to the file manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Modification time, seconds since the epoch (0 if unknown)
    pub time: i64,
    /// Size in bytes, 0 for directories
    pub size: u64,
    /// Path relative to the remote root
    pub path: String,
    /// Capability flags; `None` means the backend does not say
    pub can_rename: Option<bool>,
    pub can_move: Option<bool>,
    pub can_delete: Option<bool>,
}

impl From<RemoteEntry> for FileEntry {
    fn from(entry: RemoteEntry) -> Self {
        let kind = entry.kind();
        Self {
            name: entry.name,
            kind,
            time: entry.modified.map(|m| m.timestamp()).unwrap_or(0),
            size: if kind == EntryKind::Directory { 0 } else { entry.size },
            path: entry.path,
            can_rename: None,
            can_move: None,
            can_delete: None,
        }
    }
}

/// Uniform file-manager contract
#[async_trait]
pub trait FileManager: Send + Sync {
    /// Direct children of `path`, in the backend's listing order
    async fn ls(&self, path: &str) -> Result<Vec<FileEntry>, ProviderError>;

    /// Stream an object's content
    async fn cat(&self, path: &str) -> Result<ObjectReader, ProviderError>;

    /// Create an empty directory
    async fn mkdir(&self, path: &str) -> Result<(), ProviderError>;

    /// Remove a file, or a directory with everything below it
    async fn rm(&self, path: &str) -> Result<(), ProviderError>;

    /// Move or rename a file or directory
    async fn mv(&self, from: &str, to: &str) -> Result<(), ProviderError>;

    /// Upload `content` to `path`, replacing any existing object
    async fn save(&self, path: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<(), ProviderError>;

    /// Create an empty object
    async fn touch(&self, path: &str) -> Result<(), ProviderError>;
}

/// Connection parameters
#[derive(Debug)]
pub struct AdapterOptions {
    /// Encrypted (or plain) config blob
    pub config: String,
    /// Password for `config`; dropped as soon as the config is open
    pub password: SecretString,
    /// Remote to bind, e.g. `work:` or `:memory:`; first config section if unset
    pub storage: Option<String>,
    pub staging: StagingConfig,
}

impl AdapterOptions {
    pub fn new(config: impl Into<String>, password: SecretString) -> Self {
        Self {
            config: config.into(),
            password,
            storage: None,
            staging: StagingConfig::default(),
        }
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    pub fn with_staging(mut self, staging: StagingConfig) -> Self {
        self.staging = staging;
        self
    }

    /// Build from the generic string parameter map
    /// (`config`, `password`, `storage`, `spill_threshold`, `temp_dir`)
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ProviderError> {
        let config = params
            .get("config")
            .ok_or_else(|| ProviderError::InvalidConfig("missing config".to_string()))?;
        let password = params
            .get("password")
            .ok_or_else(|| ProviderError::InvalidConfig("missing password".to_string()))?;

        let mut staging = StagingConfig::default();
        if let Some(raw) = params.get("spill_threshold").filter(|v| !v.is_empty()) {
            staging.spill_threshold = raw.parse().map_err(|_| {
                ProviderError::InvalidConfig(format!("spill_threshold is not a number: {:?}", raw))
            })?;
        }
        staging.temp_dir = params
            .get("temp_dir")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let mut options = Self::new(config.clone(), SecretString::from(password.clone()))
            .with_staging(staging);
        options.storage = params
            .get("storage")
            .filter(|v| !v.trim().is_empty())
            .cloned();
        Ok(options)
    }
}

/// Adapter bound to a single remote
pub struct Adapter {
    fs: Box<dyn RemoteFs>,
    conf: ConfigStore,
    remote: String,
    stager: UploadStager,
}

impl Adapter {
    /// Open the config and bind the remote it names.
    ///
    /// Config and connection failures both come back as
    /// [`ProviderError::ConnectionFailed`].
    pub fn init(options: AdapterOptions) -> Result<Self, ProviderError> {
        let AdapterOptions {
            config,
            password,
            storage,
            staging,
        } = options;

        let (conf, loaded) = ConfigStore::load(&config, &password);
        drop(password);
        loaded.map_err(|e| ProviderError::ConnectionFailed(format!("config: {}", e)))?;

        let remote = match storage {
            Some(remote) => remote,
            None => default_remote(&conf)?,
        };
        let fs = open_remote(&conf, &remote).map_err(|e| match e {
            ProviderError::ConnectionFailed(_) => e,
            other => ProviderError::ConnectionFailed(other.to_string()),
        })?;

        info!("Adapter bound to {}", remote);
        Ok(Self::from_parts(fs, conf, remote, staging))
    }

    /// Assemble from an already connected backend
    pub fn from_parts(
        fs: Box<dyn RemoteFs>,
        conf: ConfigStore,
        remote: impl Into<String>,
        staging: StagingConfig,
    ) -> Self {
        Self {
            fs,
            conf,
            remote: remote.into(),
            stager: UploadStager::new(staging),
        }
    }

    /// Wrap a backend with an empty config and default staging
    pub fn with_remote(fs: Box<dyn RemoteFs>) -> Self {
        let remote = fs.root();
        Self::from_parts(fs, ConfigStore::default(), remote, StagingConfig::default())
    }

    pub fn config(&self) -> &ConfigStore {
        &self.conf
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn backend(&self) -> &dyn RemoteFs {
        self.fs.as_ref()
    }

    async fn put_checked(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
    ) -> Result<(), ProviderError> {
        let info = ObjectInfo::new(path, Utc::now(), size);
        let written = self.fs.put(reader, &info).await?;
        if written.size != size {
            return Err(ProviderError::IntegrityMismatch {
                path: path.to_string(),
                expected: size,
                actual: written.size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FileManager for Adapter {
    async fn ls(&self, path: &str) -> Result<Vec<FileEntry>, ProviderError> {
        let path = normalize_path(path);
        debug!("ls {:?}", path);
        let entries = self.fs.list(&path).await?;
        Ok(entries.into_iter().map(FileEntry::from).collect())
    }

    async fn cat(&self, path: &str) -> Result<ObjectReader, ProviderError> {
        let path = normalize_path(path);
        debug!("cat {:?}", path);
        self.fs.open(&path).await
    }

    async fn mkdir(&self, path: &str) -> Result<(), ProviderError> {
        let path = normalize_path(path);
        debug!("mkdir {:?}", path);
        self.fs.mkdir(&path).await
    }

    async fn rm(&self, path: &str) -> Result<(), ProviderError> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(ProviderError::InvalidPath("refusing to remove the remote root".to_string()));
        }
        debug!("rm {:?}", path);

        let entry = match resolve_entry(self.fs.as_ref(), &path).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                debug!("rm {:?}: already gone", path);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if entry.is_dir {
            return self.fs.purge(&path).await;
        }
        match self.fs.remove(&path).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn mv(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        debug!("mv {:?} -> {:?}", from, to);
        mover::move_path(self.fs.as_ref(), from, to).await
    }

    async fn save(&self, path: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<(), ProviderError> {
        let path = normalize_path(path);
        let mut staged = self.stager.stage(content).await?;
        debug!(
            "save {:?}: {} bytes ({})",
            path,
            staged.size,
            if staged.is_spilled() { "spilled" } else { "in memory" }
        );
        self.put_checked(&path, &mut staged.source, staged.size).await
    }

    async fn touch(&self, path: &str) -> Result<(), ProviderError> {
        let path = normalize_path(path);
        debug!("touch {:?}", path);
        let mut empty: &[u8] = &[];
        self.put_checked(&path, &mut empty, 0).await
    }
}
