//! Remote Backends Module
//!
//! Every storage system the adapter can sit on implements [`RemoteFs`]: a small
//! list/read/write/delete capability set plus optional extras (stat, native
//! move) that backends advertise through `supports_*` probes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 RemoteFs Trait               │
//! │  list, open, put, mkdir, rmdir, remove, ...  │
//! └──────────────────────────────────────────────┘
//!                │                  │
//!           ┌────────┐         ┌────────┐
//!           │ Local  │         │ Memory │
//!           └────────┘         └────────┘
//! ```
//!
//! Backends are selected with an rclone-style remote string, see [`RemoteSpec`].

pub mod local;
pub mod memory;
pub mod types;

pub use local::LocalFs;
pub use memory::MemoryFs;
pub use types::*;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::config_store::{is_ephemeral_section, ConfigStore};

/// Streaming reader handed out by [`RemoteFs::open`]
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Remote storage capability
///
/// Paths are relative to the remote root (see [`normalize_path`]); the empty
/// string is the root itself.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Backend type identifier (`local`, `memory`, ...)
    fn backend_type(&self) -> &str;

    /// Human readable root, for logs
    fn root(&self) -> String;

    /// List direct children of `dir`
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, ProviderError>;

    /// Open an object for streaming read
    async fn open(&self, path: &str) -> Result<ObjectReader, ProviderError>;

    /// Upload `info.size` bytes from `reader` to `info.path`, replacing any
    /// existing object. Returns the entry as the remote now reports it.
    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        info: &ObjectInfo,
    ) -> Result<RemoteEntry, ProviderError>;

    /// Create a directory
    async fn mkdir(&self, dir: &str) -> Result<(), ProviderError>;

    /// Remove an empty directory
    async fn rmdir(&self, dir: &str) -> Result<(), ProviderError>;

    /// Remove a single object
    async fn remove(&self, path: &str) -> Result<(), ProviderError>;

    /// Remove a directory and everything below it
    async fn purge(&self, dir: &str) -> Result<(), ProviderError> {
        let mut pending = vec![normalize_path(dir)];
        let mut visited = Vec::new();
        while let Some(current) = pending.pop() {
            for entry in self.list(&current).await? {
                if entry.is_dir {
                    pending.push(entry.path);
                } else {
                    self.remove(&entry.path).await?;
                }
            }
            visited.push(current);
        }
        // deepest first; implied directories disappear with their last object
        for current in visited.iter().rev() {
            match self.rmdir(current).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }
        Ok(())
    }

    // Optional capabilities - backends can override these

    /// Check if the backend can describe a single path directly
    fn supports_stat(&self) -> bool {
        false
    }

    /// Describe a single path
    async fn stat(&self, _path: &str) -> Result<RemoteEntry, ProviderError> {
        Err(ProviderError::NotSupported("stat".to_string()))
    }

    /// Check if the backend can move objects server side
    fn supports_move(&self) -> bool {
        false
    }

    /// Move a single object
    async fn move_file(&self, _from: &str, _to: &str) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported("move".to_string()))
    }

    /// Check if the backend can move whole directories server side
    fn supports_dir_move(&self) -> bool {
        false
    }

    /// Move a directory and its subtree
    async fn move_dir(&self, _from: &str, _to: &str) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported("dirmove".to_string()))
    }
}

// ============ Path Helpers ============

/// Strip leading and trailing separators: `"/a/b/"` -> `"a/b"`, `"/"` -> `""`
pub fn normalize_path(path: &str) -> String {
    path.trim().trim_matches('/').to_string()
}

/// Split a normalized path into `(parent, leaf)`; the root's parent is itself
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Join two normalized paths
pub fn join_path(base: &str, name: &str) -> String {
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, name),
    }
}

/// Last path component
pub fn base_name(path: &str) -> &str {
    split_parent(path).1
}

// ============ Remote Specifiers ============

/// Parsed remote string
///
/// - `name:path` names a section of the config
/// - `:type,key=value:path` builds an on-the-fly backend
/// - a bare `path` is the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSpec {
    Named { name: String, path: String },
    OnTheFly { backend: String, params: HashMap<String, String>, path: String },
    LocalPath(String),
}

impl RemoteSpec {
    pub fn parse(spec: &str) -> Result<Self, ProviderError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ProviderError::InvalidConfig("empty remote".to_string()));
        }

        if let Some(rest) = spec.strip_prefix(':') {
            let (head, path) = rest.split_once(':').unwrap_or((rest, ""));
            let mut parts = head.split(',');
            let backend = parts.next().unwrap_or_default().trim().to_string();
            if backend.is_empty() {
                return Err(ProviderError::InvalidConfig(format!(
                    "missing backend type in {:?}",
                    spec
                )));
            }
            let mut params = HashMap::new();
            for part in parts.filter(|p| !p.trim().is_empty()) {
                let (key, value) = part.split_once('=').ok_or_else(|| {
                    ProviderError::InvalidConfig(format!("expected key=value, got {:?}", part))
                })?;
                params.insert(key.trim().to_string(), value.trim().to_string());
            }
            return Ok(RemoteSpec::OnTheFly {
                backend,
                params,
                path: path.to_string(),
            });
        }

        match spec.split_once(':') {
            Some((name, path)) if !name.is_empty() && !name.contains('/') => Ok(RemoteSpec::Named {
                name: name.to_string(),
                path: path.to_string(),
            }),
            _ => Ok(RemoteSpec::LocalPath(spec.to_string())),
        }
    }

    /// Config section this remote reads its settings from
    pub fn section_name(&self) -> Option<String> {
        match self {
            RemoteSpec::Named { name, .. } => Some(name.clone()),
            RemoteSpec::OnTheFly { backend, .. } => Some(format!(":{}", backend)),
            RemoteSpec::LocalPath(_) => None,
        }
    }
}

/// Pick the remote used when the caller names none: the first persistent section
pub fn default_remote(store: &ConfigStore) -> Result<String, ProviderError> {
    store
        .section_list()
        .into_iter()
        .find(|s| !is_ephemeral_section(s))
        .map(|s| format!("{}:", s))
        .ok_or_else(|| ProviderError::ConnectionFailed("config has no remotes".to_string()))
}

/// Build the backend a remote string points at.
pub fn open_remote(store: &ConfigStore, spec: &str) -> Result<Box<dyn RemoteFs>, ProviderError> {
    let (backend, params, path) = match RemoteSpec::parse(spec)? {
        RemoteSpec::Named { name, path } => {
            let entries = store.section_entries(&name).ok_or_else(|| {
                ProviderError::ConnectionFailed(format!(
                    "didn't find section {:?} in config",
                    name
                ))
            })?;
            let params: HashMap<String, String> = entries.into_iter().collect();
            let backend = params.get("type").cloned().ok_or_else(|| {
                ProviderError::ConnectionFailed(format!("section {:?} has no type", name))
            })?;
            (backend, params, path)
        }
        RemoteSpec::OnTheFly { backend, params, path } => (backend, params, path),
        RemoteSpec::LocalPath(path) => ("local".to_string(), HashMap::new(), path),
    };

    debug!("Opening {} remote at {:?}", backend, path);
    let remote: Box<dyn RemoteFs> = match backend.as_str() {
        "local" => Box::new(LocalFs::from_params(&params, &path)?),
        "memory" => Box::new(MemoryFs::new()),
        other => {
            return Err(ProviderError::ConnectionFailed(format!(
                "unknown backend type {:?}",
                other
            )))
        }
    };
    info!("Connected to {} remote {}", remote.backend_type(), remote.root());
    Ok(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_normalize_and_split() {
        assert_eq!(normalize_path("/a/b/"), "a/b");
        assert_eq!(normalize_path("///"), "");
        assert_eq!(split_parent("a/b/c"), ("a/b", "c"));
        assert_eq!(split_parent("c"), ("", "c"));
        assert_eq!(join_path("", "x"), "x");
        assert_eq!(join_path("a", "x"), "a/x");
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
    }

    #[test]
    fn test_parse_remote_specs() {
        assert_eq!(
            RemoteSpec::parse("work:docs/2024").unwrap(),
            RemoteSpec::Named { name: "work".to_string(), path: "docs/2024".to_string() }
        );

        match RemoteSpec::parse(":local,root=/srv:sub").unwrap() {
            RemoteSpec::OnTheFly { backend, params, path } => {
                assert_eq!(backend, "local");
                assert_eq!(params.get("root").map(String::as_str), Some("/srv"));
                assert_eq!(path, "sub");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            RemoteSpec::parse("/tmp/data").unwrap(),
            RemoteSpec::LocalPath("/tmp/data".to_string())
        );
        assert!(RemoteSpec::parse(":").is_err());
        assert!(RemoteSpec::parse(":local,root:x").is_err());
        assert_eq!(
            RemoteSpec::parse(":memory:").unwrap().section_name().as_deref(),
            Some(":memory")
        );
    }

    #[test]
    fn test_open_remote_from_config() {
        let (store, result) = ConfigStore::load(
            "[mem]\ntype = memory\n[broken]\nroot = /x\n[odd]\ntype = ftp\n",
            &SecretString::from(String::new()),
        );
        result.unwrap();

        assert_eq!(open_remote(&store, "mem:").unwrap().backend_type(), "memory");
        assert_eq!(open_remote(&store, ":memory:").unwrap().backend_type(), "memory");
        assert!(matches!(open_remote(&store, "ghost:"), Err(ProviderError::ConnectionFailed(_))));
        assert!(matches!(open_remote(&store, "broken:"), Err(ProviderError::ConnectionFailed(_))));
        assert!(matches!(open_remote(&store, "odd:"), Err(ProviderError::ConnectionFailed(_))));
        assert_eq!(default_remote(&store).unwrap(), "mem:");
        assert!(default_remote(&ConfigStore::default()).is_err());
    }
}
