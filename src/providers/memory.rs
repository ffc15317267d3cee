//! In-memory object store backend
//!
//! Behaves like a bucket: flat object keys, directories implied by key
//! prefixes plus explicit markers left by `mkdir`, no stat and no server-side
//! move. Everything is lost when the backend is dropped. Used for on-the-fly
//! `:memory:` remotes and throughout the tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{base_name, normalize_path, ObjectInfo, ObjectReader, ProviderError, RemoteEntry, RemoteFs};

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, MemoryObject>,
    dirs: BTreeSet<String>,
}

fn prefix_of(dir: &str) -> String {
    if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    }
}

impl MemoryState {
    fn has_children(&self, dir: &str) -> bool {
        let prefix = prefix_of(dir);
        self.objects.keys().any(|k| k.starts_with(&prefix))
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir.is_empty() || self.dirs.contains(dir) || self.has_children(dir)
    }
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: RwLock<MemoryState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial objects, all stamped with the current time
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let fs = Self::new();
        {
            let mut state = fs.write();
            let now = Utc::now();
            for (path, content) in files {
                state.objects.insert(
                    normalize_path(path),
                    MemoryObject {
                        data: content.to_vec(),
                        modified: now,
                    },
                );
            }
        }
        fs
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    fn backend_type(&self) -> &str {
        "memory"
    }

    fn root(&self) -> String {
        ":memory:".to_string()
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, ProviderError> {
        let dir = normalize_path(dir);
        let state = self.read();
        if state.objects.contains_key(&dir) || !state.dir_exists(&dir) {
            return Err(ProviderError::NotFound(dir));
        }

        let prefix = prefix_of(&dir);
        let mut children: BTreeMap<String, RemoteEntry> = BTreeMap::new();

        for (key, object) in state.objects.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    children.entry(child.to_string()).or_insert_with(|| {
                        RemoteEntry::directory(child.to_string(), format!("{}{}", prefix, child))
                    });
                }
                None => {
                    children.entry(rest.to_string()).or_insert_with(|| {
                        RemoteEntry::file(rest.to_string(), key.clone(), object.data.len() as u64)
                            .with_modified(Some(object.modified))
                    });
                }
            }
        }

        for marker in state.dirs.range(prefix.clone()..) {
            let Some(rest) = marker.strip_prefix(&prefix) else {
                break;
            };
            if rest.is_empty() {
                continue;
            }
            let child = rest.split('/').next().unwrap_or(rest);
            children.entry(child.to_string()).or_insert_with(|| {
                RemoteEntry::directory(child.to_string(), format!("{}{}", prefix, child))
            });
        }

        Ok(children.into_values().collect())
    }

    async fn open(&self, path: &str) -> Result<ObjectReader, ProviderError> {
        let path = normalize_path(path);
        let state = self.read();
        let object = state
            .objects
            .get(&path)
            .ok_or(ProviderError::NotFound(path.clone()))?;
        Ok(Box::new(Cursor::new(object.data.clone())))
    }

    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        info: &ObjectInfo,
    ) -> Result<RemoteEntry, ProviderError> {
        let path = normalize_path(&info.path);
        if path.is_empty() {
            return Err(ProviderError::InvalidPath("cannot upload to the root".to_string()));
        }
        if self.read().dir_exists(&path) {
            return Err(ProviderError::AlreadyExists(path));
        }

        let mut data = Vec::with_capacity(info.size.min(1 << 20) as usize);
        reader.read_to_end(&mut data).await?;
        let size = data.len() as u64;

        self.write().objects.insert(
            path.clone(),
            MemoryObject {
                data,
                modified: info.modified,
            },
        );
        Ok(RemoteEntry::file(base_name(&path).to_string(), path, size).with_modified(Some(info.modified)))
    }

    async fn mkdir(&self, dir: &str) -> Result<(), ProviderError> {
        let dir = normalize_path(dir);
        if dir.is_empty() {
            return Ok(());
        }
        let mut state = self.write();
        if state.objects.contains_key(&dir) {
            return Err(ProviderError::AlreadyExists(dir));
        }
        state.dirs.insert(dir);
        Ok(())
    }

    async fn rmdir(&self, dir: &str) -> Result<(), ProviderError> {
        let dir = normalize_path(dir);
        let mut state = self.write();
        if state.has_children(&dir) {
            return Err(ProviderError::DirectoryNotEmpty(dir));
        }
        if !state.dirs.remove(&dir) {
            return Err(ProviderError::NotFound(dir));
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), ProviderError> {
        let path = normalize_path(path);
        match self.write().objects.remove(&path) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound(path)),
        }
    }

    async fn purge(&self, dir: &str) -> Result<(), ProviderError> {
        let dir = normalize_path(dir);
        let mut state = self.write();
        if state.objects.contains_key(&dir) || !state.dir_exists(&dir) {
            return Err(ProviderError::NotFound(dir));
        }
        let prefix = prefix_of(&dir);
        state.objects.retain(|k, _| !k.starts_with(&prefix));
        state.dirs.retain(|d| !d.starts_with(&prefix) && *d != dir);
        Ok(())
    }
}
