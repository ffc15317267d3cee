//! File-vs-directory resolution
//!
//! Many remotes cannot describe a single path; the only way to learn what
//! `a/b` is, is to list `a` and look for it. Backends with a native stat skip
//! the listing entirely. [`resolver_for`] picks the right strategy.

use async_trait::async_trait;
use tracing::debug;

use crate::providers::{normalize_path, split_parent, EntryKind, ProviderError, RemoteEntry, RemoteFs};

/// Resolve a path to the entry describing it
#[async_trait]
pub trait ExistenceResolver: Send + Sync {
    async fn resolve_entry(&self, fs: &dyn RemoteFs, path: &str) -> Result<RemoteEntry, ProviderError>;

    async fn resolve(&self, fs: &dyn RemoteFs, path: &str) -> Result<EntryKind, ProviderError> {
        Ok(self.resolve_entry(fs, path).await?.kind())
    }
}

/// Finds a path among its parent's children
#[derive(Debug, Default, Clone, Copy)]
pub struct ListingResolver;

/// Asks the backend directly
#[derive(Debug, Default, Clone, Copy)]
pub struct StatResolver;

fn root_entry() -> RemoteEntry {
    RemoteEntry::directory(String::new(), String::new())
}

#[async_trait]
impl ExistenceResolver for ListingResolver {
    async fn resolve_entry(&self, fs: &dyn RemoteFs, path: &str) -> Result<RemoteEntry, ProviderError> {
        let target = normalize_path(path);
        if target.is_empty() {
            return Ok(root_entry());
        }

        let (parent, _) = split_parent(&target);
        debug!("Resolving {:?} by listing {:?}", target, parent);
        fs.list(parent)
            .await?
            .into_iter()
            .find(|entry| entry.path.trim_matches('/') == target)
            .ok_or(ProviderError::NotFound(target))
    }
}

#[async_trait]
impl ExistenceResolver for StatResolver {
    async fn resolve_entry(&self, fs: &dyn RemoteFs, path: &str) -> Result<RemoteEntry, ProviderError> {
        let target = normalize_path(path);
        if target.is_empty() {
            return Ok(root_entry());
        }
        fs.stat(&target).await
    }
}

static LISTING: ListingResolver = ListingResolver;
static STAT: StatResolver = StatResolver;

/// Strategy for `fs`: native stat when available, parent listing otherwise
pub fn resolver_for(fs: &dyn RemoteFs) -> &'static dyn ExistenceResolver {
    if fs.supports_stat() {
        &STAT
    } else {
        &LISTING
    }
}

/// Shorthand for `resolver_for(fs).resolve_entry(fs, path)`
pub async fn resolve_entry(fs: &dyn RemoteFs, path: &str) -> Result<RemoteEntry, ProviderError> {
    resolver_for(fs).resolve_entry(fs, path).await
}
