//! Local filesystem backend
//!
//! Serves a directory tree on disk. Unlike object stores it has a real stat
//! call and atomic renames, so it advertises stat, file move and directory
//! move.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;

use super::{base_name, join_path, normalize_path, ObjectInfo, ObjectReader, ProviderError, RemoteEntry, RemoteFs};

/// Name prefix of in-flight upload files; hidden from listings
const UPLOAD_PREFIX: &str = ".aerobridge-upload-";

/// Local directory exposed as a remote
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

/// Map an IO error on `path` onto the provider taxonomy
fn map_io(err: std::io::Error, path: &str) -> ProviderError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ProviderError::NotFound(path.to_string()),
        std::io::ErrorKind::AlreadyExists => ProviderError::AlreadyExists(path.to_string()),
        _ => ProviderError::IoError(err),
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from remote parameters: optional `root`, then the remote path
    pub fn from_params(params: &HashMap<String, String>, path: &str) -> Result<Self, ProviderError> {
        let mut root = params
            .get("root")
            .map(|r| expand_home(r))
            .unwrap_or_default();
        if !path.is_empty() {
            root = root.join(expand_home(path));
        }
        if root.as_os_str().is_empty() {
            root = PathBuf::from(".");
        }
        if root.as_os_str().to_string_lossy().contains('\0') {
            return Err(ProviderError::InvalidConfig("root contains null bytes".to_string()));
        }
        Ok(Self::new(root))
    }

    /// Resolve a remote path below the root, rejecting traversal
    fn resolve(&self, path: &str) -> Result<(String, PathBuf), ProviderError> {
        let path = normalize_path(path);
        if path.contains('\0') {
            return Err(ProviderError::InvalidPath("path contains null bytes".to_string()));
        }
        for component in Path::new(&path).components() {
            if !matches!(component, Component::Normal(_) | Component::CurDir) {
                return Err(ProviderError::InvalidPath(format!(
                    "path escapes the remote root: {}",
                    path
                )));
            }
        }
        let full = if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&path)
        };
        Ok((path, full))
    }

    fn entry_for(path: &str, meta: &std::fs::Metadata) -> RemoteEntry {
        let name = base_name(path).to_string();
        let entry = if meta.is_dir() {
            RemoteEntry::directory(name, path.to_string())
        } else {
            RemoteEntry::file(name, path.to_string(), meta.len())
        };
        entry.with_modified(to_utc(meta.modified()))
    }

    async fn ensure_parent(full: &Path) -> Result<(), ProviderError> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for LocalFs {
    fn backend_type(&self) -> &str {
        "local"
    }

    fn root(&self) -> String {
        self.root.display().to_string()
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, ProviderError> {
        let (dir, full) = self.resolve(dir)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(e, &dir))?;
        if !meta.is_dir() {
            return Err(ProviderError::NotFound(dir));
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&full).await.map_err(|e| map_io(e, &dir))?;
        while let Some(item) = reader.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with(UPLOAD_PREFIX) {
                continue;
            }
            // follows symlinks; dangling links are skipped
            let meta = match fs::metadata(item.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!("Skipping {:?}: {}", item.path(), e);
                    continue;
                }
            };
            entries.push(Self::entry_for(&join_path(&dir, &name), &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open(&self, path: &str) -> Result<ObjectReader, ProviderError> {
        let (path, full) = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(e, &path))?;
        if meta.is_dir() {
            return Err(ProviderError::NotFound(path));
        }
        let file = fs::File::open(&full).await.map_err(|e| map_io(e, &path))?;
        Ok(Box::new(file))
    }

    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        info: &ObjectInfo,
    ) -> Result<RemoteEntry, ProviderError> {
        let (path, full) = self.resolve(&info.path)?;
        if path.is_empty() {
            return Err(ProviderError::InvalidPath("cannot upload to the root".to_string()));
        }
        if let Ok(meta) = fs::metadata(&full).await {
            if meta.is_dir() {
                return Err(ProviderError::AlreadyExists(path));
            }
        }
        Self::ensure_parent(&full).await?;

        // write beside the target, then rename over it; a failed upload
        // leaves the existing object as it was
        let dir = full.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        let staged = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(UPLOAD_PREFIX)
                .tempfile_in(dir)
        })
        .await
        .map_err(|e| ProviderError::Other(format!("upload temp file task: {}", e)))??;
        let (std_file, temp_path) = staged.into_parts();

        let mut file = fs::File::from_std(std_file);
        tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;

        let modified = SystemTime::from(info.modified);
        let std_file = file.into_std().await;
        let target = full.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std_file.set_modified(modified)?;
            drop(std_file);
            temp_path.persist(&target).map_err(|e| e.error)
        })
        .await
        .map_err(|e| ProviderError::Other(format!("upload commit task: {}", e)))??;

        let meta = fs::metadata(&full).await?;
        Ok(Self::entry_for(&path, &meta))
    }

    async fn mkdir(&self, dir: &str) -> Result<(), ProviderError> {
        let (dir, full) = self.resolve(dir)?;
        if let Ok(meta) = fs::metadata(&full).await {
            return if meta.is_dir() {
                Ok(())
            } else {
                Err(ProviderError::AlreadyExists(dir))
            };
        }
        fs::create_dir_all(&full).await.map_err(|e| map_io(e, &dir))
    }

    async fn rmdir(&self, dir: &str) -> Result<(), ProviderError> {
        let (dir, full) = self.resolve(dir)?;
        let mut reader = fs::read_dir(&full).await.map_err(|e| map_io(e, &dir))?;
        if reader.next_entry().await?.is_some() {
            return Err(ProviderError::DirectoryNotEmpty(dir));
        }
        fs::remove_dir(&full).await.map_err(|e| map_io(e, &dir))
    }

    async fn remove(&self, path: &str) -> Result<(), ProviderError> {
        let (path, full) = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(e, &path))?;
        if meta.is_dir() {
            return Err(ProviderError::InvalidPath(format!("{} is a directory", path)));
        }
        fs::remove_file(&full).await.map_err(|e| map_io(e, &path))
    }

    async fn purge(&self, dir: &str) -> Result<(), ProviderError> {
        let (dir, full) = self.resolve(dir)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(e, &dir))?;
        if !meta.is_dir() {
            return Err(ProviderError::NotFound(dir));
        }
        fs::remove_dir_all(&full).await.map_err(|e| map_io(e, &dir))
    }

    fn supports_stat(&self) -> bool {
        true
    }

    async fn stat(&self, path: &str) -> Result<RemoteEntry, ProviderError> {
        let (path, full) = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(e, &path))?;
        Ok(Self::entry_for(&path, &meta))
    }

    fn supports_move(&self) -> bool {
        true
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let (from, src) = self.resolve(from)?;
        let (to, dst) = self.resolve(to)?;
        let meta = fs::metadata(&src).await.map_err(|e| map_io(e, &from))?;
        if meta.is_dir() {
            return Err(ProviderError::InvalidPath(format!("{} is a directory", from)));
        }
        if fs::metadata(&dst).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(ProviderError::AlreadyExists(to));
        }
        Self::ensure_parent(&dst).await?;
        fs::rename(&src, &dst).await.map_err(|e| map_io(e, &from))
    }

    fn supports_dir_move(&self) -> bool {
        true
    }

    async fn move_dir(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let (from, src) = self.resolve(from)?;
        let (to, dst) = self.resolve(to)?;
        if from.is_empty() || to.is_empty() || to.starts_with(&format!("{}/", from)) {
            return Err(ProviderError::InvalidPath(format!("cannot move {:?} into {:?}", from, to)));
        }
        let meta = fs::metadata(&src).await.map_err(|e| map_io(e, &from))?;
        if !meta.is_dir() {
            return Err(ProviderError::NotFound(from));
        }
        if fs::metadata(&dst).await.is_ok() {
            return Err(ProviderError::AlreadyExists(to));
        }
        Self::ensure_parent(&dst).await?;
        fs::rename(&src, &dst).await.map_err(|e| map_io(e, &from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn put_bytes(fs: &LocalFs, path: &str, data: &[u8]) -> RemoteEntry {
        let info = ObjectInfo::new(path, Utc::now(), data.len() as u64);
        let mut reader = data;
        fs.put(&mut reader, &info).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_list_open() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        let entry = put_bytes(&fs, "a/b/c.txt", b"hello").await;
        assert_eq!(entry.size, 5);
        assert_eq!(entry.path, "a/b/c.txt");

        let listed = fs.list("a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_dir);
        assert_eq!(listed[0].path, "a/b");

        let mut out = String::new();
        fs.open("/a/b/c.txt").await.unwrap().read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello");

        assert!(fs.open("a").await.is_err());
        assert!(fs.list("a/b/c.txt").await.unwrap_err().is_not_found());
    }

    /// Yields some bytes, then fails
    struct BrokenUpload {
        sent: bool,
    }

    impl AsyncRead for BrokenUpload {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.sent {
                return std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "upload stream dropped",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_put_keeps_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        put_bytes(&fs, "keep/doc.txt", b"original").await;

        let info = ObjectInfo::new("keep/doc.txt", Utc::now(), 100);
        let err = fs.put(&mut BrokenUpload { sent: false }, &info).await.unwrap_err();
        assert!(matches!(err, ProviderError::IoError(_)));

        assert_eq!(std::fs::read(dir.path().join("keep/doc.txt")).unwrap(), b"original");
        let names: Vec<_> = std::fs::read_dir(dir.path().join("keep"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["doc.txt"]);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        put_bytes(&fs, "doc.txt", b"first version").await;
        let entry = put_bytes(&fs, "doc.txt", b"v2").await;
        assert_eq!(entry.size, 2);
        assert_eq!(std::fs::read(dir.path().join("doc.txt")).unwrap(), b"v2");
        assert_eq!(fs.list("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_records_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let when = DateTime::parse_from_rfc3339("2021-06-01T12:00:00Z").unwrap().with_timezone(&Utc);

        let info = ObjectInfo::new("old.txt", when, 2);
        let mut reader: &[u8] = b"hi";
        fs.put(&mut reader, &info).await.unwrap();

        let stat = fs.stat("old.txt").await.unwrap();
        assert_eq!(stat.modified.map(|m| m.timestamp()), Some(when.timestamp()));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        assert!(matches!(fs.list("../etc").await, Err(ProviderError::InvalidPath(_))));
        assert!(matches!(fs.stat("a/../../x").await, Err(ProviderError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_native_moves() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        put_bytes(&fs, "src/one.txt", b"1").await;
        put_bytes(&fs, "src/sub/two.txt", b"22").await;

        fs.move_file("src/one.txt", "dst/uno.txt").await.unwrap();
        assert!(fs.stat("src/one.txt").await.unwrap_err().is_not_found());
        assert_eq!(fs.stat("dst/uno.txt").await.unwrap().size, 1);

        fs.move_dir("src", "moved").await.unwrap();
        assert!(fs.stat("src").await.unwrap_err().is_not_found());
        assert_eq!(fs.stat("moved/sub/two.txt").await.unwrap().size, 2);

        assert!(matches!(fs.move_dir("moved", "dst").await, Err(ProviderError::AlreadyExists(_))));
        assert!(matches!(fs.move_dir("moved", "moved/inner").await, Err(ProviderError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_rmdir_requires_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        put_bytes(&fs, "full/x", b"x").await;
        fs.mkdir("empty").await.unwrap();
        fs.mkdir("empty").await.unwrap();

        assert!(matches!(fs.rmdir("full").await, Err(ProviderError::DirectoryNotEmpty(_))));
        fs.rmdir("empty").await.unwrap();
        assert!(matches!(fs.mkdir("full/x").await, Err(ProviderError::AlreadyExists(_))));

        fs.purge("full").await.unwrap();
        assert!(fs.list("").await.unwrap().is_empty());
    }

    #[test]
    fn test_from_params() {
        let mut params = HashMap::new();
        params.insert("root".to_string(), "/srv".to_string());
        assert_eq!(LocalFs::from_params(&params, "data").unwrap().root, PathBuf::from("/srv/data"));
        assert_eq!(LocalFs::from_params(&HashMap::new(), "").unwrap().root, PathBuf::from("."));
    }
}
