//! Move / rename
//!
//! Uses the backend's native move when it has one. Otherwise files are copied,
//! verified by size and then deleted, and directories are walked and moved
//! entry by entry. Any failure after something has already been relocated is
//! reported as [`ProviderError::PartialMove`] so callers can tell an untouched
//! tree from a half-moved one.

use chrono::Utc;
use tracing::{debug, warn};

use crate::providers::{join_path, normalize_path, ObjectInfo, ProviderError, RemoteEntry, RemoteFs};
use crate::resolver::resolve_entry;

/// Move `from` to `to`, whether it is a file or a directory tree
pub async fn move_path(fs: &dyn RemoteFs, from: &str, to: &str) -> Result<(), ProviderError> {
    let from = normalize_path(from);
    let to = normalize_path(to);
    if from.is_empty() || to.is_empty() {
        return Err(ProviderError::InvalidPath("cannot move the remote root".to_string()));
    }
    if to.starts_with(&format!("{}/", from)) {
        return Err(ProviderError::InvalidPath(format!("cannot move {:?} into itself", from)));
    }

    let entry = resolve_entry(fs, &from).await?;
    if from == to {
        return Ok(());
    }
    if entry.is_dir {
        move_dir(fs, &from, &to).await
    } else {
        move_file(fs, &entry, &to).await
    }
}

async fn move_file(fs: &dyn RemoteFs, src: &RemoteEntry, to: &str) -> Result<(), ProviderError> {
    if fs.supports_move() {
        match fs.move_file(&src.path, to).await {
            Err(e) if e.is_not_supported() => {
                debug!("Native move refused for {:?}, copying instead", src.path);
            }
            other => return other,
        }
    }
    copy_then_delete(fs, src, to).await
}

async fn copy_then_delete(fs: &dyn RemoteFs, src: &RemoteEntry, to: &str) -> Result<(), ProviderError> {
    let mut reader = fs.open(&src.path).await?;
    let info = ObjectInfo::new(to, src.modified.unwrap_or_else(Utc::now), src.size);
    let written = fs.put(&mut *reader, &info).await?;
    drop(reader);

    if written.size != src.size {
        return Err(ProviderError::IntegrityMismatch {
            path: to.to_string(),
            expected: src.size,
            actual: written.size,
        });
    }

    if let Err(e) = fs.remove(&src.path).await {
        warn!("Copied {:?} to {:?} but could not delete the source: {}", src.path, to, e);
        return Err(ProviderError::PartialMove {
            from: src.path.clone(),
            to: to.to_string(),
            reason: format!("source delete failed: {}", e),
        });
    }
    Ok(())
}

async fn move_dir(fs: &dyn RemoteFs, from: &str, to: &str) -> Result<(), ProviderError> {
    if fs.supports_dir_move() {
        match fs.move_dir(from, to).await {
            Err(e) if e.is_not_supported() || matches!(e, ProviderError::AlreadyExists(_)) => {
                debug!("Native directory move unavailable for {:?} ({}), merging", from, e);
            }
            other => return other,
        }
    }

    let mut moved_any = false;
    let result = walk_and_move(fs, from, to, &mut moved_any).await;
    match result {
        Err(e) if moved_any => {
            warn!("Directory move {:?} -> {:?} stopped halfway: {}", from, to, e);
            Err(ProviderError::PartialMove {
                from: from.to_string(),
                to: to.to_string(),
                reason: e.to_string(),
            })
        }
        other => other,
    }
}

async fn walk_and_move(
    fs: &dyn RemoteFs,
    from: &str,
    to: &str,
    moved_any: &mut bool,
) -> Result<(), ProviderError> {
    let mut pending = vec![(from.to_string(), to.to_string())];
    let mut emptied = Vec::new();

    while let Some((src_dir, dst_dir)) = pending.pop() {
        fs.mkdir(&dst_dir).await?;
        for child in fs.list(&src_dir).await? {
            let target = join_path(&dst_dir, &child.name);
            if child.is_dir {
                pending.push((child.path, target));
            } else {
                move_file(fs, &child, &target).await?;
                *moved_any = true;
            }
        }
        emptied.push(src_dir);
    }

    // deepest first
    for dir in emptied.iter().rev() {
        match fs.rmdir(dir).await {
            Err(e) if e.is_not_found() => {}
            other => other?,
        }
    }
    Ok(())
}
