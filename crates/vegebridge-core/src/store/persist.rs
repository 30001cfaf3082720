// ── Store persistence ──
//
// Writes go to a temp file beside the target and are renamed over it,
// so a crash mid-write leaves the previous copy intact. The background
// persister coalesces bursts of mutations into one write.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Replace `path` with `contents` via temp file + rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    let write_err = |reason: String| CoreError::StoreWrite {
        path: path.to_path_buf(),
        reason,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| write_err(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|()| tmp.write_all(b"\n"))
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| write_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;
    Ok(())
}

/// Serialized store snapshots waiting to be written. `None` until the
/// first mutation.
pub(crate) type SnapshotSender = watch::Sender<Option<Arc<String>>>;

/// Write the latest snapshot whenever it changes, at most once per
/// `debounce`. Flushes whatever is pending when cancelled.
pub(crate) async fn persister_task(
    path: PathBuf,
    mut rx: watch::Receiver<Option<Arc<String>>>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    // Set while a change has been seen but not yet written.
    let mut pending = false;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                pending = true;
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(debounce) => {}
                }
                pending = false;
                let snapshot = rx.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    write_snapshot(path.clone(), snapshot).await;
                }
            }
        }
    }

    // Final flush of anything not yet written.
    if pending || rx.has_changed().unwrap_or(false) {
        let snapshot = rx.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            write_snapshot(path, snapshot).await;
        }
    }
    debug!("settings persister stopped");
}

async fn write_snapshot(path: PathBuf, snapshot: Arc<String>) {
    let result = tokio::task::spawn_blocking(move || write_atomic(&path, &snapshot)).await;
    match result {
        Ok(Ok(())) => debug!("settings written"),
        Ok(Err(e)) => warn!(error = %e, "settings write failed (in-memory copy kept)"),
        Err(e) => warn!(error = %e, "settings writer task failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn write_atomic_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/store.json");
        write_atomic(&path, "{}").unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn persister_coalesces_and_flushes_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(persister_task(
            path.clone(),
            rx,
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        tx.send_replace(Some(Arc::new("{\"a\": 1}".to_string())));
        tx.send_replace(Some(Arc::new("{\"a\": 2}".to_string())));
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\": 2}\n");
    }
}
