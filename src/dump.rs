use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{watch, Mutex};
use tracing::{debug, error};

use crate::{
    codec::{decode_timeline, encode_timeline},
    consumer::GaugeTimeline,
    error::TelemetryError,
    in_mem::GaugeStore,
};

/// Whole-timeline snapshot at a fixed path.
///
/// Each write lands in its own temp file next to the target, which is synced
/// and then renamed over it, so readers see either the previous snapshot or
/// the new one. Clones share one lock and write one at a time.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}
impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, timeline: &GaugeTimeline) -> Result<(), TelemetryError> {
        let _guard = self.lock.lock().await;
        self.write_locked(timeline).await
    }

    /// Copies the store and writes it under the write lock, so a later save
    /// never gets replaced by an older copy. Returns the number of samples
    /// written.
    pub async fn save(&self, store: &GaugeStore) -> Result<usize, TelemetryError> {
        let _guard = self.lock.lock().await;
        let timeline = store.snapshot().await;
        self.write_locked(&timeline).await?;
        Ok(timeline.sample_count())
    }

    async fn write_locked(&self, timeline: &GaugeTimeline) -> Result<(), TelemetryError> {
        let mut buf = vec![];
        encode_timeline(&mut buf, timeline).map_err(TelemetryError::StorageUnavailable)?;
        let bytes = buf.len();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_synced(&path, &buf))
            .await
            .map_err(|e| TelemetryError::StorageUnavailable(io::Error::other(e)))?
            .map_err(TelemetryError::StorageUnavailable)?;
        debug!(path = %self.path.display(), bytes, "snapshot written");
        Ok(())
    }

    pub async fn read(&self) -> Result<GaugeTimeline, TelemetryError> {
        let buf = match tokio::fs::read(&self.path).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TelemetryError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(TelemetryError::StorageUnavailable(e)),
        };
        decode_timeline(&mut &buf[..]).await
    }
}

/// Blocking I/O. The temp file is removed on every failure path.
fn write_synced(path: &Path, buf: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut prefix = path.file_name().unwrap_or_default().to_os_string();
    prefix.push(".");
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(buf)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Writes a snapshot every `interval` until shutdown. Failed writes are logged
/// and retried on the next tick.
#[derive(Debug)]
pub struct Autosaver {
    store: GaugeStore,
    file: SnapshotFile,
    interval: Duration,
}
impl Autosaver {
    pub fn new(store: GaugeStore, file: SnapshotFile, interval: Duration) -> Self {
        Self {
            store,
            file,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticks = tokio::time::interval_at(start, self.interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    debug!("autosave");
                    if let Err(e) = self.file.save(&self.store).await {
                        error!(error = %e, "autosave failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
