use std::time::Duration;

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::{
    aggregate,
    config::TelemetryConfig,
    consumer::GaugeTimeline,
    dump::{Autosaver, SnapshotFile},
    error::TelemetryError,
    in_mem::{Cleaner, GaugeStore},
    now, Sample, Time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Hydrating,
    Running,
    Flushing,
    Stopped,
}

/// Gauge ingestion, retention, hourly averages and snapshot persistence behind
/// one handle.
#[derive(Debug)]
pub struct TelemetryService {
    store: GaugeStore,
    dump: Option<SnapshotFile>,
    state: watch::Sender<ServiceState>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    span: Span,
}
impl TelemetryService {
    /// Spawns the background workers on the current tokio runtime. Every log
    /// line of the service and its workers is emitted inside `span`.
    pub async fn start(config: TelemetryConfig, span: Span) -> Result<Self, TelemetryError> {
        config.validate()?;
        let (state, _) = watch::channel(ServiceState::Created);
        let (store, collector) = GaugeStore::new(config.queue_capacity, config.ingest_timeout);
        let dump = config
            .enable_persistence
            .then(|| SnapshotFile::new(&config.dump_path));

        if let Some(dump) = &dump {
            state.send_replace(ServiceState::Hydrating);
            hydrate(&store, dump).instrument(span.clone()).await;
        }

        let (shutdown, _) = watch::channel(false);
        let mut workers = vec![];
        workers.push(tokio::spawn(
            collector
                .run(shutdown.subscribe())
                .instrument(span.clone()),
        ));
        let cleaner = Cleaner::new(store.clone(), config.retention, config.prune_interval);
        workers.push(tokio::spawn(
            cleaner.run(shutdown.subscribe()).instrument(span.clone()),
        ));
        if let Some(dump) = &dump {
            if !config.autosave_interval.is_zero() {
                let saver = Autosaver::new(store.clone(), dump.clone(), config.autosave_interval);
                workers.push(tokio::spawn(
                    saver.run(shutdown.subscribe()).instrument(span.clone()),
                ));
            }
        }

        state.send_replace(ServiceState::Running);
        span.in_scope(|| info!(?config, "telemetry running"));
        Ok(Self {
            store,
            dump,
            state,
            shutdown,
            workers: Mutex::new(workers),
            span,
        })
    }

    pub fn store(&self) -> &GaugeStore {
        &self.store
    }
    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }
    pub fn subscribe_state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    pub async fn record(&self, key: &str, value: f64) -> Result<(), TelemetryError> {
        self.record_at(key, value, now()).await
    }
    pub async fn record_at(&self, key: &str, value: f64, time: Time) -> Result<(), TelemetryError> {
        self.store.record(key, Sample { time, value }).await
    }
    /// Fails with [`TelemetryError::QueueFull`] instead of waiting.
    pub fn try_record(&self, key: &str, value: f64) -> Result<(), TelemetryError> {
        self.store.try_record(key, Sample { time: now(), value })
    }

    /// Hourly trimmed means of `key` over the last `window`, oldest first.
    pub async fn average(&self, key: &str, window: Duration) -> Vec<Sample> {
        self.average_at(key, window, now()).await
    }
    /// Like [`Self::snapshot`], includes every sample recorded before the call.
    pub async fn average_at(&self, key: &str, window: Duration, now: Time) -> Vec<Sample> {
        if let Err(e) = self.store.flush().await {
            debug!(parent: &self.span, error = %e, "average without flush");
        }
        let Some(series) = self.store.series(key).await else {
            return vec![];
        };
        aggregate::average(series.samples(), window, now)
    }

    /// Includes every sample recorded before the call.
    pub async fn snapshot(&self) -> GaugeTimeline {
        if let Err(e) = self.store.flush().await {
            debug!(parent: &self.span, error = %e, "snapshot without flush");
        }
        self.store.snapshot().await
    }

    /// Writes a snapshot now. No-op without persistence.
    pub async fn save(&self) -> Result<(), TelemetryError> {
        let Some(dump) = &self.dump else {
            return Ok(());
        };
        if let Err(e) = self.store.flush().await {
            debug!(parent: &self.span, error = %e, "save without flush");
        }
        dump.save(&self.store).await.map(|_| ())
    }

    /// Stops ingestion, drains queued samples and writes the final snapshot.
    /// Later calls return `Ok(())` without doing anything.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        let mut workers = self.workers.lock().await;
        if self.state() == ServiceState::Stopped {
            return Ok(());
        }
        self.state.send_replace(ServiceState::Flushing);
        info!(parent: &self.span, "telemetry shutting down");
        self.shutdown.send_replace(true);
        for worker in workers.drain(..) {
            if let Err(e) = worker.await {
                error!(parent: &self.span, error = %e, "telemetry worker failed");
            }
        }

        let result = match &self.dump {
            Some(dump) => match dump.save(&self.store).await {
                Ok(samples) => {
                    info!(parent: &self.span, samples, "final snapshot written");
                    Ok(())
                }
                Err(e) => {
                    error!(parent: &self.span, error = %e, "final snapshot failed");
                    Err(e)
                }
            },
            None => Ok(()),
        };
        self.state.send_replace(ServiceState::Stopped);
        result
    }
}

async fn hydrate(store: &GaugeStore, dump: &SnapshotFile) {
    info!(path = %dump.path().display(), "restoring from snapshot");
    match dump.read().await {
        Ok(timeline) => {
            for (key, series) in timeline.iter() {
                info!(%key, samples = series.len(), "restored");
            }
            store.restore(timeline).await;
        }
        Err(e @ TelemetryError::NotFound(_)) => info!(error = %e, "starting empty"),
        Err(e @ TelemetryError::CorruptSnapshot(_)) => {
            warn!(error = %e, "snapshot is corrupt, starting empty")
        }
        Err(e) => warn!(error = %e, "snapshot unreadable, starting empty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HOUR;

    async fn start(config: TelemetryConfig) -> TelemetryService {
        TelemetryService::start(config, Span::none()).await.unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_without_persistence() {
        let service = start(TelemetryConfig::new()).await;
        assert_eq!(service.state(), ServiceState::Running);
        service.record("t", 1.0).await.unwrap();
        service.shutdown().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.snapshot().await.sample_count(), 1);
    }

    #[tokio::test]
    async fn test_record_after_shutdown() {
        let service = start(TelemetryConfig::new()).await;
        service.shutdown().await.unwrap();
        assert!(matches!(
            service.record("t", 1.0).await,
            Err(TelemetryError::ServiceStopped)
        ));
        assert!(matches!(
            service.try_record("t", 1.0),
            Err(TelemetryError::ServiceStopped)
        ));
    }

    #[tokio::test]
    async fn test_average() {
        let service = start(TelemetryConfig::new()).await;
        let base = 100 * HOUR;
        for (offset, value) in [(0, 10.0), (1, 20.0), (2, 30.0), (HOUR, 5.0)] {
            service.record_at("t", value, base + offset).await.unwrap();
        }
        service.snapshot().await;
        let avg = service
            .average_at("t", Duration::from_secs(24 * 3600), base + HOUR + 1)
            .await;
        assert_eq!(
            avg,
            [
                Sample { time: base, value: 20.0 },
                Sample { time: base + HOUR, value: 5.0 }
            ]
        );
        assert!(service
            .average_at("missing", Duration::from_secs(3600), base)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_average_includes_latest_record() {
        let service = start(TelemetryConfig::new()).await;
        let base = 200 * HOUR;
        for i in 0..20u32 {
            let key = format!("t{i}");
            let value = f64::from(i);
            service.record_at(&key, value, base).await.unwrap();
            let avg = service
                .average_at(&key, Duration::from_secs(3600), base + 1)
                .await;
            assert_eq!(avg, [Sample { time: base, value }]);
        }
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let config = TelemetryConfig::new().with_queue_capacity(0);
        assert!(matches!(
            TelemetryService::start(config, Span::none()).await,
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_save_without_persistence_is_noop() {
        let service = start(TelemetryConfig::new()).await;
        service.save().await.unwrap();
        service.shutdown().await.unwrap();
    }
}
