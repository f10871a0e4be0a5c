use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tracing::{debug, info};

use crate::{
    consumer::{GaugeTimeline, Series},
    error::TelemetryError,
    millis, now, MetricKey, Sample, Time,
};

const BATCH_SIZE: usize = 256;

#[derive(Debug)]
pub enum Ingest {
    Sample(MetricKey, Sample),
    /// Acknowledged once everything queued before it is applied.
    Barrier(oneshot::Sender<()>),
}

/// Append-only gauge store. Writes go through a bounded queue to the single
/// [`Collector`]; reads copy out under a read lock.
#[derive(Debug, Clone)]
pub struct GaugeStore {
    timeline: Arc<RwLock<GaugeTimeline>>,
    tx: mpsc::Sender<Ingest>,
    ingest_timeout: Duration,
}
impl GaugeStore {
    pub fn new(capacity: usize, ingest_timeout: Duration) -> (Self, Collector) {
        let timeline = Arc::new(RwLock::new(GaugeTimeline::new()));
        let (tx, rx) = mpsc::channel(capacity);
        let collector = Collector {
            timeline: timeline.clone(),
            rx,
        };
        let store = Self {
            timeline,
            tx,
            ingest_timeout,
        };
        (store, collector)
    }

    /// Waits at most the ingest timeout for queue space.
    pub async fn record(&self, key: &str, sample: Sample) -> Result<(), TelemetryError> {
        check_key(key)?;
        let msg = Ingest::Sample(key.to_owned(), sample);
        self.tx
            .send_timeout(msg, self.ingest_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => TelemetryError::QueueFull,
                mpsc::error::SendTimeoutError::Closed(_) => TelemetryError::ServiceStopped,
            })
    }
    pub fn try_record(&self, key: &str, sample: Sample) -> Result<(), TelemetryError> {
        check_key(key)?;
        let msg = Ingest::Sample(key.to_owned(), sample);
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TelemetryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TelemetryError::ServiceStopped,
        })
    }

    /// Returns once every sample queued before the call is visible to readers.
    pub async fn flush(&self) -> Result<(), TelemetryError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Ingest::Barrier(tx))
            .await
            .map_err(|_| TelemetryError::ServiceStopped)?;
        rx.await.map_err(|_| TelemetryError::ServiceStopped)
    }
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn snapshot(&self) -> GaugeTimeline {
        self.timeline.read().await.clone()
    }
    pub async fn series(&self, key: &str) -> Option<Series> {
        self.timeline.read().await.get(key).cloned()
    }

    pub async fn prune(&self, cutoff: Time) -> usize {
        self.timeline.write().await.prune(cutoff)
    }
    pub async fn restore(&self, timeline: GaugeTimeline) {
        *self.timeline.write().await = timeline;
    }

    /// Blocks the collector until the guard is dropped.
    #[cfg(test)]
    pub(crate) async fn stall_writes(&self) -> tokio::sync::OwnedRwLockWriteGuard<GaugeTimeline> {
        self.timeline.clone().write_owned().await
    }
}

fn check_key(key: &str) -> Result<(), TelemetryError> {
    if key.is_empty() || u16::try_from(key.len()).is_err() {
        return Err(TelemetryError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// The only writer of the timeline.
#[derive(Debug)]
pub struct Collector {
    timeline: Arc<RwLock<GaugeTimeline>>,
    rx: mpsc::Receiver<Ingest>,
}
impl Collector {
    /// Applies queued samples until `shutdown` flips, then closes the queue and
    /// drains what is left.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        debug!("collector started");
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        loop {
            tokio::select! {
                n = self.rx.recv_many(&mut batch, BATCH_SIZE) => {
                    if n == 0 {
                        break;
                    }
                    self.apply(&mut batch).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        self.rx.close();
        let mut drained = 0;
        while self.rx.recv_many(&mut batch, BATCH_SIZE).await != 0 {
            drained += batch.len();
            self.apply(&mut batch).await;
        }
        debug!(drained, "collector stopped");
    }

    async fn apply(&self, batch: &mut Vec<Ingest>) {
        let mut barriers = vec![];
        {
            let mut timeline = self.timeline.write().await;
            for msg in batch.drain(..) {
                match msg {
                    Ingest::Sample(key, sample) => {
                        debug!(%key, value = sample.value, time = sample.time, "gauge");
                        timeline.push(&key)(sample);
                    }
                    Ingest::Barrier(ack) => barriers.push(ack),
                }
            }
        }
        for ack in barriers {
            let _ = ack.send(());
        }
    }
}

/// Drops samples older than the retention period on a fixed cadence.
#[derive(Debug)]
pub struct Cleaner {
    store: GaugeStore,
    retention: Duration,
    interval: Duration,
}
impl Cleaner {
    pub fn new(store: GaugeStore, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.retention.is_zero() {
            info!("retention disabled");
            return;
        }
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticks = tokio::time::interval_at(start, self.interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    let cutoff = now().saturating_sub(millis(self.retention));
                    let removed = self.store.prune(cutoff).await;
                    if removed != 0 {
                        debug!(removed, retention = ?self.retention, "pruned by retention policy");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
