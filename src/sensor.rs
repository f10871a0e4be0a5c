use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    error::TelemetryError,
    notify::Notifier,
    service::{ServiceState, TelemetryService},
};

pub const TEMPERATURE_KEY: &str = "current_temperature";
pub const HUMIDITY_KEY: &str = "current_humidity";
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Blocking I/O
pub trait ClimateSensor: core::fmt::Debug + Sync + Send {
    fn current_temperature(&self) -> anyhow::Result<f64>;
    fn current_humidity(&self) -> anyhow::Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub status: SensorStatus,
    pub error: Option<String>,
    /// Last successful reading; kept while the sensor is offline.
    pub reading: Option<ClimateReading>,
}
impl SensorState {
    pub fn new() -> Self {
        Self {
            status: SensorStatus::Online,
            error: None,
            reading: None,
        }
    }
}
impl Default for SensorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds sensor readings into the telemetry service and raises one
/// notification per online to offline transition.
#[derive(Debug)]
pub struct SensorPoller {
    sensor: Arc<dyn ClimateSensor>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<SensorState>,
}
impl SensorPoller {
    pub fn new(sensor: Arc<dyn ClimateSensor>, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(SensorState::new());
        Self {
            sensor,
            notifier,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SensorState> {
        self.state.subscribe()
    }
    pub fn state(&self) -> SensorState {
        self.state.borrow().clone()
    }

    /// Both values are recorded even when the first one is rejected; the
    /// first error is returned.
    pub async fn poll(&self, service: &TelemetryService) -> Result<(), TelemetryError> {
        let sensor = self.sensor.clone();
        let reading = tokio::task::spawn_blocking(move || -> anyhow::Result<ClimateReading> {
            let temperature = sensor.current_temperature()?;
            let humidity = sensor.current_humidity()?;
            Ok(ClimateReading {
                temperature,
                humidity,
            })
        })
        .await
        .unwrap_or_else(|e| Err(e.into()));

        let reading = match reading {
            Ok(reading) => reading,
            Err(e) => {
                self.fail(format!("{e:#}")).await;
                return Ok(());
            }
        };
        self.state.send_modify(|state| {
            if state.status == SensorStatus::Offline {
                info!("sensor back online");
            }
            state.status = SensorStatus::Online;
            state.error = None;
            state.reading = Some(reading);
        });
        let temperature = service.record(TEMPERATURE_KEY, reading.temperature).await;
        let humidity = service.record(HUMIDITY_KEY, reading.humidity).await;
        temperature.and(humidity)
    }

    async fn fail(&self, message: String) {
        error!(error = %message, "can't get sensor data");
        let mut was_online = false;
        self.state.send_modify(|state| {
            was_online = state.status == SensorStatus::Online;
            state.status = SensorStatus::Offline;
            state.error = Some(message.clone());
        });
        if !was_online {
            return;
        }
        let notifier = self.notifier.clone();
        let body = format!("Sensor error occurred: {message}");
        let sent = tokio::task::spawn_blocking(move || notifier.notify("Sensor Error", &body)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "can't send notification"),
            Err(e) => warn!(error = %e, "notifier panicked"),
        }
    }

    /// Polls every `interval` until the service leaves [`ServiceState::Running`].
    /// Readings dropped under backpressure are logged and polling goes on.
    pub async fn run(self, service: Arc<TelemetryService>, interval: Duration) {
        let stopped = stopped(service.subscribe_state());
        tokio::pin!(stopped);
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(?interval, "start syncing sensor data");
        loop {
            tokio::select! {
                _ = ticks.tick() => match self.poll(&service).await {
                    Ok(()) => {}
                    Err(TelemetryError::ServiceStopped) => {
                        info!("sensor polling stopped");
                        break;
                    }
                    Err(e) => warn!(error = %e, "dropped sensor reading"),
                },
                () = &mut stopped => break,
            }
        }
    }
}

async fn stopped(mut state: watch::Receiver<ServiceState>) {
    let _ = state.wait_for(|state| *state != ServiceState::Running).await;
}
