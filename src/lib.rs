use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod dump;
pub mod error;
pub mod in_mem;
pub mod notify;
pub mod sensor;
pub mod service;
pub mod sparkline;
pub mod view;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use service::{ServiceState, TelemetryService};

pub type MetricKey = String;
/// Milliseconds since the Unix epoch.
pub type Time = u64;

pub const SAMPLE_SIZE: usize = 16;
pub const HOUR: Time = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: Time,
    pub value: f64,
}

pub fn now() -> Time {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    millis(since_epoch)
}

/// Saturates at [`Time::MAX`].
pub fn millis(dur: Duration) -> Time {
    Time::try_from(dur.as_millis()).unwrap_or(Time::MAX)
}

pub fn system_time(time: Time) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(time)
}
