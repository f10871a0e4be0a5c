use std::{collections::BTreeMap, time::Duration};

use crate::{millis, Sample, Time, HOUR};

/// Buckets with fewer samples are averaged untrimmed.
pub const TRIM_THRESHOLD: usize = 5;
const TRIM_LOW: usize = 2;
const TRIM_HIGH: usize = 3;

pub fn truncate_to_hour(time: Time) -> Time {
    time - time % HOUR
}

/// Hourly trimmed means over `now - window ..= now`, oldest bucket first.
///
/// Each returned sample carries the bucket start as its time.
pub fn average(samples: &[Sample], window: Duration, now: Time) -> Vec<Sample> {
    let start = now.saturating_sub(millis(window));
    let mut buckets: BTreeMap<Time, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        if !(start..=now).contains(&sample.time) {
            continue;
        }
        buckets
            .entry(truncate_to_hour(sample.time))
            .or_default()
            .push(sample.value);
    }
    buckets
        .into_iter()
        .map(|(time, mut values)| {
            let values = normalize(&mut values);
            let value = values.iter().sum::<f64>() / values.len() as f64;
            Sample { time, value }
        })
        .collect()
}

/// Drops the 2 lowest and 3 highest values once there are at least
/// [`TRIM_THRESHOLD`] of them, as long as something is left.
pub fn normalize(values: &mut [f64]) -> &[f64] {
    if values.len() < TRIM_THRESHOLD {
        return values;
    }
    values.sort_by(f64::total_cmp);
    let end = values.len() - TRIM_HIGH;
    // exactly five values would trim to nothing
    if end <= TRIM_LOW {
        return values;
    }
    &values[TRIM_LOW..end]
}
