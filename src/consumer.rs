use std::collections::HashMap;

use crate::{MetricKey, Sample, Time};

/// Every gauge series, keyed by metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeTimeline {
    metrics: HashMap<MetricKey, Series>,
}
impl GaugeTimeline {
    pub fn new() -> Self {
        Self {
            metrics: HashMap::new(),
        }
    }

    pub fn push(&mut self, key: &str) -> impl FnMut(Sample) + use<'_> {
        let series = self.metrics.entry(key.to_owned()).or_default();
        move |sample: Sample| {
            series.push(sample);
        }
    }
    pub fn insert(&mut self, key: MetricKey, series: Series) -> Option<Series> {
        self.metrics.insert(key, series)
    }
    pub fn get(&self, key: &str) -> Option<&Series> {
        self.metrics.get(key)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &Series)> {
        self.metrics.iter()
    }
    pub fn len(&self) -> usize {
        self.metrics.len()
    }
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
    pub fn sample_count(&self) -> usize {
        self.metrics.values().map(Series::len).sum()
    }

    /// Drops samples older than `cutoff` from every series. Keys stay even when
    /// their series empties.
    pub fn prune(&mut self, cutoff: Time) -> usize {
        self.metrics
            .values_mut()
            .map(|series| series.prune(cutoff))
            .sum()
    }
}
impl FromIterator<(MetricKey, Series)> for GaugeTimeline {
    fn from_iter<T: IntoIterator<Item = (MetricKey, Series)>>(iter: T) -> Self {
        let metrics = iter.into_iter().collect();
        Self { metrics }
    }
}

/// Samples of one metric in arrival order, which is not necessarily
/// chronological.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    buf: Vec<Sample>,
}
impl Series {
    pub fn new() -> Self {
        let buf = Vec::new();
        Self { buf }
    }

    pub fn push(&mut self, sample: Sample) {
        self.buf.push(sample);
    }
    pub fn samples(&self) -> &[Sample] {
        &self.buf
    }
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn span(&self, range: core::ops::RangeInclusive<Time>) -> impl Iterator<Item = Sample> + '_ {
        self.buf
            .iter()
            .filter(move |sample| range.contains(&sample.time))
            .copied()
    }

    pub fn prune(&mut self, cutoff: Time) -> usize {
        let before = self.buf.len();
        self.buf.retain(|sample| cutoff <= sample.time);
        before - self.buf.len()
    }
}
impl From<Vec<Sample>> for Series {
    fn from(buf: Vec<Sample>) -> Self {
        Self { buf }
    }
}
