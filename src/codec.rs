use std::io::{self, Write};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    consumer::{GaugeTimeline, Series},
    error::TelemetryError,
    MetricKey, Sample, SAMPLE_SIZE,
};

pub const FORMAT_VERSION: u16 = 1;

pub fn encode_timeline(wtr: &mut impl Write, timeline: &GaugeTimeline) -> io::Result<()> {
    wtr.write_all(&FORMAT_VERSION.to_be_bytes())?;
    wtr.write_all(&encode_count(timeline.len())?)?;
    let mut metrics: Vec<_> = timeline.iter().collect();
    metrics.sort_unstable_by(|a, b| a.0.cmp(b.0));
    for (key, series) in metrics {
        encode_key(wtr, key)?;
        wtr.write_all(&encode_count(series.len())?)?;
        for &sample in series.samples() {
            wtr.write_all(&encode_sample(sample))?;
        }
    }
    Ok(())
}

/// Reads one complete timeline; the reader must end right after it.
pub async fn decode_timeline<R>(rdr: &mut R) -> Result<GaugeTimeline, TelemetryError>
where
    R: AsyncRead + Unpin,
{
    let version = rdr.read_u16().await.map_err(corrupt)?;
    if version != FORMAT_VERSION {
        return Err(TelemetryError::CorruptSnapshot(format!(
            "unsupported format version {version}"
        )));
    }
    let key_count = rdr.read_u32().await.map_err(corrupt)?;
    let mut timeline = GaugeTimeline::new();
    let mut key = MetricKey::new();
    for _ in 0..key_count {
        decode_key(rdr, &mut key).await.map_err(corrupt)?;
        let sample_count = rdr.read_u32().await.map_err(corrupt)?;
        let mut samples = vec![];
        for _ in 0..sample_count {
            let mut sample = [0; SAMPLE_SIZE];
            rdr.read_exact(&mut sample).await.map_err(corrupt)?;
            samples.push(decode_sample(sample));
        }
        if timeline.insert(key.clone(), Series::from(samples)).is_some() {
            return Err(TelemetryError::CorruptSnapshot(format!(
                "duplicate key {key:?}"
            )));
        }
    }
    let mut trailing = [0; 1];
    if rdr.read(&mut trailing).await.map_err(corrupt)? != 0 {
        return Err(TelemetryError::CorruptSnapshot("trailing bytes".into()));
    }
    Ok(timeline)
}

fn corrupt(e: io::Error) -> TelemetryError {
    TelemetryError::CorruptSnapshot(e.to_string())
}

pub fn encode_key(wtr: &mut impl Write, key: &str) -> io::Result<()> {
    let len = u16::try_from(key.len())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    wtr.write_all(&len.to_be_bytes())?;
    wtr.write_all(key.as_bytes())?;
    Ok(())
}
pub async fn decode_key<R>(rdr: &mut R, key: &mut MetricKey) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let len = rdr.read_u16().await?;
    let buf = std::mem::take(key);
    let mut buf = buf.into_bytes();
    buf.clear();
    buf.resize(usize::from(len), 0);
    rdr.read_exact(&mut buf).await?;
    let buf = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    *key = buf;
    Ok(())
}

fn encode_count(count: usize) -> io::Result<[u8; 4]> {
    let count =
        u32::try_from(count).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    Ok(count.to_be_bytes())
}

pub fn encode_sample(sample: Sample) -> [u8; SAMPLE_SIZE] {
    let mut buf = [0; SAMPLE_SIZE];
    buf[..8].copy_from_slice(&sample.time.to_be_bytes());
    buf[8..].copy_from_slice(&sample.value.to_be_bytes());
    buf
}
pub fn decode_sample(buf: [u8; SAMPLE_SIZE]) -> Sample {
    let mut time = [0; 8];
    time.copy_from_slice(&buf[..8]);
    let mut value = [0; 8];
    value.copy_from_slice(&buf[8..]);
    Sample {
        time: u64::from_be_bytes(time),
        value: f64::from_be_bytes(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> GaugeTimeline {
        let mut timeline = GaugeTimeline::new();
        {
            let mut push = timeline.push("current_temperature");
            push(Sample { time: 1_700_000_000_000, value: 21.5 });
            push(Sample { time: 1_699_999_999_000, value: -3.25 });
            push(Sample { time: 1_700_000_001_000, value: 0.0 });
        }
        timeline.push("current_humidity")(Sample { time: 7, value: 55.125 });
        timeline.insert("empty".into(), Series::new());
        timeline
    }

    fn encode(timeline: &GaugeTimeline) -> Vec<u8> {
        let mut buf = vec![];
        encode_timeline(&mut buf, timeline).unwrap();
        buf
    }

    #[tokio::test]
    async fn test_round_trip() {
        let timeline = timeline();
        let buf = encode(&timeline);
        let decoded = decode_timeline(&mut &buf[..]).await.unwrap();
        assert_eq!(decoded, timeline);
        let order: Vec<_> = decoded
            .get("current_temperature")
            .unwrap()
            .samples()
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(order, [21.5, -3.25, 0.0]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = timeline();
        let b: GaugeTimeline = a.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(encode(&a), encode(&b));
    }

    #[test]
    fn test_version_leads() {
        let buf = encode(&GaugeTimeline::new());
        assert_eq!(buf, [0, 1, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_truncated_is_corrupt() {
        let buf = encode(&timeline());
        for len in [0, 1, 5, 9, buf.len() - 1] {
            let err = decode_timeline(&mut &buf[..len]).await.unwrap_err();
            assert!(matches!(err, TelemetryError::CorruptSnapshot(_)), "len {len}: {err}");
        }
    }

    #[tokio::test]
    async fn test_trailing_bytes_are_corrupt() {
        let mut buf = encode(&timeline());
        buf.push(0);
        let err = decode_timeline(&mut &buf[..]).await.unwrap_err();
        assert!(matches!(err, TelemetryError::CorruptSnapshot(_)));
    }

    #[tokio::test]
    async fn test_unknown_version_is_corrupt() {
        let mut buf = encode(&timeline());
        buf[1] = 9;
        let err = decode_timeline(&mut &buf[..]).await.unwrap_err();
        assert!(matches!(err, TelemetryError::CorruptSnapshot(_)));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_corrupt() {
        let mut buf = vec![];
        buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        for _ in 0..2 {
            encode_key(&mut buf, "a").unwrap();
            buf.extend_from_slice(&0u32.to_be_bytes());
        }
        let err = decode_timeline(&mut &buf[..]).await.unwrap_err();
        assert!(matches!(err, TelemetryError::CorruptSnapshot(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_key_is_corrupt() {
        let mut buf = vec![];
        buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(&[0xff, 0xfe]);
        buf.extend_from_slice(&0u32.to_be_bytes());
        let err = decode_timeline(&mut &buf[..]).await.unwrap_err();
        assert!(matches!(err, TelemetryError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_oversized_key_rejected() {
        let key = "k".repeat(usize::from(u16::MAX) + 1);
        assert!(encode_key(&mut vec![], &key).is_err());
    }
}
