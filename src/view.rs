use std::{collections::BTreeMap, fmt::Write, time::Duration};

use plotly::{
    layout::{Axis, AxisType},
    Layout, Plot, Scatter,
};

use crate::{
    aggregate::truncate_to_hour,
    sensor::{SensorState, SensorStatus},
    sparkline, system_time, Sample, Time,
};

pub const SPARKLINE_ROWS: usize = 4;

const RULE: &str = "+-------------------------------+----------------+----------------+\n";

/// Hourly averages side by side, oldest hour first. The temperature column is
/// marked `^`, `v` or `~` against the previous hour and the current hour gets
/// a `<--`.
pub fn hourly_table(temperature: &[Sample], humidity: &[Sample], now: Time) -> String {
    let mut hours: BTreeMap<Time, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for sample in temperature {
        hours.entry(sample.time).or_default().0 = Some(sample.value);
    }
    for sample in humidity {
        hours.entry(sample.time).or_default().1 = Some(sample.value);
    }

    let mut table = String::new();
    table.push_str(RULE);
    table.push_str("| Hour                          |        T       |        H       |\n");
    table.push_str(RULE);
    let current = truncate_to_hour(now);
    let mut prev_t = None;
    for (hour, (t, h)) in hours {
        let trend = match (prev_t, t) {
            (Some(prev), Some(t)) if prev < t => '^',
            (Some(prev), Some(t)) if t < prev => 'v',
            _ => '~',
        };
        let label = humantime::format_rfc3339_seconds(system_time(hour)).to_string();
        let now_mark = if hour == current { " <--" } else { "" };
        let _ = writeln!(
            table,
            "| {label:<29} | {trend} {:>12} | {:>14} |{now_mark}",
            cell(t),
            cell(h)
        );
        if t.is_some() {
            prev_t = t;
        }
    }
    table.push_str(RULE);
    table
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}"),
        None => "-".into(),
    }
}

/// Saturates instead of overflowing on absurd inputs.
pub fn hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    if days > 0 {
        format!("(uptime: {days}d {hours}h {minutes}m)")
    } else if hours > 0 {
        format!("(uptime: {hours}h {minutes}m)")
    } else {
        format!("(uptime: {minutes}m)")
    }
}

pub fn status_title(state: &SensorState, uptime: Duration) -> String {
    let status = match state.status {
        SensorStatus::Online => "🟢 Online",
        SensorStatus::Offline => "🔴 Offline",
    };
    let mut title = format!("Sensor: {status} {}\n", format_uptime(uptime));
    if let Some(error) = &state.error {
        let _ = writeln!(title, "Error: {error}");
    }
    title
}

/// Plain-text status page: sensor title, current reading, temperature
/// sparkline and the hourly table.
pub fn status_page(
    state: &SensorState,
    uptime: Duration,
    temperature: &[Sample],
    humidity: &[Sample],
    now: Time,
) -> String {
    let mut page = status_title(state, uptime);
    if let Some(reading) = state.reading {
        let _ = write!(
            page,
            "Temp {:.2} *C\nHumi {:.2} percent\n",
            reading.temperature, reading.humidity
        );
    }
    let values: Vec<f64> = temperature.iter().map(|s| s.value).collect();
    let plot = sparkline::render(SPARKLINE_ROWS, &values);
    if !plot.is_empty() {
        let _ = write!(page, "\n{plot}\n");
    }
    let _ = write!(page, "\n{}", hourly_table(temperature, humidity, now));
    page
}

pub fn scatter_chart_html(series: &[(&str, &[Sample])], div_id: Option<&str>) -> String {
    let mut plot = Plot::new();
    for (key, samples) in series {
        if samples.is_empty() {
            continue;
        }
        let x: Vec<Time> = samples.iter().map(|s| s.time).collect();
        let y: Vec<f64> = samples.iter().map(|s| s.value).collect();
        plot.add_trace(Scatter::new(x, y).name(*key));
    }
    let layout = Layout::default()
        .x_axis(Axis::default().title("time").type_(AxisType::Date))
        .y_axis(Axis::default().title("hourly average"));
    plot.set_layout(layout);
    plot.to_inline_html(div_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sensor::ClimateReading, HOUR};

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(MINUTE * 30), "(uptime: 30m)");
        assert_eq!(format_uptime(MINUTE * 65), "(uptime: 1h 5m)");
        assert_eq!(format_uptime(MINUTE * (25 * 60 + 30)), "(uptime: 1d 1h 30m)");
    }

    #[test]
    fn test_hours() {
        assert_eq!(hours(24), Duration::from_secs(86_400));
        assert_eq!(hours(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_status_title() {
        let online = SensorState::new();
        assert_eq!(
            status_title(&online, MINUTE * 45),
            "Sensor: 🟢 Online (uptime: 45m)\n"
        );
        let offline = SensorState {
            status: SensorStatus::Offline,
            error: Some("test error".into()),
            reading: None,
        };
        assert_eq!(
            status_title(&offline, MINUTE * 135),
            "Sensor: 🔴 Offline (uptime: 2h 15m)\nError: test error\n"
        );
    }

    #[test]
    fn test_hourly_table() {
        let t = [
            Sample { time: 0, value: 20.0 },
            Sample { time: HOUR, value: 21.5 },
            Sample { time: 2 * HOUR, value: 21.5 },
            Sample { time: 3 * HOUR, value: 19.25 },
        ];
        let h = [Sample { time: HOUR, value: 40.0 }];
        let table = hourly_table(&t, &h, 3 * HOUR + 5);
        let rows: Vec<&str> = table.lines().skip(3).take(4).collect();
        assert_eq!(
            rows,
            [
                "| 1970-01-01T00:00:00Z          | ~        20.00 |              - |",
                "| 1970-01-01T01:00:00Z          | ^        21.50 |          40.00 |",
                "| 1970-01-01T02:00:00Z          | ~        21.50 |              - |",
                "| 1970-01-01T03:00:00Z          | v        19.25 |              - | <--",
            ]
        );
        assert_eq!(table.lines().count(), 8);
    }

    #[test]
    fn test_empty_table() {
        let table = hourly_table(&[], &[], 0);
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn test_status_page() {
        let state = SensorState {
            status: SensorStatus::Online,
            error: None,
            reading: Some(ClimateReading {
                temperature: 22.0,
                humidity: 41.0,
            }),
        };
        let t = [Sample { time: 0, value: 20.0 }, Sample { time: HOUR, value: 22.0 }];
        let page = status_page(&state, MINUTE, &t, &[], HOUR);
        assert!(page.starts_with("Sensor: 🟢 Online (uptime: 1m)\nTemp 22.00 *C\nHumi 41.00 percent\n"));
        assert!(page.contains("22.00\n"));
        assert!(page.contains("\n20.00\n"));
        assert!(page.ends_with(RULE));
    }

    #[test]
    fn test_scatter_chart_html() {
        let t = [Sample { time: 0, value: 20.0 }];
        let none: [Sample; 0] = [];
        let html = scatter_chart_html(
            &[("current_temperature", &t[..]), ("empty", &none[..])],
            Some("chart"),
        );
        assert!(html.contains("chart"));
        assert!(html.contains("current_temperature"));
        assert!(!html.contains("\"empty\""));
    }
}
