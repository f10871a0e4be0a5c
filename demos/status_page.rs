use std::{
    f64::consts::TAU,
    sync::Arc,
    time::{Duration, Instant},
};

use hk_metrics::{
    notify::{NoopNotifier, Notifier, NtfyNotifier},
    now,
    sensor::{ClimateSensor, SensorPoller, SensorState, HUMIDITY_KEY, POLL_INTERVAL, TEMPERATURE_KEY},
    view, Sample, TelemetryConfig, TelemetryService,
};
use hyped::*;
use poem::{
    get, handler,
    middleware::AddData,
    web::{Data, Html, Query},
    EndpointExt, Route, Server,
};
use serde::Deserialize;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Daily temperature and humidity waves, standing in for a BME280.
#[derive(Debug)]
struct DummySensor;
impl DummySensor {
    fn phase() -> f64 {
        (now() % 86_400_000) as f64 / 86_400_000.0 * TAU
    }
}
impl ClimateSensor for DummySensor {
    fn current_temperature(&self) -> anyhow::Result<f64> {
        Ok(22.0 + 3.0 * Self::phase().sin())
    }
    fn current_humidity(&self) -> anyhow::Result<f64> {
        Ok(50.0 + 10.0 * Self::phase().cos())
    }
}

struct AppState {
    service: Arc<TelemetryService>,
    sensor: watch::Receiver<SensorState>,
    started: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = TelemetryConfig::from_env()?;
    let span = tracing::info_span!("telemetry");
    let service = Arc::new(TelemetryService::start(config, span).await?);

    let notifier: Arc<dyn Notifier> = match std::env::var("HK_NTFY_URL") {
        Ok(url) => Arc::new(NtfyNotifier::new(url)),
        Err(_) => Arc::new(NoopNotifier),
    };
    let poller = SensorPoller::new(Arc::new(DummySensor), notifier);
    let sensor = poller.subscribe();
    tokio::spawn(poller.run(service.clone(), POLL_INTERVAL));

    {
        let service = service.clone();
        std::thread::spawn(move || {
            let mut sys = sysinfo::System::new_all();
            loop {
                std::thread::sleep(Duration::from_secs(1));
                sys.refresh_cpu_usage();
                let cpu = sys.global_cpu_usage();
                if let Err(e) = service.try_record("cpu", f64::from(cpu)) {
                    tracing::debug!(error = %e, "cpu sampler stopped");
                    break;
                }
            }
        });
    }

    let state = Arc::new(AppState {
        service: service.clone(),
        sensor,
        started: Instant::now(),
    });

    #[handler]
    async fn status(state: Data<&Arc<AppState>>) -> String {
        let window = view::hours(24);
        let temperature = state.service.average(TEMPERATURE_KEY, window).await;
        let humidity = state.service.average(HUMIDITY_KEY, window).await;
        let sensor = state.sensor.borrow().clone();
        view::status_page(
            &sensor,
            state.started.elapsed(),
            &temperature,
            &humidity,
            now(),
        )
    }

    #[derive(Deserialize)]
    struct ChartQuery {
        pub keys: String,
        pub hours: Option<u64>,
    }

    #[handler]
    async fn chart(query: Query<ChartQuery>, state: Data<&Arc<AppState>>) -> Html<String> {
        let window = view::hours(query.hours.unwrap_or(24));
        let mut series = vec![];
        for key in query.keys.split(',') {
            let averages = state.service.average(key, window).await;
            series.push((key, averages));
        }
        let series: Vec<(&str, &[Sample])> = series
            .iter()
            .map(|(key, averages)| (*key, averages.as_slice()))
            .collect();
        let chart = danger(view::scatter_chart_html(&series, None));
        let plotly = "https://cdn.plot.ly/plotly-2.12.1.min.js";
        let plotly = script(()).src(plotly);
        let root_div = div((plotly, chart));
        let body = hyped::body(root_div);
        let root = (doctype(), html(body));
        Html(render(root))
    }

    let app = Route::new()
        .at("/", get(status))
        .at("/chart", get(chart))
        .with(AddData::new(state));

    let listener = poem::listener::TcpListener::bind("0.0.0.0:3000");
    println!("- status: <http://127.0.0.1:3000/>");
    println!("- chart: <http://127.0.0.1:3000/chart?keys=current_temperature,current_humidity,cpu>");
    let signal = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("server shutdown...");
    };
    Server::new(listener)
        .run_with_graceful_shutdown(app, signal, Some(Duration::from_secs(5)))
        .await?;

    tracing::info!("try make a snapshot to restore it next time...");
    if let Err(e) = service.shutdown().await {
        tracing::error!(error = %e, "can't make a metrics snapshot");
    }
    tracing::info!("bye");
    Ok(())
}
