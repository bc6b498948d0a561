use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::ServiceError;

// sqlx logs every statement at info.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ServiceError::Validation(format!(
                "unknown log format '{}', expected compact or json",
                other
            ))),
        }
    }
}

pub fn init_tracing(
    service_name: &'static str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let compact = (format == LogFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .compact()
    });
    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(compact)
        .with(json)
        .try_init()?;

    tracing::info!(service = service_name, format = ?format, "✅ Logging initialized");

    Ok(())
}

/// Monotonic counters exported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    EventsPublished,
    EventsFailed,
    ConnectAttempts,
    ConnectionsLost,
    TicksApplied,
    TicksSkipped,
    TicksFailed,
    Clicks,
    Purchases,
}

impl CounterMetric {
    pub const ALL: [CounterMetric; 9] = [
        CounterMetric::EventsPublished,
        CounterMetric::EventsFailed,
        CounterMetric::ConnectAttempts,
        CounterMetric::ConnectionsLost,
        CounterMetric::TicksApplied,
        CounterMetric::TicksSkipped,
        CounterMetric::TicksFailed,
        CounterMetric::Clicks,
        CounterMetric::Purchases,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CounterMetric::EventsPublished => "clicker.publisher.published",
            CounterMetric::EventsFailed => "clicker.publisher.failed",
            CounterMetric::ConnectAttempts => "clicker.publisher.connect_attempts",
            CounterMetric::ConnectionsLost => "clicker.publisher.connection_lost",
            CounterMetric::TicksApplied => "clicker.tick.applied",
            CounterMetric::TicksSkipped => "clicker.tick.skipped",
            CounterMetric::TicksFailed => "clicker.tick.failed",
            CounterMetric::Clicks => "clicker.game.clicks",
            CounterMetric::Purchases => "clicker.game.purchases",
        }
    }

    const fn help(self) -> &'static str {
        match self {
            CounterMetric::EventsPublished => "Events accepted by the broker",
            CounterMetric::EventsFailed => "Events dropped without delivery",
            CounterMetric::ConnectAttempts => "Broker connect attempts",
            CounterMetric::ConnectionsLost => "Broker connections lost after being established",
            CounterMetric::TicksApplied => "Ticks that added auto production",
            CounterMetric::TicksSkipped => "Ticks with nothing to apply",
            CounterMetric::TicksFailed => "Ticks that failed and made no progress",
            CounterMetric::Clicks => "Player clicks applied",
            CounterMetric::Purchases => "Upgrades purchased",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeMetric {
    CounterValue,
    AutoRate,
}

impl GaugeMetric {
    pub const ALL: [GaugeMetric; 2] = [GaugeMetric::CounterValue, GaugeMetric::AutoRate];

    pub const fn name(self) -> &'static str {
        match self {
            GaugeMetric::CounterValue => "clicker.counter.value",
            GaugeMetric::AutoRate => "clicker.tick.rate",
        }
    }

    const fn help(self) -> &'static str {
        match self {
            GaugeMetric::CounterValue => "Counter value after the last applied tick",
            GaugeMetric::AutoRate => "Auto production per tick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingMetric {
    TickDuration,
}

impl TimingMetric {
    pub const ALL: [TimingMetric; 1] = [TimingMetric::TickDuration];

    pub const fn name(self) -> &'static str {
        match self {
            TimingMetric::TickDuration => "clicker.tick.duration",
        }
    }

    const fn help(self) -> &'static str {
        match self {
            TimingMetric::TickDuration => "Wall time of one tick in seconds",
        }
    }
}

pub fn init_metrics(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_metrics();

    tracing::info!("✅ Prometheus metrics exporter started at http://{}/metrics", addr);

    Ok(())
}

fn describe_metrics() {
    for metric in CounterMetric::ALL {
        metrics::describe_counter!(metric.name(), metric.help());
    }
    for metric in GaugeMetric::ALL {
        metrics::describe_gauge!(metric.name(), metric.help());
    }
    for metric in TimingMetric::ALL {
        metrics::describe_histogram!(metric.name(), metrics::Unit::Seconds, metric.help());
    }
}

pub fn record_timing(metric: TimingMetric, duration_secs: f64) {
    metrics::histogram!(metric.name()).record(duration_secs);
}

pub fn record_counter(metric: CounterMetric, value: u64) {
    metrics::counter!(metric.name()).increment(value);
}

pub fn record_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}
