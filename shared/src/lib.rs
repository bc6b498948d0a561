pub mod config;
pub mod errors;
pub mod telemetry;
pub mod types;

pub use config::{BrokerConfig, DatabaseConfig, PluginConfig, ServiceConfig, TickConfig};
pub use errors::{Result, ServiceError};
pub use telemetry::{
    init_metrics, init_tracing, record_counter, record_gauge, record_timing, CounterMetric,
    GaugeMetric, LogFormat, TimingMetric,
};
pub use types::{
    ClickEvent, ClickValue, Counter, CounterId, CounterUpdate, PluginInfo, PurchaseOutcome,
    UpgradeDescriptor,
};

pub mod proto {
    tonic::include_proto!("clicker");
}
