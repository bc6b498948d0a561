use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use clicker_service::{
    plugin_client::{PluginClient, RemoteCompute},
    repository::{CounterRepository, CounterStore},
    service::{GameService, TickScheduler},
    stream::{AmqpBroker, EventPublisher},
};
use shared::{BrokerConfig, DatabaseConfig, PluginConfig, ServiceConfig, TickConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let service_config = ServiceConfig::from_env()?;

    shared::init_tracing("clicker-service", service_config.log_format)?;

    shared::init_metrics(service_config.metrics_port)?;

    tracing::info!("Clicker Service starting...");

    let database_config = DatabaseConfig::from_env()?;
    let broker_config = BrokerConfig::from_env()?;
    let plugin_config = PluginConfig::from_env()?;
    let tick_config = TickConfig::from_env()?;

    tracing::info!(
        plugin = %plugin_config.endpoint_url(),
        queue = %broker_config.queue,
        reconnect_delay_ms = broker_config.reconnect_delay_ms,
        connect_timeout_ms = broker_config.connect_timeout_ms,
        tick_interval_ms = tick_config.interval_ms,
        tick_publish_events = tick_config.publish_events,
        "Configuration loaded"
    );

    tracing::info!("Connecting to PostgreSQL...");
    let db_pool = PgPoolOptions::new()
        .max_connections(database_config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&database_config.url)
        .await?;

    tracing::info!("Connected to PostgreSQL successfully");

    if service_config.run_migrations {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    } else {
        tracing::info!("Skipping migrations (RUN_MIGRATIONS=false)");
    }

    let store: Arc<dyn CounterStore> = Arc::new(CounterRepository::new(db_pool.clone()));
    let compute: Arc<dyn RemoteCompute> = Arc::new(PluginClient::connect_lazy(&plugin_config)?);

    let event_publisher = EventPublisher::new(
        Arc::new(AmqpBroker::new(broker_config.url.clone())),
        &broker_config,
    );
    event_publisher.init();
    tracing::info!(queue = %event_publisher.queue(), "Initialized event publisher");

    let game = GameService::new(store.clone(), compute.clone(), Some(event_publisher.clone()));

    let counter = game.counter().await?;
    tracing::info!(
        counter_id = counter.id,
        value = counter.value,
        upgrades = counter.upgrades.len(),
        "Counter ready"
    );

    match game.plugin_info().await {
        Ok(info) => tracing::info!(
            name = %info.name,
            version = %info.version,
            "Plugin reachable"
        ),
        Err(e) => tracing::warn!(error = %e, "Plugin not reachable yet, ticks will retry"),
    }

    let scheduler = Arc::new(TickScheduler::new(
        store,
        compute,
        Some(event_publisher.clone()),
        &tick_config,
    ));
    let ticks = scheduler.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    ticks.shutdown().await;
    event_publisher.shutdown().await;
    db_pool.close().await;

    tracing::info!("Service shut down gracefully");

    Ok(())
}
