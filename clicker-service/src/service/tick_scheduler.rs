use shared::{
    ClickEvent, Counter, CounterMetric, GaugeMetric, Result, TickConfig, TimingMetric,
    UpgradeDescriptor,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::plugin_client::RemoteCompute;
use crate::repository::CounterStore;
use crate::stream::EventPublisher;

use super::PLAYER_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NoCounter,
    NoUpgrades,
    ZeroRate,
    Applied { rate: i64, value: i64 },
}

/// Sum of `auto_rate` over purchased upgrades. Anything the plugin lists
/// but the player does not own contributes nothing.
pub fn aggregate_auto_rate(upgrades: &[UpgradeDescriptor]) -> i64 {
    upgrades
        .iter()
        .filter(|u| u.is_purchased)
        .map(|u| u.auto_rate)
        .fold(0i64, |total, rate| total.saturating_add(rate))
}

// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Folds passive production into the counter once per interval.
pub struct TickScheduler {
    store: Arc<dyn CounterStore>,
    compute: Arc<dyn RemoteCompute>,
    event_publisher: Option<EventPublisher>,
    interval: Duration,
}

impl TickScheduler {
    pub fn new(
        store: Arc<dyn CounterStore>,
        compute: Arc<dyn RemoteCompute>,
        event_publisher: Option<EventPublisher>,
        config: &TickConfig,
    ) -> Self {
        let mut interval = config.interval();
        if interval < MIN_INTERVAL {
            warn!(interval_ms = config.interval_ms, "Tick interval too small, using 1 ms");
            interval = MIN_INTERVAL;
        }

        Self {
            store,
            compute,
            event_publisher: event_publisher.filter(|_| config.publish_events),
            interval,
        }
    }

    /// One tick. An error leaves the counter as it was before the tick.
    pub async fn run_tick(&self) -> Result<TickOutcome> {
        let counter: Counter = match self.store.get().await? {
            Some(counter) => counter,
            None => return Ok(TickOutcome::NoCounter),
        };

        if counter.upgrades.is_empty() {
            return Ok(TickOutcome::NoUpgrades);
        }

        let upgrades = self
            .compute
            .get_available_upgrades(PLAYER_ID, counter.value, &counter.upgrades)
            .await?;

        let rate = aggregate_auto_rate(&upgrades);
        if rate <= 0 {
            return Ok(TickOutcome::ZeroRate);
        }

        let updated = self.store.increment_value(counter.id, rate).await?;

        debug!(
            rate = rate,
            value = updated.value,
            owned = counter.upgrades.len(),
            "Applied auto production"
        );

        if let Some(publisher) = &self.event_publisher {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                publisher.publish(&ClickEvent::new(ClickEvent::AUTO, rate)).await;
            });
        }

        Ok(TickOutcome::Applied {
            rate,
            value: updated.value,
        })
    }

    /// Spawns the repeating timer. Ticks never overlap: the next one starts
    /// only after the current one has finished, and ticks missed while a
    /// slow one ran are skipped.
    pub fn start(self: Arc<Self>) -> TickHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(interval_ms = interval.as_millis(), "Started tick scheduler");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.wait_for(|stopped| *stopped) => break,
                }

                let started = Instant::now();
                match self.run_tick().await {
                    Ok(TickOutcome::Applied { rate, value }) => {
                        shared::record_counter(CounterMetric::TicksApplied, 1);
                        shared::record_gauge(GaugeMetric::CounterValue, value as f64);
                        shared::record_gauge(GaugeMetric::AutoRate, rate as f64);
                    }
                    Ok(outcome) => {
                        shared::record_counter(CounterMetric::TicksSkipped, 1);
                        debug!(outcome = ?outcome, "Tick skipped");
                    }
                    Err(e) if e.is_transient() => {
                        shared::record_counter(CounterMetric::TicksFailed, 1);
                        warn!(error = %e, "Tick failed, no progress this interval");
                    }
                    Err(e) => {
                        shared::record_counter(CounterMetric::TicksFailed, 1);
                        error!(error = %e, "Tick failed, no progress this interval");
                    }
                }
                shared::record_timing(TimingMetric::TickDuration, started.elapsed().as_secs_f64());
            }

            info!("Tick scheduler stopped");
        });

        TickHandle { shutdown, task }
    }
}

/// Keeps the scheduler task alive and stops it on shutdown.
pub struct TickHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickHandle {
    /// Waits for a running tick to finish; no tick fires afterwards.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Tick scheduler task ended abnormally");
        }
    }
}
