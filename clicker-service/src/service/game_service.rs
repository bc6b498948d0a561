use shared::{
    ClickEvent, Counter, CounterMetric, CounterUpdate, PluginInfo, Result, ServiceError,
    UpgradeDescriptor,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::plugin_client::RemoteCompute;
use crate::repository::CounterStore;
use crate::stream::EventPublisher;

use super::PLAYER_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickResult {
    pub value: i64,
    pub click_value: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseResult {
    pub counter: Counter,
    pub upgrade_id: String,
    pub message: String,
}

/// Player-triggered operations. Plugin and store failures are returned to
/// the caller; event publishing is best effort and never fails an operation.
pub struct GameService {
    store: Arc<dyn CounterStore>,
    compute: Arc<dyn RemoteCompute>,
    event_publisher: Option<EventPublisher>,
}

impl GameService {
    pub fn new(
        store: Arc<dyn CounterStore>,
        compute: Arc<dyn RemoteCompute>,
        event_publisher: Option<EventPublisher>,
    ) -> Self {
        Self {
            store,
            compute,
            event_publisher,
        }
    }

    pub async fn counter(&self) -> Result<Counter> {
        self.store.get_or_create().await
    }

    #[tracing::instrument(skip(self))]
    pub async fn click(&self) -> Result<ClickResult> {
        let counter = self.store.get_or_create().await?;

        let computed = self
            .compute
            .calculate_click_value(PLAYER_ID, counter.value, &counter.upgrades)
            .await?;

        let mut updated = self
            .store
            .increment_value(counter.id, computed.click_value)
            .await?;

        if updated.clicks_per_click != computed.click_value {
            updated = self
                .store
                .update(
                    counter.id,
                    CounterUpdate {
                        clicks_per_click: Some(computed.click_value),
                        ..CounterUpdate::default()
                    },
                )
                .await?;
        }

        shared::record_counter(CounterMetric::Clicks, 1);
        self.emit(ClickEvent::new(ClickEvent::CLICK, computed.click_value))
            .await;

        Ok(ClickResult {
            value: updated.value,
            click_value: computed.click_value,
            message: computed.message,
        })
    }

    pub async fn available_upgrades(&self) -> Result<Vec<UpgradeDescriptor>> {
        let counter = self.store.get_or_create().await?;

        self.compute
            .get_available_upgrades(PLAYER_ID, counter.value, &counter.upgrades)
            .await
    }

    /// Buys `upgrade_id`. The balance change reported by the plugin is
    /// applied as a delta together with the new upgrade in a single write,
    /// so clicks and ticks landing meanwhile are kept.
    #[tracing::instrument(skip(self))]
    pub async fn purchase(&self, upgrade_id: &str) -> Result<PurchaseResult> {
        let counter = self.store.get_or_create().await?;

        if counter.owns(upgrade_id) {
            return Err(ServiceError::Validation(format!(
                "Upgrade already owned: {}",
                upgrade_id
            )));
        }

        let outcome = self
            .compute
            .purchase_upgrade(PLAYER_ID, upgrade_id, counter.value)
            .await?;

        if !outcome.success {
            warn!(upgrade_id = %upgrade_id, message = %outcome.message, "Purchase refused by plugin");
            return Err(ServiceError::Plugin(outcome.message));
        }

        let cost = counter.value - outcome.new_click_total;
        if cost < 0 {
            return Err(ServiceError::Validation(format!(
                "Purchase of {} would add {} clicks",
                upgrade_id, -cost
            )));
        }

        let purchased_id = outcome
            .purchased_upgrade
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| upgrade_id.to_string());

        let updated = self
            .store
            .apply_purchase(counter.id, cost, &purchased_id)
            .await?;

        info!(upgrade_id = %purchased_id, cost = cost, value = updated.value, "Upgrade purchased");
        shared::record_counter(CounterMetric::Purchases, 1);
        self.emit(ClickEvent::new(ClickEvent::PURCHASE, cost)).await;

        Ok(PurchaseResult {
            counter: updated,
            upgrade_id: purchased_id,
            message: outcome.message,
        })
    }

    pub async fn reset(&self) -> Result<Counter> {
        let counter = self.store.get_or_create().await?;

        let updated = self
            .store
            .update(
                counter.id,
                CounterUpdate {
                    value: Some(0),
                    ..CounterUpdate::default()
                },
            )
            .await?;

        info!(previous = counter.value, "Counter reset");
        self.emit(ClickEvent::new(ClickEvent::RESET, 0)).await;

        Ok(updated)
    }

    pub async fn plugin_info(&self) -> Result<PluginInfo> {
        self.compute.get_plugin_info().await
    }

    async fn emit(&self, event: ClickEvent) {
        if let Some(publisher) = &self.event_publisher {
            publisher.publish(&event).await;
        }
    }
}
