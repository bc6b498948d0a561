pub mod grpc_client;

pub use grpc_client::PluginClient;

use async_trait::async_trait;
use shared::{ClickValue, PluginInfo, PurchaseOutcome, Result, UpgradeDescriptor};

/// Request/response boundary to the game-rules plugin.
///
/// Every call is one remote invocation; a transport failure comes back as
/// `ServiceError::Grpc` and a malformed answer as `ServiceError::Validation`.
#[async_trait]
pub trait RemoteCompute: Send + Sync {
    async fn calculate_click_value(
        &self,
        user_id: &str,
        current_clicks: i64,
        active_upgrades: &[String],
    ) -> Result<ClickValue>;

    async fn get_available_upgrades(
        &self,
        user_id: &str,
        current_clicks: i64,
        owned_upgrades: &[String],
    ) -> Result<Vec<UpgradeDescriptor>>;

    async fn purchase_upgrade(
        &self,
        user_id: &str,
        upgrade_id: &str,
        current_clicks: i64,
    ) -> Result<PurchaseOutcome>;

    async fn get_plugin_info(&self) -> Result<PluginInfo>;
}
