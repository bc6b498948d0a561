use async_trait::async_trait;
use shared::errors::{Result, ServiceError};
use shared::proto::clicker_plugin_client::ClickerPluginClient as GrpcPluginClient;
use shared::proto::{
    ClickRequest, ClickResponse, PluginInfoRequest, PluginInfoResponse, PurchaseRequest,
    PurchaseResponse, Upgrade, UpgradesRequest,
};
use shared::{ClickValue, PluginConfig, PluginInfo, PurchaseOutcome, UpgradeDescriptor};
use std::time::Duration;
use tonic::transport::Channel;

use super::RemoteCompute;

#[derive(Clone)]
pub struct PluginClient {
    client: GrpcPluginClient<Channel>,
}

impl PluginClient {
    pub fn new(channel: Channel) -> Self {
        let client = GrpcPluginClient::new(channel);
        Self { client }
    }

    /// Builds a lazily connected client: nothing is dialled until the first
    /// call, so the service starts while the plugin is still down.
    pub fn connect_lazy(config: &PluginConfig) -> Result<Self> {
        let url = config.endpoint_url();
        let channel = Channel::from_shared(url.clone())
            .map_err(|e| ServiceError::Grpc(format!("Invalid URL {}: {}", url, e)))?
            .connect_timeout(Duration::from_millis(1000))
            .timeout(config.timeout())
            .tcp_nodelay(true)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .http2_keep_alive_interval(Duration::from_secs(30))
            .keep_alive_timeout(Duration::from_secs(10))
            .connect_lazy();

        tracing::info!(url = %url, "Plugin client configured");

        Ok(Self::new(channel))
    }
}

#[async_trait]
impl RemoteCompute for PluginClient {
    async fn calculate_click_value(
        &self,
        user_id: &str,
        current_clicks: i64,
        active_upgrades: &[String],
    ) -> Result<ClickValue> {
        let request = tonic::Request::new(ClickRequest {
            user_id: user_id.to_string(),
            current_clicks,
            active_upgrades: active_upgrades.to_vec(),
        });

        let response = self
            .client
            .clone()
            .calculate_click_value(request)
            .await?
            .into_inner();

        click_value_from_proto(response)
    }

    async fn get_available_upgrades(
        &self,
        user_id: &str,
        current_clicks: i64,
        owned_upgrades: &[String],
    ) -> Result<Vec<UpgradeDescriptor>> {
        let request = tonic::Request::new(UpgradesRequest {
            user_id: user_id.to_string(),
            current_clicks,
            owned_upgrades: owned_upgrades.to_vec(),
        });

        let response = self
            .client
            .clone()
            .get_available_upgrades(request)
            .await?
            .into_inner();

        response
            .available_upgrades
            .into_iter()
            .map(upgrade_from_proto)
            .collect()
    }

    async fn purchase_upgrade(
        &self,
        user_id: &str,
        upgrade_id: &str,
        current_clicks: i64,
    ) -> Result<PurchaseOutcome> {
        let request = tonic::Request::new(PurchaseRequest {
            user_id: user_id.to_string(),
            upgrade_id: upgrade_id.to_string(),
            current_clicks,
        });

        let response = self
            .client
            .clone()
            .purchase_upgrade(request)
            .await?
            .into_inner();

        purchase_from_proto(response)
    }

    async fn get_plugin_info(&self) -> Result<PluginInfo> {
        let request = tonic::Request::new(PluginInfoRequest {});

        let response = self
            .client
            .clone()
            .get_plugin_info(request)
            .await?
            .into_inner();

        Ok(plugin_info_from_proto(response))
    }
}

fn click_value_from_proto(proto: ClickResponse) -> Result<ClickValue> {
    if proto.click_value < 0 {
        return Err(ServiceError::Validation(format!(
            "Plugin returned negative click value {}",
            proto.click_value
        )));
    }

    Ok(ClickValue {
        click_value: proto.click_value,
        message: proto.message,
    })
}

fn upgrade_from_proto(proto: Upgrade) -> Result<UpgradeDescriptor> {
    if proto.id.trim().is_empty() {
        return Err(ServiceError::Validation(
            "Plugin returned an upgrade without an id".to_string(),
        ));
    }

    if proto.auto_rate < 0 || proto.cost < 0 {
        return Err(ServiceError::Validation(format!(
            "Upgrade {} has negative auto_rate ({}) or cost ({})",
            proto.id, proto.auto_rate, proto.cost
        )));
    }

    Ok(UpgradeDescriptor {
        id: proto.id,
        name: proto.name,
        description: proto.description,
        cost: proto.cost,
        click_bonus: proto.click_bonus,
        auto_rate: proto.auto_rate,
        is_purchased: proto.is_purchased,
    })
}

fn purchase_from_proto(proto: PurchaseResponse) -> Result<PurchaseOutcome> {
    if proto.success && proto.new_click_total < 0 {
        return Err(ServiceError::Validation(format!(
            "Purchase left a negative balance {}",
            proto.new_click_total
        )));
    }

    let purchased_upgrade = proto.purchased_upgrade.map(upgrade_from_proto).transpose()?;

    Ok(PurchaseOutcome {
        success: proto.success,
        message: proto.message,
        new_click_total: proto.new_click_total,
        purchased_upgrade,
    })
}

fn plugin_info_from_proto(proto: PluginInfoResponse) -> PluginInfo {
    PluginInfo {
        name: proto.name,
        version: proto.version,
        description: proto.description,
    }
}
