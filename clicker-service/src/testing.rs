//! In-memory fakes for the store, the plugin and the broker.

use async_trait::async_trait;
use shared::{
    ClickValue, Counter, CounterId, CounterUpdate, PluginInfo, PurchaseOutcome, Result,
    ServiceError, UpgradeDescriptor,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::plugin_client::RemoteCompute;
use crate::repository::CounterStore;
use crate::stream::{Broker, BrokerChannel, ConnectionLost, OutboundMessage};

pub fn upgrade(id: &str, auto_rate: i64, is_purchased: bool) -> UpgradeDescriptor {
    UpgradeDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        cost: 10,
        click_bonus: 0,
        auto_rate,
        is_purchased,
    }
}

#[derive(Default)]
pub struct MemoryCounterStore {
    counter: Mutex<Option<Counter>>,
    updates: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryCounterStore {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_counter(value: i64, upgrades: &[&str]) -> Arc<Self> {
        let store = Self::default();
        let mut counter = Counter::new(1);
        counter.value = value;
        counter.upgrades = upgrades.iter().map(|u| u.to_string()).collect();
        *store.counter.lock().unwrap() = Some(counter);
        Arc::new(store)
    }

    pub fn snapshot(&self) -> Option<Counter> {
        self.counter.lock().unwrap().clone()
    }

    pub fn value(&self) -> i64 {
        self.snapshot().map(|c| c.value).unwrap_or_default()
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails only `update`, leaving the other writes working.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ServiceError::Database("connection refused".to_string()));
        }
        Ok(())
    }

    fn write(&self, id: CounterId, apply: impl FnOnce(&mut Counter)) -> Result<Counter> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ServiceError::Database("connection refused".to_string()));
        }

        let mut guard = self.counter.lock().unwrap();
        match guard.as_mut() {
            Some(counter) if counter.id == id => {
                apply(counter);
                Ok(counter.clone())
            }
            _ => Err(ServiceError::CounterNotFound(id)),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self) -> Result<Option<Counter>> {
        self.check_read()?;
        Ok(self.snapshot())
    }

    async fn get_or_create(&self) -> Result<Counter> {
        self.check_read()?;
        let mut guard = self.counter.lock().unwrap();
        Ok(guard.get_or_insert_with(|| Counter::new(1)).clone())
    }

    async fn update(&self, id: CounterId, update: CounterUpdate) -> Result<Counter> {
        if self.fail_updates.load(Ordering::SeqCst) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            return Err(ServiceError::Database("update rejected".to_string()));
        }
        self.write(id, |counter| {
            if let Some(value) = update.value {
                counter.value = value;
            }
            if let Some(clicks_per_click) = update.clicks_per_click {
                counter.clicks_per_click = clicks_per_click;
            }
            if let Some(upgrades) = update.upgrades {
                counter.upgrades = upgrades;
            }
        })
    }

    async fn increment_value(&self, id: CounterId, delta: i64) -> Result<Counter> {
        self.write(id, |counter| counter.value += delta)
    }

    async fn apply_purchase(&self, id: CounterId, cost: i64, upgrade_id: &str) -> Result<Counter> {
        if let Some(counter) = self.snapshot() {
            // Mirrors the `value >= 0` check on the column.
            if counter.id == id && counter.value < cost {
                self.updates.fetch_add(1, Ordering::SeqCst);
                return Err(ServiceError::Database("violates check constraint".to_string()));
            }
        }
        self.write(id, |counter| {
            counter.value -= cost;
            counter.upgrades.push(upgrade_id.to_string());
        })
    }
}

/// Plugin fake. Upgrade listings are served from a script first and fall
/// back to a fixed catalog once the script runs out.
#[derive(Default)]
pub struct FakeCompute {
    catalog: Mutex<Vec<UpgradeDescriptor>>,
    scripted: Mutex<VecDeque<Result<Vec<UpgradeDescriptor>>>>,
    click_value: Mutex<Option<ClickValue>>,
    purchase: Mutex<Option<PurchaseOutcome>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeCompute {
    pub fn with_catalog(catalog: Vec<UpgradeDescriptor>) -> Arc<Self> {
        let compute = Self::default();
        *compute.catalog.lock().unwrap() = catalog;
        Arc::new(compute)
    }

    pub fn push_upgrades(&self, result: Result<Vec<UpgradeDescriptor>>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn set_click_value(&self, click_value: i64) {
        *self.click_value.lock().unwrap() = Some(ClickValue {
            click_value,
            message: format!("+{}", click_value),
        });
    }

    pub fn set_purchase(&self, outcome: PurchaseOutcome) {
        *self.purchase.lock().unwrap() = Some(outcome);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Grpc("Unavailable: plugin down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCompute for FakeCompute {
    async fn calculate_click_value(
        &self,
        _user_id: &str,
        _current_clicks: i64,
        _active_upgrades: &[String],
    ) -> Result<ClickValue> {
        self.enter()?;
        Ok(self.click_value.lock().unwrap().clone().unwrap_or(ClickValue {
            click_value: 1,
            message: "+1".to_string(),
        }))
    }

    async fn get_available_upgrades(
        &self,
        _user_id: &str,
        _current_clicks: i64,
        _owned_upgrades: &[String],
    ) -> Result<Vec<UpgradeDescriptor>> {
        self.enter()?;
        if let Some(result) = self.scripted.lock().unwrap().pop_front() {
            return result;
        }
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn purchase_upgrade(
        &self,
        _user_id: &str,
        upgrade_id: &str,
        current_clicks: i64,
    ) -> Result<PurchaseOutcome> {
        self.enter()?;
        Ok(self.purchase.lock().unwrap().clone().unwrap_or(PurchaseOutcome {
            success: false,
            message: format!("Unknown upgrade {}", upgrade_id),
            new_click_total: current_clicks,
            purchased_upgrade: None,
        }))
    }

    async fn get_plugin_info(&self) -> Result<PluginInfo> {
        self.enter()?;
        Ok(PluginInfo {
            name: "fake".to_string(),
            version: "0.0.1".to_string(),
            description: "in-memory plugin".to_string(),
        })
    }
}

#[derive(Default)]
struct BrokerShared {
    available: AtomicBool,
    reject_sends: AtomicBool,
    connects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicUsize,
    lose_next_connect: AtomicBool,
    connect_delay: Mutex<Duration>,
    send_delay: Mutex<Duration>,
    declared: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    last_loss: Mutex<Option<ConnectionLost>>,
    live: Mutex<Option<Arc<AtomicBool>>>,
}

/// Broker fake that tracks concurrent connect attempts.
#[derive(Clone, Default)]
pub struct FakeBroker {
    shared: Arc<BrokerShared>,
}

impl FakeBroker {
    pub fn available() -> Arc<Self> {
        let broker = Self::default();
        broker.set_available(true);
        Arc::new(broker)
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    pub fn set_reject_sends(&self, reject: bool) {
        self.shared.reject_sends.store(reject, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.shared.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.shared.send_delay.lock().unwrap() = delay;
    }

    /// The next successful connect reports its own loss before returning.
    pub fn lose_next_connect(&self) {
        self.shared.lose_next_connect.store(true, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn closed_channels(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.shared.declared.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn last_loss_handle(&self) -> Option<ConnectionLost> {
        self.shared.last_loss.lock().unwrap().clone()
    }

    /// Kills the live connection the way a broker restart would.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(live) = self.shared.live.lock().unwrap().take() {
            live.store(false, Ordering::SeqCst);
        }
        if let Some(lost) = self.last_loss_handle() {
            lost.notify(reason);
        }
    }

    /// Kills the live connection without telling anyone, so only a failed
    /// send notices.
    pub fn kill_channel_silently(&self) {
        if let Some(live) = self.shared.live.lock().unwrap().take() {
            live.store(false, Ordering::SeqCst);
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn connect(&self, queue: &str, lost: ConnectionLost) -> Result<Arc<dyn BrokerChannel>> {
        let shared = &self.shared;
        shared.connects.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&shared.in_flight, &shared.max_in_flight);

        let delay = *shared.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !shared.available.load(Ordering::SeqCst) {
            return Err(ServiceError::Broker("connection refused".to_string()));
        }

        shared.declared.lock().unwrap().push(queue.to_string());
        *shared.last_loss.lock().unwrap() = Some(lost.clone());

        let live = Arc::new(AtomicBool::new(true));
        *shared.live.lock().unwrap() = Some(Arc::clone(&live));

        if shared.lose_next_connect.swap(false, Ordering::SeqCst) {
            live.store(false, Ordering::SeqCst);
            lost.notify("connection reset during handshake");
        }

        Ok(Arc::new(FakeChannel {
            shared: Arc::clone(shared),
            live,
        }))
    }
}

struct FakeChannel {
    shared: Arc<BrokerShared>,
    live: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn publish(&self, queue: &str, message: &OutboundMessage) -> Result<()> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(ServiceError::Broker("channel closed".to_string()));
        }
        let delay = *self.shared.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.shared.reject_sends.load(Ordering::SeqCst) {
            return Err(ServiceError::Broker("send rejected".to_string()));
        }
        self.shared
            .sent
            .lock()
            .unwrap()
            .push((queue.to_string(), message.clone()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.live.store(false, Ordering::SeqCst);
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
