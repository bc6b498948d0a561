pub mod counter_repo;

pub use counter_repo::CounterRepository;

use async_trait::async_trait;
use shared::{Counter, CounterId, CounterUpdate, Result};

/// Access to the singleton counter record. All mutation goes through
/// `update`, `increment_value` or `apply_purchase`; callers never write
/// back a cached copy.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self) -> Result<Option<Counter>>;

    async fn get_or_create(&self) -> Result<Counter>;

    async fn update(&self, id: CounterId, update: CounterUpdate) -> Result<Counter>;

    /// Adds `delta` to `value` in a single store-side statement.
    async fn increment_value(&self, id: CounterId, delta: i64) -> Result<Counter>;

    /// Deducts `cost` and appends `upgrade_id` to the owned list in one
    /// statement. Either both changes land or neither does.
    async fn apply_purchase(&self, id: CounterId, cost: i64, upgrade_id: &str) -> Result<Counter>;
}
