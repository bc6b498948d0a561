pub mod game_service;
pub mod tick_scheduler;

pub use game_service::{ClickResult, GameService, PurchaseResult};
pub use tick_scheduler::{aggregate_auto_rate, TickHandle, TickOutcome, TickScheduler};

/// The deployment has one counter, so every plugin call speaks for the same
/// player.
pub const PLAYER_ID: &str = "default";
