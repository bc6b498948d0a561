use chrono::Utc;
use shared::{BrokerConfig, ClickEvent, CounterMetric};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::broker::{Broker, BrokerChannel, ConnectionLost, OutboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

enum ConnectionState {
    Disconnected,
    // `lost` is set when the broker reports this generation dead before
    // the connect call has returned.
    Connecting {
        generation: u64,
        lost: bool,
    },
    Connected {
        channel: Arc<dyn BrokerChannel>,
        generation: u64,
    },
}

impl ConnectionState {
    fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting { .. } => ConnectionStatus::Connecting,
            ConnectionState::Connected { .. } => ConnectionStatus::Connected,
        }
    }
}

pub(crate) struct PublisherInner {
    broker: Arc<dyn Broker>,
    queue: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    state: Mutex<ConnectionState>,
    // Held for the whole duration of a connect attempt.
    connect_lock: tokio::sync::Mutex<()>,
    attempts: AtomicU64,
    reconnect_scheduled: AtomicBool,
    shutdown: watch::Sender<bool>,
    runtime: Handle,
}

/// Best-effort publisher of [`ClickEvent`]s to a durable queue.
///
/// Cheap to clone; all clones share one connection. `publish` never fails
/// loudly: it returns `false` and the event is dropped. Lost connections are
/// retried forever at a fixed delay, with at most one connect attempt in
/// flight at a time.
#[derive(Clone)]
pub struct EventPublisher {
    inner: Arc<PublisherInner>,
}

impl EventPublisher {
    /// Must be called from within a tokio runtime.
    pub fn new(broker: Arc<dyn Broker>, config: &BrokerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(PublisherInner {
                broker,
                queue: config.queue.clone(),
                reconnect_delay: config.reconnect_delay(),
                connect_timeout: config.connect_timeout(),
                state: Mutex::new(ConnectionState::Disconnected),
                connect_lock: tokio::sync::Mutex::new(()),
                attempts: AtomicU64::new(0),
                reconnect_scheduled: AtomicBool::new(false),
                shutdown,
                runtime: Handle::current(),
            }),
        }
    }

    /// Starts the first connection attempt in the background.
    pub fn init(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            inner.connect_once().await;
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state().status()
    }

    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Sends `event` to the queue. Returns `true` only when an established
    /// channel accepted the message.
    pub async fn publish(&self, event: &ClickEvent) -> bool {
        if self.inner.is_shut_down() {
            warn!(action = %event.action, "Publisher is shut down, dropping event");
            return false;
        }

        let (channel, generation) = match self.inner.current_channel() {
            Some(current) => current,
            None => {
                warn!("⚠️ Broker channel not ready, attempting to connect...");
                self.inner.connect_once().await;
                match self.inner.current_channel() {
                    Some(current) => current,
                    None => {
                        error!(
                            action = %event.action,
                            amount = event.amount,
                            "❌ Failed to publish event: channel not available"
                        );
                        shared::record_counter(CounterMetric::EventsFailed, 1);
                        return false;
                    }
                }
            }
        };

        let payload = match serde_json::to_vec(&event.stamped(Utc::now())) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize event");
                shared::record_counter(CounterMetric::EventsFailed, 1);
                return false;
            }
        };

        let message = OutboundMessage {
            payload,
            persistent: true,
        };

        let sent = tokio::time::timeout(
            self.inner.connect_timeout,
            channel.publish(&self.inner.queue, &message),
        )
        .await;

        match sent {
            Ok(Ok(())) => {
                debug!(action = %event.action, amount = event.amount, "📤 Event published");
                shared::record_counter(CounterMetric::EventsPublished, 1);
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, action = %event.action, "❌ Error publishing event");
                shared::record_counter(CounterMetric::EventsFailed, 1);
                if !channel.is_connected() {
                    self.inner.connection_lost(generation, &e.to_string());
                }
                false
            }
            Err(_) => {
                error!(
                    timeout_ms = self.inner.connect_timeout.as_millis(),
                    action = %event.action,
                    "❌ Publishing event timed out"
                );
                shared::record_counter(CounterMetric::EventsFailed, 1);
                false
            }
        }
    }

    /// Stops reconnecting, waits for an in-flight connect to settle and
    /// closes the channel. Later `publish` calls return `false`.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let _guard = self.inner.connect_lock.lock().await;
        let previous = std::mem::replace(&mut *self.inner.state(), ConnectionState::Disconnected);

        if let ConnectionState::Connected { channel, .. } = previous {
            match tokio::time::timeout(self.inner.connect_timeout, channel.close()).await {
                Ok(Ok(())) => info!("Broker connection closed"),
                Ok(Err(e)) => warn!(error = %e, "Broker connection closed with error"),
                Err(_) => warn!("Timed out closing broker connection"),
            }
        }

        info!("✅ Event publisher shut down");
    }
}

impl PublisherInner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn current_channel(&self) -> Option<(Arc<dyn BrokerChannel>, u64)> {
        match &*self.state() {
            ConnectionState::Connected {
                channel,
                generation,
            } => Some((Arc::clone(channel), *generation)),
            _ => None,
        }
    }

    /// One connect attempt, bounded by the connect timeout. Callers that
    /// queue up behind an attempt share its result instead of starting
    /// their own.
    async fn connect_once(self: &Arc<Self>) -> bool {
        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.connect_lock.lock().await;

        if self.is_shut_down() {
            return false;
        }

        if self.current_channel().is_some() {
            return true;
        }

        if self.attempts.load(Ordering::SeqCst) != seen {
            debug!("Connect attempt already made while waiting, not retrying");
            return false;
        }

        let generation = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state() = ConnectionState::Connecting {
            generation,
            lost: false,
        };
        shared::record_counter(CounterMetric::ConnectAttempts, 1);

        let lost = ConnectionLost::new(Arc::downgrade(self), generation);
        let connected =
            tokio::time::timeout(self.connect_timeout, self.broker.connect(&self.queue, lost)).await;

        match connected {
            Ok(Ok(channel)) => {
                {
                    let mut state = self.state();
                    let lost = matches!(&*state, ConnectionState::Connecting { lost: true, .. });
                    if !lost {
                        *state = ConnectionState::Connected {
                            channel,
                            generation,
                        };
                        info!(generation = generation, queue = %self.queue, "Publisher connected");
                        return true;
                    }
                    *state = ConnectionState::Disconnected;
                }

                error!(generation = generation, "❌ Broker connection lost while connecting. Reconnecting...");
                shared::record_counter(CounterMetric::ConnectionsLost, 1);
                self.schedule_reconnect();
                false
            }
            Ok(Err(e)) => {
                *self.state() = ConnectionState::Disconnected;
                error!(error = %e, generation = generation, "❌ Failed to connect to broker");
                self.schedule_reconnect();
                false
            }
            Err(_) => {
                *self.state() = ConnectionState::Disconnected;
                error!(
                    timeout_ms = self.connect_timeout.as_millis(),
                    generation = generation,
                    "❌ Broker connect timed out"
                );
                self.schedule_reconnect();
                false
            }
        }
    }

    pub(crate) fn connection_lost(self: &Arc<Self>, generation: u64, reason: &str) {
        if self.is_shut_down() {
            return;
        }

        {
            let mut state = self.state();
            match &mut *state {
                ConnectionState::Connected {
                    generation: current,
                    ..
                } if *current == generation => {}
                ConnectionState::Connecting {
                    generation: current,
                    lost,
                } if *current == generation => {
                    // The connect attempt settles the state once it returns.
                    debug!(generation = generation, reason = reason, "Connection lost before connect finished");
                    *lost = true;
                    return;
                }
                _ => {
                    debug!(generation = generation, "Ignoring loss of a stale connection");
                    return;
                }
            }
            *state = ConnectionState::Disconnected;
        }

        error!(generation = generation, reason = reason, "❌ Broker connection lost. Reconnecting...");
        shared::record_counter(CounterMetric::ConnectionsLost, 1);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_shut_down() {
            return;
        }

        if self.reconnect_scheduled.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already scheduled");
            return;
        }

        info!(
            delay_ms = self.reconnect_delay.as_millis(),
            "🔄 Retrying broker connection"
        );

        let inner = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(inner.reconnect_delay) => {}
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    inner.reconnect_scheduled.store(false, Ordering::SeqCst);
                    return;
                }
            }

            inner.reconnect_scheduled.store(false, Ordering::SeqCst);
            inner.connect_once().await;
        });
    }
}
