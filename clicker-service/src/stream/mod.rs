pub mod amqp;
pub mod broker;
pub mod publisher;

pub use amqp::AmqpBroker;
pub use broker::{Broker, BrokerChannel, ConnectionLost, OutboundMessage};
pub use publisher::{ConnectionStatus, EventPublisher};
