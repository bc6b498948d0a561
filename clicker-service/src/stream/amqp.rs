use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use shared::Result;
use std::sync::Arc;
use tracing::{error, info};

use super::broker::{Broker, BrokerChannel, ConnectionLost, OutboundMessage};

const DELIVERY_MODE_TRANSIENT: u8 = 1;
const DELIVERY_MODE_PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

/// RabbitMQ over AMQP 0.9.1.
pub struct AmqpBroker {
    url: String,
}

impl AmqpBroker {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self, queue: &str, lost: ConnectionLost) -> Result<Arc<dyn BrokerChannel>> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        connection.on_error(move |err| {
            error!(error = %err, "❌ RabbitMQ connection error");
            lost.notify(&err.to_string());
        });

        info!(queue = queue, "✅ Connected to RabbitMQ");

        Ok(Arc::new(AmqpChannel {
            connection,
            channel,
        }))
    }
}

struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn publish(&self, queue: &str, message: &OutboundMessage) -> Result<()> {
        let delivery_mode = if message.persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(delivery_mode);

        // Default exchange routes by queue name.
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await?;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel.close(REPLY_SUCCESS, "publisher shutdown").await?;
        }
        if self.connection.status().connected() {
            self.connection.close(REPLY_SUCCESS, "publisher shutdown").await?;
        }
        Ok(())
    }
}
