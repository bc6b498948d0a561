use async_trait::async_trait;
use shared::types::{join_upgrades, parse_upgrades};
use shared::{Counter, CounterId, CounterUpdate, Result, ServiceError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::CounterStore;

#[derive(Clone)]
pub struct CounterRepository {
    pool: PgPool,
}

impl CounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_default(&self) -> Result<Counter> {
        let row = sqlx::query(
            r#"
            INSERT INTO counters (value, clicks_per_click, upgrades)
            VALUES ($1, $2, '')
            RETURNING id, value, clicks_per_click, upgrades
            "#,
        )
        .bind(Counter::DEFAULT_VALUE)
        .bind(Counter::DEFAULT_CLICKS_PER_CLICK)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(counter_id = row.get::<i32, _>("id"), "Created singleton counter");

        Ok(counter_from_row(&row))
    }
}

fn counter_from_row(row: &PgRow) -> Counter {
    Counter {
        id: row.get("id"),
        value: row.get("value"),
        clicks_per_click: row.get("clicks_per_click"),
        upgrades: parse_upgrades(row.get::<&str, _>("upgrades")),
    }
}

#[async_trait]
impl CounterStore for CounterRepository {
    async fn get(&self) -> Result<Option<Counter>> {
        // Lowest id wins if concurrent first reads ever raced two rows in.
        let row = sqlx::query(
            r#"
            SELECT id, value, clicks_per_click, upgrades
            FROM counters
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(counter_from_row))
    }

    async fn get_or_create(&self) -> Result<Counter> {
        match self.get().await? {
            Some(counter) => Ok(counter),
            None => self.insert_default().await,
        }
    }

    async fn update(&self, id: CounterId, update: CounterUpdate) -> Result<Counter> {
        let upgrades = update.upgrades.as_deref().map(join_upgrades);

        let row = sqlx::query(
            r#"
            UPDATE counters
            SET value = COALESCE($2, value),
                clicks_per_click = COALESCE($3, clicks_per_click),
                upgrades = COALESCE($4, upgrades),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, value, clicks_per_click, upgrades
            "#,
        )
        .bind(id)
        .bind(update.value)
        .bind(update.clicks_per_click)
        .bind(upgrades)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServiceError::CounterNotFound(id))?;

        Ok(counter_from_row(&row))
    }

    async fn increment_value(&self, id: CounterId, delta: i64) -> Result<Counter> {
        let row = sqlx::query(
            r#"
            UPDATE counters
            SET value = value + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, value, clicks_per_click, upgrades
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, counter_id = id, delta = delta, "Counter increment failed");
            ServiceError::Database(e.to_string())
        })?
        .ok_or(ServiceError::CounterNotFound(id))?;

        Ok(counter_from_row(&row))
    }

    async fn apply_purchase(&self, id: CounterId, cost: i64, upgrade_id: &str) -> Result<Counter> {
        let row = sqlx::query(
            r#"
            UPDATE counters
            SET value = value - $2,
                upgrades = CASE
                    WHEN upgrades = '' THEN $3
                    ELSE upgrades || ',' || $3
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, value, clicks_per_click, upgrades
            "#,
        )
        .bind(id)
        .bind(cost)
        .bind(upgrade_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, counter_id = id, upgrade_id = %upgrade_id, "Purchase write failed");
            ServiceError::Database(e.to_string())
        })?
        .ok_or(ServiceError::CounterNotFound(id))?;

        Ok(counter_from_row(&row))
    }
}
