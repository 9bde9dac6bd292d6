use async_trait::async_trait;
use sqlx::PgPool;
use tramo_core::sequence::{SequenceCounter, SequenceStore};
use tramo_core::StoreResult;
use uuid::Uuid;

use crate::shipment_repo::map_db_err;

/// Postgres-backed sequence counters, one row per tenant and series key.
pub struct PgSequenceStore {
    pool: PgPool,
}

impl PgSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceStore for PgSequenceStore {
    async fn read(&self, tenant_id: Uuid, key: &str) -> StoreResult<SequenceCounter> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT value, version FROM sequences WHERE tenant_id = $1 AND key = $2",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("sequence", key.to_string(), e))?;
        Ok(row
            .map(|(value, version)| SequenceCounter { value, version })
            .unwrap_or_default())
    }

    async fn write(
        &self,
        tenant_id: Uuid,
        key: &str,
        value: i64,
        expected_version: i64,
    ) -> StoreResult<bool> {
        if expected_version == 0 {
            // First allocation: whoever inserts the row wins the race.
            let result = sqlx::query(
                r#"
                INSERT INTO sequences (tenant_id, key, value, version)
                VALUES ($1, $2, $3, 1)
                ON CONFLICT (tenant_id, key) DO NOTHING
                "#,
            )
            .bind(tenant_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err("sequence", key.to_string(), e))?;
            return Ok(result.rows_affected() == 1);
        }

        let result = sqlx::query(
            r#"
            UPDATE sequences SET value = $1, version = version + 1
            WHERE tenant_id = $2 AND key = $3 AND version = $4
            "#,
        )
        .bind(value)
        .bind(tenant_id)
        .bind(key)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("sequence", key.to_string(), e))?;
        Ok(result.rows_affected() == 1)
    }
}
