use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tramo_core::{StoreError, StoreResult};
use tramo_shipment::model::Shipment;
use tramo_shipment::state::ShipmentState;
use tramo_shipment::store::ShipmentStore;
use uuid::Uuid;

/// Postgres-backed shipment documents. The full aggregate lives in a
/// JSONB column; the scalar columns exist for uniqueness and lookups and
/// are written from the same document on every commit.
pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(doc: Value) -> StoreResult<T> {
    serde_json::from_value(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// A unique-key violation on the primary key means a concurrent insert of
/// the same row, which is a version conflict under the versioned-write
/// contract; any other unique violation is a natural-key duplicate.
pub(crate) fn map_db_err(entity: &'static str, id: String, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => match db.constraint() {
            Some(name) if name.ends_with("_pkey") => StoreError::VersionConflict { entity, id },
            Some(name) => StoreError::Duplicate(name.to_string()),
            None => StoreError::Duplicate(entity.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Versioned write of one shipment inside an open transaction. Returns the
/// committed version. The document is serialized after the version bump so
/// the JSONB copy always agrees with the version column.
pub(crate) async fn write_shipment(
    tx: &mut Transaction<'_, Postgres>,
    shipment: &Shipment,
) -> StoreResult<i64> {
    let mut next = shipment.clone();
    next.version += 1;
    let doc = encode(&next)?;

    if shipment.version == 0 {
        sqlx::query(
            r#"
            INSERT INTO shipments (tenant_id, id, version, tracking_code, state, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(next.tenant_id)
        .bind(next.id)
        .bind(next.version)
        .bind(&next.tracking_code)
        .bind(next.state().as_str())
        .bind(&doc)
        .bind(next.created_at)
        .bind(next.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_err("shipment", shipment.id.to_string(), e))?;
        return Ok(next.version);
    }

    let result = sqlx::query(
        r#"
        UPDATE shipments
        SET version = $1, state = $2, doc = $3, updated_at = $4
        WHERE tenant_id = $5 AND id = $6 AND version = $7
        "#,
    )
    .bind(next.version)
    .bind(next.state().as_str())
    .bind(&doc)
    .bind(next.updated_at)
    .bind(shipment.tenant_id)
    .bind(shipment.id)
    .bind(shipment.version)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_db_err("shipment", shipment.id.to_string(), e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict {
            entity: "shipment",
            id: shipment.id.to_string(),
        });
    }
    Ok(next.version)
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Shipment>> {
        let doc: Option<Value> =
            sqlx::query_scalar("SELECT doc FROM shipments WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_db_err("shipment", id.to_string(), e))?;
        doc.map(decode).transpose()
    }

    async fn get_by_tracking(
        &self,
        tenant_id: Uuid,
        tracking_code: &str,
    ) -> StoreResult<Option<Shipment>> {
        let doc: Option<Value> = sqlx::query_scalar(
            "SELECT doc FROM shipments WHERE tenant_id = $1 AND tracking_code = $2",
        )
        .bind(tenant_id)
        .bind(tracking_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("shipment", tracking_code.to_string(), e))?;
        doc.map(decode).transpose()
    }

    async fn put(&self, shipment: &Shipment) -> StoreResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("shipment", shipment.id.to_string(), e))?;
        let version = write_shipment(&mut tx, shipment).await?;
        tx.commit()
            .await
            .map_err(|e| map_db_err("shipment", shipment.id.to_string(), e))?;
        Ok(version)
    }

    async fn list_by_states(
        &self,
        tenant_id: Uuid,
        states: &[ShipmentState],
    ) -> StoreResult<Vec<Shipment>> {
        let names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT doc FROM shipments WHERE tenant_id = $1 AND state = ANY($2) ORDER BY created_at",
        )
        .bind(tenant_id)
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("shipment", tenant_id.to_string(), e))?;
        docs.into_iter().map(decode).collect()
    }
}
