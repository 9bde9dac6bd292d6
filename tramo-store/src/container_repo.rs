use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tramo_container::model::{Container, ContainerState, ShipmentSummary};
use tramo_container::store::{ContainerStore, MarkItemOutcome, MarkSummary};
use tramo_core::{StoreError, StoreResult};
use tramo_shipment::model::{ItemCondition, ItemVerification, Shipment};
use uuid::Uuid;

use crate::shipment_repo::{decode, map_db_err, write_shipment};

/// Postgres-backed containers. The container itself is a scalar row; the
/// per-shipment verification counters live in `container_shipments`, one
/// row per member, and only `mark_item` ever moves `marked_items`. A
/// close racing a scan is caught by the member shipment's version check,
/// since every mark bumps that shipment.
pub struct PgContainerStore {
    pool: PgPool,
}

impl PgContainerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ContainerRow {
    id: Uuid,
    tenant_id: Uuid,
    version: i64,
    number: String,
    state: String,
    incomplete_at_origin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    shipment_id: Uuid,
    tracking_code: String,
    total_items: i32,
    marked_items: i32,
}

#[derive(sqlx::FromRow)]
struct LockedDoc {
    version: i64,
    doc: Value,
}

async fn write_container(
    tx: &mut Transaction<'_, Postgres>,
    container: &Container,
) -> StoreResult<i64> {
    let next_version = container.version + 1;

    if container.version == 0 {
        sqlx::query(
            r#"
            INSERT INTO containers (tenant_id, id, version, number, state, incomplete_at_origin, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(container.tenant_id)
        .bind(container.id)
        .bind(next_version)
        .bind(&container.number)
        .bind(container.state.as_str())
        .bind(container.incomplete_at_origin)
        .bind(container.created_at)
        .bind(container.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_err("container", container.id.to_string(), e))?;
    } else {
        let result = sqlx::query(
            r#"
            UPDATE containers
            SET version = $1, state = $2, incomplete_at_origin = $3, updated_at = $4
            WHERE tenant_id = $5 AND id = $6 AND version = $7
            "#,
        )
        .bind(next_version)
        .bind(container.state.as_str())
        .bind(container.incomplete_at_origin)
        .bind(container.updated_at)
        .bind(container.tenant_id)
        .bind(container.id)
        .bind(container.version)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_err("container", container.id.to_string(), e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "container",
                id: container.id.to_string(),
            });
        }
    }

    // New memberships only; existing counter rows are never rewritten here.
    for summary in &container.shipments {
        sqlx::query(
            r#"
            INSERT INTO container_shipments (tenant_id, container_id, shipment_id, tracking_code, total_items, marked_items)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, container_id, shipment_id) DO NOTHING
            "#,
        )
        .bind(container.tenant_id)
        .bind(container.id)
        .bind(summary.shipment_id)
        .bind(&summary.tracking_code)
        .bind(summary.total_items as i32)
        .bind(summary.marked_items as i32)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_err("container", container.id.to_string(), e))?;
    }

    Ok(next_version)
}

#[async_trait]
impl ContainerStore for PgContainerStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Container>> {
        let row: Option<ContainerRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, version, number, state, incomplete_at_origin, created_at, updated_at
            FROM containers WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("container", id.to_string(), e))?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let members: Vec<MembershipRow> = sqlx::query_as(
            r#"
            SELECT shipment_id, tracking_code, total_items, marked_items
            FROM container_shipments
            WHERE tenant_id = $1 AND container_id = $2
            ORDER BY tracking_code
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("container", id.to_string(), e))?;

        let state = row
            .state
            .parse::<ContainerState>()
            .map_err(StoreError::Serialization)?;

        Ok(Some(Container {
            id: row.id,
            tenant_id: row.tenant_id,
            version: row.version,
            number: row.number,
            state,
            shipments: members
                .into_iter()
                .map(|m| ShipmentSummary {
                    shipment_id: m.shipment_id,
                    tracking_code: m.tracking_code,
                    total_items: m.total_items as u32,
                    marked_items: m.marked_items as u32,
                })
                .collect(),
            incomplete_at_origin: row.incomplete_at_origin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn put(&self, container: &Container) -> StoreResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("container", container.id.to_string(), e))?;
        let version = write_container(&mut tx, container).await?;
        tx.commit()
            .await
            .map_err(|e| map_db_err("container", container.id.to_string(), e))?;
        Ok(version)
    }

    async fn put_with_shipments(
        &self,
        container: &Container,
        shipments: &[Shipment],
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("container", container.id.to_string(), e))?;
        write_container(&mut tx, container).await?;
        for shipment in shipments {
            write_shipment(&mut tx, shipment).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_db_err("container", container.id.to_string(), e))?;
        Ok(())
    }

    async fn mark_item(
        &self,
        tenant_id: Uuid,
        container_id: Uuid,
        shipment_id: Uuid,
        item_id: Uuid,
        condition: ItemCondition,
    ) -> StoreResult<MarkItemOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("container", container_id.to_string(), e))?;

        // Lock the shipment row so two scanners marking items of the same
        // shipment serialize. Different shipments stay concurrent.
        let locked: Option<LockedDoc> = sqlx::query_as(
            "SELECT version, doc FROM shipments WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(shipment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_err("shipment", shipment_id.to_string(), e))?;
        let locked = match locked {
            Some(locked) => locked,
            None => {
                return Err(StoreError::Missing {
                    entity: "shipment",
                    id: shipment_id.to_string(),
                })
            }
        };

        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM containers WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(container_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_db_err("container", container_id.to_string(), e))?;
        match state.as_deref() {
            None => {
                return Err(StoreError::Missing {
                    entity: "container",
                    id: container_id.to_string(),
                })
            }
            Some("open") => {}
            Some(_) => return Ok(MarkItemOutcome::ContainerNotOpen),
        }

        let member: Option<(i32, i32)> = sqlx::query_as(
            r#"
            SELECT total_items, marked_items FROM container_shipments
            WHERE tenant_id = $1 AND container_id = $2 AND shipment_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(container_id)
        .bind(shipment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_err("container", container_id.to_string(), e))?;
        if member.is_none() {
            return Ok(MarkItemOutcome::ShipmentNotInContainer);
        }

        let mut shipment: Shipment = decode(locked.doc)?;
        match shipment.verify_item(item_id, condition) {
            ItemVerification::Unknown => return Ok(MarkItemOutcome::ItemUnknown),
            ItemVerification::AlreadyVerified => return Ok(MarkItemOutcome::AlreadyVerified),
            ItemVerification::Applied => {}
        }

        let counted = sqlx::query(
            r#"
            UPDATE container_shipments SET marked_items = marked_items + 1
            WHERE tenant_id = $1 AND container_id = $2 AND shipment_id = $3
              AND marked_items < total_items
            "#,
        )
        .bind(tenant_id)
        .bind(container_id)
        .bind(shipment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_err("container", container_id.to_string(), e))?;
        if counted.rows_affected() == 0 {
            return Ok(MarkItemOutcome::CounterConflict);
        }

        shipment.version = locked.version + 1;
        shipment.updated_at = Utc::now();
        let doc = crate::shipment_repo::encode(&shipment)?;
        sqlx::query(
            "UPDATE shipments SET version = $1, doc = $2, updated_at = $3 WHERE tenant_id = $4 AND id = $5",
        )
        .bind(shipment.version)
        .bind(&doc)
        .bind(shipment.updated_at)
        .bind(tenant_id)
        .bind(shipment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_err("shipment", shipment_id.to_string(), e))?;

        let (shipment_marked, shipment_total): (i32, i32) = sqlx::query_as(
            r#"
            SELECT marked_items, total_items FROM container_shipments
            WHERE tenant_id = $1 AND container_id = $2 AND shipment_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(container_id)
        .bind(shipment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("container", container_id.to_string(), e))?;

        let (container_marked, container_total): (Option<i64>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT SUM(marked_items), SUM(total_items) FROM container_shipments
            WHERE tenant_id = $1 AND container_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(container_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("container", container_id.to_string(), e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_err("container", container_id.to_string(), e))?;

        Ok(MarkItemOutcome::Applied(MarkSummary {
            shipment_marked: shipment_marked as u32,
            shipment_total: shipment_total as u32,
            container_marked: container_marked.unwrap_or(0) as u32,
            container_total: container_total.unwrap_or(0) as u32,
        }))
    }

    async fn repair_summary(
        &self,
        tenant_id: Uuid,
        container_id: Uuid,
        summary: &ShipmentSummary,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE container_shipments SET total_items = $1, marked_items = $2
            WHERE tenant_id = $3 AND container_id = $4 AND shipment_id = $5
            "#,
        )
        .bind(summary.total_items as i32)
        .bind(summary.marked_items as i32)
        .bind(tenant_id)
        .bind(container_id)
        .bind(summary.shipment_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("container", container_id.to_string(), e))?;
        Ok(())
    }
}
