use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tramo_core::{StoreError, StoreResult};
use tramo_route::model::Route;
use tramo_route::store::RouteStore;
use tramo_shipment::model::Shipment;
use uuid::Uuid;

use crate::shipment_repo::{decode, encode, map_db_err, write_shipment};

/// Postgres-backed routes, stored like shipments: scalar columns for
/// lookups plus the JSONB document.
pub struct PgRouteStore {
    pool: PgPool,
}

impl PgRouteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn write_route(tx: &mut Transaction<'_, Postgres>, route: &Route) -> StoreResult<i64> {
    let mut next = route.clone();
    next.version += 1;
    let doc = encode(&next)?;

    if route.version == 0 {
        sqlx::query(
            r#"
            INSERT INTO routes (tenant_id, id, version, manifest_number, state, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(next.tenant_id)
        .bind(next.id)
        .bind(next.version)
        .bind(&next.manifest_number)
        .bind(next.state.as_str())
        .bind(&doc)
        .bind(next.created_at)
        .bind(next.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_err("route", route.id.to_string(), e))?;
        return Ok(next.version);
    }

    let result = sqlx::query(
        r#"
        UPDATE routes
        SET version = $1, state = $2, doc = $3, updated_at = $4
        WHERE tenant_id = $5 AND id = $6 AND version = $7
        "#,
    )
    .bind(next.version)
    .bind(next.state.as_str())
    .bind(&doc)
    .bind(next.updated_at)
    .bind(route.tenant_id)
    .bind(route.id)
    .bind(route.version)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_db_err("route", route.id.to_string(), e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict {
            entity: "route",
            id: route.id.to_string(),
        });
    }
    Ok(next.version)
}

#[async_trait]
impl RouteStore for PgRouteStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Route>> {
        let doc: Option<Value> =
            sqlx::query_scalar("SELECT doc FROM routes WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_db_err("route", id.to_string(), e))?;
        doc.map(decode).transpose()
    }

    async fn put(&self, route: &Route) -> StoreResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("route", route.id.to_string(), e))?;
        let version = write_route(&mut tx, route).await?;
        tx.commit()
            .await
            .map_err(|e| map_db_err("route", route.id.to_string(), e))?;
        Ok(version)
    }

    async fn put_with_shipments(&self, route: &Route, shipments: &[Shipment]) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("route", route.id.to_string(), e))?;
        write_route(&mut tx, route).await?;
        for shipment in shipments {
            write_shipment(&mut tx, shipment).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_db_err("route", route.id.to_string(), e))?;
        Ok(())
    }

    async fn finalize(&self, route: &Route) -> StoreResult<bool> {
        let mut next = route.clone();
        next.version += 1;
        let doc = encode(&next)?;

        // Single-statement compare-and-swap on version and state; exactly
        // one concurrent close can match.
        let result = sqlx::query(
            r#"
            UPDATE routes
            SET version = $1, state = $2, doc = $3, updated_at = $4
            WHERE tenant_id = $5 AND id = $6 AND version = $7 AND state = 'in_delivery'
            "#,
        )
        .bind(next.version)
        .bind(next.state.as_str())
        .bind(&doc)
        .bind(next.updated_at)
        .bind(route.tenant_id)
        .bind(route.id)
        .bind(route.version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("route", route.id.to_string(), e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT version FROM routes WHERE tenant_id = $1 AND id = $2")
                .bind(route.tenant_id)
                .bind(route.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_db_err("route", route.id.to_string(), e))?;
        match exists {
            None => Err(StoreError::Missing {
                entity: "route",
                id: route.id.to_string(),
            }),
            Some(_) => Ok(false),
        }
    }
}
