//! Per-tenant, gap-tolerant sequence numbers for the human-facing codes.
//!
//! Each series is an independent counter per tenant, some bucketed by
//! calendar period. Allocation is read, increment, compare-and-swap; a
//! lost race re-reads and retries a bounded number of times, so two
//! concurrent callers can never observe the same code.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::{CoreError, CoreResult, StoreResult};

const MAX_ATTEMPTS: u32 = 5;

/// The code series the platform hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceSeries {
    /// Shipment tracking codes, `RC` + 8 digits, one stream per tenant.
    Tracking,
    /// Container numbers, `CT` + 5 digits, one stream per tenant.
    Container,
    /// Fiscal invoice numbers, `F` + year + `-` + 6 digits, restarting yearly.
    FiscalInvoice,
    /// Route manifest numbers, `MF` + date + `-` + 4 digits, restarting daily.
    Manifest,
}

impl SequenceSeries {
    pub fn label(&self) -> &'static str {
        match self {
            SequenceSeries::Tracking => "tracking",
            SequenceSeries::Container => "container",
            SequenceSeries::FiscalInvoice => "fiscal_invoice",
            SequenceSeries::Manifest => "manifest",
        }
    }

    /// Storage key for the counter. Bucketed series embed the period so a
    /// new year or day starts a fresh stream without touching old rows.
    pub fn key(&self, today: NaiveDate) -> String {
        match self {
            SequenceSeries::Tracking => "RC".to_string(),
            SequenceSeries::Container => "CT".to_string(),
            SequenceSeries::FiscalInvoice => format!("F:{}", today.year()),
            SequenceSeries::Manifest => format!("MF:{}", today.format("%Y-%m-%d")),
        }
    }

    pub fn format(&self, today: NaiveDate, value: i64) -> String {
        match self {
            SequenceSeries::Tracking => format!("RC{value:08}"),
            SequenceSeries::Container => format!("CT{value:05}"),
            SequenceSeries::FiscalInvoice => format!("F{}-{value:06}", today.year()),
            SequenceSeries::Manifest => format!("MF{}-{value:04}", today.format("%Y%m%d")),
        }
    }
}

/// Counter state as last read from the store. `version` 0 means the
/// counter has never been written for this tenant and key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCounter {
    pub value: i64,
    pub version: i64,
}

/// Port for the counter rows. `write` is a compare-and-swap: it commits
/// only when the stored version still equals `expected_version` (0 meaning
/// insert-if-absent) and reports a lost race as `Ok(false)`, never as an
/// error, because contention here is an expected outcome.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn read(&self, tenant_id: Uuid, key: &str) -> StoreResult<SequenceCounter>;

    async fn write(
        &self,
        tenant_id: Uuid,
        key: &str,
        value: i64,
        expected_version: i64,
    ) -> StoreResult<bool>;
}

/// Allocates the next code in a series for a tenant.
#[derive(Clone)]
pub struct SequenceGenerator {
    store: Arc<dyn SequenceStore>,
}

impl SequenceGenerator {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self { store }
    }

    /// Next code in `series`, bucketed by the current UTC date.
    pub async fn next(&self, tenant_id: Uuid, series: SequenceSeries) -> CoreResult<String> {
        self.next_on(tenant_id, series, Utc::now().date_naive()).await
    }

    /// Same as [`next`](Self::next) with an explicit date, so callers and
    /// tests can pin the bucket.
    pub async fn next_on(
        &self,
        tenant_id: Uuid,
        series: SequenceSeries,
        today: NaiveDate,
    ) -> CoreResult<String> {
        let key = series.key(today);
        for attempt in 1..=MAX_ATTEMPTS {
            let counter = self.store.read(tenant_id, &key).await?;
            let value = counter.value + 1;
            if self
                .store
                .write(tenant_id, &key, value, counter.version)
                .await?
            {
                return Ok(series.format(today, value));
            }
            tracing::debug!(%tenant_id, key, attempt, "sequence write lost the race, retrying");
        }
        Err(CoreError::SequenceConflict {
            series: series.label().to_string(),
            tenant_id,
            attempts: MAX_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Mutex;

    use super::*;

    /// In-memory counters with a knob to make the first N writes lose.
    #[derive(Default)]
    struct ContendedStore {
        counters: Mutex<HashMap<(Uuid, String), SequenceCounter>>,
        reject_next: AtomicU32,
    }

    #[async_trait]
    impl SequenceStore for ContendedStore {
        async fn read(&self, tenant_id: Uuid, key: &str) -> StoreResult<SequenceCounter> {
            let counters = self.counters.lock().await;
            Ok(counters
                .get(&(tenant_id, key.to_string()))
                .copied()
                .unwrap_or_default())
        }

        async fn write(
            &self,
            tenant_id: Uuid,
            key: &str,
            value: i64,
            expected_version: i64,
        ) -> StoreResult<bool> {
            if self.reject_next.load(Ordering::SeqCst) > 0 {
                self.reject_next.fetch_sub(1, Ordering::SeqCst);
                return Ok(false);
            }
            let mut counters = self.counters.lock().await;
            let entry = counters
                .entry((tenant_id, key.to_string()))
                .or_insert_with(SequenceCounter::default);
            if entry.version != expected_version {
                return Ok(false);
            }
            entry.value = value;
            entry.version += 1;
            Ok(true)
        }
    }

    fn generator() -> (SequenceGenerator, Arc<ContendedStore>) {
        let store = Arc::new(ContendedStore::default());
        (SequenceGenerator::new(store.clone()), store)
    }

    fn august_25() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 25).unwrap()
    }

    #[tokio::test]
    async fn tracking_codes_start_at_one_and_zero_pad() {
        let (gen, _) = generator();
        let tenant = Uuid::new_v4();

        let first = gen.next_on(tenant, SequenceSeries::Tracking, august_25()).await.unwrap();
        let second = gen.next_on(tenant, SequenceSeries::Tracking, august_25()).await.unwrap();

        assert_eq!(first, "RC00000001");
        assert_eq!(second, "RC00000002");
    }

    #[tokio::test]
    async fn container_numbers_use_five_digits() {
        let (gen, _) = generator();
        let code = gen
            .next_on(Uuid::new_v4(), SequenceSeries::Container, august_25())
            .await
            .unwrap();
        assert_eq!(code, "CT00001");
    }

    #[tokio::test]
    async fn invoice_numbers_restart_each_year() {
        let (gen, _) = generator();
        let tenant = Uuid::new_v4();

        let this_year = gen
            .next_on(tenant, SequenceSeries::FiscalInvoice, august_25())
            .await
            .unwrap();
        let next_year = gen
            .next_on(
                tenant,
                SequenceSeries::FiscalInvoice,
                NaiveDate::from_ymd_opt(2027, 1, 2).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(this_year, "F2026-000001");
        assert_eq!(next_year, "F2027-000001");
    }

    #[tokio::test]
    async fn manifest_numbers_restart_each_day() {
        let (gen, _) = generator();
        let tenant = Uuid::new_v4();

        let today = gen
            .next_on(tenant, SequenceSeries::Manifest, august_25()).await.unwrap();
        let tomorrow = gen
            .next_on(
                tenant,
                SequenceSeries::Manifest,
                NaiveDate::from_ymd_opt(2026, 8, 26).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(today, "MF20260825-0001");
        assert_eq!(tomorrow, "MF20260826-0001");
    }

    #[tokio::test]
    async fn tenants_do_not_share_streams() {
        let (gen, _) = generator();

        let a = gen.next_on(Uuid::new_v4(), SequenceSeries::Tracking, august_25()).await.unwrap();
        let b = gen.next_on(Uuid::new_v4(), SequenceSeries::Tracking, august_25()).await.unwrap();

        assert_eq!(a, "RC00000001");
        assert_eq!(b, "RC00000001");
    }

    #[tokio::test]
    async fn a_lost_race_is_retried() {
        let (gen, store) = generator();
        store.reject_next.store(3, Ordering::SeqCst);

        let code = gen
            .next_on(Uuid::new_v4(), SequenceSeries::Tracking, august_25())
            .await
            .unwrap();
        assert_eq!(code, "RC00000001");
    }

    #[tokio::test]
    async fn sustained_contention_surfaces_after_bounded_attempts() {
        let (gen, store) = generator();
        store.reject_next.store(u32::MAX, Ordering::SeqCst);
        let tenant = Uuid::new_v4();

        let err = gen
            .next_on(tenant, SequenceSeries::Tracking, august_25())
            .await
            .unwrap_err();

        match err {
            CoreError::SequenceConflict { series, tenant_id, attempts } => {
                assert_eq!(series, "tracking");
                assert_eq!(tenant_id, tenant);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected SequenceConflict, got {other:?}"),
        }
    }
}
