//! Post-restore data integrity verification.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IntegrityConfig;
use crate::datastore::DataStore;
use crate::error::IntegrityError;

/// What a passing integrity check observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub table: String,
    pub row_count: i64,
    pub seeded_value: String,
}

#[async_trait]
pub trait IntegrityCheck: Send + Sync {
    async fn verify(&self) -> Result<IntegrityReport, IntegrityError>;
}

/// Checks that a known seeded record still holds its known-good value and,
/// optionally, that the table row count matches a captured baseline.
pub struct SeededRecordCheck {
    store: Arc<dyn DataStore>,
    config: IntegrityConfig,
    expected_rows: Option<i64>,
}

impl SeededRecordCheck {
    pub fn new(store: Arc<dyn DataStore>, config: IntegrityConfig) -> Self {
        Self {
            store,
            config,
            expected_rows: None,
        }
    }

    /// Also require the table to hold exactly `rows` rows.
    pub fn expect_rows(mut self, rows: i64) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub async fn row_count(&self) -> Result<i64, IntegrityError> {
        self.store
            .count_rows(&self.config.table)
            .await
            .map_err(|e| IntegrityError::Query(e.to_string()))
    }

    /// Write the known-good seed value back.
    pub async fn repair(&self) -> Result<(), IntegrityError> {
        let c = &self.config;
        self.store
            .upsert(&c.table, &c.key_column, &c.value_column, &c.seed_key, &c.seed_value)
            .await
            .map_err(|e| IntegrityError::Query(e.to_string()))
    }
}

#[async_trait]
impl IntegrityCheck for SeededRecordCheck {
    async fn verify(&self) -> Result<IntegrityReport, IntegrityError> {
        let c = &self.config;
        let value = self
            .store
            .lookup(&c.table, &c.key_column, &c.value_column, &c.seed_key)
            .await
            .map_err(|e| IntegrityError::Query(e.to_string()))?;

        let Some(value) = value else {
            warn!(table = %c.table, key = %c.seed_key, "Seeded record missing");
            return Err(IntegrityError::MissingRecord {
                table: c.table.clone(),
                key: c.seed_key.clone(),
            });
        };
        if value != c.seed_value {
            warn!(key = %c.seed_key, actual = %value, "Seeded record altered");
            return Err(IntegrityError::ValueMismatch {
                key: c.seed_key.clone(),
                expected: c.seed_value.clone(),
                actual: Some(value),
            });
        }

        let row_count = self.row_count().await?;
        if let Some(expected) = self.expected_rows {
            if row_count != expected {
                return Err(IntegrityError::RowCount {
                    table: c.table.clone(),
                    expected,
                    actual: row_count,
                });
            }
        }

        debug!(table = %c.table, row_count, "Integrity check passed");
        Ok(IntegrityReport {
            table: c.table.clone(),
            row_count,
            seeded_value: value,
        })
    }
}

/// Closure-backed check for composition and tests.
pub struct FnIntegrityCheck<F> {
    f: F,
}

impl<F> FnIntegrityCheck<F>
where
    F: Fn() -> Result<IntegrityReport, IntegrityError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> IntegrityCheck for FnIntegrityCheck<F>
where
    F: Fn() -> Result<IntegrityReport, IntegrityError> + Send + Sync,
{
    async fn verify(&self) -> Result<IntegrityReport, IntegrityError> {
        (self.f)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::DataStoreError;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// Single-table key/value store.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<BTreeMap<String, String>>,
    }

    #[async_trait]
    impl DataStore for MemoryStore {
        async fn execute(&self, _statement: &str) -> Result<u64, DataStoreError> {
            let mut rows = self.rows.lock();
            let n = rows.len() as u64;
            rows.clear();
            Ok(n)
        }

        async fn count_rows(&self, _table: &str) -> Result<i64, DataStoreError> {
            Ok(self.rows.lock().len() as i64)
        }

        async fn lookup(&self, _t: &str, _k: &str, _v: &str, key: &str) -> Result<Option<String>, DataStoreError> {
            Ok(self.rows.lock().get(key).cloned())
        }

        async fn upsert(&self, _t: &str, _k: &str, _v: &str, key: &str, value: &str) -> Result<(), DataStoreError> {
            self.rows.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = MemoryStore::default();
        store.rows.lock().insert("seed-1".into(), "known-good".into());
        store.rows.lock().insert("other".into(), "x".into());
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_passes_on_seeded_store() {
        let check = SeededRecordCheck::new(seeded(), IntegrityConfig::default()).expect_rows(2);
        let report = check.verify().await.unwrap();
        assert_eq!(report.row_count, 2);
        assert_eq!(report.seeded_value, "known-good");
    }

    #[tokio::test]
    async fn test_detects_altered_value_and_repairs() {
        let store = seeded();
        store.rows.lock().insert("seed-1".into(), "__corrupted__".into());
        let check = SeededRecordCheck::new(store, IntegrityConfig::default());
        assert!(matches!(
            check.verify().await,
            Err(IntegrityError::ValueMismatch { .. })
        ));
        check.repair().await.unwrap();
        assert!(check.verify().await.is_ok());
    }

    #[tokio::test]
    async fn test_detects_missing_record_and_row_loss() {
        let store = seeded();
        let check = SeededRecordCheck::new(store.clone(), IntegrityConfig::default()).expect_rows(3);
        assert!(matches!(
            check.verify().await,
            Err(IntegrityError::RowCount { expected: 3, actual: 2, .. })
        ));
        store.execute("DELETE").await.unwrap();
        assert!(matches!(
            check.verify().await,
            Err(IntegrityError::MissingRecord { .. })
        ));
    }
}
