//! Record store adapter
//!
//! The narrow load/store/query interface the resolver reads and writes
//! presence rows through. Implementations provide their own per-write
//! atomicity; nothing here spans several records.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::Record;
use crate::error::AppError;

/// Backing store for presence rows, keyed by full user ID
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the row stored under exactly `user_id`
    async fn get(&self, user_id: &str) -> Result<Option<Record>, AppError>;

    /// Fetch every row whose user ID starts with `prefix`, in store order
    ///
    /// An empty prefix returns all rows.
    async fn get_all(&self, prefix: &str) -> Result<Vec<Record>, AppError>;

    /// Insert or replace the row for `record.user_id`
    ///
    /// `Ok(false)` means the store declined the write.
    async fn store(&self, record: &Record) -> Result<bool, AppError>;
}

/// Volatile store keeping rows in insertion order
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing rows
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, user_id: &str) -> Result<Option<Record>, AppError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.user_id == user_id).cloned())
    }

    async fn get_all(&self, prefix: &str) -> Result<Vec<Record>, AppError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.user_id.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn store(&self, record: &Record) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.user_id == record.user_id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::FIELD_ONLINE;

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    #[tokio::test]
    async fn get_all_matches_prefix_in_insertion_order() {
        let store = MemoryRecordStore::new();
        let federated = format!("{USER}@grid.example.org");
        store.store(&Record::new(USER)).await.unwrap();
        store.store(&Record::new(federated.clone())).await.unwrap();
        store
            .store(&Record::new("22222222-2222-2222-2222-222222222222"))
            .await
            .unwrap();

        let matches = store.get_all(USER).await.unwrap();
        let ids: Vec<_> = matches.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec![USER, federated.as_str()]);

        assert_eq!(store.get_all("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn store_replaces_existing_row() {
        let store = MemoryRecordStore::new();
        store
            .store(&Record::new(USER).with(FIELD_ONLINE, "False"))
            .await
            .unwrap();
        store
            .store(&Record::new(USER).with(FIELD_ONLINE, "True"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let row = store.get(USER).await.unwrap().unwrap();
        assert_eq!(row.field(FIELD_ONLINE), Some("True"));
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
