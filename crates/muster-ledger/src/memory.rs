//! In-memory attendance store — the `memory` persistence backend and
//! the test double.

use crate::{AttendanceRecord, AttendanceStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutex-guarded map keyed by (identity, day). The single lock makes
/// check-then-insert atomic for every key; fine at gallery scale.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, NaiveDate), AttendanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, NaiveDate), AttendanceRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn insert_if_absent(
        &self,
        record: &AttendanceRecord,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let mut records = self.lock();
        let key = (record.identity.clone(), record.day);
        if let Some(existing) = records.get(&key) {
            return Ok(Some(existing.clone()));
        }
        records.insert(key, record.clone());
        Ok(None)
    }

    async fn get(
        &self,
        identity: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.lock().get(&(identity.to_string(), day)).cloned())
    }

    async fn list_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut records: Vec<AttendanceRecord> = self
            .lock()
            .values()
            .filter(|r| r.day == day)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(identity: &str, hour: u32) -> AttendanceRecord {
        let first_seen = Utc.with_ymd_and_hms(2026, 8, 5, hour, 0, 0).unwrap();
        AttendanceRecord {
            identity: identity.into(),
            day: first_seen.date_naive(),
            first_seen,
        }
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent(&record("alice", 9)).await.unwrap().is_none());

        let existing = store.insert_if_absent(&record("alice", 10)).await.unwrap();
        assert_eq!(existing.unwrap().first_seen, record("alice", 9).first_seen);
    }

    #[tokio::test]
    async fn test_list_day_orders_by_first_seen() {
        let store = MemoryStore::new();
        store.insert_if_absent(&record("carol", 11)).await.unwrap();
        store.insert_if_absent(&record("alice", 9)).await.unwrap();
        store.insert_if_absent(&record("bob", 10)).await.unwrap();

        let day = record("alice", 9).day;
        let names: Vec<String> = store
            .list_day(day)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        let day = record("alice", 9).day;
        assert!(store.get("alice", day).await.unwrap().is_none());
    }
}
