//! muster-ledger — append-only attendance ledger.
//!
//! One record per identity per calendar day. The calendar day is derived
//! from the observation timestamp in the ledger's configured time zone,
//! and the store enforces key uniqueness, so concurrent sightings of the
//! same person collapse to a single record carrying the earliest
//! timestamp.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One attendance event: who, which day, and when they were first seen.
/// Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity: String,
    pub day: NaiveDate,
    pub first_seen: DateTime<Utc>,
}

/// What `record` did for a sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// First sighting of this identity today — a new record was appended.
    Recorded(AttendanceRecord),
    /// Already on the ledger for today; the original record is returned.
    AlreadyPresent(AttendanceRecord),
}

impl RecordOutcome {
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            RecordOutcome::Recorded(r) | RecordOutcome::AlreadyPresent(r) => r,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Ledger failures. Persistence trouble is its own outcome — it is never
/// reported as `AlreadyPresent` or success, so a caller can retry with
/// the same (identity, day) key without risking silent loss or a
/// duplicate.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("identity must not be empty")]
    EmptyIdentity,
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("persistence timed out after {0:?}")]
    Timeout(Duration),
}

/// Time zone used to derive the ledger day from a timestamp.
///
/// Accepts `utc`, `local`, or a fixed offset like `+05:00` / `-08:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTimezone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

#[derive(Error, Debug)]
#[error("unrecognized time zone {0:?} (expected \"utc\", \"local\", or \"+HH:MM\")")]
pub struct TimezoneParseError(String);

impl LedgerTimezone {
    /// The calendar day `at` falls on in this zone — the ledger key.
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            LedgerTimezone::Utc => at.date_naive(),
            LedgerTimezone::Local => at.with_timezone(&chrono::Local).date_naive(),
            LedgerTimezone::Fixed(offset) => at.with_timezone(offset).date_naive(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.day_of(Utc::now())
    }
}

impl std::str::FromStr for LedgerTimezone {
    type Err = TimezoneParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utc" => return Ok(LedgerTimezone::Utc),
            "local" => return Ok(LedgerTimezone::Local),
            _ => {}
        }

        let err = || TimezoneParseError(s.to_string());
        let (negative, rest) = if let Some(rest) = s.strip_prefix('+') {
            (false, rest)
        } else if let Some(rest) = s.strip_prefix('-') {
            (true, rest)
        } else {
            return Err(err());
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(err)?;
        let hours: i32 = hours.parse().map_err(|_| err())?;
        let minutes: i32 = minutes.parse().map_err(|_| err())?;
        if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
            return Err(err());
        }
        let mut seconds = hours * 3600 + minutes * 60;
        if negative {
            seconds = -seconds;
        }
        FixedOffset::east_opt(seconds)
            .map(LedgerTimezone::Fixed)
            .ok_or_else(err)
    }
}

impl std::fmt::Display for LedgerTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerTimezone::Utc => write!(f, "utc"),
            LedgerTimezone::Local => write!(f, "local"),
            LedgerTimezone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Append-if-absent storage for attendance records.
///
/// Implementations must make `insert_if_absent` atomic with respect to
/// concurrent calls on the same (identity, day) key: of N racing calls,
/// exactly one appends and the rest observe the winner's record.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Append `record` unless a record already exists for its
    /// (identity, day) key. Returns `None` when appended, or the
    /// pre-existing record (untouched) when the key is already present.
    async fn insert_if_absent(
        &self,
        record: &AttendanceRecord,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    async fn get(
        &self,
        identity: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// All records for a day, ascending by `first_seen`.
    async fn list_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// The attendance ledger: exactly-once-per-day recording over a
/// pluggable store.
pub struct Ledger {
    store: Arc<dyn AttendanceStore>,
    timezone: LedgerTimezone,
    write_timeout: Duration,
}

impl Ledger {
    pub fn new(store: Arc<dyn AttendanceStore>, timezone: LedgerTimezone, write_timeout: Duration) -> Self {
        Self {
            store,
            timezone,
            write_timeout,
        }
    }

    pub fn timezone(&self) -> LedgerTimezone {
        self.timezone
    }

    /// Record a sighting of `identity` at `at`.
    ///
    /// The first call for a given (identity, day) persists a record with
    /// `at` as its `first_seen` and returns [`RecordOutcome::Recorded`];
    /// every later same-day call returns
    /// [`RecordOutcome::AlreadyPresent`] with the original record and
    /// appends nothing. The store call is bounded by the configured
    /// write timeout.
    pub async fn record(
        &self,
        identity: &str,
        at: DateTime<Utc>,
    ) -> Result<RecordOutcome, LedgerError> {
        if identity.is_empty() {
            return Err(LedgerError::EmptyIdentity);
        }

        let record = AttendanceRecord {
            identity: identity.to_string(),
            day: self.timezone.day_of(at),
            first_seen: at,
        };

        let existing = tokio::time::timeout(
            self.write_timeout,
            self.store.insert_if_absent(&record),
        )
        .await
        .map_err(|_| LedgerError::Timeout(self.write_timeout))??;

        Ok(match existing {
            None => {
                tracing::info!(identity, day = %record.day, "attendance recorded");
                RecordOutcome::Recorded(record)
            }
            Some(existing) => RecordOutcome::AlreadyPresent(existing),
        })
    }

    pub async fn query(
        &self,
        identity: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, LedgerError> {
        Ok(self.store.get(identity, day).await?)
    }

    /// A day's records, ascending by `first_seen`.
    pub async fn list(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self.store.list_day(day).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn ledger(timezone: LedgerTimezone) -> Ledger {
        Ledger::new(
            Arc::new(MemoryStore::new()),
            timezone,
            Duration::from_secs(2),
        )
    }

    /// Store whose first insert fails, then delegates.
    struct FailingOnceStore {
        inner: MemoryStore,
        failed: AtomicBool,
    }

    impl FailingOnceStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl AttendanceStore for FailingOnceStore {
        async fn insert_if_absent(
            &self,
            record: &AttendanceRecord,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Database("backend unavailable".into()));
            }
            self.inner.insert_if_absent(record).await
        }

        async fn get(
            &self,
            identity: &str,
            day: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            self.inner.get(identity, day).await
        }

        async fn list_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
            self.inner.list_day(day).await
        }
    }

    /// Store that never answers in time.
    struct StuckStore;

    #[async_trait]
    impl AttendanceStore for StuckStore {
        async fn insert_if_absent(
            &self,
            _record: &AttendanceRecord,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn get(
            &self,
            _identity: &str,
            _day: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            Ok(None)
        }

        async fn list_day(&self, _day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_same_day_records_once_with_earlier_timestamp() {
        // Scenario A, ledger half: 09:00 records, 09:05 is a no-op.
        let ledger = ledger(LedgerTimezone::Utc);
        let first = ledger.record("alice", utc(2026, 8, 5, 9, 0)).await.unwrap();
        let second = ledger.record("alice", utc(2026, 8, 5, 9, 5)).await.unwrap();

        assert!(first.is_recorded());
        assert!(!second.is_recorded());
        assert_eq!(second.record().first_seen, utc(2026, 8, 5, 9, 0));

        let day = LedgerTimezone::Utc.day_of(utc(2026, 8, 5, 9, 0));
        let records = ledger.list(day).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first_seen, utc(2026, 8, 5, 9, 0));
    }

    #[tokio::test]
    async fn test_next_day_records_again() {
        let ledger = ledger(LedgerTimezone::Utc);
        assert!(ledger
            .record("alice", utc(2026, 8, 5, 9, 0))
            .await
            .unwrap()
            .is_recorded());
        assert!(ledger
            .record("alice", utc(2026, 8, 6, 9, 0))
            .await
            .unwrap()
            .is_recorded());
    }

    #[tokio::test]
    async fn test_concurrent_records_collapse_to_one() {
        // N racing calls for one key: exactly one Recorded, N-1
        // AlreadyPresent, one stored row.
        let ledger = Arc::new(ledger(LedgerTimezone::Utc));
        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record("alice", utc(2026, 8, 5, 9, i)).await.unwrap()
            }));
        }

        let mut recorded = 0;
        for handle in handles {
            if handle.await.unwrap().is_recorded() {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 1);

        let day = LedgerTimezone::Utc.day_of(utc(2026, 8, 5, 9, 0));
        assert_eq!(ledger.list(day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_identities_record_independently() {
        let ledger = ledger(LedgerTimezone::Utc);
        assert!(ledger
            .record("alice", utc(2026, 8, 5, 9, 0))
            .await
            .unwrap()
            .is_recorded());
        assert!(ledger
            .record("bob", utc(2026, 8, 5, 9, 0))
            .await
            .unwrap()
            .is_recorded());
    }

    #[tokio::test]
    async fn test_failed_write_then_retry_records_once() {
        // Scenario D: backend down on the first attempt; the retry with
        // the same key records exactly once.
        let ledger = Ledger::new(
            Arc::new(FailingOnceStore::new()),
            LedgerTimezone::Utc,
            Duration::from_secs(2),
        );
        let at = utc(2026, 8, 5, 9, 0);

        let err = ledger.record("alice", at).await.unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));

        assert!(ledger.record("alice", at).await.unwrap().is_recorded());
        assert!(!ledger.record("alice", at).await.unwrap().is_recorded());

        let day = LedgerTimezone::Utc.day_of(at);
        assert_eq!(ledger.list(day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_timeout_surfaces_as_its_own_error() {
        let ledger = Ledger::new(
            Arc::new(StuckStore),
            LedgerTimezone::Utc,
            Duration::from_millis(50),
        );
        let err = ledger.record("alice", utc(2026, 8, 5, 9, 0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let ledger = ledger(LedgerTimezone::Utc);
        let err = ledger.record("", utc(2026, 8, 5, 9, 0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::EmptyIdentity));
    }

    #[test]
    fn test_day_of_respects_offset_across_midnight() {
        // 23:30 UTC is already "tomorrow" five hours east, still "today"
        // in UTC, and "yesterday" eight hours west.
        let at = utc(2026, 8, 5, 23, 30);
        let east: LedgerTimezone = "+05:00".parse().unwrap();
        let west: LedgerTimezone = "-08:00".parse().unwrap();

        assert_eq!(LedgerTimezone::Utc.day_of(at).to_string(), "2026-08-05");
        assert_eq!(east.day_of(at).to_string(), "2026-08-06");
        assert_eq!(west.day_of(at).to_string(), "2026-08-05");

        let early = utc(2026, 8, 5, 3, 0);
        assert_eq!(west.day_of(early).to_string(), "2026-08-04");
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!("utc".parse::<LedgerTimezone>().unwrap(), LedgerTimezone::Utc);
        assert_eq!("UTC".parse::<LedgerTimezone>().unwrap(), LedgerTimezone::Utc);
        assert_eq!(
            "local".parse::<LedgerTimezone>().unwrap(),
            LedgerTimezone::Local
        );
        assert!(matches!(
            "+05:30".parse::<LedgerTimezone>().unwrap(),
            LedgerTimezone::Fixed(_)
        ));
        assert!("Europe/Berlin".parse::<LedgerTimezone>().is_err());
        assert!("+25:00".parse::<LedgerTimezone>().is_err());
        assert!("+05".parse::<LedgerTimezone>().is_err());
    }
}
