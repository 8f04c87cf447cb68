use anyhow::Context;
use muster_ledger::LedgerTimezone;
use std::path::PathBuf;
use std::time::Duration;

/// Which store backs the attendance ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    Sqlite,
    Memory,
}

/// Which embedding provider the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderBackend {
    /// Deterministic image-statistics provider (no model).
    Synthetic,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory of reference images; filename stems become identities.
    pub gallery_dir: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Maximum embedding distance for a positive identification.
    /// Lower = stricter (fewer false accepts, more false rejects).
    pub match_threshold: f32,
    /// Time zone used to derive the attendance day from a timestamp.
    pub ledger_timezone: LedgerTimezone,
    /// Ledger store backend.
    pub persistence: PersistenceBackend,
    /// Embedding provider backend.
    pub provider: ProviderBackend,
    /// Time budget for face detection on one frame.
    pub detect_timeout: Duration,
    /// Time budget for one attendance write.
    pub write_timeout: Duration,
}

impl Config {
    /// Load configuration from `MUSTER_*` environment variables with
    /// defaults. Numeric variables fall back to their default when
    /// unparsable; enumerated ones are a startup error so a typo cannot
    /// silently select the wrong backend.
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("muster");

        let db_path = std::env::var("MUSTER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let ledger_timezone = match std::env::var("MUSTER_LEDGER_TIMEZONE") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("MUSTER_LEDGER_TIMEZONE={value}"))?,
            Err(_) => LedgerTimezone::Local,
        };

        let persistence = match std::env::var("MUSTER_PERSISTENCE").as_deref() {
            Ok("sqlite") | Err(_) => PersistenceBackend::Sqlite,
            Ok("memory") => PersistenceBackend::Memory,
            Ok(other) => anyhow::bail!(
                "MUSTER_PERSISTENCE={other} (expected \"sqlite\" or \"memory\")"
            ),
        };

        let provider = match std::env::var("MUSTER_PROVIDER").as_deref() {
            Ok("synthetic") | Err(_) => ProviderBackend::Synthetic,
            Ok(other) => anyhow::bail!("MUSTER_PROVIDER={other} (expected \"synthetic\")"),
        };

        Ok(Self {
            gallery_dir: std::env::var("MUSTER_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("known_faces")),
            db_path,
            match_threshold: env_f32("MUSTER_MATCH_THRESHOLD", 0.6),
            ledger_timezone,
            persistence,
            provider,
            detect_timeout: Duration::from_millis(env_u64("MUSTER_DETECT_TIMEOUT_MS", 2000)),
            write_timeout: Duration::from_millis(env_u64("MUSTER_WRITE_TIMEOUT_MS", 2000)),
        })
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
