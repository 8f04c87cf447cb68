use crate::pipeline::{Pipeline, PipelineError};
use chrono::{NaiveDate, Utc};
use muster_core::{EmbeddingProvider, Gallery, SharedGallery};
use muster_ledger::Ledger;
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the Muster attendance daemon.
///
/// Bus name: org.freedesktop.Muster1
/// Object path: /org/freedesktop/Muster1
pub struct MusterService {
    pipeline: Arc<Pipeline>,
    ledger: Arc<Ledger>,
    gallery: SharedGallery,
    provider: Arc<dyn EmbeddingProvider>,
    gallery_dir: PathBuf,
}

impl MusterService {
    pub fn new(
        pipeline: Arc<Pipeline>,
        ledger: Arc<Ledger>,
        gallery: SharedGallery,
        provider: Arc<dyn EmbeddingProvider>,
        gallery_dir: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            ledger,
            gallery,
            provider,
            gallery_dir,
        }
    }

    /// Parse a day argument; empty means today in the ledger time zone.
    fn parse_day(&self, day: &str) -> zbus::fdo::Result<NaiveDate> {
        if day.is_empty() {
            return Ok(self.ledger.timezone().today());
        }
        day.parse().map_err(|_| {
            zbus::fdo::Error::InvalidArgs(format!("invalid day {day:?} (expected YYYY-MM-DD)"))
        })
    }
}

#[interface(name = "org.freedesktop.Muster1")]
impl MusterService {
    /// Process one encoded frame: detect faces, match against the
    /// gallery, record attendance for known identities. Returns a JSON
    /// array of annotated detections.
    async fn process_frame(&self, frame: Vec<u8>) -> zbus::fdo::Result<String> {
        let annotated = self
            .pipeline
            .process_bytes(frame, Utc::now())
            .await
            .map_err(|e| match e {
                PipelineError::InvalidFrame(_) => zbus::fdo::Error::InvalidArgs(e.to_string()),
            })?;
        serde_json::to_string(&annotated).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Attendance records for a day ("" = today), as a JSON array
    /// ordered by first sighting.
    async fn attendance(&self, day: &str) -> zbus::fdo::Result<String> {
        let day = self.parse_day(day)?;
        let records = self
            .ledger
            .list(day)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&records).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// One identity's record for a day ("" = today), as JSON, or "null".
    async fn query(&self, identity: &str, day: &str) -> zbus::fdo::Result<String> {
        let day = self.parse_day(day)?;
        let record = self
            .ledger
            .query(identity, day)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&record).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Rebuild the gallery from the reference directory and install it
    /// atomically. In-flight frames finish against the old snapshot.
    /// Returns the new entry count.
    async fn reload_gallery(&self) -> zbus::fdo::Result<u32> {
        let provider = self.provider.clone();
        let dir = self.gallery_dir.clone();
        let report = tokio::task::spawn_blocking(move || Gallery::load_dir(provider.as_ref(), &dir))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        tracing::info!(
            entries = report.gallery.len(),
            warnings = report.warnings.len(),
            "gallery reloaded"
        );
        let count = report.gallery.len() as u32;
        self.gallery.install(report.gallery);
        Ok(count)
    }

    /// Daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let gallery = self.gallery.snapshot();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery_entries": gallery.len(),
            "identities": gallery.identity_count(),
            "gallery_dir": self.gallery_dir.display().to_string(),
            "ledger_timezone": self.ledger.timezone().to_string(),
        })
        .to_string())
    }
}
