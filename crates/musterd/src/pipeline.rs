//! Frame pipeline — decode, detect, match, record, annotate.
//!
//! Stateless across frames: each call reads one gallery snapshot and
//! writes through the ledger, nothing else is remembered. Frames may be
//! processed concurrently.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use muster_core::{best_match, BoundingBox, EmbeddingProvider, SharedGallery};
use muster_ledger::Ledger;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Label attached to detections that match nothing in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("undecodable frame: {0}")]
    InvalidFrame(String),
}

/// What the ledger said for a matched face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Recorded,
    AlreadyPresent,
    /// The write failed; the sighting was not persisted. Visible here so
    /// a persistence outage is never mistaken for a duplicate.
    Failed,
}

/// One annotated face in a processed frame, ready for an overlay
/// renderer or API serialization.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedDetection {
    pub bbox: BoundingBox,
    /// Identity name, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Best gallery distance seen for this face.
    pub distance: f32,
    /// `None` for Unknown faces — the ledger is never consulted for them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
}

pub struct Pipeline {
    provider: Arc<dyn EmbeddingProvider>,
    gallery: SharedGallery,
    ledger: Arc<Ledger>,
    match_threshold: f32,
    detect_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        gallery: SharedGallery,
        ledger: Arc<Ledger>,
        match_threshold: f32,
        detect_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            gallery,
            ledger,
            match_threshold,
            detect_timeout,
        }
    }

    /// Decode raw frame bytes and process them. Undecodable input is a
    /// rejected request — no partial processing.
    pub async fn process_bytes(
        &self,
        bytes: Vec<u8>,
        at: DateTime<Utc>,
    ) -> Result<Vec<AnnotatedDetection>, PipelineError> {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| PipelineError::InvalidFrame(e.to_string()))?;
        Ok(self.process_image(image, at).await)
    }

    /// Process one decoded frame.
    ///
    /// Detection is fail-open: a provider timeout or failure yields an
    /// empty result for this frame, same as a frame with no faces.
    /// Attendance is not: a ledger failure is logged and surfaced on the
    /// annotation as [`AttendanceStatus::Failed`], but never suppresses
    /// the annotation itself.
    pub async fn process_image(
        &self,
        image: DynamicImage,
        at: DateTime<Utc>,
    ) -> Vec<AnnotatedDetection> {
        // One snapshot per frame; a concurrent gallery reload does not
        // change what this frame is matched against.
        let gallery = self.gallery.snapshot();

        let provider = self.provider.clone();
        let detect = tokio::task::spawn_blocking(move || provider.detect(&image));
        let detections = match tokio::time::timeout(self.detect_timeout, detect).await {
            Err(_) => {
                tracing::warn!(
                    budget = ?self.detect_timeout,
                    "detection timed out; treating frame as faceless"
                );
                return Vec::new();
            }
            Ok(Err(join_err)) => {
                tracing::warn!(error = %join_err, "detection task died; treating frame as faceless");
                return Vec::new();
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "detection failed; treating frame as faceless");
                return Vec::new();
            }
            Ok(Ok(Ok(detections))) => detections,
        };

        let mut annotated = Vec::with_capacity(detections.len());
        for detection in detections {
            let result = best_match(&detection.embedding, &gallery, self.match_threshold);

            let (label, attendance, first_seen) = match result.identity {
                Some(identity) => match self.ledger.record(&identity, at).await {
                    Ok(outcome) => {
                        let status = if outcome.is_recorded() {
                            AttendanceStatus::Recorded
                        } else {
                            AttendanceStatus::AlreadyPresent
                        };
                        let first_seen = outcome.record().first_seen;
                        (identity, Some(status), Some(first_seen))
                    }
                    Err(e) => {
                        tracing::error!(
                            identity = %identity,
                            error = %e,
                            "attendance write failed; annotation still returned"
                        );
                        (identity, Some(AttendanceStatus::Failed), None)
                    }
                },
                None => {
                    tracing::debug!(distance = result.distance, "face matched nothing in gallery");
                    (UNKNOWN_LABEL.to_string(), None, None)
                }
            };

            annotated.push(AnnotatedDetection {
                bbox: detection.bbox,
                label,
                distance: result.distance,
                attendance,
                first_seen,
            });
        }

        annotated
    }
}
