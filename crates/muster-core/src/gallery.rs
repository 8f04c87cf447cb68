//! Gallery — the set of known (identity, embedding) reference pairs.
//!
//! Built once from reference images, matched against many times. A
//! rebuild installs a whole new snapshot; readers keep the snapshot they
//! started with, so a reload is never observable mid-match.

use crate::provider::EmbeddingProvider;
use crate::types::Embedding;
use image::DynamicImage;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// File extensions recognized as reference images.
const REFERENCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One known face: who it is and what it looks like. Several entries may
/// share an identity (multiple reference photos of the same person).
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    pub embedding: Embedding,
}

/// Immutable snapshot of the known-face set.
///
/// Entries are sorted by identity at build time; [`entries`](Self::entries)
/// always enumerates in that fixed order, which is what the matcher's
/// tie-break is defined against.
#[derive(Debug, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct identities.
    pub fn identity_count(&self) -> usize {
        let mut identities: Vec<&str> = self.entries.iter().map(|e| e.identity.as_str()).collect();
        identities.dedup();
        identities.len()
    }
}

/// A decoded reference image to learn from. `source` is a diagnostic
/// label (usually the filename) carried through warnings.
pub struct ReferenceImage {
    pub identity: String,
    pub source: String,
    pub image: DynamicImage,
}

/// Non-fatal conditions hit while building a gallery. Each one means a
/// single reference image was skipped or disambiguated; the load as a
/// whole continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadWarning {
    #[error("no face detected in reference image {reference} for {identity}")]
    NoFaceInReferenceImage { identity: String, reference: String },
    #[error("{faces} faces in reference image {reference} for {identity}; using the largest")]
    AmbiguousReferenceImage {
        identity: String,
        reference: String,
        faces: usize,
    },
    #[error("could not read reference image {reference}: {reason}")]
    UnreadableReferenceImage { reference: String, reason: String },
    #[error("detection failed on reference image {reference} for {identity}: {reason}")]
    ReferenceDetectionFailed {
        identity: String,
        reference: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("reference image {reference} has an empty identity")]
    EmptyIdentity { reference: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a gallery build: the snapshot plus everything that was
/// skipped along the way.
pub struct LoadReport {
    pub gallery: Gallery,
    pub warnings: Vec<LoadWarning>,
}

impl Gallery {
    /// Build a gallery by running the provider over reference images.
    ///
    /// A reference image with no detectable face, an ambiguous one (the
    /// largest box wins), or one the provider chokes on produces a
    /// warning and is skipped — one bad reference photo never aborts the
    /// load. An empty identity string is the one fatal input.
    pub fn load(
        provider: &dyn EmbeddingProvider,
        sources: Vec<ReferenceImage>,
    ) -> Result<LoadReport, GalleryError> {
        let mut entries = Vec::new();
        let mut warnings = Vec::new();

        for source in sources {
            if source.identity.is_empty() {
                return Err(GalleryError::EmptyIdentity {
                    reference: source.source,
                });
            }

            let detections = match provider.detect(&source.image) {
                Ok(d) => d,
                Err(e) => {
                    warnings.push(LoadWarning::ReferenceDetectionFailed {
                        identity: source.identity,
                        reference: source.source,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            // Largest box is the deterministic pick for a crowded
            // reference photo.
            let faces = detections.len();
            let best = detections.into_iter().max_by(|a, b| {
                a.bbox
                    .area()
                    .partial_cmp(&b.bbox.area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            match best {
                None => warnings.push(LoadWarning::NoFaceInReferenceImage {
                    identity: source.identity,
                    reference: source.source,
                }),
                Some(detection) => {
                    if faces > 1 {
                        warnings.push(LoadWarning::AmbiguousReferenceImage {
                            identity: source.identity.clone(),
                            reference: source.source,
                            faces,
                        });
                    }
                    entries.push(GalleryEntry {
                        identity: source.identity,
                        embedding: detection.embedding,
                    });
                }
            }
        }

        for warning in &warnings {
            tracing::warn!(%warning, "gallery load");
        }

        // Fixed enumeration order: by identity, insertion order within one.
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));

        tracing::info!(
            entries = entries.len(),
            skipped = warnings.len(),
            "gallery built"
        );

        Ok(LoadReport {
            gallery: Gallery { entries },
            warnings,
        })
    }

    /// Build a gallery from a directory of reference images, identities
    /// derived from filename stems (`alice.jpg` → `alice`).
    ///
    /// A missing directory yields an empty gallery with a warning logged,
    /// matching first-run behavior: the operator drops photos in later
    /// and reloads. Unreadable files are skipped with a warning.
    pub fn load_dir(
        provider: &dyn EmbeddingProvider,
        dir: &Path,
    ) -> Result<LoadReport, GalleryError> {
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "reference directory missing; gallery is empty");
            return Ok(LoadReport {
                gallery: Gallery::default(),
                warnings: Vec::new(),
            });
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        let ext = ext.to_ascii_lowercase();
                        REFERENCE_EXTENSIONS.contains(&ext.as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut sources = Vec::new();
        let mut unreadable = Vec::new();
        for path in paths {
            let source = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let identity = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            match image::open(&path) {
                Ok(image) => sources.push(ReferenceImage {
                    identity,
                    source,
                    image,
                }),
                Err(e) => unreadable.push(LoadWarning::UnreadableReferenceImage {
                    reference: source,
                    reason: e.to_string(),
                }),
            }
        }

        for warning in &unreadable {
            tracing::warn!(%warning, "gallery load");
        }

        let mut report = Gallery::load(provider, sources)?;
        report.warnings.extend(unreadable);
        Ok(report)
    }
}

/// Swappable handle to the current gallery snapshot.
///
/// Readers take an `Arc` and match against it for as long as they like;
/// [`install`](Self::install) replaces the snapshot wholesale for
/// subsequent readers. No reader ever observes a half-built gallery.
#[derive(Clone)]
pub struct SharedGallery {
    inner: Arc<RwLock<Arc<Gallery>>>,
}

impl SharedGallery {
    pub fn new(gallery: Gallery) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(gallery))),
        }
    }

    /// The current snapshot. Cheap (one Arc clone).
    pub fn snapshot(&self) -> Arc<Gallery> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the snapshot. In-flight readers are unaffected.
    pub fn install(&self, gallery: Gallery) {
        let gallery = Arc::new(gallery);
        match self.inner.write() {
            Ok(mut guard) => *guard = gallery,
            Err(poisoned) => *poisoned.into_inner() = gallery,
        }
    }
}
