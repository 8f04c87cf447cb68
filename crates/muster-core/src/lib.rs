//! muster-core — Gallery management and face matching.
//!
//! Face detection and embedding extraction are behind the
//! [`EmbeddingProvider`] trait; the core only assumes "image in,
//! embeddings out" and a distance function between embeddings.

pub mod gallery;
pub mod matcher;
pub mod provider;
pub mod types;

pub use gallery::{Gallery, GalleryEntry, LoadReport, LoadWarning, ReferenceImage, SharedGallery};
pub use matcher::best_match;
pub use provider::EmbeddingProvider;
pub use types::{BoundingBox, Detection, Embedding, MatchResult};
