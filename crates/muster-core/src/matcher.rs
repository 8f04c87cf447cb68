//! Distance-threshold matching of a probe embedding against the gallery.

use crate::gallery::Gallery;
use crate::types::{Embedding, MatchResult};

/// Match a probe embedding against every gallery entry.
///
/// Pure function: scans ALL entries (no early exit), keeps the global
/// minimum distance, and declares a match only when that minimum is at
/// or below `threshold` — strictly greater means Unknown no matter how
/// many candidates exist. A person with several reference photos is
/// covered by the global scan: their closest photo is what competes.
///
/// Ties resolve to the entry enumerated first in the gallery's fixed
/// ordering (sorted by identity at build time) — the strict `<` below
/// never displaces an equal earlier candidate. An empty gallery yields
/// Unknown with `f32::INFINITY`.
///
/// Threshold semantics: lower = stricter (fewer false accepts, more
/// false rejects).
pub fn best_match(probe: &Embedding, gallery: &Gallery, threshold: f32) -> MatchResult {
    let mut best_distance = f32::INFINITY;
    let mut best_idx: Option<usize> = None;

    for (i, entry) in gallery.entries().iter().enumerate() {
        let distance = probe.distance(&entry.embedding);
        if distance < best_distance {
            best_distance = distance;
            best_idx = Some(i);
        }
    }

    match best_idx {
        Some(idx) if best_distance <= threshold => MatchResult {
            identity: Some(gallery.entries()[idx].identity.clone()),
            distance: best_distance,
        },
        _ => MatchResult {
            identity: None,
            distance: best_distance,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{Gallery, ReferenceImage};
    use crate::provider::{EmbeddingProvider, ProviderError};
    use crate::types::{BoundingBox, Detection};
    use image::DynamicImage;
    use std::sync::Mutex;

    /// Provider that hands out pre-baked embeddings one image at a time.
    struct ScriptedProvider {
        embeddings: Mutex<Vec<Vec<f32>>>,
    }

    impl ScriptedProvider {
        fn new(embeddings: Vec<Vec<f32>>) -> Self {
            Self {
                embeddings: Mutex::new(embeddings),
            }
        }
    }

    impl EmbeddingProvider for ScriptedProvider {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>, ProviderError> {
            let mut remaining = self.embeddings.lock().unwrap();
            let values = remaining.remove(0);
            Ok(vec![Detection {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    confidence: 1.0,
                },
                embedding: Embedding::new(values),
            }])
        }
    }

    fn gallery_of(pairs: &[(&str, Vec<f32>)]) -> Gallery {
        let provider = ScriptedProvider::new(pairs.iter().map(|(_, e)| e.clone()).collect());
        let sources = pairs
            .iter()
            .map(|(identity, _)| ReferenceImage {
                identity: identity.to_string(),
                source: format!("{identity}.jpg"),
                image: DynamicImage::new_rgb8(8, 8),
            })
            .collect();
        Gallery::load(&provider, sources).unwrap().gallery
    }

    #[test]
    fn test_match_within_threshold() {
        // Scenario A: one entry at distance 0.4, threshold 0.6.
        let gallery = gallery_of(&[("alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.4, 0.0]);
        let result = best_match(&probe, &gallery, 0.6);
        assert_eq!(result.identity.as_deref(), Some("alice"));
        assert!((result.distance - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_beyond_threshold() {
        // Scenario B: distance 0.9 against threshold 0.6 — Unknown, but
        // the distance is still reported.
        let gallery = gallery_of(&[("alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.9, 0.0]);
        let result = best_match(&probe, &gallery, 0.6);
        assert!(result.identity.is_none());
        assert!((result.distance - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_distance_exactly_at_threshold_matches() {
        // Unknown only when strictly greater than the threshold.
        let gallery = gallery_of(&[("alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.6, 0.0]);
        assert!(best_match(&probe, &gallery, 0.6).is_match());
    }

    #[test]
    fn test_all_entries_scanned() {
        // Best match is the last entry in gallery order.
        let gallery = gallery_of(&[
            ("alice", vec![5.0, 0.0]),
            ("bob", vec![0.0, 5.0]),
            ("zoe", vec![0.1, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = best_match(&probe, &gallery, 1.0);
        assert_eq!(result.identity.as_deref(), Some("zoe"));
    }

    #[test]
    fn test_min_distance_per_identity_wins() {
        // Two reference photos for bob; the closer one carries the match.
        let gallery = gallery_of(&[
            ("alice", vec![3.0, 0.0]),
            ("bob", vec![4.0, 0.0]),
            ("bob", vec![0.2, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = best_match(&probe, &gallery, 1.0);
        assert_eq!(result.identity.as_deref(), Some("bob"));
        assert!((result.distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_tie_resolves_to_first_in_gallery_order() {
        // Equidistant candidates: entries are sorted by identity, so
        // "alice" enumerates before "bob" and keeps the match.
        let gallery = gallery_of(&[("bob", vec![1.0, 0.0]), ("alice", vec![-1.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = best_match(&probe, &gallery, 2.0);
        assert_eq!(result.identity.as_deref(), Some("alice"));
    }

    #[test]
    fn test_threshold_monotonicity() {
        // A match at threshold T holds at every T' > T and fails below
        // the actual distance.
        let gallery = gallery_of(&[("alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.5, 0.0]);
        assert!(best_match(&probe, &gallery, 0.5).is_match());
        assert!(best_match(&probe, &gallery, 0.7).is_match());
        assert!(best_match(&probe, &gallery, 0.9).is_match());
        assert!(!best_match(&probe, &gallery, 0.49).is_match());
        assert!(!best_match(&probe, &gallery, 0.1).is_match());
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let gallery = Gallery::default();
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = best_match(&probe, &gallery, 0.6);
        assert!(result.identity.is_none());
        assert_eq!(result.distance, f32::INFINITY);
    }
}
