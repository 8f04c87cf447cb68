use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Box area in square pixels. Used to pick the dominant face when a
    /// reference image contains more than one.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector. Opaque beyond supporting a distance function —
/// length and value ranges are whatever the provider produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Lower = more similar. Mismatched dimensions return
    /// `f32::INFINITY` rather than panicking — a probe from one provider
    /// can never accidentally match a gallery built by another.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected face in a frame: where it is and what it looks like.
/// Ephemeral — never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against the gallery.
///
/// `identity` is `None` when the best candidate sits beyond the match
/// threshold (or the gallery is empty); `distance` still carries the
/// best distance seen so callers can log near-misses.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Option<String>,
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert!(a.distance(&b).abs() < 1e-6);
    }

    #[test]
    fn test_distance_unit_apart() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert!((a.distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Embedding::new(vec![0.3, -1.2, 4.0]);
        let b = Embedding::new(vec![-0.7, 0.4, 1.5]);
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_bbox_area() {
        let b = BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 4.0,
            height: 5.0,
            confidence: 0.9,
        };
        assert!((b.area() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_area_degenerate() {
        let b = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: -3.0,
            height: 5.0,
            confidence: 0.9,
        };
        assert_eq!(b.area(), 0.0);
    }
}
