//! Embedding provider boundary.
//!
//! A provider turns a decoded image into zero or more (bounding box,
//! embedding) pairs. Everything model-specific lives behind this trait;
//! the gallery, matcher, and pipeline only see its output.

use crate::types::{BoundingBox, Detection, Embedding};
use image::DynamicImage;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Given pixel data, produce the faces found in it.
///
/// Implementations are synchronous and CPU-bound; callers that need a
/// time bound run `detect` under a blocking task with a timeout.
pub trait EmbeddingProvider: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, ProviderError>;
}

// Grid resolution for the synthetic color-moment embedding.
const SYNTHETIC_GRID: u32 = 4;

/// Deterministic image-statistics provider.
///
/// Treats the whole frame as a single face and derives a coarse
/// embedding from per-cell mean colors on a 4x4 grid (48 dimensions,
/// each in [0, 1]). Identical images always produce identical
/// embeddings, so the full gallery/match/ledger path can be exercised
/// end to end without a model. Not a face model — a real backend plugs
/// in through [`EmbeddingProvider`].
pub struct SyntheticProvider;

impl EmbeddingProvider for SyntheticProvider {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, ProviderError> {
        let rgb = image.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        if width < SYNTHETIC_GRID || height < SYNTHETIC_GRID {
            return Ok(Vec::new());
        }

        let cell_w = width / SYNTHETIC_GRID;
        let cell_h = height / SYNTHETIC_GRID;
        let mut values = Vec::with_capacity((SYNTHETIC_GRID * SYNTHETIC_GRID * 3) as usize);

        for row in 0..SYNTHETIC_GRID {
            for col in 0..SYNTHETIC_GRID {
                let mut sums = [0u64; 3];
                for y in (row * cell_h)..((row + 1) * cell_h) {
                    for x in (col * cell_w)..((col + 1) * cell_w) {
                        let px = rgb.get_pixel(x, y);
                        sums[0] += px[0] as u64;
                        sums[1] += px[1] as u64;
                        sums[2] += px[2] as u64;
                    }
                }
                let n = (cell_w * cell_h) as f32;
                for sum in sums {
                    values.push(sum as f32 / n / 255.0);
                }
            }
        }

        Ok(vec![Detection {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                confidence: 1.0,
            },
            embedding: Embedding::new(values),
        }])
    }
}

/// Scripted provider for tests: returns a fixed detection list, after an
/// optional delay, or fails outright.
pub struct FixtureProvider {
    detections: Vec<Detection>,
    delay: Option<Duration>,
    fail: bool,
}

impl FixtureProvider {
    pub fn returning(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            delay: None,
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self::returning(Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            detections: Vec::new(),
            delay: None,
            fail: true,
        }
    }

    /// Sleep before answering — for exercising detection timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl EmbeddingProvider for FixtureProvider {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>, ProviderError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(ProviderError::Inference("fixture configured to fail".into()));
        }
        Ok(self.detections.clone())
    }
}
