//! Query-time embedding inference and int8 quantisation.
//!
//! The artwork and Iconclass embeddings were produced by the same 384-dim
//! multilingual model; queries go through the identical pipeline (instruction
//! prefix, mean pooling, L2 normalisation) followed by the unit-scale int8
//! quantisation used when the indexes were built, so integer cosine distance
//! matches what was indexed.

use crate::config::SemanticConfig;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embedding: {0}")]
    Inference(String),
}

/// Expected embedding width; the indexes assert this at open.
pub const EMBEDDING_DIM: usize = 384;

/// A single multilingual text-embedding model instance.
///
/// Inference is CPU-bound and serialised through the mutex; callers run it
/// on a worker pool, not a hot event-loop thread.
pub struct QueryEmbedder {
    model: Mutex<TextEmbedding>,
    dimensions: usize,
    prefix: String,
}

impl QueryEmbedder {
    /// Load the model once at startup.
    pub fn new(config: &SemanticConfig) -> Result<Self, EmbeddingError> {
        let cache_dir = config
            .model_cache_dir
            .clone()
            .unwrap_or_else(default_model_dir);
        let mut model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::MultilingualE5Small)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        let probe = model
            .embed(vec!["probe"], None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let dimensions = probe
            .into_iter()
            .next()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::Inference("model returned no vectors".to_string()))?;

        tracing::info!(target: "semantic", "embedding model ready ({dimensions} dimensions)");
        Ok(Self {
            model: Mutex::new(model),
            dimensions,
            prefix: config.query_prefix.clone(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a query: instruction prefix, inference, L2 normalisation.
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let prefixed = format!("{}{}", self.prefix, text);
        let vectors = self
            .model
            .lock()
            .embed(vec![prefixed], None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        let mut vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Inference("model returned no vectors".to_string()))?;
        normalize(&mut vector);
        Ok(vector)
    }

    /// Embed and quantise in one step, matching the stored representation.
    pub fn embed_query_int8(&self, text: &str) -> Result<Vec<i8>, EmbeddingError> {
        Ok(quantize_int8(&self.embed_query(text)?))
    }
}

fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("musea")
        .join("models")
}

/// L2-normalise in place. Zero vectors are left untouched; similarity is
/// undefined for them and the quantised form stays all-zero.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Unit-scale int8 quantisation of a unit-normalised vector: each component
/// in [-1, 1] maps to [-127, 127].
pub fn quantize_int8(vector: &[f32]) -> Vec<i8> {
    vector
        .iter()
        .map(|x| (x * 127.0).round().clamp(-127.0, 127.0) as i8)
        .collect()
}

/// Inverse of [`quantize_int8`], for tests and diagnostics.
pub fn dequantize_int8(vector: &[i8]) -> Vec<f32> {
    vector.iter().map(|x| f32::from(*x) / 127.0).collect()
}

/// Cosine distance between two int8 vectors: `1 − dot/(‖a‖·‖b‖)`, bounded
/// in [0, 2]. Returns 2.0 (maximally distant) when either vector is zero.
pub fn cosine_distance_int8(a: &[i8], b: &[i8]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0i64;
    let mut norm_a = 0i64;
    let mut norm_b = 0i64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (i64::from(*x), i64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0 || norm_b == 0 {
        return 2.0;
    }
    1.0 - (dot as f32) / ((norm_a as f32).sqrt() * (norm_b as f32).sqrt())
}

/// Reinterpret a stored embedding BLOB as int8 components.
pub fn blob_to_int8(blob: &[u8]) -> Vec<i8> {
    blob.iter().map(|b| *b as i8).collect()
}

/// Render an int8 vector as the BLOB bytes the index stores.
pub fn int8_to_blob(vector: &[i8]) -> Vec<u8> {
    vector.iter().map(|v| *v as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_round_trip_within_bound() {
        let mut v: Vec<f32> = (0..EMBEDDING_DIM).map(|i| (i as f32).sin()).collect();
        normalize(&mut v);
        let q = quantize_int8(&v);
        let back = dequantize_int8(&q);
        // Each component recovers within the quantisation step
        for (orig, rec) in v.iter().zip(back.iter()) {
            assert!((orig - rec).abs() <= 1.0 / 127.0 + f32::EPSILON, "{orig} vs {rec}");
        }
    }

    #[test]
    fn normalization_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut v = vec![0.0_f32; 4];
        normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn cosine_distance_extremes() {
        let a = quantize_int8(&[1.0, 0.0, 0.0]);
        let b = quantize_int8(&[1.0, 0.0, 0.0]);
        let c = quantize_int8(&[0.0, 1.0, 0.0]);
        let d = quantize_int8(&[-1.0, 0.0, 0.0]);
        assert!(cosine_distance_int8(&a, &b).abs() < 1e-6);
        assert!((cosine_distance_int8(&a, &c) - 1.0).abs() < 1e-6);
        assert!((cosine_distance_int8(&a, &d) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_maximally_distant() {
        let a = quantize_int8(&[1.0, 0.0]);
        let z = vec![0i8, 0];
        assert_eq!(cosine_distance_int8(&a, &z), 2.0);
    }

    #[test]
    fn blob_round_trip() {
        let v: Vec<i8> = vec![-127, -1, 0, 1, 127];
        assert_eq!(blob_to_int8(&int8_to_blob(&v)), v);
    }
}
