//! Embedding collaborator.
//!
//! [`EmbeddingEngine`] wraps fastembed's Jina v2 Base Code model (768 dims)
//! and only exists with the `embedding` feature. The store takes any
//! [`Embedder`], so tests can plug in a deterministic one and builds without
//! the feature run keyword-only.

use crate::error::Result;

/// Which side of retrieval a text is on. Asymmetric models encode queries
/// and passages differently; symmetric ones ignore this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Passage,
    Query,
}

/// Turns texts into fixed-width vectors.
pub trait Embedder: Send {
    fn dimensions(&self) -> usize;

    /// One vector of length [`dimensions`](Self::dimensions) per input text.
    fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>>;
}

#[cfg(feature = "embedding")]
pub use engine::{EmbeddingEngine, JINA_CODE_DIMENSIONS};

/// The embedder used by the binary: the local model when the `embedding`
/// feature is on and the model loads, otherwise none.
#[cfg(feature = "embedding")]
pub fn default_embedder() -> Option<Box<dyn Embedder>> {
    match EmbeddingEngine::try_new() {
        Ok(engine) => Some(Box::new(engine)),
        Err(e) => {
            tracing::warn!("{e}; continuing without vector search");
            None
        }
    }
}

#[cfg(not(feature = "embedding"))]
pub fn default_embedder() -> Option<Box<dyn Embedder>> {
    tracing::debug!("built without the embedding feature; using keyword search");
    None
}

#[cfg(feature = "embedding")]
mod engine {
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::{Embedder, EmbeddingTask};
    use crate::error::{Result, StructdexError};

    /// Output width of `JinaEmbeddingsV2BaseCode`.
    pub const JINA_CODE_DIMENSIONS: usize = 768;

    const BATCH_SIZE: usize = 32;

    /// Local ONNX embedding model.
    pub struct EmbeddingEngine {
        model: TextEmbedding,
    }

    impl EmbeddingEngine {
        /// Load the model, downloading it into the fastembed cache on first
        /// use.
        pub fn try_new() -> Result<Self> {
            let options = InitOptions::new(EmbeddingModel::JinaEmbeddingsV2BaseCode)
                .with_show_download_progress(false);
            let model = TextEmbedding::try_new(options)
                .map_err(|e| StructdexError::Other(format!("failed to load embedding model: {e}")))?;
            tracing::info!("embedding model loaded (jina-embeddings-v2-base-code)");
            Ok(Self { model })
        }
    }

    impl Embedder for EmbeddingEngine {
        fn dimensions(&self) -> usize {
            JINA_CODE_DIMENSIONS
        }

        // Jina v2 code embeddings are symmetric.
        fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.model
                .embed(texts.to_vec(), Some(BATCH_SIZE))
                .map_err(|e| StructdexError::Other(format!("embedding failed: {e}")))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Embedder, EmbeddingTask};
    use crate::error::Result;

    /// Bag-of-bytes embedder: texts sharing characters land close together.
    pub struct HashEmbedder {
        pub dims: usize,
    }

    impl Embedder for HashEmbedder {
        fn dimensions(&self) -> usize {
            self.dims
        }

        fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    for b in t.to_lowercase().bytes() {
                        v[b as usize % self.dims] += 1.0;
                    }
                    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
                    v.iter_mut().for_each(|x| *x /= norm);
                    v
                })
                .collect())
        }
    }

    #[test]
    fn hash_embedder_is_normalized() {
        let e = HashEmbedder { dims: 8 };
        let v = e.embed(&["hello".to_string()], EmbeddingTask::Passage).unwrap();
        let norm: f32 = v[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
