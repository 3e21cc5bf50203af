// Embeddings module
// The narrow `embed` seam the core depends on, plus its Ollama implementation

pub mod ollama;

pub use ollama::{ModelInfo, OllamaClient};

/// Turns text into fixed-length embedding vectors
///
/// Implementations must return exactly one vector per input text, in input
/// order, and must be deterministic for a fixed model.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[cfg(test)]
pub(crate) mod test_support;
