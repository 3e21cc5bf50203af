// Deterministic embedders for unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Embedder;

/// Embeds text as a letter histogram over `a..=z`, folded into `dimension` buckets
pub struct LetterEmbedder {
    pub dimension: usize,
    pub calls: AtomicUsize,
}

impl LetterEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for c in text.chars().filter(char::is_ascii_lowercase) {
            vector[(c as usize - 'a' as usize) % self.dimension] += 1.0;
        }
        vector
    }
}

impl Embedder for LetterEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Looks every text up in a fixed table; unknown text is an error
#[derive(Default)]
pub struct TableEmbedder {
    pub table: Mutex<HashMap<String, Vec<f32>>>,
}

impl TableEmbedder {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Vec<f32>)>) -> Self {
        let table = entries
            .into_iter()
            .map(|(text, vector)| (text.to_string(), vector))
            .collect();
        Self {
            table: Mutex::new(table),
        }
    }
}

impl Embedder for TableEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let table = self.table.lock().expect("table lock is not poisoned");
        texts
            .iter()
            .map(|text| {
                table
                    .get(text)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no embedding for '{}'", text))
            })
            .collect()
    }
}

/// Always fails, like an unreachable model server
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("model server unreachable"))
    }
}

/// Returns one vector fewer than requested
pub struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }
}
