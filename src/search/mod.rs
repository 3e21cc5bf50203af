// Search service
// Embeds a query and maps index hits back to the records they were built from


use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::collection::Record;
use crate::embeddings::Embedder;
use crate::registry::CollectionRegistry;
use crate::{Result, SemanticError};

/// Ranked results of a search, nearest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub results: Vec<Record>,
}

/// Every record of a collection, in store order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordList {
    pub records: Vec<Record>,
}

/// Read-only query surface over a [`CollectionRegistry`]
#[derive(Clone)]
pub struct SearchService {
    registry: Arc<CollectionRegistry>,
    embedder: Arc<dyn Embedder>,
    default_top_k: usize,
}

impl SearchService {
    #[inline]
    pub fn new(
        registry: Arc<CollectionRegistry>,
        embedder: Arc<dyn Embedder>,
        default_top_k: usize,
    ) -> Self {
        Self {
            registry,
            embedder,
            default_top_k,
        }
    }

    /// Result count used when a caller doesn't ask for one
    #[inline]
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Find the `top_k` records nearest to `query`
    ///
    /// The collection snapshot is taken once and used for the whole search, so
    /// a concurrent reload never mixes records and vectors from different loads.
    ///
    /// # Arguments
    /// * `collection` - Collection name
    /// * `query` - Natural-language query text
    /// * `top_k` - Maximum number of results; zero yields no results
    ///
    /// # Returns
    /// * `Result<SearchResults>` - Records ordered by ascending distance, or
    ///   `CollectionNotFound`, `EmbeddingFailure` or `DimensionMismatch`
    #[inline]
    pub fn search(&self, collection: &str, query: &str, top_k: usize) -> Result<SearchResults> {
        let snapshot = self.registry.get(collection)?;

        debug!(
            "Searching '{}' ({} records) for {:?} with top_k={}",
            collection,
            snapshot.len(),
            query,
            top_k
        );

        let query_vector = self.embed_query(query)?;
        let neighbors = snapshot.index().search(&query_vector, top_k)?;

        let results = neighbors
            .iter()
            .map(|neighbor| {
                snapshot.store().get(neighbor.position).cloned().ok_or_else(|| {
                    SemanticError::Other(anyhow::anyhow!(
                        "index position {} has no record in collection '{}'",
                        neighbor.position,
                        collection
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Search in '{}' returned {} results", collection, results.len());

        Ok(SearchResults { results })
    }

    /// Search using the configured default result count
    #[inline]
    pub fn search_default(&self, collection: &str, query: &str) -> Result<SearchResults> {
        self.search(collection, query, self.default_top_k)
    }

    /// Dump every record of a collection without ranking
    #[inline]
    pub fn list_all(&self, collection: &str) -> Result<RecordList> {
        let snapshot = self.registry.get(collection)?;
        Ok(RecordList {
            records: snapshot.store().records().to_vec(),
        })
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embedder
            .embed(&[query.to_string()])
            .map_err(|e| SemanticError::EmbeddingFailure(format!("query: {:#}", e)))?;

        if vectors.len() != 1 {
            return Err(SemanticError::EmbeddingFailure(format!(
                "query: requested 1 embedding, received {}",
                vectors.len()
            )));
        }

        Ok(vectors.swap_remove(0))
    }
}
