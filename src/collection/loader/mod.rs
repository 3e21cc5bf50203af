
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Collection, CollectionSource, Record, RecordStore, SourceInfo};
use crate::embeddings::Embedder;
use crate::index::FlatIndex;
use crate::{Result, SemanticError};

/// Builds fresh collections from JSON sources
///
/// A loader never touches a published collection: every call produces a new,
/// self-contained [`Collection`], so loads can run alongside searches.
#[derive(Clone)]
pub struct CollectionLoader {
    embedder: Arc<dyn Embedder>,
}

impl CollectionLoader {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Load a collection from its configured source
    #[inline]
    pub fn load_source(&self, source: &CollectionSource) -> Result<Collection> {
        self.load(&source.name, &source.path)
    }

    /// Load a collection from a JSON file
    ///
    /// # Arguments
    /// * `name` - Collection name
    /// * `path` - JSON document holding an array of record objects
    ///
    /// # Returns
    /// * `Result<Collection>` - The new collection, or `SourceUnavailable`,
    ///   `MalformedSource` or `EmbeddingFailure`
    #[inline]
    pub fn load(&self, name: &str, path: &Path) -> Result<Collection> {
        info!("Loading collection '{}' from {}", name, path.display());

        let content = fs::read_to_string(path).map_err(|source| SemanticError::SourceUnavailable {
            collection: name.to_string(),
            path: path.to_path_buf(),
            source,
        })?;

        self.build(name, &content, Some(path))
    }

    /// Load a collection from an in-memory JSON document
    #[inline]
    pub fn load_from_str(&self, name: &str, content: &str) -> Result<Collection> {
        self.build(name, content, None)
    }

    fn build(&self, name: &str, content: &str, path: Option<&Path>) -> Result<Collection> {
        let records = parse_records(name, content)?;
        let total_records = records.len();

        let (valid, invalid): (Vec<Record>, Vec<Record>) = records
            .into_iter()
            .partition(|record| record.description().is_some());

        if !invalid.is_empty() {
            warn!(
                "{}: {} entries skipped (missing 'Description')",
                name,
                invalid.len()
            );
        }

        let index = self.embed_records(name, &valid)?;

        let source = SourceInfo {
            path: path.map(Path::to_path_buf),
            total_records,
            skipped_records: invalid.len(),
            loaded_at: Utc::now(),
        };
        let collection = Collection::new(name, RecordStore::new(valid, source), index)?;

        info!(
            "Loaded collection '{}': {} records, {} skipped, {:?} dimensions",
            name,
            collection.len(),
            total_records - collection.len(),
            collection.index().dimension()
        );

        Ok(collection)
    }

    fn embed_records(&self, name: &str, records: &[Record]) -> Result<FlatIndex> {
        if records.is_empty() {
            debug!("Collection '{}' has no valid records, building empty index", name);
            return Ok(FlatIndex::default());
        }

        let descriptions: Vec<String> = records
            .iter()
            .filter_map(Record::description)
            .map(str::to_string)
            .collect();

        let vectors = self.embedder.embed(&descriptions).map_err(|e| {
            SemanticError::EmbeddingFailure(format!("collection '{}': {:#}", name, e))
        })?;

        if vectors.len() != descriptions.len() {
            return Err(SemanticError::EmbeddingFailure(format!(
                "collection '{}': requested {} embeddings, received {}",
                name,
                descriptions.len(),
                vectors.len()
            )));
        }

        FlatIndex::build(&vectors).map_err(|e| {
            SemanticError::EmbeddingFailure(format!("collection '{}': {}", name, e))
        })
    }
}

/// Parse a JSON document into records, rejecting anything but an array of objects
fn parse_records(name: &str, content: &str) -> Result<Vec<Record>> {
    let malformed = |message: String| SemanticError::MalformedSource {
        collection: name.to_string(),
        message,
    };

    let value: Value =
        serde_json::from_str(content).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array of records".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| match item {
            Value::Object(fields) => Ok(Record::new(fields)),
            other => Err(malformed(format!(
                "entry {} is not an object: {}",
                position, other
            ))),
        })
        .collect()
}
