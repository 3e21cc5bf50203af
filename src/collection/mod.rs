// Collection module
// Records, their store, and the loader that pairs them with a vector index


pub mod loader;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::index::FlatIndex;
use crate::{Result, SemanticError};

pub use loader::CollectionLoader;

/// Field holding the text a record is embedded by
pub const DESCRIPTION_FIELD: &str = "Description";

/// One JSON object from a collection source, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    #[inline]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The searchable text, if the record has a non-empty string `Description`
    #[inline]
    pub fn description(&self) -> Option<&str> {
        self.0
            .get(DESCRIPTION_FIELD)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    #[inline]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    #[inline]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    #[inline]
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A named JSON source a collection is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSource {
    pub name: String,
    pub path: PathBuf,
}

impl CollectionSource {
    #[inline]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Where a record store came from and what was filtered out of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Source path, `None` when loaded from memory
    pub path: Option<PathBuf>,
    /// Records read from the source, valid or not
    pub total_records: usize,
    /// Records excluded for lacking a usable `Description`
    pub skipped_records: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Validated records of one collection, in index order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStore {
    records: Vec<Record>,
    source: SourceInfo,
}

impl RecordStore {
    #[inline]
    pub fn new(records: Vec<Record>, source: SourceInfo) -> Self {
        Self { records, source }
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }
}

/// An immutable snapshot pairing a record store with its index
///
/// The record at position `i` is the one embedded at index position `i`.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    store: RecordStore,
    index: FlatIndex,
}

/// Summary of a published collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub records: usize,
    pub skipped: usize,
    pub dimension: Option<usize>,
    pub loaded_at: DateTime<Utc>,
}

impl Collection {
    /// Pair a store with its index
    ///
    /// # Returns
    /// * `Result<Self>` - The collection, or `EmbeddingFailure` if the store
    ///   and index hold a different number of entries
    #[inline]
    pub fn new(name: impl Into<String>, store: RecordStore, index: FlatIndex) -> Result<Self> {
        let name = name.into();
        if store.len() != index.len() {
            return Err(SemanticError::EmbeddingFailure(format!(
                "collection '{}' has {} records but {} indexed vectors",
                name,
                store.len(),
                index.len()
            )));
        }

        Ok(Self { name, store, index })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[inline]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            name: self.name.clone(),
            records: self.store.len(),
            skipped: self.store.source().skipped_records,
            dimension: self.index.dimension(),
            loaded_at: self.store.source().loaded_at,
        }
    }
}
