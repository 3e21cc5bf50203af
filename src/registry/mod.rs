// Collection registry
// Process-wide name -> collection mapping with lock-free reads and atomic publish


use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::collection::{Collection, CollectionSummary};
use crate::{Result, SemanticError};

type Snapshot = HashMap<String, Arc<Collection>>;

/// The currently published collection for every known name
///
/// Readers get an `Arc` to an immutable [`Collection`] and keep a consistent
/// view for as long as they hold it. Publishing swaps the whole mapping, so a
/// reader never observes a store from one load paired with an index from
/// another. A retired collection is freed when its last reader drops it.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    collections: ArcSwap<Snapshot>,
}

impl CollectionRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current collection for `name`
    ///
    /// # Returns
    /// * `Result<Arc<Collection>>` - The published snapshot, or `CollectionNotFound`
    #[inline]
    pub fn get(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| SemanticError::CollectionNotFound(name.to_string()))
    }

    /// Install `collection` as the current value for its name
    ///
    /// Unknown names are created. Concurrent publishes of different names never
    /// overwrite each other; for the same name the last publish wins.
    ///
    /// # Returns
    /// * `Option<Arc<Collection>>` - The snapshot that was replaced, if any
    #[inline]
    pub fn publish(&self, collection: Collection) -> Option<Arc<Collection>> {
        let name = collection.name().to_string();
        let records = collection.len();
        let collection = Arc::new(collection);

        let previous = self.collections.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.insert(name.clone(), Arc::clone(&collection));
            next
        });
        let replaced = previous.get(&name).cloned();

        match &replaced {
            Some(old) => info!(
                "Published collection '{}': {} records (replaced {})",
                name,
                records,
                old.len()
            ),
            None => info!("Published collection '{}': {} records", name, records),
        }

        replaced
    }

    /// Names of every published collection, sorted
    #[inline]
    pub fn names(&self) -> BTreeSet<String> {
        self.collections.load().keys().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.collections.load().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.collections.load().is_empty()
    }

    /// Summaries of every published collection, ordered by name
    #[inline]
    pub fn summaries(&self) -> Vec<CollectionSummary> {
        let snapshot = self.collections.load_full();
        let mut summaries: Vec<CollectionSummary> =
            snapshot.values().map(|collection| collection.summary()).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Summarised {} collections", summaries.len());
        summaries
    }
}
