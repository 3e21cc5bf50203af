// Sync controller
// Reloads every configured collection, optionally after pulling fresh sources


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, bail};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::collection::{CollectionLoader, CollectionSource};
use crate::registry::CollectionRegistry;
use crate::{Result, SemanticError};

/// Status reported after a successful reload
pub const RELOADED_STATUS: &str = "reloaded";
/// Status reported after a successful pull and reload
pub const SYNCED_STATUS: &str = "updated and reloaded from Git";

/// Refreshes the source directory from its remote origin
pub trait SourcePuller: Send + Sync {
    fn pull(&self) -> anyhow::Result<()>;
}

/// Runs `<program> -C <repo_dir> <args...>`, failing on a nonzero exit
#[derive(Debug, Clone)]
pub struct GitPuller {
    program: String,
    args: Vec<String>,
    repo_dir: PathBuf,
}

impl GitPuller {
    #[inline]
    pub fn new(program: impl Into<String>, args: Vec<String>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            repo_dir: repo_dir.into(),
        }
    }

    #[inline]
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }
}

impl SourcePuller for GitPuller {
    #[inline]
    fn pull(&self) -> anyhow::Result<()> {
        info!(
            "Pulling sources: {} -C {} {}",
            self.program,
            self.repo_dir.display(),
            self.args.join(" ")
        );

        let output = Command::new(&self.program)
            .arg("-C")
            .arg(&self.repo_dir)
            .args(&self.args)
            .output()
            .with_context(|| format!("Failed to run '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{} {}' exited with {}: {}",
                self.program,
                self.args.join(" "),
                output.status,
                stderr.trim()
            );
        }

        Ok(())
    }
}

/// Outcome of reloading a single collection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Loaded {
        records: usize,
        skipped: usize,
        dimension: Option<usize>,
    },
    Failed {
        error: String,
    },
}

/// Per-collection outcomes of a reload, keyed by collection name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReloadReport {
    pub collections: BTreeMap<String, CollectionOutcome>,
}

impl ReloadReport {
    /// Collections that failed to load, with their error messages
    #[inline]
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.collections
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                CollectionOutcome::Failed { error } => Some((name.as_str(), error.as_str())),
                CollectionOutcome::Loaded { .. } => None,
            })
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Orchestrates reloads and pulls against a shared registry
///
/// Whole reload and sync operations are serialised so two pulls never run at
/// once. Searches never take this lock; they keep reading whatever snapshot
/// the registry currently publishes.
pub struct SyncController {
    registry: Arc<CollectionRegistry>,
    loader: CollectionLoader,
    sources: Vec<CollectionSource>,
    puller: Arc<dyn SourcePuller>,
    lock: Mutex<()>,
}

impl SyncController {
    #[inline]
    pub fn new(
        registry: Arc<CollectionRegistry>,
        loader: CollectionLoader,
        sources: Vec<CollectionSource>,
        puller: Arc<dyn SourcePuller>,
    ) -> Self {
        Self {
            registry,
            loader,
            sources,
            puller,
            lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn sources(&self) -> &[CollectionSource] {
        &self.sources
    }

    /// Reload every configured collection
    ///
    /// A collection that fails to load keeps its previously published value
    /// and is reported as failed; the remaining collections still reload.
    #[inline]
    pub fn reload(&self) -> ReloadReport {
        let _guard = self.acquire();
        self.reload_locked()
    }

    /// Pull fresh sources, then reload
    ///
    /// # Returns
    /// * `Result<ReloadReport>` - The reload outcomes, or `SyncUnavailable` if
    ///   the pull failed, in which case nothing is reloaded
    #[inline]
    pub fn sync(&self) -> Result<ReloadReport> {
        let _guard = self.acquire();

        if let Err(e) = self.puller.pull() {
            warn!("Sync aborted, pull failed: {:#}", e);
            return Err(SemanticError::SyncUnavailable(format!("{:#}", e)));
        }

        let report = self.reload_locked();
        if !report.is_complete() {
            warn!(
                "Sync pulled new sources but {} collection(s) failed to reload: {}",
                report.failures().count(),
                report
                    .failures()
                    .map(|(name, _)| name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(report)
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reload_locked(&self) -> ReloadReport {
        let mut report = ReloadReport::default();

        for source in &self.sources {
            let outcome = match self.loader.load_source(source) {
                Ok(collection) => {
                    let outcome = CollectionOutcome::Loaded {
                        records: collection.len(),
                        skipped: collection.store().source().skipped_records,
                        dimension: collection.index().dimension(),
                    };
                    self.registry.publish(collection);
                    outcome
                }
                Err(e) => {
                    error!("Failed to reload collection '{}': {}", source.name, e);
                    CollectionOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.collections.insert(source.name.clone(), outcome);
        }

        info!(
            "Reloaded {} of {} collections",
            report.collections.len() - report.failures().count(),
            report.collections.len()
        );

        report
    }
}
