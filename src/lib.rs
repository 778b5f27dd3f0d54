//! iv_info - Metadata aggregation for releases identified by catalog ids
//!
//! This library resolves a release id (such as `REBD-789`) from a file path
//! or title and folds a set of pluggable sources over it: searching for
//! candidates, composing one metadata record, and collecting image URLs.
//! Sources run one at a time in priority order. A failing source is logged
//! and skipped without undoing what earlier sources contributed.

pub mod compose;
pub mod config;
pub mod identifier;
pub mod images;
pub mod record;
pub mod registry;
pub mod search;
pub mod sources;

mod cache;
mod fold;

use std::fmt::Debug;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// Re-export error types
pub use cache::CacheError;
pub use config::ConfigError;
pub use registry::RegistryError;
pub use sources::SourceError;

// Re-export the types hosts work with
pub use config::{PluginConfig, SharedConfig, SourceSettings};
pub use identifier::{GLOBAL_ID_KEY, GlobalId, parse_global_id, resolve_global_id};
pub use record::{MetadataRecord, MetadataResult, Person, PersonKind};
pub use registry::{SourceDescriptor, SourceRegistry};
pub use sources::{
    ImageCandidate, ImageItem, ImageKind, LookupInfo, SearchCandidate, Source, SourceContext,
};

/// An aggregation stopped early because cancellation was requested.
///
/// `partial` holds the state accumulated by the sources that finished before
/// the cancellation.
#[derive(Debug, Error)]
#[error("Aggregation cancelled after {completed} source(s)")]
pub struct Cancelled<T: Debug> {
    /// Number of sources that finished before cancellation
    pub completed: usize,
    /// Accumulated state at that point
    pub partial: T,
}

/// Top-level error type for setting up an [`IvInfo`] instance
#[derive(Debug, Error)]
pub enum IvInfoError {
    /// Error while loading configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while building the source registry
    #[error("Source registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Entry point for hosts: a registry plus the live configuration.
///
/// Every call takes a fresh configuration snapshot, so changes made through
/// [`SharedConfig::replace`] apply to the next call.
///
/// # Examples
///
/// ```no_run
/// use iv_info::{IvInfo, LookupInfo, PluginConfig, SharedConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = IvInfo::builtin(SharedConfig::new(PluginConfig::default()))?;
/// let cancel = CancellationToken::new();
///
/// let query = LookupInfo::from_path("/media/REBD-789.mp4");
/// let candidates = engine.search(&query, &cancel).await?;
/// for candidate in candidates {
///     println!("{} ({})", candidate.name, candidate.global_id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct IvInfo {
    registry: SourceRegistry,
    config: SharedConfig,
}

impl IvInfo {
    /// Creates an engine over an existing registry.
    pub fn new(registry: SourceRegistry, config: SharedConfig) -> Self {
        Self { registry, config }
    }

    /// Creates an engine with every built-in source registered.
    pub fn builtin(config: SharedConfig) -> Result<Self, IvInfoError> {
        let registry = SourceRegistry::builtin(&config.snapshot())?;
        Ok(Self::new(registry, config))
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Describes every registered source under the current configuration.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.registry.descriptors(&self.config.snapshot())
    }

    /// See [`search::search`].
    pub async fn search(
        &self,
        query: &LookupInfo,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchCandidate>, Cancelled<Vec<SearchCandidate>>> {
        let config = self.config.snapshot();
        let sources = self.registry.enabled_sources(&config);
        debug!(sources = sources.len(), "search started");
        search::search(&sources, config, query, cancel).await
    }

    /// See [`compose::compose`].
    pub async fn compose(
        &self,
        info: &LookupInfo,
        cancel: &CancellationToken,
    ) -> Result<MetadataResult, Cancelled<MetadataResult>> {
        let config = self.config.snapshot();
        let sources = self.registry.enabled_sources(&config);
        debug!(sources = sources.len(), "compose started");
        compose::compose(&sources, config, info, cancel).await
    }

    /// See [`images::images`]. `kind` restricts the lookup to one image kind.
    pub async fn images(
        &self,
        item: &ImageItem,
        kind: Option<ImageKind>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>, Cancelled<Vec<ImageCandidate>>> {
        let config = self.config.snapshot();
        let sources = self.registry.image_sources(&config);
        debug!(sources = sources.len(), ?kind, "image lookup started");
        let single = kind.map(|k| [k]);
        let requested = single.as_ref().map(|k| k.as_slice());
        images::images(&sources, config, item, requested, cancel).await
    }
}
