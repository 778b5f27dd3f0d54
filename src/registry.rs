//! Source registry
//!
//! The set of sources is decided at build time: built-in sources come from
//! [`BUILTIN_SOURCES`], hosts may register more. Which of them run, and in
//! which order, is re-evaluated from the configuration on every call.

use crate::config::{PluginConfig, SourceSettings};
use crate::sources::{ImageKind, R18DevSource, Source, SourceError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building a registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two sources share a name
    #[error("A source named '{0}' is already registered")]
    DuplicateSource(String),

    /// A built-in source could not be constructed
    #[error("Failed to construct source '{name}': {source}")]
    ConstructionFailed { name: String, source: SourceError },
}

/// Constructor for a built-in source.
pub type SourceFactory = fn(&PluginConfig) -> Result<Arc<dyn Source>, SourceError>;

/// Built-in sources, by name.
pub const BUILTIN_SOURCES: &[(&str, SourceFactory)] = &[(R18DevSource::NAME, r18dev)];

fn r18dev(config: &PluginConfig) -> Result<Arc<dyn Source>, SourceError> {
    Ok(Arc::new(R18DevSource::new(config)?))
}

/// Live description of a source under the current configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    /// Lower runs earlier
    pub priority: i32,
    pub enabled: bool,
    pub image_enabled: bool,
    pub handled_image_kinds: BTreeSet<ImageKind>,
}

/// A source paired with its descriptor and settings for one call.
#[derive(Clone)]
pub struct ActiveSource {
    pub descriptor: SourceDescriptor,
    pub settings: SourceSettings,
    pub source: Arc<dyn Source>,
}

impl fmt::Debug for ActiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSource")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// All sources known to this process, in registration order.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| s.name()))
            .finish()
    }
}

impl SourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in source.
    pub fn builtin(config: &PluginConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (name, factory) in BUILTIN_SOURCES {
            let source = factory(config).map_err(|e| RegistryError::ConstructionFailed {
                name: name.to_string(),
                source: e,
            })?;
            registry.register(source)?;
        }
        Ok(registry)
    }

    /// Adds a source; names must be unique.
    pub fn register(&mut self, source: Arc<dyn Source>) -> Result<(), RegistryError> {
        if self.sources.iter().any(|s| s.name() == source.name()) {
            return Err(RegistryError::DuplicateSource(source.name().to_string()));
        }
        self.sources.push(source);
        Ok(())
    }

    /// Builder style [`register`](Self::register).
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Result<Self, RegistryError> {
        self.register(source)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Descriptors of all registered sources, sorted by priority.
    pub fn descriptors(&self, config: &PluginConfig) -> Vec<SourceDescriptor> {
        self.resolve(config)
            .into_iter()
            .map(|active| active.descriptor)
            .collect()
    }

    /// Enabled sources, ascending by priority.
    pub fn enabled_sources(&self, config: &PluginConfig) -> Vec<ActiveSource> {
        self.resolve(config)
            .into_iter()
            .filter(|active| active.descriptor.enabled)
            .collect()
    }

    /// Enabled sources that also have images enabled, ascending by priority.
    pub fn image_sources(&self, config: &PluginConfig) -> Vec<ActiveSource> {
        self.resolve(config)
            .into_iter()
            .filter(|active| active.descriptor.enabled && active.descriptor.image_enabled)
            .collect()
    }

    /// Pairs every source with its settings; ties keep registration order.
    fn resolve(&self, config: &PluginConfig) -> Vec<ActiveSource> {
        let mut active: Vec<ActiveSource> = self
            .sources
            .iter()
            .map(|source| {
                let settings = config.source(source.name());
                let descriptor = SourceDescriptor {
                    name: source.name().to_string(),
                    priority: settings.priority.unwrap_or_else(|| source.default_priority()),
                    enabled: settings.enabled,
                    image_enabled: settings.image_enabled,
                    handled_image_kinds: source.handled_image_kinds().iter().copied().collect(),
                };
                ActiveSource {
                    descriptor,
                    settings,
                    source: Arc::clone(source),
                }
            })
            .collect();
        active.sort_by_key(|a| a.descriptor.priority);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetadataRecord;
    use crate::sources::{CandidateList, ImageCandidate, ImageItem, LookupInfo, SourceContext};
    use async_trait::async_trait;

    struct Named(&'static str, i32);

    #[async_trait]
    impl Source for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn default_priority(&self) -> i32 {
            self.1
        }

        fn handled_image_kinds(&self) -> &'static [ImageKind] {
            &[ImageKind::Primary]
        }

        async fn search(
            &self,
            _candidates: &mut CandidateList,
            _query: &LookupInfo,
            _ctx: &SourceContext,
        ) -> Result<(), SourceError> {
            Ok(())
        }

        async fn fill_metadata(
            &self,
            _record: &mut MetadataRecord,
            _info: &LookupInfo,
            _ctx: &SourceContext,
        ) -> Result<bool, SourceError> {
            Ok(false)
        }

        async fn images(
            &self,
            _item: &ImageItem,
            _kind: ImageKind,
            _ctx: &SourceContext,
        ) -> Result<Vec<ImageCandidate>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn enabled(priority: Option<i32>, image_enabled: bool) -> SourceSettings {
        SourceSettings {
            enabled: true,
            image_enabled,
            priority,
            ..SourceSettings::default()
        }
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::new()
            .with_source(Arc::new(Named("a", 3)))
            .unwrap()
            .with_source(Arc::new(Named("b", 1)))
            .unwrap()
            .with_source(Arc::new(Named("c", 2)))
            .unwrap()
    }

    fn names(sources: &[ActiveSource]) -> Vec<&str> {
        sources.iter().map(|s| s.descriptor.name.as_str()).collect()
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = registry().with_source(Arc::new(Named("a", 9)));
        assert!(matches!(result, Err(RegistryError::DuplicateSource(name)) if name == "a"));
    }

    #[test]
    fn test_unconfigured_sources_are_disabled() {
        assert!(registry().enabled_sources(&PluginConfig::default()).is_empty());
    }

    #[test]
    fn test_enabled_sources_sorted_by_priority() {
        let config = PluginConfig::default()
            .with_source("a", enabled(None, false))
            .with_source("b", enabled(None, false))
            .with_source("c", enabled(Some(0), false));
        assert_eq!(names(&registry().enabled_sources(&config)), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_image_sources_require_both_flags() {
        let config = PluginConfig::default()
            .with_source("a", enabled(None, true))
            .with_source("b", enabled(None, false))
            .with_source(
                "c",
                SourceSettings {
                    image_enabled: true,
                    ..SourceSettings::default()
                },
            );
        assert_eq!(names(&registry().image_sources(&config)), vec!["a"]);
    }

    #[test]
    fn test_configuration_changes_apply_per_call() {
        let registry = registry();
        let first = PluginConfig::default().with_source("a", enabled(None, false));
        let second = PluginConfig::default()
            .with_source("a", enabled(Some(5), false))
            .with_source("b", enabled(Some(6), false));
        assert_eq!(names(&registry.enabled_sources(&first)), vec!["a"]);
        assert_eq!(names(&registry.enabled_sources(&second)), vec!["a", "b"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let config = PluginConfig::default()
            .with_source("a", enabled(Some(1), false))
            .with_source("b", enabled(Some(1), false))
            .with_source("c", enabled(Some(1), false));
        assert_eq!(names(&registry().enabled_sources(&config)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_builtin_registry_lists_r18dev() {
        let config = PluginConfig {
            cache: crate::config::CacheConfig {
                enabled: false,
                ..Default::default()
            },
            ..PluginConfig::default()
        };
        let registry = SourceRegistry::builtin(&config).unwrap();
        let descriptors = registry.descriptors(&config);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, R18DevSource::NAME);
        assert!(!descriptors[0].enabled);
        assert!(descriptors[0].handled_image_kinds.contains(&ImageKind::Primary));
    }
}
