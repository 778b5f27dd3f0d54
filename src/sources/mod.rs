//! The source capability and the data it exchanges with the aggregators.
//!
//! A source is one external catalog. The aggregators fold over the enabled
//! sources in priority order and hand each one the state accumulated so far:
//! the candidate list during search, the partially filled record during
//! composition. Sources extend that state; they never remove from it.
mod cached;
mod r18dev;
mod r18dev_types;

pub(crate) use cached::CachedDocuments;
pub use r18dev::R18DevSource;

use crate::config::{PluginConfig, SourceSettings};
use crate::identifier::{GLOBAL_ID_KEY, GlobalId, global_id_prefix, resolve_global_id};
use crate::record::{MetadataRecord, ProviderIds};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors a source may report.
///
/// The aggregators log these and treat the source as having contributed
/// nothing; they never reach the caller.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Request to the source failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// The source answered with an unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Failed to parse the source's response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The source returned invalid or unexpected data
    #[error("Source returned invalid data: {0}")]
    InvalidData(String),

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// What the host knows about the item being looked up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupInfo {
    pub name: Option<String>,
    pub path: Option<String>,
    pub metadata_language: Option<String>,
    pub metadata_country_code: Option<String>,
    /// True for unattended library scans, false for manual lookups
    pub is_automated: bool,
    /// Ids attached by earlier lookups, keyed by provider name
    pub provider_ids: ProviderIds,
}

impl LookupInfo {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_provider_id(mut self, provider: &str, id: impl Into<String>) -> Self {
        self.provider_ids.insert(provider.to_string(), id.into());
        self
    }

    /// Resolves the global id, preferring a pre-attached one.
    pub fn global_id(&self) -> Option<GlobalId> {
        resolve_global_id(
            &self.provider_ids,
            self.path.as_deref(),
            self.name.as_deref(),
        )
    }
}

/// One search hit, possibly merged from several sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub name: String,
    pub image_url: Option<String>,
    pub overview: Option<String>,
    /// The source that produced the candidate
    pub source_name: String,
    /// Insertion order tie-breaker, unique within one result list
    pub index_number: u32,
    /// Global id, optionally followed by `|` and a disambiguator
    pub global_id: String,
    /// Source specific ids keyed by source name
    pub source_ids: ProviderIds,
}

impl SearchCandidate {
    /// Creates a candidate; the index number is assigned by [`CandidateList::push`].
    pub fn new(
        name: impl Into<String>,
        source_name: impl Into<String>,
        global_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image_url: None,
            overview: None,
            source_name: source_name.into(),
            index_number: 0,
            global_id: global_id.into(),
            source_ids: ProviderIds::new(),
        }
    }

    /// The global id without its disambiguator.
    pub fn global_id_prefix(&self) -> &str {
        global_id_prefix(&self.global_id)
    }

    /// Returns the id a source attached to this candidate, if any.
    pub fn source_id(&self, source_name: &str) -> Option<&str> {
        self.source_ids
            .get(source_name)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn set_source_id(&mut self, source_name: &str, id: impl Into<String>) {
        self.source_ids.insert(source_name.to_string(), id.into());
    }

    /// All ids of this candidate including the global one, as the host stores them.
    pub fn provider_ids(&self) -> ProviderIds {
        let mut ids = self.source_ids.clone();
        ids.insert(GLOBAL_ID_KEY.to_string(), self.global_id.clone());
        ids
    }
}

/// The accumulating list of search candidates.
///
/// Index numbers are assigned on insertion and grow monotonically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateList {
    candidates: Vec<SearchCandidate>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a candidate, assigning the next index number.
    pub fn push(&mut self, mut candidate: SearchCandidate) -> u32 {
        let next = self
            .candidates
            .iter()
            .map(|c| c.index_number)
            .max()
            .map_or(1, |max| max + 1);
        candidate.index_number = next;
        self.candidates.push(candidate);
        next
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchCandidate> {
        self.candidates.iter()
    }

    /// Mutable access for attaching ids; entries cannot be removed.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SearchCandidate> {
        self.candidates.iter_mut()
    }

    pub fn as_slice(&self) -> &[SearchCandidate] {
        &self.candidates
    }

    pub fn into_vec(self) -> Vec<SearchCandidate> {
        self.candidates
    }
}

/// Outcome of picking one candidate from a source's own search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<'a> {
    /// Nothing found
    Empty,
    /// Exactly one candidate, or the first one when first-only is on
    Single(&'a SearchCandidate),
    /// Several candidates and first-only is off
    Ambiguous(usize),
}

/// Applies the first-only policy to a source's own search results.
pub fn select_candidate(candidates: &[SearchCandidate], first_only: bool) -> Selection<'_> {
    match candidates {
        [] => Selection::Empty,
        [single] => Selection::Single(single),
        [first, ..] if first_only => Selection::Single(first),
        many => Selection::Ambiguous(many.len()),
    }
}

/// Image kinds a source can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Primary,
    Box,
    BoxRear,
    Backdrop,
    Thumb,
    Screenshot,
}

impl ImageKind {
    pub const ALL: [ImageKind; 6] = [
        ImageKind::Primary,
        ImageKind::Box,
        ImageKind::BoxRear,
        ImageKind::Backdrop,
        ImageKind::Thumb,
        ImageKind::Screenshot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Primary => "primary",
            ImageKind::Box => "box",
            ImageKind::BoxRear => "boxrear",
            ImageKind::Backdrop => "backdrop",
            ImageKind::Thumb => "thumb",
            ImageKind::Screenshot => "screenshot",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        ImageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| format!("unknown image kind: {s}"))
    }
}

/// The item images are requested for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub provider_ids: ProviderIds,
    /// Kinds the item already has an image for
    pub existing_image_kinds: BTreeSet<ImageKind>,
}

impl ImageItem {
    pub fn provider_id(&self, source_name: &str) -> Option<&str> {
        self.provider_ids
            .get(source_name)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn has_image(&self, kind: ImageKind) -> bool {
        self.existing_image_kinds.contains(&kind)
    }

    pub fn global_id(&self) -> Option<GlobalId> {
        self.provider_ids
            .get(GLOBAL_ID_KEY)
            .and_then(|id| GlobalId::trusted(id.as_str()))
    }
}

/// A remote image proposed by a source. Only the URL is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub kind: ImageKind,
    pub source_name: String,
}

/// Everything a source may consult during one call.
///
/// Built by the aggregators from the configuration snapshot of the current
/// call; sources never read global state.
#[derive(Debug, Clone)]
pub struct SourceContext {
    config: Arc<PluginConfig>,
    settings: SourceSettings,
    cancel: CancellationToken,
}

impl SourceContext {
    pub fn new(
        config: Arc<PluginConfig>,
        settings: SourceSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            settings,
            cancel,
        }
    }

    /// Whether later sources may replace filled scalar fields
    pub fn overwrite(&self) -> bool {
        self.config.overwrite
    }

    /// Whether ambiguous own-search results resolve to the first candidate
    pub fn first_only(&self) -> bool {
        self.config.first_only
    }

    /// Whether a source's search should stop after its first hit.
    ///
    /// Only manual lookups are cut short; automated scans keep every hit so
    /// the host sees the ambiguity.
    pub fn stop_after_first_hit(&self, query: &LookupInfo) -> bool {
        self.first_only() && !query.is_automated
    }

    /// A named switch from this source's settings
    pub fn option(&self, key: &str) -> bool {
        self.settings.option(key)
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`SourceError::Cancelled`] once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), SourceError> {
        if self.cancel.is_cancelled() {
            Err(SourceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A pluggable catalog of release metadata.
///
/// Implementations must be non-destructive: append to the candidate list
/// rather than remove, and go through [`MetadataRecord::apply`] so filled
/// fields are respected. Returning `Err` (or panicking) makes the aggregator
/// roll back whatever the call changed and continue with the next source.
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique name, also the key of this source's ids and settings
    fn name(&self) -> &'static str;

    /// Priority used when the configuration does not set one
    fn default_priority(&self) -> i32;

    /// Image kinds this source can provide; static, no I/O
    fn handled_image_kinds(&self) -> &'static [ImageKind];

    /// Appends this source's candidates for `query` to `candidates`.
    ///
    /// May attach this source's id to existing candidates it recognizes.
    async fn search(
        &self,
        candidates: &mut CandidateList,
        query: &LookupInfo,
        ctx: &SourceContext,
    ) -> Result<(), SourceError>;

    /// Fills what it can into `record`; returns true if it contributed.
    ///
    /// "Nothing found" and ambiguous results are `Ok(false)`, not errors.
    async fn fill_metadata(
        &self,
        record: &mut MetadataRecord,
        info: &LookupInfo,
        ctx: &SourceContext,
    ) -> Result<bool, SourceError>;

    /// Returns image candidates of one kind; empty when unsupported or unavailable.
    async fn images(
        &self,
        item: &ImageItem,
        kind: ImageKind,
        ctx: &SourceContext,
    ) -> Result<Vec<ImageCandidate>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str) -> SearchCandidate {
        SearchCandidate::new(name, "Test", "REBD-789")
    }

    #[test]
    fn test_push_assigns_increasing_index_numbers() {
        let mut list = CandidateList::new();
        assert_eq!(list.push(candidate("a")), 1);
        assert_eq!(list.push(candidate("b")), 2);
        let numbers: Vec<u32> = list.iter().map(|c| c.index_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_select_candidate() {
        let none: Vec<SearchCandidate> = Vec::new();
        assert_eq!(select_candidate(&none, true), Selection::Empty);

        let one = vec![candidate("a")];
        assert!(matches!(
            select_candidate(&one, false),
            Selection::Single(c) if c.name == "a"
        ));

        let two = vec![candidate("a"), candidate("b")];
        assert_eq!(select_candidate(&two, false), Selection::Ambiguous(2));
        assert!(matches!(
            select_candidate(&two, true),
            Selection::Single(c) if c.name == "a"
        ));
    }

    #[test]
    fn test_image_kind_parsing() {
        assert_eq!("Primary".parse::<ImageKind>().unwrap(), ImageKind::Primary);
        assert_eq!("screenshot".parse::<ImageKind>().unwrap(), ImageKind::Screenshot);
        assert!("poster".parse::<ImageKind>().is_err());
    }

    #[test]
    fn test_candidate_provider_ids_include_global_id() {
        let mut c = SearchCandidate::new("a", "Test", "REBD-789|x1");
        c.set_source_id("Test", "x1");
        let ids = c.provider_ids();
        assert_eq!(ids.get(GLOBAL_ID_KEY).map(String::as_str), Some("REBD-789|x1"));
        assert_eq!(c.global_id_prefix(), "REBD-789");
    }

    #[test]
    fn test_lookup_prefers_attached_id() {
        let info = LookupInfo::from_path("/media/[REBD-789].mkv")
            .with_provider_id(GLOBAL_ID_KEY, "ABC-123");
        assert_eq!(info.global_id().unwrap().as_str(), "ABC-123");
    }

    #[test]
    fn test_stop_after_first_hit_only_for_manual_first_only_lookups() {
        let context = |first_only| {
            let config = PluginConfig {
                first_only,
                ..PluginConfig::default()
            };
            SourceContext::new(
                Arc::new(config),
                SourceSettings::default(),
                CancellationToken::new(),
            )
        };
        let manual = LookupInfo::from_name("REBD-789");
        let automated = LookupInfo {
            is_automated: true,
            ..manual.clone()
        };

        assert!(context(true).stop_after_first_hit(&manual));
        assert!(!context(true).stop_after_first_hit(&automated));
        assert!(!context(false).stop_after_first_hit(&manual));
        assert!(!context(false).stop_after_first_hit(&automated));
    }

    #[test]
    fn test_image_item_fields() {
        let mut item = ImageItem::default();
        item.provider_ids.insert(GLOBAL_ID_KEY.to_string(), "REBD-789".to_string());
        item.existing_image_kinds.insert(ImageKind::Primary);

        let value = serde_json::to_value(&item).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["existing_image_kinds", "provider_ids"]);
        assert_eq!(value["existing_image_kinds"], serde_json::json!(["primary"]));
    }
}
