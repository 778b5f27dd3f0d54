//! Global id resolution
//!
//! This module derives the canonical, source-independent release identifier
//! (e.g. `REBD-789`) from a file path or a free-text name. Resolution is a
//! pure function: no I/O, no configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

/// Provider id key under which the global id is stored on items and candidates.
pub const GLOBAL_ID_KEY: &str = "IvInfo";

/// Separator between the global id and a source-specific disambiguator.
pub const DISAMBIGUATOR_SEPARATOR: char = '|';

/// 2-5 word characters, a hyphen, up to two extra word characters,
/// 3-6 digits and an optional trailing letter.
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w{2,5}-\w{0,2}\d{3,6}\w?)").expect("global id pattern is valid")
});

/// A release identifier shared by every source.
///
/// Comparison and hashing ignore ASCII case, so `rebd-789` and `REBD-789`
/// name the same release. The original spelling is preserved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(String);

impl GlobalId {
    /// Wraps an already trusted identifier without re-deriving it.
    ///
    /// Returns `None` for blank input.
    pub fn trusted(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The identifier as written, including any `|` disambiguator.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier without its `|` disambiguator.
    pub fn prefix(&self) -> &str {
        global_id_prefix(&self.0)
    }

    /// Returns a copy with the disambiguator removed.
    pub fn without_disambiguator(&self) -> Self {
        Self(self.prefix().to_string())
    }
}

impl PartialEq for GlobalId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for GlobalId {}

impl Hash for GlobalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the part of a raw global id before the `|` disambiguator.
pub fn global_id_prefix(raw: &str) -> &str {
    raw.split(DISAMBIGUATOR_SEPARATOR).next().unwrap_or_default()
}

/// Extracts the first global id shaped substring from `text`.
///
/// Trailing modifiers after the id (resolution tags, part markers) are
/// not part of the capture and are ignored.
pub fn parse_global_id(text: &str) -> Option<GlobalId> {
    ID_PATTERN
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| GlobalId(m.as_str().to_string()))
}

/// Resolves the global id for a lookup.
///
/// A pre-attached id under [`GLOBAL_ID_KEY`] is returned unchanged. Otherwise
/// the id is parsed from `path`, or from `name` when `path` is absent or
/// empty. A non-empty path without a match yields `None` without consulting
/// the name.
///
/// # Examples
///
/// ```
/// use iv_info::identifier::resolve_global_id;
/// use std::collections::BTreeMap;
///
/// let id = resolve_global_id(&BTreeMap::new(), Some("/media/[REBD-789].mkv"), None);
/// assert_eq!(id.unwrap().as_str(), "REBD-789");
/// ```
pub fn resolve_global_id(
    provider_ids: &BTreeMap<String, String>,
    path: Option<&str>,
    name: Option<&str>,
) -> Option<GlobalId> {
    if let Some(existing) = provider_ids
        .get(GLOBAL_ID_KEY)
        .and_then(|id| GlobalId::trusted(id.as_str()))
    {
        return Some(existing);
    }

    match path.filter(|p| !p.is_empty()) {
        Some(path) => parse_global_id(path),
        None => name.filter(|n| !n.is_empty()).and_then(parse_global_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_ids() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn test_resolve_from_path() {
        let id = resolve_global_id(&no_ids(), Some("/media/[REBD-789].mkv"), None);
        assert_eq!(id.unwrap().as_str(), "REBD-789");

        let id = resolve_global_id(&no_ids(), Some("/media/iv/[REBD-789].mkv"), Some("ignored"));
        assert_eq!(id.unwrap().as_str(), "REBD-789");
    }

    #[test]
    fn test_resolve_from_name_when_path_missing() {
        let id = resolve_global_id(&no_ids(), None, Some("REBD-789 some title"));
        assert_eq!(id.unwrap().as_str(), "REBD-789");

        let id = resolve_global_id(&no_ids(), Some(""), Some("REBD-789 some title"));
        assert_eq!(id.unwrap().as_str(), "REBD-789");
    }

    #[test]
    fn test_unmatched_path_does_not_fall_back_to_name() {
        let id = resolve_global_id(&no_ids(), Some("/media/holiday.mkv"), Some("REBD-789"));
        assert!(id.is_none());
    }

    #[test]
    fn test_no_match_is_none() {
        assert!(resolve_global_id(&no_ids(), None, None).is_none());
        assert!(resolve_global_id(&no_ids(), None, Some("plain title")).is_none());
    }

    #[test]
    fn test_trusted_id_wins() {
        let mut ids = no_ids();
        ids.insert(GLOBAL_ID_KEY.to_string(), "ABC-123|h_1abc00123".to_string());
        let id = resolve_global_id(&ids, Some("/media/[REBD-789].mkv"), None).unwrap();
        assert_eq!(id.as_str(), "ABC-123|h_1abc00123");
        assert_eq!(id.prefix(), "ABC-123");
    }

    #[test]
    fn test_blank_trusted_id_is_ignored() {
        let mut ids = no_ids();
        ids.insert(GLOBAL_ID_KEY.to_string(), "  ".to_string());
        let id = resolve_global_id(&ids, Some("/media/[REBD-789].mkv"), None);
        assert_eq!(id.unwrap().as_str(), "REBD-789");
    }

    #[test]
    fn test_trailing_modifiers_are_discarded() {
        assert_eq!(parse_global_id("SSIS-001-1080p.mp4").unwrap().as_str(), "SSIS-001");
        assert_eq!(parse_global_id("[MIDE-12345A] part1").unwrap().as_str(), "MIDE-12345A");
        assert_eq!(parse_global_id("IPX-AB123").unwrap().as_str(), "IPX-AB123");
    }

    #[test]
    fn test_case_insensitive_equality() {
        let lower = GlobalId::trusted("rebd-789").unwrap();
        let upper = GlobalId::trusted("REBD-789").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "rebd-789");
    }

    #[test]
    fn test_without_disambiguator() {
        let id = GlobalId::trusted("REBD-789|h_346rebd00789").unwrap();
        assert_eq!(id.without_disambiguator().as_str(), "REBD-789");
        assert_eq!(global_id_prefix("NOPIPE-123"), "NOPIPE-123");
    }
}
