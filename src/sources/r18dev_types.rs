/// r18.dev API response types for deserialization.
///
/// These structures mirror the JSON documents served by the r18.dev
/// `dvd_id=` lookup and `combined=` detail endpoints. Every field is optional
/// because the catalog omits or nulls fields freely.
use serde::{Deserialize, Serialize};

/// Response of the `dvd_id=` lookup endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct R18DevLookup {
    /// The catalog's own id for the release
    pub content_id: Option<String>,
}

/// Response of the `combined=` detail endpoint.
///
/// Cached on disk, hence `Serialize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct R18DevMovie {
    pub content_id: Option<String>,
    pub dvd_id: Option<String>,
    pub title_ja: Option<String>,
    pub title_en: Option<String>,
    pub comment_en: Option<String>,
    /// Release date, `YYYY-MM-DD` optionally followed by a time
    pub release_date: Option<String>,
    pub maker_name_ja: Option<String>,
    pub label_name_ja: Option<String>,
    pub series_name_ja: Option<String>,
    pub jacket_thumb_url: Option<String>,
    pub jacket_full_url: Option<String>,
    pub sample_url: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub categories: Vec<R18DevCategory>,
    #[serde(deserialize_with = "null_as_empty")]
    pub actresses: Vec<R18DevPerson>,
    #[serde(deserialize_with = "null_as_empty")]
    pub directors: Vec<R18DevPerson>,
    #[serde(deserialize_with = "null_as_empty")]
    pub gallery: Vec<R18DevGalleryImage>,
}

/// A genre tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct R18DevCategory {
    pub name_ja: Option<String>,
    pub name_en: Option<String>,
}

/// An actress or director entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct R18DevPerson {
    pub name_kanji: Option<String>,
    pub name_romaji: Option<String>,
    /// File name below the actress portrait base URL
    pub image_url: Option<String>,
}

/// A sample image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct R18DevGalleryImage {
    pub image_full: Option<String>,
    pub image_thumb: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
