//! The accumulating metadata record
//!
//! A [`MetadataRecord`] is owned by the caller of the composer. Sources never
//! write fields directly; they describe what they found as a [`Contribution`]
//! and hand it to [`MetadataRecord::apply`], which enforces the merge policy:
//!
//! - scalar fields are filled only while empty, unless overwriting is enabled,
//! - collection fields (studios, genres, people, trailers) are always merged
//!   and deduplicated, whatever the overwrite setting.

use crate::identifier::{GLOBAL_ID_KEY, GlobalId};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider ids keyed by provider name.
pub type ProviderIds = BTreeMap<String, String>;

/// The role a person played in a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    Actor,
    Director,
}

/// A cast or crew member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Display name, also the deduplication key
    pub name: String,
    /// Optional role text (e.g. a romanized name)
    pub role: Option<String>,
    /// Actor or director
    pub kind: PersonKind,
    /// Portrait URL, if the source knows one
    pub image_url: Option<String>,
}

impl Person {
    /// Creates a person without role or image.
    pub fn new(name: impl Into<String>, kind: PersonKind) -> Self {
        Self {
            name: name.into(),
            role: None,
            kind,
            image_url: None,
        }
    }
}

/// Field values proposed by one source.
///
/// Every field is optional; empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contribution {
    pub name: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub premiere_date: Option<NaiveDate>,
    pub production_year: Option<i32>,
    pub official_rating: Option<String>,
    pub external_id: Option<String>,
    pub collection_name: Option<String>,
    pub studios: Vec<String>,
    pub genres: Vec<String>,
    pub people: Vec<Person>,
    pub trailer_urls: Vec<String>,
}

/// The canonical record assembled from all sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub name: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub premiere_date: Option<NaiveDate>,
    pub production_year: Option<i32>,
    pub official_rating: Option<String>,
    pub external_id: Option<String>,
    pub collection_name: Option<String>,
    pub studios: Vec<String>,
    pub genres: Vec<String>,
    pub people: Vec<Person>,
    pub trailer_urls: Vec<String>,
    /// Path of the item being described, passed through from the lookup
    pub path: Option<String>,
    /// The release id shared by all sources
    pub global_id: Option<GlobalId>,
    /// Source specific ids, including the global id under [`GLOBAL_ID_KEY`]
    pub provider_ids: ProviderIds,
}

impl MetadataRecord {
    /// Creates a record seeded with the global id and pass-through provider ids.
    pub fn seeded(global_id: GlobalId, path: Option<String>, provider_ids: ProviderIds) -> Self {
        let mut record = Self {
            path,
            provider_ids,
            ..Self::default()
        };
        record
            .provider_ids
            .insert(GLOBAL_ID_KEY.to_string(), global_id.as_str().to_string());
        record.global_id = Some(global_id);
        record
    }

    /// Returns the id a given source has pinned on this record, if any.
    pub fn provider_id(&self, source_name: &str) -> Option<&str> {
        self.provider_ids
            .get(source_name)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Pins a source specific id on the record.
    pub fn set_provider_id(&mut self, source_name: &str, id: impl Into<String>) {
        self.provider_ids.insert(source_name.to_string(), id.into());
    }

    /// Merges a source's contribution into the record.
    ///
    /// Returns true if any field changed.
    pub fn apply(&mut self, contribution: Contribution, overwrite: bool) -> bool {
        let Contribution {
            name,
            original_title,
            overview,
            premiere_date,
            production_year,
            official_rating,
            external_id,
            collection_name,
            studios,
            genres,
            people,
            trailer_urls,
        } = contribution;

        // A release date implies the production year unless one was given.
        let production_year = production_year.or_else(|| premiere_date.map(|d| d.year()));

        let mut changed = false;
        changed |= fill_text(&mut self.name, name, overwrite);
        changed |= fill_text(&mut self.original_title, original_title, overwrite);
        changed |= fill_text(&mut self.overview, overview, overwrite);
        changed |= fill(&mut self.premiere_date, premiere_date, overwrite);
        changed |= fill(&mut self.production_year, production_year, overwrite);
        changed |= fill_text(&mut self.official_rating, official_rating, overwrite);
        changed |= fill_text(&mut self.external_id, external_id, overwrite);
        changed |= fill_text(&mut self.collection_name, collection_name, overwrite);
        changed |= merge_strings(&mut self.studios, studios);
        changed |= merge_strings(&mut self.genres, genres);
        changed |= merge_strings(&mut self.trailer_urls, trailer_urls);
        changed |= merge_people(&mut self.people, people);
        changed
    }
}

fn fill<T: PartialEq>(slot: &mut Option<T>, value: Option<T>, overwrite: bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    if slot.is_some() && !overwrite {
        return false;
    }
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

fn fill_text(slot: &mut Option<String>, value: Option<String>, overwrite: bool) -> bool {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if slot.as_deref().is_some_and(|s| s.trim().is_empty()) {
        *slot = None;
    }
    fill(slot, value, overwrite)
}

fn merge_strings(target: &mut Vec<String>, values: Vec<String>) -> bool {
    let mut changed = false;
    for value in values {
        let value = value.trim();
        if value.is_empty() || target.iter().any(|existing| existing == value) {
            continue;
        }
        target.push(value.to_string());
        changed = true;
    }
    changed
}

fn merge_people(target: &mut Vec<Person>, people: Vec<Person>) -> bool {
    let mut changed = false;
    for person in people {
        if person.name.trim().is_empty() || target.iter().any(|p| p.name == person.name) {
            continue;
        }
        target.push(person);
        changed = true;
    }
    changed
}

/// The result of composing metadata for one lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    /// True if at least one source contributed
    pub has_metadata: bool,
    /// The composed record; empty when no global id could be resolved
    pub record: MetadataRecord,
}
