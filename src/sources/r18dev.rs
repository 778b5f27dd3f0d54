/// r18.dev catalog source implementation.
use super::r18dev_types::{R18DevLookup, R18DevMovie, R18DevPerson};
use super::{
    CachedDocuments, CandidateList, ImageCandidate, ImageItem, ImageKind, LookupInfo,
    SearchCandidate, Selection, Source, SourceContext, SourceError, select_candidate,
};
use crate::config::PluginConfig;
use crate::record::{Contribution, MetadataRecord, Person, PersonKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://r18.dev";
const ACTRESS_IMAGE_BASE_URL: &str = "https://pics.dmm.co.jp/mono/actjpgs";
const RATING: &str = "R";

/// Metadata source for the r18.dev JSON API.
///
/// Releases are looked up by global id (`dvd_id`) to learn the catalog's
/// content id, which is then used for the detail document. Detail documents
/// are cached on disk.
///
/// Options: `english_titles`, `english_cast`, `english_tags`, `trailers`.
pub struct R18DevSource {
    client: reqwest::Client,
    base_url: String,
    documents: CachedDocuments<R18DevMovie>,
}

impl R18DevSource {
    pub const NAME: &'static str = "R18Dev";

    /// Creates a source using the HTTP and cache settings of `config`.
    pub fn new(config: &PluginConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.as_str())
            .build()
            .map_err(|e| SourceError::RequestError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            documents: CachedDocuments::open("r18dev", &config.cache),
        })
    }

    /// Points the source at another server, e.g. a mirror or a test double.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds a detail endpoint URL; `key` is encoded as one path segment.
    fn detail_url(&self, key: &str, value: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::RequestError(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| SourceError::RequestError("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["videos", "vod", "movies", "detail", "-"])
            .push(&format!("{key}={value}"))
            .push("json");
        Ok(url)
    }

    /// Fetches a JSON document; a 404 means "not in the catalog".
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        ctx: &SourceContext,
    ) -> Result<Option<T>, SourceError> {
        ctx.check_cancelled()?;
        debug!(source = Self::NAME, url = %url, "requesting");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::RequestError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| SourceError::ParseError(e.to_string()))
    }

    /// Resolves a global id to the catalog's content id.
    async fn lookup_content_id(
        &self,
        global_id: &str,
        ctx: &SourceContext,
    ) -> Result<Option<String>, SourceError> {
        let url = self.detail_url("dvd_id", global_id)?;
        let lookup: Option<R18DevLookup> = self.get_json(url, ctx).await?;
        Ok(lookup
            .and_then(|l| l.content_id)
            .filter(|id| !id.is_empty()))
    }

    /// Loads the detail document for a content id, from cache when possible.
    async fn fetch_movie(
        &self,
        content_id: &str,
        ctx: &SourceContext,
    ) -> Result<Option<R18DevMovie>, SourceError> {
        let url = self.detail_url("combined", content_id)?;
        self.documents
            .get_or_fetch(content_id, || self.get_json(url, ctx))
            .await
    }

    /// Looks up `global_id` and appends the release found, if any.
    async fn search_into(
        &self,
        candidates: &mut CandidateList,
        global_id: &str,
        ctx: &SourceContext,
    ) -> Result<(), SourceError> {
        let Some(content_id) = self.lookup_content_id(global_id, ctx).await? else {
            debug!(source = Self::NAME, global_id, "not in catalog");
            return Ok(());
        };
        let Some(movie) = self.fetch_movie(&content_id, ctx).await? else {
            return Ok(());
        };

        // Link the release to candidates other sources already found.
        for existing in candidates.iter_mut() {
            if existing.global_id_prefix().eq_ignore_ascii_case(global_id)
                && existing.source_id(Self::NAME).is_none()
            {
                existing.set_source_id(Self::NAME, content_id.as_str());
            }
        }

        candidates.push(Self::convert_to_candidate(global_id, &content_id, &movie));
        Ok(())
    }

    fn convert_to_candidate(
        global_id: &str,
        content_id: &str,
        movie: &R18DevMovie,
    ) -> SearchCandidate {
        let name = non_empty(movie.title_ja.as_deref())
            .or_else(|| non_empty(movie.title_en.as_deref()))
            .unwrap_or(global_id);

        let mut candidate = SearchCandidate::new(
            name,
            Self::NAME,
            format!("{global_id}|{content_id}"),
        );
        candidate.image_url = movie.jacket_thumb_url.clone();
        candidate.overview = Some(format!("{global_id} / {content_id}"));
        candidate.set_source_id(Self::NAME, content_id);
        candidate
    }

    /// Converts a detail document into field proposals.
    fn convert_to_contribution(
        movie: &R18DevMovie,
        content_id: &str,
        ctx: &SourceContext,
    ) -> Contribution {
        let english_tags = ctx.option("english_tags");
        let english_cast = ctx.option("english_cast");

        let genres = movie
            .categories
            .iter()
            .filter_map(|c| {
                if english_tags {
                    c.name_en.clone()
                } else {
                    c.name_ja.clone()
                }
            })
            .collect();

        let person = |p: &R18DevPerson, kind: PersonKind| {
            let name = non_empty(p.name_kanji.as_deref())
                .or_else(|| non_empty(p.name_romaji.as_deref()))?;
            Some(Person {
                name: name.to_string(),
                role: english_cast.then(|| p.name_romaji.clone()).flatten(),
                kind,
                image_url: non_empty(p.image_url.as_deref())
                    .map(|file| format!("{ACTRESS_IMAGE_BASE_URL}/{file}")),
            })
        };
        let people = movie
            .actresses
            .iter()
            .filter_map(|p| person(p, PersonKind::Actor))
            .chain(
                movie
                    .directors
                    .iter()
                    .filter_map(|p| person(p, PersonKind::Director))
                    .map(|mut p| {
                        p.image_url = None;
                        p
                    }),
            )
            .collect();

        Contribution {
            name: movie.title_ja.clone(),
            original_title: ctx
                .option("english_titles")
                .then(|| movie.title_en.clone())
                .flatten(),
            overview: movie.comment_en.clone(),
            premiere_date: movie.release_date.as_deref().and_then(parse_release_date),
            production_year: None,
            official_rating: Some(RATING.to_string()),
            external_id: Some(content_id.to_string()),
            collection_name: movie.series_name_ja.clone(),
            studios: [&movie.maker_name_ja, &movie.label_name_ja]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            genres,
            people,
            trailer_urls: ctx
                .option("trailers")
                .then(|| movie.sample_url.clone())
                .flatten()
                .into_iter()
                .collect(),
        }
    }

    fn convert_to_images(movie: &R18DevMovie, kind: ImageKind) -> Vec<ImageCandidate> {
        let image = |url: &str, thumbnail: Option<&str>| ImageCandidate {
            url: url.to_string(),
            thumbnail_url: thumbnail.map(str::to_string),
            kind,
            source_name: Self::NAME.to_string(),
        };

        match kind {
            ImageKind::Primary => non_empty(movie.jacket_thumb_url.as_deref())
                .map(|url| image(url, None))
                .into_iter()
                .collect(),
            ImageKind::Box => non_empty(movie.jacket_full_url.as_deref())
                .map(|url| image(url, None))
                .into_iter()
                .collect(),
            ImageKind::Screenshot => movie
                .gallery
                .iter()
                .filter_map(|entry| {
                    let thumb = non_empty(entry.image_thumb.as_deref());
                    let url = non_empty(entry.image_full.as_deref()).or(thumb)?;
                    Some(image(url, thumb))
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Source for R18DevSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn default_priority(&self) -> i32 {
        1
    }

    fn handled_image_kinds(&self) -> &'static [ImageKind] {
        &[ImageKind::Primary, ImageKind::Box, ImageKind::Screenshot]
    }

    async fn search(
        &self,
        candidates: &mut CandidateList,
        query: &LookupInfo,
        ctx: &SourceContext,
    ) -> Result<(), SourceError> {
        let Some(global_id) = query.global_id() else {
            return Ok(());
        };
        debug!(source = Self::NAME, global_id = %global_id, "searching");
        self.search_into(candidates, global_id.prefix(), ctx).await
    }

    async fn fill_metadata(
        &self,
        record: &mut MetadataRecord,
        _info: &LookupInfo,
        ctx: &SourceContext,
    ) -> Result<bool, SourceError> {
        let pinned = record.provider_id(Self::NAME).map(str::to_string);
        let content_id = match pinned {
            Some(id) => id,
            None => {
                let Some(global_id) = record.global_id.clone() else {
                    debug!(source = Self::NAME, "no id to look up");
                    return Ok(false);
                };

                let mut own = CandidateList::new();
                self.search_into(&mut own, global_id.prefix(), ctx).await?;

                match select_candidate(own.as_slice(), ctx.first_only()) {
                    Selection::Empty => return Ok(false),
                    Selection::Ambiguous(count) => {
                        debug!(
                            source = Self::NAME,
                            count, "multiple results and first-only disabled, skipping"
                        );
                        return Ok(false);
                    }
                    Selection::Single(candidate) => match candidate.source_id(Self::NAME) {
                        Some(id) => id.to_string(),
                        None => return Ok(false),
                    },
                }
            }
        };

        let Some(movie) = self.fetch_movie(&content_id, ctx).await? else {
            return Ok(false);
        };

        record.apply(
            Self::convert_to_contribution(&movie, &content_id, ctx),
            ctx.overwrite(),
        );
        record.set_provider_id(Self::NAME, content_id);

        debug!(source = Self::NAME, "metadata fetching finished");
        Ok(true)
    }

    async fn images(
        &self,
        item: &ImageItem,
        kind: ImageKind,
        ctx: &SourceContext,
    ) -> Result<Vec<ImageCandidate>, SourceError> {
        if !self.handled_image_kinds().contains(&kind) {
            return Ok(Vec::new());
        }
        let Some(content_id) = item.provider_id(Self::NAME) else {
            return Ok(Vec::new());
        };

        let Some(movie) = self.fetch_movie(content_id, ctx).await? else {
            return Ok(Vec::new());
        };

        Ok(Self::convert_to_images(&movie, kind))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parses `YYYY-MM-DD`, ignoring any trailing time part.
fn parse_release_date(text: &str) -> Option<NaiveDate> {
    let date = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
