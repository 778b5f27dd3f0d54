//! Search aggregation
//!
//! Threads one candidate list through every enabled source in priority order,
//! then collapses candidates that describe the same release.

use crate::Cancelled;
use crate::config::PluginConfig;
use crate::fold::{Step, guarded};
use crate::registry::ActiveSource;
use crate::sources::{CandidateList, LookupInfo, SearchCandidate, SourceContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Names more similar than this many tenths (normalized Levenshtein) may be merged.
pub const MERGE_SIMILARITY_TENTHS: usize = 3;

/// Searches all `sources` for the release described by `query`.
///
/// Returns an empty list when no global id can be resolved. On cancellation
/// the candidates gathered so far are returned inside the error, unmerged.
pub async fn search(
    sources: &[ActiveSource],
    config: Arc<PluginConfig>,
    query: &LookupInfo,
    cancel: &CancellationToken,
) -> Result<Vec<SearchCandidate>, Cancelled<Vec<SearchCandidate>>> {
    let Some(global_id) = query.global_id() else {
        debug!(name = ?query.name, path = ?query.path, "no global id, skipping search");
        return Ok(Vec::new());
    };
    debug!(global_id = %global_id, sources = sources.len(), "searching");

    let mut candidates = CandidateList::new();

    for (completed, active) in sources.iter().enumerate() {
        let name = active.descriptor.name.as_str();
        let ctx = SourceContext::new(Arc::clone(&config), active.settings.clone(), cancel.clone());
        let checkpoint = candidates.clone();

        let step = guarded(
            name,
            cancel,
            active.source.search(&mut candidates, query, &ctx),
        )
        .await;
        match step {
            Step::Done(()) => {}
            Step::Failed => candidates = checkpoint,
            Step::Cancelled => {
                info!(source = name, "search cancelled");
                return Err(Cancelled {
                    completed,
                    partial: checkpoint.into_vec(),
                });
            }
        }
    }

    debug!(count = candidates.len(), "found results");
    let merged = merge_results(candidates.into_vec());
    debug!(count = merged.len(), "results after merging");

    Ok(merged)
}

/// True if two candidates describe the same release.
fn same_release(first: &SearchCandidate, second: &SearchCandidate) -> bool {
    first
        .global_id_prefix()
        .eq_ignore_ascii_case(second.global_id_prefix())
        && similar_names(&first.name, &second.name)
}

/// Normalized Levenshtein similarity above [`MERGE_SIMILARITY_TENTHS`].
///
/// Compared in integers so a similarity of exactly 0.3 does not merge.
fn similar_names(first: &str, second: &str) -> bool {
    let longest = first.chars().count().max(second.chars().count());
    if longest == 0 {
        return true;
    }
    let shared = longest - strsim::levenshtein(first, second);
    10 * shared > MERGE_SIMILARITY_TENTHS * longest
}

/// Copies what `second` knows and `first` lacks into `first`.
fn absorb(first: &mut SearchCandidate, second: SearchCandidate) {
    for (source, id) in second.source_ids {
        if first.source_id(&source).is_none() {
            first.source_ids.insert(source, id);
        }
    }

    if first.overview.as_deref().is_none_or(str::is_empty)
        && second.overview.as_deref().is_some_and(|o| !o.is_empty())
    {
        first.overview = second.overview;
    }

    if first.image_url.as_deref().is_none_or(str::is_empty)
        && second.image_url.as_deref().is_some_and(|u| !u.is_empty())
    {
        first.image_url = second.image_url;
    }
}

/// Collapses candidates describing the same release.
///
/// A two-pointer sweep: `current` is compared with every later entry, and a
/// match is absorbed into `current` and removed. When the match removed the
/// last entry the sweep ends, so the result depends on input order.
pub fn merge_results(mut list: Vec<SearchCandidate>) -> Vec<SearchCandidate> {
    if list.len() <= 1 {
        return list;
    }

    let mut current = 0;
    let mut next = 1;

    while current < list.len() && next < list.len() {
        if same_release(&list[current], &list[next]) {
            let second = list.remove(next);
            absorb(&mut list[current], second);
            if list.len() <= 1 {
                break;
            }
        } else if next + 1 == list.len() {
            current += 1;
            next = current + 1;
        } else {
            next += 1;
        }
    }

    list
}
