//! Image resolution
//!
//! Asks every image-enabled source for each kind it handles, skipping kinds
//! the item already has. Results are not deduplicated: several sources may
//! legitimately offer several screenshots.

use crate::Cancelled;
use crate::config::PluginConfig;
use crate::fold::{Step, guarded};
use crate::registry::ActiveSource;
use crate::sources::{ImageCandidate, ImageItem, ImageKind, SourceContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collects image candidates for `item`.
///
/// `requested` limits the kinds queried; `None` queries every handled kind.
/// Results are ordered by source priority, then by the order each source
/// returned them.
pub async fn images(
    sources: &[ActiveSource],
    config: Arc<PluginConfig>,
    item: &ImageItem,
    requested: Option<&[ImageKind]>,
    cancel: &CancellationToken,
) -> Result<Vec<ImageCandidate>, Cancelled<Vec<ImageCandidate>>> {
    if item.global_id().is_none() {
        warn!("no global id found, skipping image lookup");
        return Ok(Vec::new());
    }

    let mut result = Vec::new();

    for (completed, active) in sources.iter().enumerate() {
        let name = active.descriptor.name.as_str();
        let ctx = SourceContext::new(Arc::clone(&config), active.settings.clone(), cancel.clone());

        let kinds = active
            .source
            .handled_image_kinds()
            .iter()
            .copied()
            .filter(|kind| requested.is_none_or(|r| r.contains(kind)));

        for kind in kinds {
            if item.has_image(kind) {
                debug!(source = name, %kind, "image already exists, not querying");
                continue;
            }

            match guarded(name, cancel, active.source.images(item, kind, &ctx)).await {
                Step::Done(found) => {
                    debug!(source = name, %kind, count = found.len(), "images found");
                    result.extend(found);
                }
                Step::Failed => {}
                Step::Cancelled => {
                    info!(source = name, "image lookup cancelled");
                    return Err(Cancelled {
                        completed,
                        partial: result,
                    });
                }
            }
        }
    }

    Ok(result)
}
