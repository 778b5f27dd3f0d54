//! Metadata composition
//!
//! Lets every enabled source, in priority order, fill the same record. The
//! merge policy itself lives in [`MetadataRecord::apply`]; this module only
//! runs the fold and keeps failing sources from leaving partial writes.

use crate::Cancelled;
use crate::config::PluginConfig;
use crate::fold::{Step, guarded};
use crate::record::{MetadataRecord, MetadataResult};
use crate::registry::ActiveSource;
use crate::sources::{LookupInfo, SourceContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Composes one record for `info` from all `sources`.
///
/// Without a resolvable global id the result is empty with
/// `has_metadata == false`. On cancellation the record as it was before the
/// interrupted source is returned inside the error.
pub async fn compose(
    sources: &[ActiveSource],
    config: Arc<PluginConfig>,
    info: &LookupInfo,
    cancel: &CancellationToken,
) -> Result<MetadataResult, Cancelled<MetadataResult>> {
    let Some(global_id) = info.global_id() else {
        error!(
            name = ?info.name,
            path = ?info.path,
            "global id could not be determined"
        );
        return Ok(MetadataResult::default());
    };
    let global_id = global_id.without_disambiguator();
    debug!(global_id = %global_id, sources = sources.len(), "composing metadata");

    let mut result = MetadataResult {
        has_metadata: false,
        record: MetadataRecord::seeded(global_id, info.path.clone(), info.provider_ids.clone()),
    };

    for (completed, active) in sources.iter().enumerate() {
        let name = active.descriptor.name.as_str();
        let ctx = SourceContext::new(Arc::clone(&config), active.settings.clone(), cancel.clone());
        let checkpoint = result.record.clone();

        let step = guarded(
            name,
            cancel,
            active.source.fill_metadata(&mut result.record, info, &ctx),
        )
        .await;
        match step {
            Step::Done(contributed) => {
                debug!(source = name, contributed, "source finished");
                result.has_metadata |= contributed;
            }
            Step::Failed => result.record = checkpoint,
            Step::Cancelled => {
                info!(source = name, "composition cancelled");
                result.record = checkpoint;
                return Err(Cancelled {
                    completed,
                    partial: result,
                });
            }
        }
    }

    Ok(result)
}
