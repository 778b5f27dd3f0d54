//! Per-source guard for the sequential folds
//!
//! Every source call made by the aggregators goes through [`guarded`]. The
//! guard turns errors and panics into [`Step::Failed`] so one broken source
//! cannot abort the fold, and races the call against the cancellation token
//! so a cancelled aggregation stops after the in-flight call unwinds.

use crate::sources::SourceError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Result of one guarded source call
#[derive(Debug)]
pub(crate) enum Step<T> {
    /// The source finished normally
    Done(T),
    /// The source failed or panicked; its effects must be discarded
    Failed,
    /// Cancellation was requested before or during the call
    Cancelled,
}

/// Runs one source call with failure isolation.
pub(crate) async fn guarded<T, F>(source: &str, cancel: &CancellationToken, call: F) -> Step<T>
where
    F: Future<Output = Result<T, SourceError>>,
{
    if cancel.is_cancelled() {
        return Step::Cancelled;
    }

    debug!(source, "invoking source");

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Step::Cancelled,
        outcome = AssertUnwindSafe(call).catch_unwind() => outcome,
    };

    match outcome {
        Ok(Ok(value)) => Step::Done(value),
        Ok(Err(SourceError::Cancelled)) => Step::Cancelled,
        Ok(Err(e)) => {
            warn!(source, error = %e, "source failed, skipping its contribution");
            Step::Failed
        }
        Err(panic) => {
            error!(
                source,
                panic = panic_message(panic.as_ref()),
                "source panicked, skipping its contribution"
            );
            Step::Failed
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        let cancel = CancellationToken::new();
        let step = guarded("ok", &cancel, async { Ok::<_, SourceError>(7) }).await;
        assert!(matches!(step, Step::Done(7)));
    }

    #[tokio::test]
    async fn test_error_becomes_failed() {
        let cancel = CancellationToken::new();
        let step = guarded("broken", &cancel, async {
            Err::<(), _>(SourceError::InvalidData("bad page".to_string()))
        })
        .await;
        assert!(matches!(step, Step::Failed));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed() {
        let cancel = CancellationToken::new();
        let step = guarded("panicky", &cancel, async {
            if true {
                panic!("boom");
            }
            Ok::<(), SourceError>(())
        })
        .await;
        assert!(matches!(step, Step::Failed));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let step = guarded("never", &cancel, async {
            if true {
                panic!("must not run");
            }
            Ok::<(), SourceError>(())
        })
        .await;
        assert!(matches!(step, Step::Cancelled));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_pending_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let step = guarded("slow", &cancel, async {
            std::future::pending::<()>().await;
            Ok::<(), SourceError>(())
        })
        .await;
        assert!(matches!(step, Step::Cancelled));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
