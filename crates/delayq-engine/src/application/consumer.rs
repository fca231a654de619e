//! The claim → process → commit/rollback consumption protocol.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use delayq_core::query::{IndexQuery, IntegrityFailurePolicy};
use delayq_core::queue_type::QueueType;
use delayq_core::signal::SignalGate;
use futures_util::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::application::engine::QueueEngine;
use crate::domain::handler::{
    ClaimedEvent, ConsumeError, ConsumeReport, EventHandler, HandlerContext, HandlerError,
};

/// Consumes up to `limit` past-due events from `queue_type`.
///
/// Each due event is claimed by deleting it (committed immediately); events
/// another consumer claimed first are skipped. A claimed event is handled
/// inside a critical section on `gate`, so a shutdown request is honored
/// between events, never in the middle of one.
///
/// If the handler fails, its rollback runs with the same context, the event
/// is stored again under a new identifier, and the handler's error is
/// returned without touching the remaining events. A panic in the handler or
/// the rollback is caught and treated as an error. Index rows whose payload
/// is missing are deleted during selection and never reach the handler.
///
/// Commits the engine's index session; any transaction in progress on it
/// should be finished before calling this.
///
/// # Errors
///
/// Returns `ConsumeError::Handler` after a handler failure was rolled back
/// and requeued, `ConsumeError::Rollback` or `ConsumeError::Requeue` when the
/// recovery itself failed (the event is lost), and `ConsumeError::Queue` for
/// store failures.
#[instrument(skip(engine, handler, gate))]
pub async fn consume_events(
    engine: &QueueEngine,
    queue_type: QueueType,
    limit: u32,
    handler: &dyn EventHandler,
    gate: &SignalGate,
) -> Result<ConsumeReport, ConsumeError> {
    let query = IndexQuery::new(queue_type, limit).before(engine.now());
    let due = engine
        .index_events(&query, IntegrityFailurePolicy::DeleteAndCommit)
        .await?;

    let mut report = ConsumeReport {
        selected: due.len(),
        ..ConsumeReport::default()
    };

    for event in due {
        // Selection already removed rows without a payload.
        let Some(payload) = event.payload else {
            continue;
        };

        if !engine.delete_event(event.event_id, true).await? {
            debug!(event_id = %event.event_id, "event already claimed by another consumer");
            report.skipped += 1;
            continue;
        }

        let _section = gate.defer();
        let claimed = ClaimedEvent {
            event_id: event.event_id,
            queue_type,
            event_at: event.event_at,
            payload,
        };
        let mut context = HandlerContext::new();

        let outcome = AssertUnwindSafe(handler.handle(&claimed, &mut context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error("handler", panic.as_ref())));
        if let Err(handler_error) = outcome {
            warn!(
                event_id = %claimed.event_id,
                error = %handler_error,
                "an unexpected error occurred processing event"
            );
            return Err(recover(engine, &claimed, handler, context, handler_error).await);
        }

        report.processed += 1;
    }

    Ok(report)
}

async fn recover(
    engine: &QueueEngine,
    claimed: &ClaimedEvent,
    handler: &dyn EventHandler,
    mut context: HandlerContext,
    handler_error: HandlerError,
) -> ConsumeError {
    let rolled_back = AssertUnwindSafe(handler.rollback(claimed, &mut context))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_error("rollback", panic.as_ref())));
    if let Err(source) = rolled_back {
        error!(
            event_id = %claimed.event_id,
            error = %source,
            "rollback failed; event is lost"
        );
        return ConsumeError::Rollback {
            event_id: claimed.event_id,
            handler_error,
            source,
        };
    }

    match engine
        .store_event(claimed.queue_type, claimed.event_at, &claimed.payload, true)
        .await
    {
        Ok(requeued_as) => {
            info!(
                event_id = %claimed.event_id,
                %requeued_as,
                "requeued event after rollback"
            );
            ConsumeError::Handler {
                event_id: claimed.event_id,
                requeued_as,
                source: handler_error,
            }
        }
        Err(source) => {
            error!(
                event_id = %claimed.event_id,
                error = %source,
                "requeue failed; event is lost"
            );
            ConsumeError::Requeue {
                event_id: claimed.event_id,
                handler_error,
                source,
            }
        }
    }
}

/// Turns a caught panic into an ordinary handler error.
fn panic_error(stage: &str, panic: &(dyn Any + Send)) -> HandlerError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    format!("{stage} panicked: {message}").into()
}
