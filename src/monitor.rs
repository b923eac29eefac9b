//! Session monitor — isolates asynchronous gateway errors
//!
//! Each active session gets one task draining its gateway event stream.
//! An `Error` notification arriving with no pending caller terminates that
//! session only: the error is logged and recorded on the record, the session
//! is evicted, `SessionEvent::Failed` is broadcast, and the client released.

use crate::error::SessionError;
use crate::gateway::{GatewayEvent, GatewayEvents};
use crate::registry::SessionRegistry;
use crate::session::{release, SessionRecord};
use crate::types::SessionEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Shared handles a monitor needs
#[derive(Clone)]
pub(crate) struct MonitorContext {
    pub registry: Arc<SessionRegistry>,
    pub notifier: broadcast::Sender<SessionEvent>,
    pub evict_on_error: bool,
    pub disconnect_timeout: Option<Duration>,
}

/// Spawn the monitor task for an active session
pub(crate) fn spawn(
    record: Arc<SessionRecord>,
    mut events: Box<dyn GatewayEvents>,
    ctx: MonitorContext,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = record.stopped() => break,
                event = events.next() => event,
            };

            match event {
                Some(GatewayEvent::Ready) => {
                    tracing::debug!(session = %record.identifier(), "Gateway ready again");
                }
                Some(GatewayEvent::Error(reason)) => {
                    if handle_error(&record, reason, &ctx).await {
                        break;
                    }
                }
                None => {
                    handle_error(&record, "gateway event stream closed".to_string(), &ctx).await;
                    break;
                }
            }
        }
        tracing::debug!(session = %record.identifier(), "Session monitor stopped");
    })
}

/// Returns true when the monitor should exit
///
/// A session already terminated by teardown is left alone: no error is
/// recorded and no `Failed` event follows its `Ended`.
async fn handle_error(record: &Arc<SessionRecord>, reason: String, ctx: &MonitorContext) -> bool {
    if !record.is_active() {
        tracing::debug!(session = %record.identifier(), reason = %reason, "Ignoring error from ended session");
        return true;
    }

    if !ctx.evict_on_error {
        log_error(record, &reason);
        record.record_error(reason.clone());
        notify_failed(record, reason, ctx);
        return false;
    }

    if !record.terminate(Some(reason.clone())) {
        tracing::debug!(session = %record.identifier(), reason = %reason, "Ignoring error from ended session");
        return true;
    }
    log_error(record, &reason);

    let evicted = ctx.registry.remove_if_same(record).await;
    tracing::info!(session = %record.identifier(), evicted, "Session terminated after gateway error");
    notify_failed(record, reason, ctx);

    release(record.client(), record.identifier(), ctx.disconnect_timeout).await;
    true
}

fn log_error(record: &SessionRecord, reason: &str) {
    let error = SessionError::UnhandledSessionError {
        session: record.identifier().to_string(),
        reason: reason.to_string(),
    };
    tracing::error!(session = %record.identifier(), error = %error, "Error from gateway client");
}

fn notify_failed(record: &SessionRecord, reason: String, ctx: &MonitorContext) {
    let _ = ctx.notifier.send(SessionEvent::Failed {
        identifier: record.identifier().to_string(),
        error: reason,
    });
}
