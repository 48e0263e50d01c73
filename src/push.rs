//! Background processing of pushed updates.
//!
//! The webhook handler must answer the remote inbox immediately, so it only
//! hands the update to a [`PushHandle`]. A single worker task drains the
//! queue in arrival order and feeds each update through
//! [`SyncEngine::handle_push`]. Failures are logged and never reach the
//! sender.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::RawInboxMessage;
use crate::sync::{PushOutcome, SyncEngine};

/// Sending side of the push queue. Cheap to clone.
#[derive(Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<RawInboxMessage>,
}

impl PushHandle {
    /// Queue an update. Never blocks; returns `false` once the worker is gone.
    pub fn submit(&self, msg: RawInboxMessage) -> bool {
        let update_id = msg.update_id;
        match self.tx.send(msg) {
            Ok(()) => {
                debug!(update_id, "push update queued");
                true
            }
            Err(_) => {
                warn!(update_id, "push worker stopped; update dropped");
                false
            }
        }
    }
}

/// Spawn the worker. It exits when every [`PushHandle`] has been dropped and
/// the queue is drained.
pub fn spawn_worker(engine: Arc<SyncEngine>) -> (PushHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RawInboxMessage>();

    let task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let update_id = msg.update_id;
            let chat_id = msg.chat.as_ref().map(|c| c.id);
            match engine.handle_push(msg).await {
                Ok(PushOutcome::Imported(added)) => {
                    info!(update_id, entry_id = %added.id, title = %added.title, "pushed media imported");
                }
                Ok(PushOutcome::Skipped(reason)) => {
                    debug!(update_id, %reason, "pushed update skipped");
                }
                Err(e) => {
                    warn!(update_id, ?chat_id, error = %e, "pushed update not imported");
                }
            }
        }
        debug!("push worker finished");
    });

    (PushHandle { tx }, task)
}
