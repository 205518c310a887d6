//! Lazy producer of unresolved dependency records.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{PackageLock, UnresolvedDependency};

/// Output of [`generate`]: a shared record source and the producing task.
///
/// The receiver may be cloned freely. Clones compete for records, so each
/// record reaches exactly one of them.
#[derive(Debug)]
pub struct DependencyStream {
    /// Competing-consumer source of records.
    pub receiver: async_channel::Receiver<UnresolvedDependency>,
    /// The producing task; finishes once the source is closed.
    pub task: JoinHandle<()>,
}

/// Start streaming one record per manifest entry.
///
/// Records are produced on their own task, one handoff at a time, so
/// production overlaps with consumption. The source closes after the last
/// entry, immediately for an empty manifest, or as soon as `cancel` fires.
pub fn generate(lock: Arc<PackageLock>, cancel: CancellationToken) -> DependencyStream {
    // async-channel does not support rendezvous channels; 1 is the closest.
    let (sender, receiver) = async_channel::bounded(1);

    let task = tokio::spawn(async move {
        let mut emitted = 0usize;
        for dep in lock.unresolved() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(emitted, "dependency generator cancelled");
                    return;
                }
                sent = sender.send(dep) => {
                    if sent.is_err() {
                        // every consumer is gone
                        return;
                    }
                }
            }
            emitted += 1;
        }
        tracing::debug!(emitted, "dependency generator exhausted");
    });

    DependencyStream { receiver, task }
}
