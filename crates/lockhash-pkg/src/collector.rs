//! Fan-in of the per-worker result streams.

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{ResolveResult, WorkerStream};

/// Output of [`merge`].
#[derive(Debug)]
pub struct MergedStream {
    /// Every worker's results, interleaved in arrival order.
    pub receiver: mpsc::Receiver<ResolveResult>,
    /// Coordinator task; finishes once every worker and forwarder has.
    pub task: JoinHandle<()>,
}

/// Merge worker streams into one.
///
/// The merged receiver yields `None` only after every worker stream has
/// closed. Each forwarder holds its own sender, so the merged channel cannot
/// close while any of them may still send. On cancellation the forwarders stop
/// draining, and the coordinator still joins every worker before it finishes.
pub fn merge(streams: Vec<WorkerStream>, cancel: &CancellationToken) -> MergedStream {
    let (sink, receiver) = mpsc::channel(1);

    let mut forwarders = JoinSet::new();
    for stream in streams {
        forwarders.spawn(forward(stream, sink.clone(), cancel.clone()));
    }
    drop(sink);

    let task = tokio::spawn(async move {
        while let Some(joined) = forwarders.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "result forwarder failed");
            }
        }
    });

    MergedStream { receiver, task }
}

async fn forward(
    mut stream: WorkerStream,
    sink: mpsc::Sender<ResolveResult>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = stream.receiver.recv() => match next {
                Some(result) => result,
                None => break,
            },
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = sink.send(result) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    // Release the merged channel and unblock the worker if it is parked on a
    // send, then wait for it.
    drop(sink);
    drop(stream.receiver);
    match stream.task.await {
        Ok(taken) => tracing::trace!(worker = stream.id, taken, "worker joined"),
        Err(e) => tracing::error!(worker = stream.id, error = %e, "resolver worker failed"),
    }
}
