//! Bounded pool of registry workers.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{ErrorKind, RegistryClient, RegistryError, ResolvedDependency, UnresolvedDependency};

/// A lookup that failed, tagged with the dependency it was for.
#[derive(Error, Debug)]
#[error("failed to resolve '{name}': {source}")]
pub struct ResolveFailure {
    /// Name of the dependency whose lookup failed.
    pub name: String,
    /// What went wrong.
    #[source]
    pub source: RegistryError,
}

impl ResolveFailure {
    /// Returns the taxonomy bucket of the underlying registry error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// What a worker emits for each record it takes.
pub type ResolveResult = Result<ResolvedDependency, ResolveFailure>;

/// Output side of one worker.
#[derive(Debug)]
pub struct WorkerStream {
    /// Worker index, for diagnostics.
    pub id: usize,
    /// Results in the order this worker produced them.
    pub receiver: mpsc::Receiver<ResolveResult>,
    /// The worker task. Yields how many records it took from the source.
    pub task: JoinHandle<usize>,
}

/// Start `workers` resolvers competing for records on `source`.
///
/// A worker count of zero is treated as one. Each worker owns its output
/// channel and closes it when the source is exhausted or `cancel` fires.
pub fn spawn_workers(
    workers: usize,
    registry: &RegistryClient,
    source: &async_channel::Receiver<UnresolvedDependency>,
    cancel: &CancellationToken,
) -> Vec<WorkerStream> {
    (0..workers.max(1))
        .map(|id| {
            let (sink, receiver) = mpsc::channel(1);
            let task = tokio::spawn(run_worker(
                id,
                registry.clone(),
                source.clone(),
                sink,
                cancel.clone(),
            ));
            WorkerStream { id, receiver, task }
        })
        .collect()
}

async fn run_worker(
    id: usize,
    registry: RegistryClient,
    source: async_channel::Receiver<UnresolvedDependency>,
    sink: mpsc::Sender<ResolveResult>,
    cancel: CancellationToken,
) -> usize {
    let mut taken = 0usize;

    loop {
        let dep = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = source.recv() => match next {
                Ok(dep) => dep,
                Err(_) => break,
            },
        };
        taken += 1;

        // A record in flight when cancellation fires is dropped, not emitted.
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(worker = id, package = %dep.name, "lookup abandoned");
                break;
            }
            result = registry.resolve(&dep) => result.map_err(|source| ResolveFailure {
                name: dep.name.clone(),
                source,
            }),
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

    tracing::debug!(worker = id, taken, "resolver worker finished");
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn dependency(server: &MockServer, name: &str) -> UnresolvedDependency {
        UnresolvedDependency {
            name: name.to_string(),
            version: Some("1.0.0".to_string()),
            resolved: Some(server.url(format!("/{name}/-/{name}-1.0.0.tgz"))),
        }
    }

    async fn feed(
        deps: Vec<UnresolvedDependency>,
    ) -> async_channel::Receiver<UnresolvedDependency> {
        let (sender, receiver) = async_channel::unbounded();
        for dep in deps {
            sender.send(dep).await.unwrap();
        }
        receiver
    }

    async fn drain(streams: Vec<WorkerStream>) -> (Vec<ResolveResult>, usize) {
        let mut results = Vec::new();
        let mut taken = 0;
        for mut stream in streams {
            while let Some(result) = stream.receiver.recv().await {
                results.push(result);
            }
            taken += stream.task.await.unwrap();
        }
        (results, taken)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_record_is_looked_up_once() {
        let server = MockServer::start_async().await;
        let mut mocks = BTreeMap::new();
        for i in 0..8 {
            let name = format!("dep-{i}");
            let mock = server
                .mock_async(|when, then| {
                    when.method(GET).path(format!("/{name}/1.0.0"));
                    then.status(200)
                        .json_body(json!({ "dist": { "shasum": format!("sum-{i}") } }));
                })
                .await;
            mocks.insert(name, mock);
        }

        let deps = mocks.keys().map(|name| dependency(&server, name)).collect();
        let source = feed(deps).await;
        let streams = spawn_workers(
            3,
            &RegistryClient::new().unwrap(),
            &source,
            &CancellationToken::new(),
        );
        drop(source);
        assert_eq!(streams.len(), 3);

        let (results, taken) = drain(streams).await;
        let mut resolved = BTreeMap::new();
        for result in results {
            let dep = result.unwrap();
            assert!(resolved.insert(dep.name.clone(), dep.shasum).is_none());
        }

        assert_eq!(taken, 8);
        assert_eq!(resolved.len(), 8);
        assert_eq!(resolved["dep-3"], "sum-3");
        for mock in mocks.values() {
            mock.assert_hits_async(1).await;
        }
    }

    #[tokio::test]
    async fn zero_workers_means_one() {
        let source = feed(Vec::new()).await;
        let registry = RegistryClient::new().unwrap();
        let streams = spawn_workers(0, &registry, &source, &CancellationToken::new());
        drop(source);

        assert_eq!(streams.len(), 1);
        let (results, taken) = drain(streams).await;
        assert!(results.is_empty());
        assert_eq!(taken, 0);
    }

    #[tokio::test]
    async fn failures_are_tagged_with_the_dependency() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/broken/1.0.0");
                then.status(404);
            })
            .await;

        let source = feed(vec![dependency(&server, "broken")]).await;
        let registry = RegistryClient::new().unwrap();
        let streams = spawn_workers(1, &registry, &source, &CancellationToken::new());
        drop(source);

        let (results, _) = drain(streams).await;
        assert_eq!(results.len(), 1);
        let failure = results.into_iter().next().unwrap().unwrap_err();
        assert_eq!(failure.name, "broken");
        assert_eq!(failure.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn unusable_url_is_reported_not_dropped() {
        let dep = UnresolvedDependency {
            name: "weird".to_string(),
            version: Some("1.0.0".to_string()),
            resolved: Some("::::".to_string()),
        };
        let source = feed(vec![dep]).await;
        let registry = RegistryClient::new().unwrap();
        let streams = spawn_workers(2, &registry, &source, &CancellationToken::new());
        drop(source);

        let (results, taken) = drain(streams).await;
        assert_eq!(taken, 1);
        let failure = results.into_iter().next().unwrap().unwrap_err();
        assert_eq!(failure.name, "weird");
        assert_eq!(failure.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn cancellation_abandons_in_flight_lookups() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow/1.0.0");
                then.status(200)
                    .delay(Duration::from_secs(30))
                    .json_body(json!({ "dist": { "shasum": "late" } }));
            })
            .await;

        let cancel = CancellationToken::new();
        let source = feed(vec![dependency(&server, "slow")]).await;
        let streams = spawn_workers(1, &RegistryClient::new().unwrap(), &source, &cancel);

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        let (results, _) = tokio::time::timeout(Duration::from_secs(5), drain(streams))
            .await
            .expect("workers should exit after cancellation");
        assert!(results.is_empty());
    }
}
