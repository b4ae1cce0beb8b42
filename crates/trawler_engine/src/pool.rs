use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trawler_logging::{trawl_debug, trawl_trace, trawl_warn};

use crate::fetch::Fetcher;
use crate::{FailureKind, FetchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Number of concurrent fetches.
    pub workers: usize,
    /// Requests that may wait for a worker before `submit` suspends.
    pub queue_capacity: usize,
    pub fetch_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 16,
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("fetch queue closed")]
    QueueClosed,
}

/// Outcome of one queued request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReply {
    pub url: String,
    pub payload: Result<Value, FetchError>,
}

struct WorkItem {
    url: String,
    reply: oneshot::Sender<FetchReply>,
}

/// Resolves to the reply of a submitted request.
///
/// Fails with [`PoolError::QueueClosed`] if the pool stopped before a worker
/// picked the request up.
#[derive(Debug)]
pub struct Ticket {
    rx: oneshot::Receiver<FetchReply>,
}

impl Future for Ticket {
    type Output = Result<FetchReply, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.map_err(|_| PoolError::QueueClosed))
    }
}

/// Cloneable submission side of a [`FetchPool`].
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<WorkItem>,
    draining: CancellationToken,
}

impl PoolHandle {
    /// Queues a request. Suspends while the queue is full.
    pub async fn submit(&self, url: impl Into<String>) -> Result<Ticket, PoolError> {
        if self.draining.is_cancelled() {
            return Err(PoolError::QueueClosed);
        }
        let (reply, rx) = oneshot::channel();
        let item = WorkItem {
            url: url.into(),
            reply,
        };
        tokio::select! {
            biased;
            _ = self.draining.cancelled() => Err(PoolError::QueueClosed),
            sent = self.tx.send(item) => sent
                .map(|_| Ticket { rx })
                .map_err(|_| PoolError::QueueClosed),
        }
    }

    /// Submits and waits for the reply.
    pub async fn fetch(&self, url: impl Into<String>) -> Result<FetchReply, PoolError> {
        self.submit(url).await?.await
    }

    pub fn is_closed(&self) -> bool {
        self.draining.is_cancelled()
    }
}

/// Fixed set of workers pulling requests off one bounded queue.
pub struct FetchPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl FetchPool {
    /// Starts the workers on the current tokio runtime.
    ///
    /// Cancelling `cancel` aborts in-flight fetches and stops the workers;
    /// queued requests then resolve with [`PoolError::QueueClosed`].
    pub fn spawn(
        fetcher: Arc<dyn Fetcher>,
        settings: PoolSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let queue = Arc::new(Mutex::new(rx));
        let draining = cancel.child_token();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let workers = (0..settings.workers.max(1))
            .map(|index| {
                let worker = Worker {
                    index,
                    fetcher: Arc::clone(&fetcher),
                    queue: Arc::clone(&queue),
                    draining: draining.clone(),
                    cancel: cancel.clone(),
                    fetch_timeout: settings.fetch_timeout,
                    in_flight: Arc::clone(&in_flight),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self {
            handle: PoolHandle { tx, draining },
            workers,
            in_flight,
        }
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Requests currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stops accepting requests, lets the workers finish everything already
    /// queued, then waits for them to exit.
    pub async fn shutdown(self) {
        self.handle.draining.cancel();
        for (index, worker) in self.workers.into_iter().enumerate() {
            if let Err(err) = worker.await {
                trawl_warn!("fetch worker {} ended abnormally: {}", index, err);
            }
        }
    }
}

enum Next {
    Item(WorkItem),
    Drain,
    Stop,
}

struct Worker {
    index: usize,
    fetcher: Arc<dyn Fetcher>,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    draining: CancellationToken,
    cancel: CancellationToken,
    fetch_timeout: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(self) {
        trawl_debug!("fetch worker {} started", self.index);
        while let Some(WorkItem { url, reply }) = self.next_item().await {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            let payload = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    Err(FetchError::new(FailureKind::Cancelled, "crawl cancelled"))
                }
                result = fetch_json(self.fetcher.as_ref(), &url, self.fetch_timeout) => result,
            };
            self.in_flight.fetch_sub(1, Ordering::AcqRel);

            if let Err(err) = &payload {
                trawl_warn!("fetch worker {}: {} failed: {}", self.index, url, err);
            }
            // The submitter may have given up on the ticket.
            let _ = reply.send(FetchReply { url, payload });
        }
        trawl_debug!("fetch worker {} stopped", self.index);
    }

    async fn next_item(&self) -> Option<WorkItem> {
        let mut rx = self.queue.lock().await;
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Next::Stop,
            item = rx.recv() => item.map(Next::Item).unwrap_or(Next::Stop),
            _ = self.draining.cancelled() => Next::Drain,
        };
        match next {
            Next::Item(item) => Some(item),
            Next::Drain => rx.try_recv().ok(),
            Next::Stop => None,
        }
    }
}

async fn fetch_json(
    fetcher: &dyn Fetcher,
    url: &str,
    fetch_timeout: Option<Duration>,
) -> Result<Value, FetchError> {
    let output = match fetch_timeout {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch(url))
            .await
            .map_err(|_| {
                FetchError::new(FailureKind::Timeout, format!("no response within {limit:?}"))
            })??,
        None => fetcher.fetch(url).await?,
    };
    let metadata = &output.metadata;
    if metadata.final_url != metadata.original_url {
        trawl_debug!("{} redirected to {}", metadata.original_url, metadata.final_url);
    }
    trawl_trace!(
        "{}: {} bytes ({})",
        metadata.final_url,
        metadata.byte_len,
        metadata.content_type.as_deref().unwrap_or("no content type")
    );
    serde_json::from_slice(&output.bytes)
        .map_err(|err| FetchError::new(FailureKind::Decode, err.to_string()))
}
