use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trawler_core::{update, CatalogTag, Effect, JoinState, JoinSummary, Msg};
use trawler_logging::{trawl_debug, trawl_error, trawl_info, trawl_warn};

use crate::fetch::Fetcher;
use crate::paginate::CatalogSource;
use crate::pool::{FetchPool, PoolSettings};
use crate::producer::spawn_producer;
use crate::retry::RetryPolicy;
use crate::{CatalogEvent, CrawlError, CrawlEvent};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub projects: CatalogSource,
    pub users: CatalogSource,
    pub pool: PoolSettings,
    pub retry: RetryPolicy,
    /// Capacity of the merged channel between producers and the accumulator.
    pub channel_capacity: usize,
}

impl CrawlSettings {
    pub fn new(projects: CatalogSource, users: CatalogSource) -> Self {
        Self {
            projects,
            users,
            pool: PoolSettings::default(),
            retry: RetryPolicy::default(),
            channel_capacity: 256,
        }
    }
}

/// Receives crawl output in the order the accumulator produces it.
pub trait CrawlSink: Send + Sync {
    fn emit(&self, event: CrawlEvent);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub summary: JoinSummary,
    /// Terminal failures, at most one per catalog.
    pub failures: Vec<CrawlError>,
}

impl CrawlReport {
    pub fn is_complete(&self) -> bool {
        self.summary.is_complete()
    }

    pub fn was_cancelled(&self) -> bool {
        self.summary.cancelled
    }
}

/// Wires the pool, both producers and the accumulator for one run.
pub struct Crawler {
    settings: CrawlSettings,
    fetcher: Arc<dyn Fetcher>,
}

impl Crawler {
    pub fn new(settings: CrawlSettings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { settings, fetcher }
    }

    /// Crawls both catalogs and streams items and pairs into `sink`.
    ///
    /// Returns once both catalogs have completed or failed, or right after
    /// `cancel` fires. All spawned tasks have exited by then. The last event
    /// handed to `sink` is always [`CrawlEvent::Finished`].
    pub async fn run(&self, sink: &dyn CrawlSink, cancel: CancellationToken) -> CrawlReport {
        trawl_info!(
            "crawl started: {} and {}",
            self.settings.projects.first_page_url(),
            self.settings.users.first_page_url()
        );

        let pool = FetchPool::spawn(
            Arc::clone(&self.fetcher),
            self.settings.pool.clone(),
            cancel.clone(),
        );
        let (tx, mut rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let producers = [&self.settings.projects, &self.settings.users].map(|source| {
            spawn_producer(
                source.clone(),
                pool.handle(),
                self.settings.retry.clone(),
                tx.clone(),
                cancel.clone(),
            )
        });
        drop(tx);

        let mut state = JoinState::new();
        let mut failures: BTreeMap<CatalogTag, CrawlError> = BTreeMap::new();
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trawl_info!("crawl cancelled");
                    Msg::Cancelled
                }
                event = rx.recv() => match event {
                    Some(CatalogEvent::Item(item)) => Msg::Item(item),
                    Some(CatalogEvent::Completed { tag, items }) => {
                        trawl_debug!("{} stream completed with {} items", tag, items);
                        Msg::CatalogCompleted(tag)
                    }
                    Some(CatalogEvent::Failed(err)) => {
                        let tag = err.catalog();
                        failures.entry(tag).or_insert(err);
                        Msg::CatalogFailed(tag)
                    }
                    None => {
                        trawl_error!("all producers ended without reporting an outcome");
                        break;
                    }
                },
            };

            let (next, effects) = update(state, msg);
            state = next;
            if dispatch(effects, &failures, sink) {
                break;
            }
        }

        rx.close();
        for (tag, producer) in CatalogTag::ALL.iter().zip(producers) {
            if let Err(err) = producer.await {
                trawl_warn!("{} producer ended abnormally: {}", tag, err);
            }
        }
        pool.shutdown().await;

        let summary = state.summary();
        trawl_info!(
            "crawl finished: {} projects, {} users, {} pairs, {} duplicates ignored",
            summary.projects_seen,
            summary.users_seen,
            summary.pairs_emitted,
            summary.duplicates_ignored
        );
        sink.emit(CrawlEvent::Finished(summary.clone()));

        CrawlReport {
            summary,
            failures: failures.into_values().collect(),
        }
    }
}

/// Hands effects to the sink. Returns true once the output is closed.
fn dispatch(
    effects: Vec<Effect>,
    failures: &BTreeMap<CatalogTag, CrawlError>,
    sink: &dyn CrawlSink,
) -> bool {
    let mut closed = false;
    for effect in effects {
        match effect {
            Effect::ForwardItem(item) => sink.emit(CrawlEvent::Item(item)),
            Effect::EmitPair(pair) => sink.emit(CrawlEvent::Pair(pair)),
            Effect::ReportFailure(tag) => {
                if let Some(err) = failures.get(&tag) {
                    sink.emit(CrawlEvent::CatalogFailed(err.clone()));
                }
            }
            Effect::Close => closed = true,
        }
    }
    closed
}
