//! Trawler engine: HTTP fetching, paging, producers and the crawl driver.
mod crawl;
mod fetch;
mod filename;
mod paginate;
mod persist;
mod pool;
mod producer;
mod retry;
mod types;

pub use crawl::{CrawlReport, CrawlSettings, CrawlSink, Crawler};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::record_filename;
pub use paginate::{catalog_items, catalog_pages, parse_page, CatalogSource, Page};
pub use persist::{
    ensure_output_dir, AtomicFileWriter, Clock, FileStore, ItemDocument, MemoryStore,
    PersistError, Store, StoreSink,
};
pub use pool::{FetchPool, FetchReply, PoolError, PoolHandle, PoolSettings, Ticket};
pub use producer::spawn_producer;
pub use retry::{retry_with_backoff, RetryPolicy, Retryable};
pub use types::{
    CatalogEvent, CrawlError, CrawlEvent, FailureKind, FetchError, FetchMetadata, FetchOutput,
};
