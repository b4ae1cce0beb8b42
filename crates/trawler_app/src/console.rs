use std::io::{self, Write};
use std::sync::Arc;

use chrono::Utc;
use trawler_engine::{Clock, CrawlEvent, CrawlSink, FileStore, StoreSink};
use trawler_logging::{trawl_debug, trawl_warn};

/// UTC RFC 3339 stamps for stored items.
pub fn utc_clock() -> Clock {
    Arc::new(|| Utc::now().to_rfc3339())
}

/// Prints each pair as one JSON line on stdout and, when an output
/// directory is configured, persists items and pairs.
pub struct ConsoleSink {
    print_pairs: bool,
    store: Option<StoreSink<FileStore>>,
}

impl ConsoleSink {
    pub fn new(print_pairs: bool, store: Option<StoreSink<FileStore>>) -> Self {
        Self { print_pairs, store }
    }

    /// Waits for queued store writes to land.
    pub async fn finish(&self) {
        if let Some(store) = &self.store {
            store.finish().await;
        }
    }

    pub fn write_failures(&self) -> u64 {
        self.store.as_ref().map_or(0, StoreSink::write_failures)
    }

    fn print_pair(&self, event: &CrawlEvent) {
        let CrawlEvent::Pair(pair) = event else {
            return;
        };
        let line = match serde_json::to_string(pair) {
            Ok(line) => line,
            Err(err) => {
                trawl_warn!("could not encode pair {}: {}", pair, err);
                return;
            }
        };
        if let Err(err) = writeln!(io::stdout().lock(), "{line}") {
            trawl_debug!("stdout closed: {}", err);
        }
    }
}

impl CrawlSink for ConsoleSink {
    fn emit(&self, event: CrawlEvent) {
        if self.print_pairs {
            self.print_pair(&event);
        }
        if let CrawlEvent::CatalogFailed(err) = &event {
            eprintln!("catalog {} failed: {}", err.catalog(), err);
        }
        if let Some(store) = &self.store {
            store.emit(event);
        }
    }
}
