use futures_util::{pin_mut, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trawler_core::TaggedItem;
use trawler_logging::{trawl_debug, trawl_info, trawl_warn};

use crate::paginate::{catalog_items, CatalogSource};
use crate::pool::PoolHandle;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{CatalogEvent, CrawlError};

enum StreamEnd {
    Exhausted(u64),
    Stopped,
}

/// Streams one catalog onto the merged channel.
///
/// Sends every item in page order, then exactly one `Completed` or `Failed`
/// event. Sends nothing further once `cancel` fires or the receiver is gone.
pub fn spawn_producer(
    source: CatalogSource,
    pool: PoolHandle,
    retry: RetryPolicy,
    tx: mpsc::Sender<CatalogEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tag = source.tag;
        trawl_info!("{} producer started", tag);

        let outcome = retry_with_backoff(&retry, &cancel, |attempt| {
            if attempt > 1 {
                trawl_info!("{} restarting from page one (attempt {})", tag, attempt);
            }
            stream_once(source.clone(), pool.clone(), &tx, &cancel)
        })
        .await;

        match outcome {
            Ok(StreamEnd::Exhausted(items)) => {
                trawl_info!("{} producer completed after {} items", tag, items);
                let _ = tx.send(CatalogEvent::Completed { tag, items }).await;
            }
            Ok(StreamEnd::Stopped) => trawl_debug!("{} producer stopped", tag),
            Err(_) if cancel.is_cancelled() => trawl_debug!("{} producer cancelled", tag),
            Err(err) => {
                trawl_warn!("{} producer failed: {}", tag, err);
                let _ = tx.send(CatalogEvent::Failed(err)).await;
            }
        }
    })
}

async fn stream_once(
    source: CatalogSource,
    pool: PoolHandle,
    tx: &mpsc::Sender<CatalogEvent>,
    cancel: &CancellationToken,
) -> Result<StreamEnd, CrawlError> {
    let tag = source.tag;
    let items = catalog_items(source, pool);
    pin_mut!(items);

    let mut sent = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Stopped),
            next = items.next() => next,
        };
        let Some(item) = next else {
            return Ok(StreamEnd::Exhausted(sent));
        };
        let event = CatalogEvent::Item(TaggedItem::new(tag, item?));
        if tx.send(event).await.is_err() {
            return Ok(StreamEnd::Stopped);
        }
        sent += 1;
    }
}
