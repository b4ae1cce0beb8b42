use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::thread;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::oneshot;
use trawler_core::{CatalogTag, ItemId, PairEvent, TaggedItem};
use trawler_logging::{trawl_error, trawl_info, trawl_warn};

use crate::crawl::CrawlSink;
use crate::filename::record_filename;
use crate::CrawlEvent;

const PAIRS_DIR: &str = "pairs";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("corrupt document {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Writability probe.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Writes `{dir}/{filename}` through a temp file and a rename, so readers see
/// either the old content or the new content.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        if !self.dir.is_dir() {
            ensure_output_dir(&self.dir)?;
        }

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Destination for crawl output. Writes are upserts keyed by item id or by
/// pair, so replaying a crawl leaves the store unchanged.
pub trait Store: Send + Sync {
    fn upsert_item(&self, item: &TaggedItem) -> Result<(), PersistError>;
    fn upsert_pair(&self, pair: &PairEvent) -> Result<(), PersistError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn upsert_item(&self, item: &TaggedItem) -> Result<(), PersistError> {
        (**self).upsert_item(item)
    }

    fn upsert_pair(&self, pair: &PairEvent) -> Result<(), PersistError> {
        (**self).upsert_pair(pair)
    }
}

/// Produces the `fetched_utc` stamp of stored items.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDocument {
    pub id: ItemId,
    pub catalog: CatalogTag,
    pub fetched_utc: String,
    pub record: Value,
}

/// One JSON document per record under `<root>/{projects,users,pairs}/`.
pub struct FileStore {
    root: PathBuf,
    clock: Clock,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, clock: Clock) -> Result<Self, PersistError> {
        let root = root.into();
        for dir in CatalogTag::ALL.iter().map(|tag| tag.as_str()).chain([PAIRS_DIR]) {
            ensure_output_dir(&root.join(dir))?;
        }
        trawl_info!("storing crawl output under {}", root.display());
        Ok(Self { root, clock })
    }

    /// Stored ids of one catalog, sorted.
    pub fn ids(&self, tag: CatalogTag) -> Result<Vec<ItemId>, PersistError> {
        let docs: Vec<ItemDocument> = read_documents(&self.root.join(tag.as_str()))?;
        let mut ids: Vec<ItemId> = docs.into_iter().map(|doc| doc.id).collect();
        ids.sort();
        Ok(ids)
    }

    pub fn item(
        &self,
        tag: CatalogTag,
        id: &ItemId,
    ) -> Result<Option<ItemDocument>, PersistError> {
        let path = self
            .root
            .join(tag.as_str())
            .join(record_filename(id.as_str()));
        if !path.is_file() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    /// Stored pairs, sorted.
    pub fn pairs(&self) -> Result<Vec<PairEvent>, PersistError> {
        let mut pairs = read_documents::<PairEvent>(&self.root.join(PAIRS_DIR))?;
        pairs.sort();
        Ok(pairs)
    }

    pub fn pair_count(&self) -> Result<usize, PersistError> {
        Ok(json_files(&self.root.join(PAIRS_DIR))?.len())
    }
}

impl Store for FileStore {
    fn upsert_item(&self, item: &TaggedItem) -> Result<(), PersistError> {
        let doc = ItemDocument {
            id: item.id().clone(),
            catalog: item.tag,
            fetched_utc: (self.clock)(),
            record: item.item.record.clone(),
        };
        let content = serde_json::to_string_pretty(&doc)?;
        AtomicFileWriter::new(self.root.join(item.tag.as_str()))
            .write(&record_filename(doc.id.as_str()), &content)?;
        Ok(())
    }

    fn upsert_pair(&self, pair: &PairEvent) -> Result<(), PersistError> {
        let key = format!("{}\u{1f}{}", pair.project_id, pair.user_id);
        let content = serde_json::to_string_pretty(pair)?;
        AtomicFileWriter::new(self.root.join(PAIRS_DIR)).write(&record_filename(&key), &content)?;
        Ok(())
    }
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, PersistError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|err| PersistError::Corrupt {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn read_documents<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, PersistError> {
    json_files(dir)?.iter().map(|path| read_document(path)).collect()
}

/// In-process store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<(CatalogTag, ItemId), Value>>,
    pairs: Mutex<BTreeSet<PairEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self, tag: CatalogTag) -> Vec<ItemId> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items
            .keys()
            .filter(|(stored, _)| *stored == tag)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn record(&self, tag: CatalogTag, id: &ItemId) -> Option<Value> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.get(&(tag, id.clone())).cloned()
    }

    pub fn pairs(&self) -> Vec<PairEvent> {
        let pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
        pairs.iter().cloned().collect()
    }
}

impl Store for MemoryStore {
    fn upsert_item(&self, item: &TaggedItem) -> Result<(), PersistError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert((item.tag, item.id().clone()), item.item.record.clone());
        Ok(())
    }

    fn upsert_pair(&self, pair: &PairEvent) -> Result<(), PersistError> {
        let mut pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
        pairs.insert(pair.clone());
        Ok(())
    }
}

enum StoreWrite {
    Item(TaggedItem),
    Pair(PairEvent),
}

/// Persists items and pairs of a crawl on a dedicated writer thread, so
/// `emit` only enqueues. Store failures are logged and counted; they never
/// stop the crawl.
pub struct StoreSink<S> {
    store: Arc<S>,
    writes: Mutex<Option<std_mpsc::Sender<StoreWrite>>>,
    drained: Mutex<Option<oneshot::Receiver<()>>>,
    write_failures: Arc<AtomicU64>,
}

impl<S: Store + 'static> StoreSink<S> {
    pub fn new(store: S) -> Self {
        let store = Arc::new(store);
        let write_failures = Arc::new(AtomicU64::new(0));
        let (tx, rx) = std_mpsc::channel();
        let (drained_tx, drained_rx) = oneshot::channel();

        let writer = Arc::clone(&store);
        let failures = Arc::clone(&write_failures);
        thread::spawn(move || {
            for write in rx {
                if let Err((what, err)) = apply(writer.as_ref(), write) {
                    failures.fetch_add(1, Ordering::Relaxed);
                    trawl_error!("failed to store {}: {}", what, err);
                }
            }
            let _ = drained_tx.send(());
        });

        Self {
            store,
            writes: Mutex::new(Some(tx)),
            drained: Mutex::new(Some(drained_rx)),
            write_failures,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Failed writes so far. Final only after [`StoreSink::finish`].
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Stops accepting writes and waits until every queued write hit the
    /// store. Later events are counted as failures.
    pub async fn finish(&self) {
        drop(self.writes.lock().unwrap_or_else(PoisonError::into_inner).take());
        let drained = self
            .drained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(drained) = drained {
            if drained.await.is_err() {
                trawl_error!("store writer stopped before draining its queue");
            }
        }
    }

    fn enqueue(&self, write: StoreWrite) {
        let sent = match self.writes.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(tx) => tx.send(write).is_ok(),
            None => false,
        };
        if !sent {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            trawl_warn!("store already closed, dropping write");
        }
    }
}

fn apply<S: Store + ?Sized>(store: &S, write: StoreWrite) -> Result<(), (String, PersistError)> {
    match write {
        StoreWrite::Item(item) => store
            .upsert_item(&item)
            .map_err(|err| (format!("{} {}", item.tag, item.id()), err)),
        StoreWrite::Pair(pair) => store
            .upsert_pair(&pair)
            .map_err(|err| (format!("pair {pair}"), err)),
    }
}

impl<S: Store + 'static> CrawlSink for StoreSink<S> {
    fn emit(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::Item(item) => self.enqueue(StoreWrite::Item(item)),
            CrawlEvent::Pair(pair) => self.enqueue(StoreWrite::Pair(pair)),
            CrawlEvent::CatalogFailed(_) | CrawlEvent::Finished(_) => {}
        }
    }
}
