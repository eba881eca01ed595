//! In-process document store
//!
//! Keeps every document in an ordered map behind a `tokio::sync::RwLock`.
//! Transactions are optimistic: reads record the version of each document
//! they saw, and commit re-checks those versions under the write lock,
//! failing with `Aborted` if any changed. That makes concurrent
//! read-compute-write cycles serializable without holding locks across
//! awaits. Change feeds are driven by a `watch` channel that is bumped on
//! every applied write.

use super::document::{Document, DocumentPath};
use super::query::Query;
use super::settings::TransactionOptions;
use super::value::Fields;
use super::{DocumentFeed, DocumentStore, ListenTarget, TransactionId, Write};
use crate::error::{EatsError, EatsResult};
use async_stream::stream;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

struct StoredDocument {
    document: Document,
    version: u64,
}

/// Versions observed by an open transaction (`None` = document was missing)
type ReadSet = HashMap<DocumentPath, Option<u64>>;

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<DocumentPath, StoredDocument>,
    transactions: HashMap<TransactionId, ReadSet>,
    next_version: u64,
}

impl MemoryState {
    fn version_of(&self, path: &DocumentPath) -> Option<u64> {
        self.documents.get(path).map(|d| d.version)
    }

    /// Validate then apply writes; nothing is applied if any write is invalid
    fn apply(&mut self, writes: Vec<Write>) -> EatsResult<()> {
        for write in &writes {
            if let Write::Update { path, .. } = write {
                if !self.documents.contains_key(path) {
                    return Err(EatsError::not_found(format!("no document to update: {}", path)));
                }
            }
        }

        for write in writes {
            self.next_version += 1;
            let version = self.next_version;
            match write {
                Write::Set { path, fields } => {
                    let document = Document::new(path.clone(), fields);
                    self.documents.insert(path, StoredDocument { document, version });
                }
                Write::Update { path, fields } => {
                    if let Some(stored) = self.documents.get_mut(&path) {
                        stored.document.fields.extend(fields);
                        stored.version = version;
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, target: &ListenTarget) -> Vec<Document> {
        match target {
            ListenTarget::Query(query) => self.run_query(query),
            ListenTarget::Document(path) => self
                .documents
                .get(path)
                .map(|d| vec![d.document.clone()])
                .unwrap_or_default(),
        }
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        query.evaluate(self.documents.values().map(|d| &d.document))
    }
}

struct MemoryInner {
    state: RwLock<MemoryState>,
    changes: watch::Sender<u64>,
    transaction: TransactionOptions,
}

/// In-memory [`DocumentStore`]
///
/// Cloning yields another handle to the same data.
///
/// # Example
/// ```
/// # async fn example() -> Result<(), friendlyeats_store::EatsError> {
/// use friendlyeats_store::store::{DocumentPath, DocumentStore, MemoryStore, Write};
///
/// let store = MemoryStore::new();
/// let path = DocumentPath::new("restaurants/abc")?;
/// store.commit(vec![Write::Set { path: path.clone(), fields: Default::default() }]).await?;
/// assert!(store.get_document(&path).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_transaction_options(TransactionOptions::default())
    }

    /// Create an empty store whose transactions retry with `options`
    pub fn with_transaction_options(options: TransactionOptions) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(MemoryInner {
                state: RwLock::new(MemoryState::default()),
                changes,
                transaction: options,
            }),
        }
    }

    /// Number of stored documents across all collections
    pub async fn document_count(&self) -> usize {
        self.inner.state.read().await.documents.len()
    }

    /// Number of transactions begun but not yet committed or rolled back
    pub async fn open_transactions(&self) -> usize {
        self.inner.state.read().await.transactions.len()
    }

    /// Number of live change feeds
    pub fn active_listeners(&self) -> usize {
        self.inner.changes.receiver_count()
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|generation| *generation += 1);
    }

    async fn evaluate(&self, target: &ListenTarget) -> Vec<Document> {
        self.inner.state.read().await.evaluate(target)
    }
}

impl DocumentStore for MemoryStore {
    fn transaction_options(&self) -> TransactionOptions {
        self.inner.transaction.clone()
    }

    async fn run_query(&self, query: &Query) -> EatsResult<Vec<Document>> {
        Ok(self.inner.state.read().await.run_query(query))
    }

    async fn get_document(&self, path: &DocumentPath) -> EatsResult<Option<Document>> {
        let state = self.inner.state.read().await;
        Ok(state.documents.get(path).map(|d| d.document.clone()))
    }

    async fn commit(&self, writes: Vec<Write>) -> EatsResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.inner.state.write().await.apply(writes)?;
        self.notify();
        Ok(())
    }

    async fn begin_transaction(&self) -> EatsResult<TransactionId> {
        let id = TransactionId(uuid::Uuid::new_v4().as_bytes().to_vec());
        self.inner
            .state
            .write()
            .await
            .transactions
            .insert(id.clone(), ReadSet::new());
        Ok(id)
    }

    async fn get_in_transaction(
        &self,
        transaction: &TransactionId,
        path: &DocumentPath,
    ) -> EatsResult<Option<Document>> {
        let mut state = self.inner.state.write().await;
        let version = state.version_of(path);
        let Some(reads) = state.transactions.get_mut(transaction) else {
            return Err(EatsError::invalid_argument("unknown or finished transaction"));
        };
        reads.entry(path.clone()).or_insert(version);
        Ok(state.documents.get(path).map(|d| d.document.clone()))
    }

    async fn commit_transaction(
        &self,
        transaction: TransactionId,
        writes: Vec<Write>,
    ) -> EatsResult<()> {
        let mut state = self.inner.state.write().await;
        let Some(reads) = state.transactions.remove(&transaction) else {
            return Err(EatsError::invalid_argument("unknown or finished transaction"));
        };

        for (path, seen) in &reads {
            if state.version_of(path) != *seen {
                debug!(path = %path, "transaction read set is stale");
                return Err(EatsError::Aborted(format!(
                    "document {} changed since it was read",
                    path
                )));
            }
        }

        let changed = !writes.is_empty();
        state.apply(writes)?;
        drop(state);
        if changed {
            self.notify();
        }
        Ok(())
    }

    async fn rollback(&self, transaction: TransactionId) -> EatsResult<()> {
        self.inner.state.write().await.transactions.remove(&transaction);
        Ok(())
    }

    async fn listen(&self, target: ListenTarget) -> EatsResult<DocumentFeed> {
        // Subscribe before the first read so no change can slip in between
        let mut changes = self.inner.changes.subscribe();
        let initial = self.evaluate(&target).await;
        let store = self.clone();

        let feed = stream! {
            let mut last = initial;
            yield Ok(last.clone());

            while changes.changed().await.is_ok() {
                let current = store.evaluate(&target).await;
                // Only deliver when the result set actually changed
                if current != last {
                    last = current;
                    yield Ok(last.clone());
                }
            }
        };
        Ok(Box::pin(feed))
    }
}

/// Convenience for building field maps in tests and fixtures
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    K: Into<String>,
    V: Into<super::value::Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
