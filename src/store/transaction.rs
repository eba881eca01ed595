//! Transaction support for atomic read-write operations
//!
//! A [`Transaction`] buffers writes locally and reads through the store with
//! the transaction id, so reads observe a consistent snapshot. All reads must
//! be executed before any writes. [`run_transaction`] drives the
//! begin → user function → commit cycle and retries it when the commit loses
//! a race, up to `TransactionOptions::max_attempts`.

use super::document::{Document, DocumentPath};
use super::settings::TransactionOptions;
use super::value::Fields;
use super::{DocumentStore, TransactionId, Write};
use crate::error::{EatsError, EatsResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Default)]
struct TransactionState {
    reads: HashMap<DocumentPath, Option<Document>>,
    writes: Vec<Write>,
}

/// Handle passed to the transaction function
///
/// Clones share the same buffered state, so the function can move its handle
/// into an `async` block while the runner keeps one to collect the writes.
#[derive(Clone)]
pub struct Transaction<S: DocumentStore> {
    id: TransactionId,
    store: S,
    state: Arc<Mutex<TransactionState>>,
}

impl<S: DocumentStore> Transaction<S> {
    pub(crate) fn new(id: TransactionId, store: S) -> Self {
        Self {
            id,
            store,
            state: Arc::new(Mutex::new(TransactionState::default())),
        }
    }

    fn lock(&self) -> EatsResult<MutexGuard<'_, TransactionState>> {
        self.state
            .lock()
            .map_err(|_| EatsError::internal("transaction state poisoned"))
    }

    /// Get a document within the transaction
    ///
    /// Returns `None` if the document doesn't exist. Repeated reads of the same
    /// path return the first result.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a write has already been buffered, or the
    /// store error if the read fails.
    pub async fn get(&self, path: &DocumentPath) -> EatsResult<Option<Document>> {
        {
            let state = self.lock()?;
            if !state.writes.is_empty() {
                return Err(EatsError::invalid_argument(
                    "transactions require all reads to be executed before all writes",
                ));
            }
            if let Some(cached) = state.reads.get(path) {
                return Ok(cached.clone());
            }
        }

        let snapshot = self.store.get_in_transaction(&self.id, path).await?;
        self.lock()?.reads.insert(path.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Overwrite (or create) a document when the transaction commits
    pub fn set(&self, path: DocumentPath, fields: Fields) -> EatsResult<()> {
        self.lock()?.writes.push(Write::Set { path, fields });
        Ok(())
    }

    /// Merge fields into an existing document when the transaction commits
    pub fn update(&self, path: DocumentPath, fields: Fields) -> EatsResult<()> {
        self.lock()?.writes.push(Write::Update { path, fields });
        Ok(())
    }

    fn take_writes(&self) -> EatsResult<Vec<Write>> {
        Ok(std::mem::take(&mut self.lock()?.writes))
    }
}

/// Run a transaction
///
/// Executes `update_fn` within a fresh transaction and commits its writes.
/// If the commit fails because a document read in the transaction was
/// modified concurrently, the whole function is run again after an
/// exponential backoff. After `options.max_attempts` failed commits the
/// result is `EatsError::TransactionConflict`. Any other error from the
/// function or the store is returned immediately, after rolling back.
///
/// # Example
/// ```no_run
/// # use friendlyeats_store::store::{run_transaction, DocumentPath, MemoryStore, TransactionOptions, Value};
/// # async fn example() -> Result<(), friendlyeats_store::EatsError> {
/// let store = MemoryStore::new();
/// let counter = DocumentPath::new("counters/visits")?;
///
/// let next = run_transaction(&store, &TransactionOptions::default(), |txn| {
///     let counter = counter.clone();
///     async move {
///         let current = txn
///             .get(&counter)
///             .await?
///             .and_then(|doc| doc.get("count").and_then(Value::as_i64))
///             .unwrap_or(0);
///         let mut fields = std::collections::BTreeMap::new();
///         fields.insert("count".to_string(), Value::Integer(current + 1));
///         txn.set(counter, fields)?;
///         Ok::<_, friendlyeats_store::EatsError>(current + 1)
///     }
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_transaction<S, F, Fut, R>(
    store: &S,
    options: &TransactionOptions,
    mut update_fn: F,
) -> EatsResult<R>
where
    S: DocumentStore,
    F: FnMut(Transaction<S>) -> Fut,
    Fut: Future<Output = EatsResult<R>>,
{
    let max_attempts = options.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let transaction_id = store.begin_transaction().await?;
        let transaction = Transaction::new(transaction_id.clone(), store.clone());

        let result = match update_fn(transaction.clone()).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(rollback_err) = store.rollback(transaction_id).await {
                    warn!(error = %rollback_err, "transaction rollback failed");
                }
                if !e.is_conflict() {
                    return Err(e);
                }
                debug!(attempt, error = %e, "transaction function hit a conflict");
                if attempt < max_attempts {
                    tokio::time::sleep(options.backoff_for(attempt - 1)).await;
                }
                continue;
            }
        };

        let writes = transaction.take_writes()?;
        match store.commit_transaction(transaction_id, writes).await {
            Ok(()) => {
                debug!(attempt, "transaction committed");
                return Ok(result);
            }
            Err(e) if e.is_conflict() => {
                debug!(attempt, max_attempts, error = %e, "transaction commit conflicted, retrying");
                if attempt < max_attempts {
                    tokio::time::sleep(options.backoff_for(attempt - 1)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    warn!(attempts = max_attempts, "transaction retry budget exhausted");
    Err(EatsError::TransactionConflict {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::value::Value;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter_path() -> DocumentPath {
        DocumentPath::new("counters/visits").unwrap()
    }

    fn count_fields(count: i64) -> Fields {
        let mut fields = BTreeMap::new();
        fields.insert("count".to_string(), Value::Integer(count));
        fields
    }

    #[tokio::test]
    async fn test_transaction_read_before_write() {
        let store = MemoryStore::new();
        let err = run_transaction(&store, &TransactionOptions::default(), |txn| async move {
            txn.set(counter_path(), count_fields(1))?;
            txn.get(&counter_path()).await?;
            Ok::<_, EatsError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EatsError::InvalidArgument(_)));
        assert!(store.get_document(&counter_path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_commits_writes() {
        let store = MemoryStore::new();
        let value = run_transaction(&store, &TransactionOptions::default(), |txn| async move {
            let current = txn.get(&counter_path()).await?;
            assert!(current.is_none());
            txn.set(counter_path(), count_fields(7))?;
            Ok::<_, EatsError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);

        let doc = store.get_document(&counter_path()).await.unwrap().unwrap();
        assert_eq!(doc.get("count"), Some(&Value::Integer(7)));
    }

    #[tokio::test]
    async fn test_function_error_discards_writes() {
        let store = MemoryStore::new();
        let calls = AtomicU32::new(0);
        let err = run_transaction(&store, &TransactionOptions::default(), |txn| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                txn.set(counter_path(), count_fields(1))?;
                Err::<(), _>(EatsError::not_found("nothing here"))
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EatsError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.get_document(&counter_path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_retried() {
        let store = MemoryStore::new();
        store
            .commit(vec![Write::Set {
                path: counter_path(),
                fields: count_fields(0),
            }])
            .await
            .unwrap();

        let attempts = AtomicU32::new(0);
        let interloper = store.clone();
        let options = TransactionOptions::default().with_initial_backoff(std::time::Duration::from_millis(1));
        run_transaction(&store, &options, |txn| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let interloper = interloper.clone();
            async move {
                let doc = txn.get(&counter_path()).await?;
                let count = doc
                    .and_then(|d| d.get("count").and_then(Value::as_i64))
                    .unwrap_or(0);
                if attempt == 0 {
                    // A concurrent writer sneaks in between our read and commit
                    interloper
                        .commit(vec![Write::Set {
                            path: counter_path(),
                            fields: count_fields(100),
                        }])
                        .await?;
                }
                txn.set(counter_path(), count_fields(count + 1))?;
                Ok::<_, EatsError>(())
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let doc = store.get_document(&counter_path()).await.unwrap().unwrap();
        assert_eq!(doc.get("count"), Some(&Value::Integer(101)));
    }
}
