//! Document store layer
//!
//! The data-access layer talks to the database only through the
//! [`DocumentStore`] trait. The store is treated as an opaque engine offering
//! collections of documents, equality/ordering queries, serializable
//! transactions, and change feeds. Two engines ship with the crate:
//!
//! - [`MemoryStore`]: in-process engine with optimistic transactions
//! - [`RestStore`]: Firestore REST v1 adapter (hosted service or emulator)
//!
//! Store handles are cheap to clone and are passed explicitly to every
//! component; there is no global instance.

pub mod document;
pub mod memory;
pub mod query;
pub mod rest;
pub mod settings;
pub mod timestamp;
/// Transaction handle and bounded retry loop
pub mod transaction;
pub mod value;

use crate::error::EatsResult;
use futures::stream::BoxStream;
use std::future::Future;

pub use document::{auto_id, CollectionPath, Document, DocumentPath};
pub use memory::MemoryStore;
pub use query::{Direction, FieldFilter, OrderBy, Query};
pub use rest::RestStore;
pub use settings::{Settings, TransactionOptions};
pub use timestamp::Timestamp;
pub use transaction::{run_transaction, Transaction};
pub use value::{ArrayValue, Fields, MapValue, Value};

/// Opaque transaction identifier issued by `begin_transaction`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(pub(crate) Vec<u8>);

impl TransactionId {
    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wrap raw identifier bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}

/// A single mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Overwrite (or create) the whole document
    Set {
        /// Target document
        path: DocumentPath,
        /// New contents
        fields: Fields,
    },

    /// Merge the given fields into an existing document
    ///
    /// Fails with `NotFound` if the document does not exist.
    Update {
        /// Target document
        path: DocumentPath,
        /// Fields to overwrite; others are left untouched
        fields: Fields,
    },
}

impl Write {
    /// Document this write targets
    pub fn path(&self) -> &DocumentPath {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } => path,
        }
    }
}

/// What a change feed watches
#[derive(Debug, Clone, PartialEq)]
pub enum ListenTarget {
    /// Every document matching a query, in query order
    Query(Query),
    /// A single document (zero or one result)
    Document(DocumentPath),
}

/// Live feed of full result sets
///
/// Each item is the complete current result of the watched target. The
/// initial result is always the first item. After an `Err` item the feed
/// ends.
pub type DocumentFeed = BoxStream<'static, EatsResult<Vec<Document>>>;

/// The document database, as seen by the data-access layer
///
/// Every operation is asynchronous and may suspend the caller. Implementations
/// must be safe to share across tasks.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Execute a query once
    fn run_query(&self, query: &Query) -> impl Future<Output = EatsResult<Vec<Document>>> + Send;

    /// Read a single document; `None` if it does not exist
    fn get_document(
        &self,
        path: &DocumentPath,
    ) -> impl Future<Output = EatsResult<Option<Document>>> + Send;

    /// Apply writes atomically outside any transaction
    fn commit(&self, writes: Vec<Write>) -> impl Future<Output = EatsResult<()>> + Send;

    /// Start a serializable read-write transaction
    fn begin_transaction(&self) -> impl Future<Output = EatsResult<TransactionId>> + Send;

    /// Read a document inside a transaction
    fn get_in_transaction(
        &self,
        transaction: &TransactionId,
        path: &DocumentPath,
    ) -> impl Future<Output = EatsResult<Option<Document>>> + Send;

    /// Commit a transaction's writes
    ///
    /// Fails with `EatsError::Aborted` if a document read in the transaction
    /// changed since it was read. Nothing is applied in that case.
    fn commit_transaction(
        &self,
        transaction: TransactionId,
        writes: Vec<Write>,
    ) -> impl Future<Output = EatsResult<()>> + Send;

    /// Abandon a transaction
    fn rollback(&self, transaction: TransactionId) -> impl Future<Output = EatsResult<()>> + Send;

    /// Open a change feed for a target
    ///
    /// Setup failures are returned here rather than on the feed.
    fn listen(&self, target: ListenTarget) -> impl Future<Output = EatsResult<DocumentFeed>> + Send;

    /// Retry behavior transactions against this store should use
    fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::default()
    }
}
