//! Live restaurant and review subscriptions
//!
//! A subscription delivers the complete, freshly mapped result set every time
//! it changes, starting with the current one. Two shapes are offered:
//!
//! - [`SnapshotStream`]: a `futures::Stream` of results, cancelled on drop
//! - [`Subscription`]: a handler invoked from a background task, cancelled
//!   with [`Subscription::cancel`] or on drop
//!
//! # Example
//! ```no_run
//! use friendlyeats_store::eats::{FilterRequest, SnapshotSubscriber};
//! use friendlyeats_store::store::MemoryStore;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), friendlyeats_store::EatsError> {
//! let subscriber = SnapshotSubscriber::new(MemoryStore::new());
//! let mut stream = subscriber.restaurants(&FilterRequest::new()).await?;
//!
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(restaurants) => println!("{} restaurants", restaurants.len()),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use super::filter::{restaurants_collection, reviews_query, QueryFilterBuilder, RATINGS};
use super::mapper::DocumentMapper;
use super::model::{FilterRequest, Restaurant, Review};
use crate::error::{EatsError, EatsResult};
use crate::store::{Document, DocumentFeed, DocumentStore, ListenTarget, Query};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::debug;

/// A stream of mapped result sets
///
/// Items are `Ok` for every delivery, or `Err` when a delivery could not be
/// mapped (the stream continues) or the store feed failed (the stream then
/// ends). Dropping the stream releases the underlying store feed.
pub struct SnapshotStream<T> {
    receiver: mpsc::UnboundedReceiver<EatsResult<T>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl<T> SnapshotStream<T> {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<EatsResult<T>>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            receiver,
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Stop deliveries and release the store feed
    ///
    /// Calling it more than once has no further effect. Queued deliveries are
    /// discarded.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            // The pump may already have exited
            let _ = tx.send(());
            self.receiver.close();
        }
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }
}

impl<T> Stream for SnapshotStream<T> {
    type Item = EatsResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel_tx.is_none() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for SnapshotStream<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Forward a store feed through `map` until cancelled or the feed fails
fn spawn_pump<T, M>(mut feed: DocumentFeed, map: M) -> SnapshotStream<T>
where
    T: Send + 'static,
    M: Fn(&[Document]) -> EatsResult<T> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    debug!("snapshot stream cancelled");
                    break;
                }
                item = feed.next() => match item {
                    Some(Ok(docs)) => {
                        if tx.send(map(&docs)).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "store feed failed");
                        let _ = tx.send(Err(e));
                        break;
                    }
                    None => break,
                }
            }
        }
        // Dropping the feed here releases the store listener
    });

    SnapshotStream::new(rx, cancel_tx)
}

struct Shared<H> {
    cancelled: AtomicBool,
    wake: Notify,
    handler: Mutex<Option<H>>,
}

/// Handle to a handler-based subscription
///
/// Deliveries for one subscription are made one at a time, in order, from a
/// background task. Cancelling (or dropping the handle) stops further
/// deliveries; a delivery already running when `cancel` is called may finish.
pub struct Subscription {
    cancel: Box<dyn Fn() + Send + Sync>,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    fn spawn<T, H>(mut stream: SnapshotStream<T>, handler: H) -> Self
    where
        T: Send + 'static,
        H: FnMut(EatsResult<T>) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
            handler: Mutex::new(Some(handler)),
        });
        let cancelled = Arc::new(AtomicBool::new(false));

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = task_shared.wake.notified() => break,
                    item = stream.next() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };

                let Ok(mut guard) = task_shared.handler.lock() else {
                    break;
                };
                if task_shared.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                match guard.as_mut() {
                    Some(handler) => handler(item),
                    None => break,
                }
            }
            stream.cancel();
            debug!("subscription finished");
        });

        let flag = Arc::clone(&cancelled);
        let cancel = move || {
            if shared.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            flag.store(true, Ordering::SeqCst);
            shared.wake.notify_one();
            // Release the handler now unless it is mid-delivery
            if let Ok(mut guard) = shared.handler.try_lock() {
                guard.take();
            }
        };

        Self {
            cancel: Box::new(cancel),
            cancelled,
        }
    }

    /// Stop deliveries and release the store feed
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        (self.cancel)();
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Opens live subscriptions over restaurants and reviews
#[derive(Clone)]
pub struct SnapshotSubscriber<S: DocumentStore> {
    store: S,
    builder: QueryFilterBuilder,
}

impl<S: DocumentStore> SnapshotSubscriber<S> {
    /// Subscriber over the restaurants collection
    pub fn new(store: S) -> Self {
        Self {
            store,
            builder: QueryFilterBuilder::new(),
        }
    }

    /// Stream of a restaurant query's results
    ///
    /// # Errors
    /// Store errors raised while opening the feed.
    pub async fn query(&self, query: Query) -> EatsResult<SnapshotStream<Vec<Restaurant>>> {
        debug!(collection = %query.collection(), "opening restaurant query subscription");
        let feed = self.store.listen(ListenTarget::Query(query)).await?;
        Ok(spawn_pump(feed, DocumentMapper::restaurants))
    }

    /// Stream of filtered restaurants, in filter order
    pub async fn restaurants(&self, filter: &FilterRequest) -> EatsResult<SnapshotStream<Vec<Restaurant>>> {
        self.query(self.builder.build(filter)).await
    }

    /// Stream of one restaurant; `None` while it does not exist
    ///
    /// # Errors
    /// `InvalidArgument` if `restaurant_id` is empty.
    pub async fn restaurant(&self, restaurant_id: &str) -> EatsResult<SnapshotStream<Option<Restaurant>>> {
        let path = restaurants_collection().doc(non_empty_id(restaurant_id)?)?;
        debug!(restaurant = %path, "opening restaurant subscription");
        let feed = self.store.listen(ListenTarget::Document(path)).await?;
        Ok(spawn_pump(feed, |docs: &[Document]| {
            docs.first().map(DocumentMapper::restaurant).transpose()
        }))
    }

    /// Stream of a restaurant's reviews, newest first
    ///
    /// # Errors
    /// `InvalidArgument` if `restaurant_id` is empty.
    pub async fn reviews(&self, restaurant_id: &str) -> EatsResult<SnapshotStream<Vec<Review>>> {
        let ratings = restaurants_collection()
            .doc(non_empty_id(restaurant_id)?)?
            .collection(RATINGS)?;
        debug!(collection = %ratings, "opening review subscription");
        let feed = self
            .store
            .listen(ListenTarget::Query(reviews_query(ratings)))
            .await?;
        Ok(spawn_pump(feed, DocumentMapper::reviews))
    }

    /// Invoke `handler` with every change to a restaurant query
    pub async fn subscribe<H>(&self, query: Query, handler: H) -> EatsResult<Subscription>
    where
        H: FnMut(EatsResult<Vec<Restaurant>>) + Send + 'static,
    {
        Ok(Subscription::spawn(self.query(query).await?, handler))
    }

    /// Invoke `handler` with every change to the filtered restaurants
    pub async fn subscribe_restaurants<H>(&self, filter: &FilterRequest, handler: H) -> EatsResult<Subscription>
    where
        H: FnMut(EatsResult<Vec<Restaurant>>) + Send + 'static,
    {
        Ok(Subscription::spawn(self.restaurants(filter).await?, handler))
    }

    /// Invoke `handler` with every change to one restaurant
    pub async fn subscribe_restaurant<H>(&self, restaurant_id: &str, handler: H) -> EatsResult<Subscription>
    where
        H: FnMut(EatsResult<Option<Restaurant>>) + Send + 'static,
    {
        Ok(Subscription::spawn(self.restaurant(restaurant_id).await?, handler))
    }

    /// Invoke `handler` with every change to a restaurant's reviews
    pub async fn subscribe_reviews<H>(&self, restaurant_id: &str, handler: H) -> EatsResult<Subscription>
    where
        H: FnMut(EatsResult<Vec<Review>>) + Send + 'static,
    {
        Ok(Subscription::spawn(self.reviews(restaurant_id).await?, handler))
    }
}

fn non_empty_id(id: &str) -> EatsResult<&str> {
    if id.trim().is_empty() {
        return Err(EatsError::invalid_argument("No restaurant ID has been provided"));
    }
    Ok(id)
}
