//! Atomic review submission
//!
//! A review and the rating aggregate it contributes to are written in one
//! serializable transaction: the restaurant's `numRatings` and `sumRating` are
//! read, the new totals computed, and both the aggregate update and the review
//! document committed together. Losing a race re-runs the whole cycle.

use super::filter::{restaurants_collection, RATINGS};
use super::mapper::DocumentMapper;
use super::model::NewReview;
use crate::error::{EatsError, EatsResult};
use crate::store::{run_transaction, Document, DocumentStore, Timestamp, TransactionOptions};
use tracing::{debug, info};

/// Rating aggregate after a review was accepted
#[derive(Debug, Clone, Copy, PartialEq)]
struct Totals {
    num_ratings: u64,
    sum_rating: f64,
}

/// Appends reviews and keeps restaurant rating statistics consistent
#[derive(Clone)]
pub struct TransactionalAggregator<S: DocumentStore> {
    store: S,
    options: TransactionOptions,
}

impl<S: DocumentStore> TransactionalAggregator<S> {
    /// Aggregator using the store's configured retry options
    pub fn new(store: S) -> Self {
        let options = store.transaction_options();
        Self::with_options(store, options)
    }

    /// Aggregator with explicit retry options
    pub fn with_options(store: S, options: TransactionOptions) -> Self {
        Self { store, options }
    }

    /// Retry options in use
    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Add a review to a restaurant and update its rating aggregate
    ///
    /// Returns the id of the new review. The review is stamped with the
    /// current time.
    ///
    /// # Errors
    /// - `InvalidArgument` if `restaurant_id` is empty
    /// - `NotFound` if the restaurant does not exist (nothing is written)
    /// - `TransactionConflict` if every attempt lost a concurrent race
    /// - `MalformedRecord` if the stored aggregate fields are not numeric
    ///
    /// # Example
    /// ```no_run
    /// # use friendlyeats_store::eats::{NewReview, TransactionalAggregator};
    /// # use friendlyeats_store::store::MemoryStore;
    /// # async fn example(store: MemoryStore) -> Result<(), friendlyeats_store::EatsError> {
    /// let aggregator = TransactionalAggregator::new(store);
    /// let review_id = aggregator
    ///     .submit_review("abc", NewReview::new(5, "Best pho in town", "Sam"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_review(&self, restaurant_id: &str, review: NewReview) -> EatsResult<String> {
        if restaurant_id.trim().is_empty() {
            return Err(EatsError::invalid_argument("No restaurant ID has been provided"));
        }

        let restaurant_path = restaurants_collection().doc(restaurant_id)?;
        // Allocated once so every attempt targets the same review document
        let review_path = restaurant_path.collection(RATINGS)?.new_doc();
        let review = &review;

        let totals = run_transaction(&self.store, &self.options, |txn| {
            let restaurant_path = restaurant_path.clone();
            let review_path = review_path.clone();
            async move {
                let Some(restaurant) = txn.get(&restaurant_path).await? else {
                    return Err(EatsError::not_found(format!(
                        "restaurant {}",
                        restaurant_path.id()
                    )));
                };

                let current = read_totals(&restaurant)?;
                let next = Totals {
                    num_ratings: current.num_ratings + 1,
                    sum_rating: current.sum_rating + review.rating as f64,
                };
                debug!(
                    restaurant = %restaurant_path,
                    num_ratings = next.num_ratings,
                    "computed rating aggregate"
                );

                txn.update(
                    restaurant_path,
                    DocumentMapper::rating_fields(next.num_ratings, next.sum_rating),
                )?;
                txn.set(review_path, DocumentMapper::review_fields(review, Timestamp::now()))?;
                Ok(next)
            }
        })
        .await?;

        info!(
            restaurant_id,
            review_id = review_path.id(),
            num_ratings = totals.num_ratings,
            "review submitted"
        );
        Ok(review_path.id().to_string())
    }
}

/// Current aggregate; absent fields count as zero
fn read_totals(doc: &Document) -> EatsResult<Totals> {
    let (num_ratings, sum_rating) = DocumentMapper::rating_totals(doc)?;
    Ok(Totals { num_ratings, sum_rating })
}
