//! FriendlyEats data-access layer
//!
//! Restaurant listings, atomic review aggregation, and live updates over a
//! Firestore-style document store.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), friendlyeats_store::EatsError> {
//! use friendlyeats_store::eats::{CollectionAccessor, FilterRequest, NewReview, TransactionalAggregator};
//! use friendlyeats_store::store::{RestStore, Settings};
//!
//! let store = RestStore::new(Settings::from_env()?)?;
//! let restaurants = CollectionAccessor::new(store.clone())
//!     .list(&FilterRequest::from_params([("category", "Pizza")])?)
//!     .await?;
//!
//! if let Some(first) = restaurants.first() {
//!     TransactionalAggregator::new(store)
//!         .submit_review(&first.id, NewReview::new(5, "Great crust", "Ada"))
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

// Document store engines
pub mod store;

// Restaurant and review components
pub mod eats;

// Sample data
pub mod seed;

// Re-exports for convenience
pub use error::{EatsError, EatsResult};

pub use eats::{
    CollectionAccessor, FilterRequest, NewRestaurant, NewReview, PriceTier, QueryFilterBuilder,
    Restaurant, Review, SnapshotStream, SnapshotSubscriber, SortMode, Subscription,
    TransactionalAggregator,
};
pub use store::{DocumentStore, MemoryStore, RestStore, Settings, TransactionOptions};
