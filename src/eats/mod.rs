//! FriendlyEats data access
//!
//! Restaurant listing, review submission, and live updates built on any
//! [`DocumentStore`](crate::store::DocumentStore). Every component takes a
//! store handle explicitly; clone the handle to share one store.
//!
//! # Example
//! ```no_run
//! use friendlyeats_store::eats::{CollectionAccessor, FilterRequest, NewReview, TransactionalAggregator};
//! use friendlyeats_store::store::MemoryStore;
//!
//! # async fn example() -> Result<(), friendlyeats_store::EatsError> {
//! let store = MemoryStore::new();
//! let accessor = CollectionAccessor::new(store.clone());
//! let aggregator = TransactionalAggregator::new(store);
//!
//! let filter = FilterRequest::from_params([("city", "London"), ("sort", "Review")])?;
//! for restaurant in accessor.list(&filter).await? {
//!     aggregator
//!         .submit_review(&restaurant.id, NewReview::new(5, "Lovely", "Kim"))
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod aggregator;
pub mod filter;
pub mod mapper;
pub mod model;
pub mod subscriber;

pub use accessor::CollectionAccessor;
pub use aggregator::TransactionalAggregator;
pub use filter::{QueryFilterBuilder, RATINGS, RESTAURANTS};
pub use mapper::DocumentMapper;
pub use model::{FilterRequest, NewRestaurant, NewReview, PriceTier, Restaurant, Review, SortMode};
pub use subscriber::{SnapshotStream, SnapshotSubscriber, Subscription};
