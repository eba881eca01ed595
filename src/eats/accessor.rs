//! One-shot restaurant and review reads, plus the non-aggregate writes

use super::filter::{restaurants_collection, reviews_query, QueryFilterBuilder, RATINGS};
use super::mapper::{field, DocumentMapper};
use super::model::{FilterRequest, NewRestaurant, Restaurant, Review};
use crate::error::{EatsError, EatsResult};
use crate::store::{DocumentPath, DocumentStore, Fields, Timestamp, Value, Write};
use tracing::{debug, info};

/// Fetches restaurants and reviews from the store
#[derive(Clone)]
pub struct CollectionAccessor<S: DocumentStore> {
    store: S,
    builder: QueryFilterBuilder,
}

impl<S: DocumentStore> CollectionAccessor<S> {
    /// Accessor over the restaurants collection
    pub fn new(store: S) -> Self {
        Self {
            store,
            builder: QueryFilterBuilder::new(),
        }
    }

    /// Store handle in use
    pub fn store(&self) -> &S {
        &self.store
    }

    fn restaurant_path(restaurant_id: &str) -> EatsResult<DocumentPath> {
        if restaurant_id.trim().is_empty() {
            return Err(EatsError::invalid_argument("No restaurant ID has been provided"));
        }
        restaurants_collection().doc(restaurant_id)
    }

    /// Restaurants matching a filter, in the filter's order
    ///
    /// Returns an empty list when nothing matches.
    pub async fn list(&self, filter: &FilterRequest) -> EatsResult<Vec<Restaurant>> {
        let query = self.builder.build(filter);
        let docs = self.store.run_query(&query).await?;
        debug!(matches = docs.len(), "listed restaurants");
        DocumentMapper::restaurants(&docs)
    }

    /// One restaurant by id
    ///
    /// # Errors
    /// `InvalidArgument` for an empty id, `NotFound` if it does not exist.
    pub async fn get_by_id(&self, restaurant_id: &str) -> EatsResult<Restaurant> {
        let path = Self::restaurant_path(restaurant_id)?;
        match self.store.get_document(&path).await? {
            Some(doc) => DocumentMapper::restaurant(&doc),
            None => Err(EatsError::not_found(format!("restaurant {}", restaurant_id))),
        }
    }

    /// Reviews of a restaurant, newest first
    ///
    /// Returns an empty list if the restaurant has no reviews.
    pub async fn list_reviews(&self, restaurant_id: &str) -> EatsResult<Vec<Review>> {
        let ratings = Self::restaurant_path(restaurant_id)?.collection(RATINGS)?;
        let docs = self.store.run_query(&reviews_query(ratings)).await?;
        DocumentMapper::reviews(&docs)
    }

    /// Point a restaurant at a new photo URL
    ///
    /// Only the `photo` field is written.
    ///
    /// # Errors
    /// `NotFound` if the restaurant does not exist.
    pub async fn update_photo(&self, restaurant_id: &str, photo_url: &str) -> EatsResult<()> {
        let path = Self::restaurant_path(restaurant_id)?;
        let mut fields = Fields::new();
        fields.insert(field::PHOTO.to_string(), Value::from(photo_url));

        self.store.commit(vec![Write::Update { path, fields }]).await?;
        info!(restaurant_id, "updated restaurant photo");
        Ok(())
    }

    /// Create a restaurant with an empty rating aggregate
    ///
    /// Returns the new restaurant's id.
    pub async fn add_restaurant(&self, restaurant: &NewRestaurant) -> EatsResult<String> {
        let path = restaurants_collection().new_doc();
        let fields = DocumentMapper::new_restaurant_fields(restaurant, Timestamp::now());
        self.store
            .commit(vec![Write::Set {
                path: path.clone(),
                fields,
            }])
            .await?;
        debug!(restaurant = %path, name = %restaurant.name, "added restaurant");
        Ok(path.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eats::model::PriceTier;
    use crate::store::memory::fields;
    use crate::store::MemoryStore;

    fn pizza() -> NewRestaurant {
        NewRestaurant {
            name: "Slice".to_string(),
            category: "Pizza".to_string(),
            city: "Naples".to_string(),
            price: PriceTier::One,
            photo: None,
        }
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let accessor = CollectionAccessor::new(MemoryStore::new());
        let id = accessor.add_restaurant(&pizza()).await.unwrap();

        let restaurant = accessor.get_by_id(&id).await.unwrap();
        assert_eq!(restaurant.name, "Slice");
        assert_eq!(restaurant.num_ratings, 0);
        assert_eq!(restaurant.avg_rating, 0.0);
    }

    #[tokio::test]
    async fn test_get_by_id_errors() {
        let accessor = CollectionAccessor::new(MemoryStore::new());
        assert!(matches!(
            accessor.get_by_id("").await,
            Err(EatsError::InvalidArgument(_))
        ));
        assert!(matches!(
            accessor.get_by_id("missing").await,
            Err(EatsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_photo() {
        let accessor = CollectionAccessor::new(MemoryStore::new());
        let id = accessor.add_restaurant(&pizza()).await.unwrap();

        accessor.update_photo(&id, "https://img/slice.png").await.unwrap();
        let restaurant = accessor.get_by_id(&id).await.unwrap();
        assert_eq!(restaurant.photo.as_deref(), Some("https://img/slice.png"));
        assert_eq!(restaurant.name, "Slice");

        assert!(matches!(
            accessor.update_photo("missing", "https://img/x.png").await,
            Err(EatsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_reviews_empty_and_invalid() {
        let accessor = CollectionAccessor::new(MemoryStore::new());
        let id = accessor.add_restaurant(&pizza()).await.unwrap();
        assert!(accessor.list_reviews(&id).await.unwrap().is_empty());
        assert!(matches!(
            accessor.list_reviews("").await,
            Err(EatsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_string_price_decodes_but_is_not_price_filtered() {
        let store = MemoryStore::new();
        store
            .commit(vec![Write::Set {
                path: DocumentPath::new("restaurants/legacy").unwrap(),
                fields: fields([
                    ("name", Value::from("Old Diner")),
                    ("city", Value::from("London")),
                    ("price", Value::from("$$")),
                    ("numRatings", Value::Integer(0)),
                    ("sumRating", Value::Double(0.0)),
                    ("avgRating", Value::Double(0.0)),
                    ("timestamp", Value::Timestamp(Timestamp::now())),
                ]),
            }])
            .await
            .unwrap();
        let accessor = CollectionAccessor::new(store);
        let mut current = pizza();
        current.name = "New Diner".to_string();
        current.price = PriceTier::Two;
        accessor.add_restaurant(&current).await.unwrap();

        let legacy = accessor.get_by_id("legacy").await.unwrap();
        assert_eq!(legacy.price, PriceTier::Two);

        let filtered = accessor
            .list(&FilterRequest::new().with_price(PriceTier::Two))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "New Diner");
        assert_eq!(accessor.list(&FilterRequest::new()).await.unwrap().len(), 2);
    }
}
