//! Integration tests against Firestore over REST
//!
//! These tests talk to a real Firestore database or the local emulator and
//! require:
//! 1. `FIRESTORE_PROJECT_ID` plus either `FIRESTORE_EMULATOR_HOST` or
//!    `FIRESTORE_ID_TOKEN`, set in the environment or a `.env` file
//! 2. Run with: cargo test --features integration-tests --test rest_integration -- --test-threads=1
//!
//! Each test writes restaurants into a city name unique to the run, so runs
//! do not see each other's data.

#![cfg(feature = "integration-tests")]

use friendlyeats_store::eats::{
    CollectionAccessor, FilterRequest, NewRestaurant, NewReview, PriceTier, SnapshotSubscriber,
    SortMode, TransactionalAggregator,
};
use friendlyeats_store::store::{RestStore, Settings};
use friendlyeats_store::EatsError;
use futures::StreamExt;
use std::time::Duration;

/// Load environment variables from .env file
fn load_env() {
    dotenvy::dotenv().ok();
}

fn store() -> RestStore {
    load_env();
    let mut settings = Settings::from_env().expect("FIRESTORE_PROJECT_ID must be set in .env file");
    settings.listen_poll_interval = Duration::from_millis(250);
    RestStore::new(settings).expect("Failed to create REST store")
}

/// City name unique to this test run
fn test_city(test_name: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    format!("test_{}_{}_{}", test_name, timestamp, rand::random::<u32>())
}

fn restaurant(name: &str, city: &str, price: PriceTier) -> NewRestaurant {
    NewRestaurant {
        name: name.to_string(),
        category: "Integration".to_string(),
        city: city.to_string(),
        price,
        photo: None,
    }
}

#[tokio::test]
async fn test_add_review_and_read_back() {
    let store = store();
    let accessor = CollectionAccessor::new(store.clone());
    let aggregator = TransactionalAggregator::new(store);
    let city = test_city("review");

    let id = accessor
        .add_restaurant(&restaurant("Aggregated", &city, PriceTier::Two))
        .await
        .expect("Failed to add restaurant");

    aggregator
        .submit_review(&id, NewReview::new(4, "Good", "Ada"))
        .await
        .expect("Failed to submit first review");
    aggregator
        .submit_review(&id, NewReview::new(2, "Meh", "Bob").with_user_id("bob-1"))
        .await
        .expect("Failed to submit second review");

    let fetched = accessor.get_by_id(&id).await.expect("Failed to get restaurant");
    assert_eq!(fetched.num_ratings, 2);
    assert!((fetched.sum_rating - 6.0).abs() < 1e-9);
    assert!((fetched.avg_rating - 3.0).abs() < 1e-9);

    let reviews = accessor.list_reviews(&id).await.expect("Failed to list reviews");
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].text, "Meh");
    assert_eq!(reviews[0].user_id.as_deref(), Some("bob-1"));
}

#[tokio::test]
async fn test_filtered_listing() {
    let store = store();
    let accessor = CollectionAccessor::new(store.clone());
    let aggregator = TransactionalAggregator::new(store);
    let city = test_city("filter");

    let cheap = accessor
        .add_restaurant(&restaurant("Cheap", &city, PriceTier::One))
        .await
        .expect("Failed to add restaurant");
    let fancy = accessor
        .add_restaurant(&restaurant("Fancy", &city, PriceTier::Four))
        .await
        .expect("Failed to add restaurant");
    let other = accessor
        .add_restaurant(&restaurant("Also cheap", &city, PriceTier::One))
        .await
        .expect("Failed to add restaurant");

    aggregator.submit_review(&cheap, NewReview::new(5, "", "Ada")).await.unwrap();
    aggregator.submit_review(&other, NewReview::new(2, "", "Ada")).await.unwrap();
    aggregator.submit_review(&other, NewReview::new(3, "", "Ada")).await.unwrap();

    // Composite index on (city, price, avgRating) may be required on a real project
    let by_rating = accessor
        .list(&FilterRequest::new().with_city(&city).with_price(PriceTier::One))
        .await
        .expect("Failed to list restaurants");
    let ids: Vec<&str> = by_rating.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, [cheap.as_str(), other.as_str()]);

    let by_reviews = accessor
        .list(&FilterRequest::new().with_city(&city).with_sort(SortMode::Review))
        .await
        .expect("Failed to list restaurants");
    assert_eq!(by_reviews.len(), 3);
    assert_eq!(by_reviews[0].id, other);
    assert_eq!(by_reviews[2].id, fancy);
}

#[tokio::test]
async fn test_missing_restaurant() {
    let store = store();
    let accessor = CollectionAccessor::new(store.clone());
    let missing = format!("missing-{}", rand::random::<u32>());

    assert!(matches!(
        accessor.get_by_id(&missing).await,
        Err(EatsError::NotFound(_))
    ));
    assert!(matches!(
        TransactionalAggregator::new(store)
            .submit_review(&missing, NewReview::new(1, "", "Ada"))
            .await,
        Err(EatsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_live_restaurant_updates() {
    let store = store();
    let accessor = CollectionAccessor::new(store.clone());
    let city = test_city("live");
    let id = accessor
        .add_restaurant(&restaurant("Live", &city, PriceTier::Three))
        .await
        .expect("Failed to add restaurant");

    let subscriber = SnapshotSubscriber::new(store.clone());
    let mut stream = subscriber.restaurant(&id).await.expect("Failed to subscribe");
    let initial = stream.next().await.unwrap().unwrap().expect("restaurant should exist");
    assert!(initial.photo.is_none());

    accessor
        .update_photo(&id, "https://example.com/live.png")
        .await
        .expect("Failed to update photo");

    let updated = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("no update within timeout")
        .unwrap()
        .unwrap()
        .expect("restaurant should exist");
    assert_eq!(updated.photo.as_deref(), Some("https://example.com/live.png"));
}
