//! Sample data for development stores
//!
//! [`generate`] builds restaurants with a handful of reviews each. The stored
//! aggregate of every generated restaurant is computed from its reviews, so a
//! seeded store looks exactly as if the reviews had been submitted one by one.
//! [`populate`] writes the data; a restaurant that fails to write is logged
//! and skipped.

use crate::eats::filter::{restaurants_collection, RATINGS};
use crate::eats::mapper::{average, DocumentMapper};
use crate::eats::model::{NewRestaurant, NewReview, PriceTier};
use crate::error::EatsResult;
use crate::store::{DocumentStore, Timestamp, Write};
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

const NAME_PREFIXES: &[&str] = &[
    "Savory", "Spicy", "Sweet", "Tasty", "Golden", "Hungry", "Lucky", "Rustic", "Urban", "Cozy",
];
const NAME_SUFFIXES: &[&str] = &[
    "Bar", "Fire", "Grill", "Drive Thru", "Place", "Best", "Spot", "Kitchen", "Eatin'", "Garden",
];
const CATEGORIES: &[&str] = &[
    "Brunch", "Burgers", "Coffee", "Deli", "Dim Sum", "Indian", "Italian", "Mediterranean",
    "Mexican", "Pizza", "Ramen", "Sushi",
];
const CITIES: &[&str] = &[
    "Albuquerque", "Arlington", "Atlanta", "Austin", "Boston", "Charlotte", "Chicago", "Denver",
    "London", "Los Angeles", "New York", "Paris", "Portland", "San Francisco", "Seattle",
];
const USER_NAMES: &[&str] = &["Ada", "Grace", "Linus", "Margaret", "Dennis", "Barbara", "Ken"];
const REVIEW_TEXTS: &[(i64, &str)] = &[
    (1, "Would never eat here again!"),
    (2, "Not my cup of tea."),
    (3, "Exactly okay :/"),
    (4, "Actually pretty good, would recommend!"),
    (5, "This is my favorite place. Literally the best."),
];
const MAX_REVIEWS: usize = 5;
const PHOTO_COUNT: u32 = 22;

/// A review to be seeded
#[derive(Debug, Clone)]
pub struct SeedReview {
    /// Review contents
    pub review: NewReview,
    /// When it was written
    pub timestamp: Timestamp,
}

/// A restaurant to be seeded, with its reviews
#[derive(Debug, Clone)]
pub struct SeedRestaurant {
    /// Restaurant contents
    pub restaurant: NewRestaurant,
    /// Creation time
    pub timestamp: Timestamp,
    /// Reviews, oldest first
    pub reviews: Vec<SeedReview>,
}

impl SeedRestaurant {
    /// Number of reviews
    pub fn num_ratings(&self) -> u64 {
        self.reviews.len() as u64
    }

    /// Sum of review ratings
    pub fn sum_rating(&self) -> f64 {
        self.reviews.iter().map(|r| r.review.rating as f64).sum()
    }

    /// Mean review rating, 0 without reviews
    pub fn avg_rating(&self) -> f64 {
        average(self.sum_rating(), self.num_ratings())
    }
}

/// Outcome of [`populate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Restaurants written
    pub restaurants: usize,
    /// Reviews written
    pub reviews: usize,
    /// Restaurants that could not be written
    pub failures: usize,
}

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

/// Generate `count` restaurants with random reviews
pub fn generate<R: Rng>(count: usize, rng: &mut R) -> Vec<SeedRestaurant> {
    let now = Utc::now();
    (0..count)
        .map(|_| {
            let created = now - Duration::days(rng.gen_range(30..365));
            let restaurant = NewRestaurant {
                name: format!("{} {}", pick(rng, NAME_PREFIXES), pick(rng, NAME_SUFFIXES)),
                category: pick(rng, CATEGORIES).to_string(),
                city: pick(rng, CITIES).to_string(),
                price: PriceTier::ALL[rng.gen_range(0..PriceTier::ALL.len())],
                photo: Some(format!(
                    "https://storage.googleapis.com/firestorequickstarts.appspot.com/food_{}.png",
                    rng.gen_range(1..=PHOTO_COUNT)
                )),
            };

            let review_count = rng.gen_range(0..=MAX_REVIEWS);
            let mut reviews: Vec<SeedReview> = (0..review_count)
                .map(|_| {
                    let (rating, text) = REVIEW_TEXTS[rng.gen_range(0..REVIEW_TEXTS.len())];
                    let written = created + Duration::minutes(rng.gen_range(1..60 * 24 * 30));
                    SeedReview {
                        review: NewReview::new(rating, text, pick(rng, USER_NAMES)),
                        timestamp: Timestamp::from_datetime(written),
                    }
                })
                .collect();
            reviews.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

            SeedRestaurant {
                restaurant,
                timestamp: Timestamp::from_datetime(created),
                reviews,
            }
        })
        .collect()
}

async fn write_restaurant<S: DocumentStore>(store: &S, seed: &SeedRestaurant) -> EatsResult<usize> {
    let path = restaurants_collection().new_doc();
    let mut fields = DocumentMapper::new_restaurant_fields(&seed.restaurant, seed.timestamp);
    fields.extend(DocumentMapper::rating_fields(seed.num_ratings(), seed.sum_rating()));
    store
        .commit(vec![Write::Set {
            path: path.clone(),
            fields,
        }])
        .await?;

    let ratings = path.collection(RATINGS)?;
    for review in &seed.reviews {
        store
            .commit(vec![Write::Set {
                path: ratings.new_doc(),
                fields: DocumentMapper::review_fields(&review.review, review.timestamp),
            }])
            .await?;
    }
    Ok(seed.reviews.len())
}

/// Write seed data to a store
///
/// Each restaurant is written before its reviews. Failures are counted in the
/// report rather than aborting the run.
pub async fn populate<S: DocumentStore>(store: &S, data: &[SeedRestaurant]) -> SeedReport {
    let mut report = SeedReport::default();
    for seed in data {
        match write_restaurant(store, seed).await {
            Ok(reviews) => {
                report.restaurants += 1;
                report.reviews += reviews;
            }
            Err(e) => {
                warn!(name = %seed.restaurant.name, error = %e, "There was an error adding the document");
                report.failures += 1;
            }
        }
    }
    info!(
        restaurants = report.restaurants,
        reviews = report.reviews,
        failures = report.failures,
        "seeding finished"
    );
    report
}
