//! Restaurant and review value objects
//!
//! These are the normalized shapes handed to callers. They are plain data:
//! serializable (camelCase, matching the stored field names) and free of any
//! store-native types.

use crate::error::{EatsError, EatsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Restaurant price tier
///
/// Stored as its ordinal (1–4). Callers see the length-encoded symbol form
/// (`"$"` .. `"$$$$"`), which is also what serde produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PriceTier {
    /// `$`
    One = 1,
    /// `$$`
    Two = 2,
    /// `$$$`
    Three = 3,
    /// `$$$$`
    Four = 4,
}

impl PriceTier {
    /// All tiers, cheapest first
    pub const ALL: [PriceTier; 4] = [PriceTier::One, PriceTier::Two, PriceTier::Three, PriceTier::Four];

    /// Tier for a stored ordinal
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    /// Parse the symbol form: one to four `$` characters
    ///
    /// # Errors
    /// `InvalidArgument` for anything else.
    pub fn from_symbols(symbols: &str) -> EatsResult<Self> {
        let symbols = symbols.trim();
        if symbols.is_empty() || !symbols.chars().all(|c| c == '$') {
            return Err(EatsError::invalid_argument(format!(
                "price must be one to four '$' symbols, got {:?}",
                symbols
            )));
        }
        Self::from_ordinal(symbols.len() as i64).ok_or_else(|| {
            EatsError::invalid_argument(format!("price tier {:?} is out of range", symbols))
        })
    }

    /// Stored ordinal, 1–4
    pub fn ordinal(self) -> i64 {
        self as i64
    }

    /// Symbol form, `"$"` .. `"$$$$"`
    pub fn symbols(self) -> &'static str {
        match self {
            Self::One => "$",
            Self::Two => "$$",
            Self::Three => "$$$",
            Self::Four => "$$$$",
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbols())
    }
}

impl TryFrom<String> for PriceTier {
    type Error = EatsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_symbols(&value)
    }
}

impl From<PriceTier> for String {
    fn from(tier: PriceTier) -> Self {
        tier.symbols().to_string()
    }
}

/// A restaurant with its rating aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    /// Store-assigned id
    pub id: String,
    /// Display name
    pub name: String,
    /// Cuisine, e.g. "Pizza"
    pub category: String,
    /// City the restaurant is in
    pub city: String,
    /// Price tier
    pub price: PriceTier,
    /// Photo URL, if one has been uploaded
    pub photo: Option<String>,
    /// Number of accepted reviews
    pub num_ratings: u64,
    /// Sum of all accepted ratings
    pub sum_rating: f64,
    /// `sum_rating / num_ratings`, or 0 when there are no ratings
    pub avg_rating: f64,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

/// A review of a restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Store-assigned id
    pub id: String,
    /// Star rating, expected 1–5
    pub rating: i64,
    /// Review body
    pub text: String,
    /// Display name of the author
    pub user_name: String,
    /// Author identifier, when the submitting client supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Time the review was written, assigned by the data layer
    pub timestamp: DateTime<Utc>,
}

/// Review contents supplied by a caller
///
/// Carries no timestamp: the time is assigned when the review is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    /// Star rating, expected 1–5
    pub rating: i64,
    /// Review body
    pub text: String,
    /// Display name of the author
    pub user_name: String,
    /// Author identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl NewReview {
    /// Create a review without an author id
    pub fn new(rating: i64, text: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            rating,
            text: text.into(),
            user_name: user_name.into(),
            user_id: None,
        }
    }

    /// Attach the author's user id
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Restaurant contents supplied by a caller
///
/// The rating aggregate starts at zero and the timestamp is assigned on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRestaurant {
    /// Display name
    pub name: String,
    /// Cuisine
    pub category: String,
    /// City
    pub city: String,
    /// Price tier
    pub price: PriceTier,
    /// Photo URL
    #[serde(default)]
    pub photo: Option<String>,
}

/// Result ordering for restaurant listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortMode {
    /// Highest average rating first
    #[default]
    Rating,
    /// Most reviews first
    Review,
}

impl SortMode {
    /// Parse a sort parameter
    ///
    /// `"Review"` selects [`SortMode::Review`]; anything else, including
    /// unrecognized values, falls back to [`SortMode::Rating`].
    pub fn from_param(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("review") {
            Self::Review
        } else {
            Self::Rating
        }
    }
}

/// Caller-supplied restaurant filter
///
/// Every field is optional; an empty request selects every restaurant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRequest {
    /// Only this category
    pub category: Option<String>,
    /// Only this city
    pub city: Option<String>,
    /// Only this price tier
    pub price: Option<PriceTier>,
    /// Result ordering; `Rating` when absent
    pub sort: Option<SortMode>,
}

impl FilterRequest {
    /// Request that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict to a city
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Restrict to a price tier
    pub fn with_price(mut self, price: PriceTier) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the ordering
    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Build a request from URL-style query parameters
    ///
    /// Recognized keys are `category`, `city`, `price` and `sort`; other keys
    /// are ignored. Empty values count as absent.
    ///
    /// # Errors
    /// `InvalidArgument` if `price` is present but is not one to four `$`.
    ///
    /// # Example
    /// ```
    /// use friendlyeats_store::eats::{FilterRequest, PriceTier, SortMode};
    ///
    /// let filter = FilterRequest::from_params([("city", "London"), ("price", "$$"), ("sort", "Review")])?;
    /// assert_eq!(filter.city.as_deref(), Some("London"));
    /// assert_eq!(filter.price, Some(PriceTier::Two));
    /// assert_eq!(filter.sort, Some(SortMode::Review));
    /// # Ok::<(), friendlyeats_store::EatsError>(())
    /// ```
    pub fn from_params<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> EatsResult<Self> {
        let mut filter = Self::default();
        for (key, value) in params {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "category" => filter.category = Some(value.to_string()),
                "city" => filter.city = Some(value.to_string()),
                "price" => filter.price = Some(PriceTier::from_symbols(value)?),
                "sort" => filter.sort = Some(SortMode::from_param(value)),
                _ => {}
            }
        }
        Ok(filter)
    }

    /// Effective sort mode
    pub fn sort_mode(&self) -> SortMode {
        self.sort.unwrap_or_default()
    }
}
