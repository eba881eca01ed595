//! Conversion between stored documents and value objects
//!
//! Decoding is tolerant where historical data varies (numbers stored as
//! integers or doubles, legacy `"$$"` price strings, absent aggregates) and
//! strict where a value object cannot be built: a missing timestamp or a field
//! of the wrong type yields `EatsError::MalformedRecord`.
//!
//! Legacy string prices decode to a [`PriceTier`], but the price filter
//! matches only the stored ordinal, so those records never appear in
//! price-filtered listings until rewritten.

use super::model::{NewRestaurant, NewReview, PriceTier, Restaurant, Review};
use crate::error::{EatsError, EatsResult};
use crate::store::{Document, Fields, Timestamp, Value};
use chrono::{DateTime, Utc};

/// Stored field names
#[allow(missing_docs)]
pub mod field {
    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const CITY: &str = "city";
    pub const PRICE: &str = "price";
    pub const PHOTO: &str = "photo";
    pub const NUM_RATINGS: &str = "numRatings";
    pub const SUM_RATING: &str = "sumRating";
    pub const AVG_RATING: &str = "avgRating";
    pub const TIMESTAMP: &str = "timestamp";
    pub const RATING: &str = "rating";
    pub const TEXT: &str = "text";
    pub const USER_NAME: &str = "userName";
    pub const USER_ID: &str = "userId";
}

/// Typed field access over one document, reporting errors against its path
struct FieldReader<'a> {
    doc: &'a Document,
}

impl<'a> FieldReader<'a> {
    fn malformed(&self, reason: String) -> EatsError {
        EatsError::malformed(self.doc.path.as_str(), reason)
    }

    fn wrong_type(&self, name: &str, expected: &str, found: &Value) -> EatsError {
        self.malformed(format!(
            "field {:?} should be {}, found {}",
            name,
            expected,
            found.type_name()
        ))
    }

    /// Present, non-null value
    fn present(&self, name: &str) -> Option<&'a Value> {
        self.doc.get(name).filter(|v| !v.is_null())
    }

    /// String field; absent reads as empty
    fn string(&self, name: &str) -> EatsResult<String> {
        Ok(self.optional_string(name)?.unwrap_or_default())
    }

    fn optional_string(&self, name: &str) -> EatsResult<Option<String>> {
        match self.present(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.wrong_type(name, "a string", value)),
        }
    }

    /// Numeric field accepting integer or double; absent reads as 0
    fn number(&self, name: &str) -> EatsResult<f64> {
        match self.present(name) {
            None => Ok(0.0),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| self.wrong_type(name, "a number", value)),
        }
    }

    /// Non-negative count; doubles are accepted when integral
    fn count(&self, name: &str) -> EatsResult<u64> {
        let value = self.number(name)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(self.malformed(format!(
                "field {:?} should be a non-negative whole number, found {}",
                name, value
            )));
        }
        Ok(value as u64)
    }

    fn integer(&self, name: &str) -> EatsResult<i64> {
        let Some(value) = self.present(name) else {
            return Err(self.malformed(format!("missing field {:?}", name)));
        };
        match value {
            Value::Integer(i) => Ok(*i),
            Value::Double(d) if d.fract() == 0.0 => Ok(*d as i64),
            other => Err(self.wrong_type(name, "an integer", other)),
        }
    }

    /// Stored ordinal, or a legacy `"$$"` string (not matched by price filters)
    fn price(&self) -> EatsResult<PriceTier> {
        let Some(value) = self.present(field::PRICE) else {
            return Err(self.malformed(format!("missing field {:?}", field::PRICE)));
        };
        let tier = match value {
            Value::Integer(i) => PriceTier::from_ordinal(*i),
            Value::Double(d) if d.fract() == 0.0 => PriceTier::from_ordinal(*d as i64),
            Value::String(symbols) => PriceTier::from_symbols(symbols).ok(),
            other => return Err(self.wrong_type(field::PRICE, "a price tier", other)),
        };
        tier.ok_or_else(|| self.malformed(format!("price {} is not a tier between 1 and 4", value_text(value))))
    }

    fn timestamp(&self) -> EatsResult<DateTime<Utc>> {
        let Some(value) = self.present(field::TIMESTAMP) else {
            return Err(self.malformed("missing timestamp".to_string()));
        };
        let timestamp = value
            .as_timestamp()
            .ok_or_else(|| self.wrong_type(field::TIMESTAMP, "a timestamp", value))?;
        timestamp
            .to_datetime()
            .ok_or_else(|| self.malformed("timestamp is out of range".to_string()))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::Integer(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        other => other.type_name().to_string(),
    }
}

/// Maps stored documents to value objects and back
pub struct DocumentMapper;

impl DocumentMapper {
    /// Rating aggregate of a restaurant document as `(numRatings, sumRating)`
    ///
    /// Absent fields read as zero. A negative or fractional count is
    /// `MalformedRecord`.
    pub fn rating_totals(doc: &Document) -> EatsResult<(u64, f64)> {
        let reader = FieldReader { doc };
        Ok((reader.count(field::NUM_RATINGS)?, reader.number(field::SUM_RATING)?))
    }

    /// Decode a restaurant document
    pub fn restaurant(doc: &Document) -> EatsResult<Restaurant> {
        let reader = FieldReader { doc };
        let num_ratings = reader.count(field::NUM_RATINGS)?;
        let sum_rating = reader.number(field::SUM_RATING)?;
        let avg_rating = match reader.present(field::AVG_RATING) {
            Some(_) => reader.number(field::AVG_RATING)?,
            None => average(sum_rating, num_ratings),
        };

        Ok(Restaurant {
            id: doc.id().to_string(),
            name: reader.string(field::NAME)?,
            category: reader.string(field::CATEGORY)?,
            city: reader.string(field::CITY)?,
            price: reader.price()?,
            photo: reader.optional_string(field::PHOTO)?,
            num_ratings,
            sum_rating,
            avg_rating,
            timestamp: reader.timestamp()?,
        })
    }

    /// Decode a review document
    pub fn review(doc: &Document) -> EatsResult<Review> {
        let reader = FieldReader { doc };
        Ok(Review {
            id: doc.id().to_string(),
            rating: reader.integer(field::RATING)?,
            text: reader.string(field::TEXT)?,
            user_name: reader.string(field::USER_NAME)?,
            user_id: reader.optional_string(field::USER_ID)?,
            timestamp: reader.timestamp()?,
        })
    }

    /// Decode every restaurant in a result set, preserving order
    pub fn restaurants(docs: &[Document]) -> EatsResult<Vec<Restaurant>> {
        docs.iter().map(Self::restaurant).collect()
    }

    /// Decode every review in a result set, preserving order
    pub fn reviews(docs: &[Document]) -> EatsResult<Vec<Review>> {
        docs.iter().map(Self::review).collect()
    }

    /// Fields for a freshly created restaurant with an empty aggregate
    pub fn new_restaurant_fields(restaurant: &NewRestaurant, timestamp: Timestamp) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::NAME.to_string(), restaurant.name.as_str().into());
        fields.insert(field::CATEGORY.to_string(), restaurant.category.as_str().into());
        fields.insert(field::CITY.to_string(), restaurant.city.as_str().into());
        fields.insert(field::PRICE.to_string(), Value::Integer(restaurant.price.ordinal()));
        fields.insert(field::PHOTO.to_string(), restaurant.photo.clone().into());
        fields.insert(field::NUM_RATINGS.to_string(), Value::Integer(0));
        fields.insert(field::SUM_RATING.to_string(), Value::Double(0.0));
        fields.insert(field::AVG_RATING.to_string(), Value::Double(0.0));
        fields.insert(field::TIMESTAMP.to_string(), Value::Timestamp(timestamp));
        fields
    }

    /// Fields for a review document
    pub fn review_fields(review: &NewReview, timestamp: Timestamp) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::RATING.to_string(), Value::Integer(review.rating));
        fields.insert(field::TEXT.to_string(), review.text.as_str().into());
        fields.insert(field::USER_NAME.to_string(), review.user_name.as_str().into());
        if let Some(user_id) = &review.user_id {
            fields.insert(field::USER_ID.to_string(), user_id.as_str().into());
        }
        fields.insert(field::TIMESTAMP.to_string(), Value::Timestamp(timestamp));
        fields
    }

    /// Aggregate update fields
    pub fn rating_fields(num_ratings: u64, sum_rating: f64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::NUM_RATINGS.to_string(), Value::Integer(num_ratings as i64));
        fields.insert(field::SUM_RATING.to_string(), Value::Double(sum_rating));
        fields.insert(
            field::AVG_RATING.to_string(),
            Value::Double(average(sum_rating, num_ratings)),
        );
        fields
    }
}

/// Mean rating, 0 when there are no ratings
pub fn average(sum_rating: f64, num_ratings: u64) -> f64 {
    if num_ratings == 0 {
        0.0
    } else {
        sum_rating / num_ratings as f64
    }
}
