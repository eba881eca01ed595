//! Restaurant query composition

use super::mapper::field;
use super::model::{FilterRequest, SortMode};
use crate::store::{CollectionPath, Direction, Query};

/// Top-level restaurants collection
pub const RESTAURANTS: &str = "restaurants";

/// Review subcollection under each restaurant
pub const RATINGS: &str = "ratings";

/// Composes restaurant queries from filter requests
///
/// Present filters are applied as equality predicates in a fixed order
/// (category, city, price), followed by exactly one ordering clause. The
/// result depends only on the request.
#[derive(Debug, Clone)]
pub struct QueryFilterBuilder {
    base: Query,
}

impl Default for QueryFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryFilterBuilder {
    /// Builder over the whole restaurants collection
    pub fn new() -> Self {
        Self {
            base: Query::new(restaurants_collection()),
        }
    }

    /// Builder over a custom base query
    pub fn with_base(base: Query) -> Self {
        Self { base }
    }

    /// Query selecting the restaurants a request asks for
    ///
    /// The price predicate compares the integer ordinal; records that still
    /// hold a `"$$"` string price do not match it.
    ///
    /// # Example
    /// ```
    /// use friendlyeats_store::eats::{FilterRequest, PriceTier, QueryFilterBuilder};
    /// use friendlyeats_store::store::Value;
    ///
    /// let request = FilterRequest::new().with_city("London").with_price(PriceTier::Two);
    /// let query = QueryFilterBuilder::new().build(&request);
    ///
    /// assert_eq!(query.filters()[0].field, "city");
    /// assert_eq!(query.filters()[1].value, Value::Integer(2));
    /// assert_eq!(query.orders()[0].field, "avgRating");
    /// ```
    pub fn build(&self, request: &FilterRequest) -> Query {
        let mut query = self.base.clone();

        if let Some(category) = non_empty(&request.category) {
            query = query.where_equal_to(field::CATEGORY, category);
        }
        if let Some(city) = non_empty(&request.city) {
            query = query.where_equal_to(field::CITY, city);
        }
        if let Some(price) = request.price {
            query = query.where_equal_to(field::PRICE, price.ordinal());
        }

        let order_field = match request.sort_mode() {
            SortMode::Review => field::NUM_RATINGS,
            SortMode::Rating => field::AVG_RATING,
        };
        query.order_by(order_field, Direction::Descending)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `restaurants`
pub fn restaurants_collection() -> CollectionPath {
    CollectionPath::root(RESTAURANTS)
}

/// Reviews of one restaurant, newest first
pub fn reviews_query(ratings: CollectionPath) -> Query {
    Query::new(ratings).order_by(field::TIMESTAMP, Direction::Descending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eats::model::PriceTier;
    use crate::store::Value;

    #[test]
    fn test_empty_request_orders_by_rating() {
        let query = QueryFilterBuilder::new().build(&FilterRequest::new());
        assert!(query.filters().is_empty());
        assert_eq!(query.orders().len(), 1);
        assert_eq!(query.orders()[0].field, "avgRating");
        assert_eq!(query.orders()[0].direction, Direction::Descending);
        assert_eq!(query.collection().as_str(), "restaurants");
    }

    #[test]
    fn test_filters_applied_in_fixed_order() {
        let request = FilterRequest::new()
            .with_price(PriceTier::Four)
            .with_city("Paris")
            .with_category("Bakery")
            .with_sort(SortMode::Review);
        let query = QueryFilterBuilder::new().build(&request);

        let fields: Vec<&str> = query.filters().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, ["category", "city", "price"]);
        assert_eq!(query.filters()[2].value, Value::Integer(4));
        assert_eq!(query.orders().len(), 1);
        assert_eq!(query.orders()[0].field, "numRatings");
    }

    #[test]
    fn test_empty_strings_add_no_predicate() {
        let request = FilterRequest {
            category: Some(String::new()),
            city: None,
            price: None,
            sort: None,
        };
        assert!(QueryFilterBuilder::new().build(&request).filters().is_empty());
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = QueryFilterBuilder::new();
        let request = FilterRequest::new().with_category("Pizza").with_city("Rome");
        assert_eq!(builder.build(&request), builder.build(&request.clone()));
    }

    #[test]
    fn test_reviews_query_is_newest_first() {
        let ratings = restaurants_collection()
            .doc("abc")
            .unwrap()
            .collection(RATINGS)
            .unwrap();
        let query = reviews_query(ratings);
        assert_eq!(query.collection().as_str(), "restaurants/abc/ratings");
        assert_eq!(query.orders()[0].field, "timestamp");
        assert_eq!(query.orders()[0].direction, Direction::Descending);
    }
}
