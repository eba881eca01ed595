//! Collection queries
//!
//! `Query` is immutable: each builder method consumes the query and returns a
//! new one with the clause appended, the way iterator adapters work. The same
//! value is executed by the in-memory engine (`evaluate`) and translated to a
//! REST `StructuredQuery` (`to_structured_query`).

use super::document::{CollectionPath, Document};
use super::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;

/// Sort direction for query ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// `field == value` predicate
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Field name
    pub field: String,
    /// Value the field must equal
    pub value: Value,
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Field name
    pub field: String,
    /// Sort direction
    pub direction: Direction,
}

/// A query over one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<FieldFilter>,
    orders: Vec<OrderBy>,
    limit: Option<u32>,
}

impl Query {
    /// Query matching every document in `collection`
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    /// Filter documents where field equals value
    pub fn where_equal_to(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Order query results by field
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Limit query results to first n documents
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Collection being queried
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Equality filters in the order they were added
    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    /// Ordering clauses in the order they were added
    pub fn orders(&self) -> &[OrderBy] {
        &self.orders
    }

    /// Result limit, if any
    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    /// Whether a document satisfies the collection scope and every filter
    ///
    /// Documents missing an `order by` field are excluded, matching the
    /// hosted store's behavior.
    pub fn matches(&self, doc: &Document) -> bool {
        if !self.collection.contains(&doc.path) {
            return false;
        }
        let filters_hold = self.filters.iter().all(|f| {
            doc.get(&f.field)
                .is_some_and(|v| v.query_eq(&f.value))
        });
        filters_hold && self.orders.iter().all(|o| doc.get(&o.field).is_some())
    }

    /// Compare two documents under this query's ordering
    ///
    /// Ties fall back to the document path, in the direction of the last
    /// ordering clause (ascending when there is none).
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for order in &self.orders {
            let ord = match (a.get(&order.field), b.get(&order.field)) {
                (Some(x), Some(y)) => x.compare(y),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ord = match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let by_path = a.path.cmp(&b.path);
        match self.orders.last().map(|o| o.direction) {
            Some(Direction::Descending) => by_path.reverse(),
            _ => by_path,
        }
    }

    /// Run the query over a set of candidate documents
    pub fn evaluate<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect();
        matched.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            matched.truncate(limit as usize);
        }
        matched
    }

    /// Build the REST `StructuredQuery` body for this query
    ///
    /// The caller posts it to `{parent}:runQuery`, where parent is the
    /// collection's parent document (or the database root).
    pub fn to_structured_query(&self) -> serde_json::Value {
        let mut query = json!({
            "from": [{ "collectionId": self.collection.id() }],
        });

        let field_filters: Vec<serde_json::Value> = self
            .filters
            .iter()
            .map(|f| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": f.field },
                        "op": "EQUAL",
                        "value": f.value,
                    }
                })
            })
            .collect();

        match field_filters.len() {
            0 => {}
            1 => query["where"] = field_filters[0].clone(),
            _ => {
                query["where"] = json!({
                    "compositeFilter": { "op": "AND", "filters": field_filters }
                })
            }
        }

        if !self.orders.is_empty() {
            query["orderBy"] = self
                .orders
                .iter()
                .map(|o| json!({ "field": { "fieldPath": o.field }, "direction": o.direction }))
                .collect();
        }

        if let Some(limit) = self.limit {
            query["limit"] = json!(limit);
        }

        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::DocumentPath;
    use crate::store::value::Fields;

    fn doc(path: &str, fields: &[(&str, Value)]) -> Document {
        let fields: Fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Document::new(DocumentPath::new(path).unwrap(), fields)
    }

    fn restaurants() -> Query {
        Query::new(CollectionPath::new("restaurants").unwrap())
    }

    #[test]
    fn test_builder_preserves_clause_order() {
        let q = restaurants()
            .where_equal_to("category", "Pizza")
            .where_equal_to("city", "London")
            .order_by("avgRating", Direction::Descending);
        let fields: Vec<&str> = q.filters().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["category", "city"]);
        assert_eq!(q.orders().len(), 1);
    }

    #[test]
    fn test_matches_scope_and_filters() {
        let q = restaurants().where_equal_to("city", "London");
        assert!(q.matches(&doc("restaurants/a", &[("city", "London".into())])));
        assert!(!q.matches(&doc("restaurants/a", &[("city", "Paris".into())])));
        assert!(!q.matches(&doc("restaurants/a", &[])));
        assert!(!q.matches(&doc("restaurants/a/ratings/r", &[("city", "London".into())])));
    }

    #[test]
    fn test_missing_order_field_excludes_document() {
        let q = restaurants().order_by("avgRating", Direction::Descending);
        assert!(!q.matches(&doc("restaurants/a", &[("name", "x".into())])));
    }

    #[test]
    fn test_evaluate_sorts_descending_with_path_tiebreak() {
        let docs = vec![
            doc("restaurants/a", &[("numRatings", Value::Integer(3))]),
            doc("restaurants/b", &[("numRatings", Value::Integer(5))]),
            doc("restaurants/c", &[("numRatings", Value::Integer(3))]),
        ];
        let q = restaurants().order_by("numRatings", Direction::Descending);
        let ids: Vec<String> = q.evaluate(&docs).iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_evaluate_applies_limit() {
        let docs = vec![
            doc("restaurants/a", &[("n", Value::Integer(1))]),
            doc("restaurants/b", &[("n", Value::Integer(2))]),
        ];
        let q = restaurants().order_by("n", Direction::Ascending).limit(1);
        let out = q.evaluate(&docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "a");
    }

    #[test]
    fn test_structured_query_single_filter() {
        let q = restaurants()
            .where_equal_to("price", Value::Integer(2))
            .order_by("avgRating", Direction::Descending);
        let body = q.to_structured_query();
        assert_eq!(body["from"][0]["collectionId"], "restaurants");
        assert_eq!(body["where"]["fieldFilter"]["field"]["fieldPath"], "price");
        assert_eq!(body["where"]["fieldFilter"]["value"]["integerValue"], "2");
        assert_eq!(body["orderBy"][0]["direction"], "DESCENDING");
    }

    #[test]
    fn test_structured_query_composite_filter() {
        let q = restaurants()
            .where_equal_to("category", "Pizza")
            .where_equal_to("city", "London");
        let body = q.to_structured_query();
        assert_eq!(body["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(
            body["where"]["compositeFilter"]["filters"].as_array().unwrap().len(),
            2
        );
        assert!(body.get("orderBy").is_none());
    }

    #[test]
    fn test_structured_query_subcollection_uses_collection_id() {
        let q = Query::new(CollectionPath::new("restaurants/abc/ratings").unwrap())
            .order_by("timestamp", Direction::Descending);
        assert_eq!(q.to_structured_query()["from"][0]["collectionId"], "ratings");
    }
}
