//! Document and collection paths, and raw stored documents
//!
//! Paths are relative to the database root: `restaurants` is a collection,
//! `restaurants/abc` a document, `restaurants/abc/ratings` a subcollection.

use super::value::{Fields, Value};
use crate::error::EatsError;
use rand::Rng;
use std::fmt;

const AUTO_ID_LENGTH: usize = 20;

/// Generate a 20-character alphanumeric document id
pub fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

fn validate_segments(path: &str, expect_even: bool) -> Result<(), EatsError> {
    if path.is_empty() {
        return Err(EatsError::invalid_argument("path must not be empty"));
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(EatsError::invalid_argument(format!(
            "path {:?} contains an empty segment",
            path
        )));
    }
    if (segments.len() % 2 == 0) != expect_even {
        let kind = if expect_even { "document" } else { "collection" };
        return Err(EatsError::invalid_argument(format!(
            "path {:?} is not a {} path",
            path, kind
        )));
    }
    Ok(())
}

fn validate_id(id: &str) -> Result<(), EatsError> {
    if id.is_empty() || id.contains('/') {
        return Err(EatsError::invalid_argument(format!(
            "{:?} is not a valid id",
            id
        )));
    }
    Ok(())
}

/// Path to a collection (odd number of segments)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse and validate a collection path
    pub fn new(path: impl Into<String>) -> Result<Self, EatsError> {
        let path = path.into();
        validate_segments(&path, false)?;
        Ok(Self(path))
    }

    /// Top-level collection from a compile-time constant id
    pub(crate) fn root(id: &'static str) -> Self {
        Self(id.to_string())
    }

    /// Full path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection ID (last segment of path)
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent document for subcollections
    pub fn parent(&self) -> Option<DocumentPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocumentPath(parent.to_string()))
    }

    /// Path of a document within this collection
    pub fn doc(&self, document_id: &str) -> Result<DocumentPath, EatsError> {
        validate_id(document_id)?;
        DocumentPath::new(format!("{}/{}", self.0, document_id))
    }

    /// Path of a new document with an auto-generated id
    pub fn new_doc(&self) -> DocumentPath {
        DocumentPath(format!("{}/{}", self.0, auto_id()))
    }

    /// Whether `doc` sits directly in this collection
    pub fn contains(&self, doc: &DocumentPath) -> bool {
        doc.parent() == *self
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to a document (even number of segments)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Parse and validate a document path
    pub fn new(path: impl Into<String>) -> Result<Self, EatsError> {
        let path = path.into();
        validate_segments(&path, true)?;
        Ok(Self(path))
    }

    /// Full path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Document ID (last segment of path)
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Collection containing this document
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(self.0.clone()),
        }
    }

    /// Subcollection under this document
    pub fn collection(&self, collection_id: &str) -> Result<CollectionPath, EatsError> {
        validate_id(collection_id)?;
        CollectionPath::new(format!("{}/{}", self.0, collection_id))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where the document lives
    pub path: DocumentPath,

    /// Document fields
    pub fields: Fields,
}

impl Document {
    /// Create a document
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    /// Document ID
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Get a field value by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
