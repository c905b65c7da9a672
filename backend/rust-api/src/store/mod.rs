//! Boundary to the hosted content store.
//!
//! Services talk to [`ContentStore`] only; `MongoContentStore` backs it in
//! production and `InMemoryContentStore` in tests and local runs.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod memory;
pub mod mongo;

pub use memory::InMemoryContentStore;
pub use mongo::MongoContentStore;

pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Posts,
    Users,
    Comments,
    Likes,
    Uploads,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Users => "users",
            Collection::Comments => "comments",
            Collection::Likes => "likes",
            Collection::Uploads => "uploads",
        }
    }

    /// Field sets that must be unique across the collection
    pub fn unique_keys(&self) -> &'static [&'static str] {
        match self {
            Collection::Likes => &["user_id", "post_id"],
            Collection::Posts | Collection::Users | Collection::Comments | Collection::Uploads => {
                &[]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Matches a missing field as well as an explicit null
    IsNull(String),
    /// Field equals any of the values
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn is_null(field: &str) -> Self {
        Filter::IsNull(field.to_string())
    }

    pub fn any_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub limit: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort = Some(Sort {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort = Some(Sort {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} record not found")]
    NotFound { collection: &'static str },
    #[error("expected a single {collection} record, found {found}")]
    MultipleRows { collection: &'static str, found: u64 },
    #[error("duplicate {collection} record")]
    Conflict { collection: &'static str },
    #[error("field {field} on {collection} is not a counter")]
    NotACounter {
        collection: &'static str,
        field: String,
    },
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// CRUD over named collections of JSON records. Every record carries a
/// string `id`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn select(&self, collection: Collection, query: &Query)
        -> Result<Vec<Record>, StoreError>;

    /// Fails with `NotFound` on zero matches and `MultipleRows` on more than one.
    async fn select_single(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Record, StoreError>;

    /// Fails with `Conflict` when a unique key of the collection is taken.
    async fn insert(&self, collection: Collection, record: Record) -> Result<Record, StoreError>;

    /// Merges `patch` into the record and returns the updated record.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
    ) -> Result<Record, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Returns the number of removed records.
    async fn delete_where(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<u64, StoreError>;

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, StoreError>;

    /// Atomically adds `delta` to a non-negative integer field. Results below
    /// zero are clamped to zero. Returns the updated record.
    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<Record, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub fn to_record<T: Serialize>(value: &T) -> Result<Record, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(format!(
            "expected an object record, got {}",
            other
        ))),
    }
}

pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

pub fn from_records<T: DeserializeOwned>(records: Vec<Record>) -> Result<Vec<T>, StoreError> {
    records.into_iter().map(from_record).collect()
}

/// `select_single` that maps "no row" to `None`
pub async fn find_one<T: DeserializeOwned>(
    store: &dyn ContentStore,
    collection: Collection,
    filters: &[Filter],
) -> Result<Option<T>, StoreError> {
    match store.select_single(collection, filters).await {
        Ok(record) => Ok(Some(from_record(record)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
