use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Collection, ContentStore, Filter, Query, Record, StoreError};

/// Process-local store with the same semantics as the Mongo backend.
/// Each operation runs under one lock, so increments are atomic.
#[derive(Default)]
pub struct InMemoryContentStore {
    collections: Mutex<HashMap<Collection, Vec<Record>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Collection, Vec<Record>>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn matches(record: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(field, value) => record.get(field) == Some(value),
        Filter::IsNull(field) => record.get(field).map_or(true, Value::is_null),
        Filter::In(field, values) => record.get(field).is_some_and(|v| values.contains(v)),
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn violates_unique(collection: Collection, rows: &[Record], candidate: &Record) -> bool {
    let keys = collection.unique_keys();
    if keys.is_empty() {
        return false;
    }
    rows.iter()
        .any(|row| keys.iter().all(|key| row.get(*key) == candidate.get(*key)))
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn select(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Record>, StoreError> {
        let guard = self.lock()?;
        let mut rows: Vec<Record> = guard
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches(r, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &query.sort {
            // stable: ties keep insertion order
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        Ok(rows)
    }

    async fn select_single(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Record, StoreError> {
        let guard = self.lock()?;
        let mut found: Vec<&Record> = guard
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| matches(r, filters)).collect())
            .unwrap_or_default();

        match found.len() {
            0 => Err(StoreError::NotFound {
                collection: collection.name(),
            }),
            1 => Ok(found.remove(0).clone()),
            n => Err(StoreError::MultipleRows {
                collection: collection.name(),
                found: n as u64,
            }),
        }
    }

    async fn insert(&self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        let mut guard = self.lock()?;
        let rows = guard.entry(collection).or_default();

        let id = record_id(&record)
            .ok_or_else(|| StoreError::Backend("record has no id".to_string()))?;
        if rows.iter().any(|r| record_id(r) == Some(id))
            || violates_unique(collection, rows, &record)
        {
            return Err(StoreError::Conflict {
                collection: collection.name(),
            });
        }

        rows.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
    ) -> Result<Record, StoreError> {
        let mut guard = self.lock()?;
        let row = guard
            .get_mut(&collection)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or(StoreError::NotFound {
                collection: collection.name(),
            })?;

        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let rows = guard.entry(collection).or_default();
        let before = rows.len();
        rows.retain(|r| record_id(r) != Some(id));

        if rows.len() == before {
            return Err(StoreError::NotFound {
                collection: collection.name(),
            });
        }
        Ok(())
    }

    async fn delete_where(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let rows = guard.entry(collection).or_default();
        let before = rows.len();
        rows.retain(|r| !matches(r, filters));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| matches(r, filters)).count() as u64)
            .unwrap_or(0))
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<Record, StoreError> {
        let mut guard = self.lock()?;
        let row = guard
            .get_mut(&collection)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or(StoreError::NotFound {
                collection: collection.name(),
            })?;

        let current = match row.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_i64().ok_or_else(|| StoreError::NotACounter {
                collection: collection.name(),
                field: field.to_string(),
            })?,
        };
        let next = current.saturating_add(delta).max(0);
        row.insert(field.to_string(), Value::from(next));

        Ok(row.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
