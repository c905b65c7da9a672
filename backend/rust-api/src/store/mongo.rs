use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, to_document, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Database, IndexModel,
};
use serde_json::Value;

use super::{Collection, ContentStore, Filter, Query, Record, StoreError};
use crate::metrics::track_store_operation;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// `ContentStore` over a MongoDB database. Record `id` is stored as `_id`.
#[derive(Clone)]
pub struct MongoContentStore {
    db: Database,
}

impl MongoContentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the unique indexes declared by [`Collection::unique_keys`].
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        for collection in [
            Collection::Posts,
            Collection::Users,
            Collection::Comments,
            Collection::Likes,
            Collection::Uploads,
        ] {
            let keys = collection.unique_keys();
            if keys.is_empty() {
                continue;
            }

            let mut index_keys = Document::new();
            for key in keys {
                index_keys.insert(*key, 1);
            }
            let model = IndexModel::builder()
                .keys(index_keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();

            self.collection(collection)
                .create_index(model)
                .await
                .map_err(backend)?;
            tracing::info!("Ensured unique index on {} {:?}", collection.name(), keys);
        }
        Ok(())
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(collection.name())
    }
}

fn backend(e: mongodb::error::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        *e.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY_CODE
    )
}

fn field_name(field: &str) -> &str {
    if field == "id" {
        "_id"
    } else {
        field
    }
}

fn to_bson_value(value: &Value) -> Result<Bson, StoreError> {
    to_bson(value).map_err(|e| StoreError::Backend(format!("Failed to convert value: {}", e)))
}

fn filter_document(filters: &[Filter]) -> Result<Document, StoreError> {
    let mut filter = Document::new();
    for f in filters {
        match f {
            Filter::Eq(field, value) => {
                filter.insert(field_name(field), to_bson_value(value)?);
            }
            // `{field: null}` matches both null and missing fields
            Filter::IsNull(field) => {
                filter.insert(field_name(field), Bson::Null);
            }
            Filter::In(field, values) => {
                let values = values
                    .iter()
                    .map(to_bson_value)
                    .collect::<Result<Vec<Bson>, StoreError>>()?;
                let mut any_of = Document::new();
                any_of.insert("$in", Bson::Array(values));
                filter.insert(field_name(field), any_of);
            }
        }
    }
    Ok(filter)
}

fn record_to_document(mut record: Record) -> Result<Document, StoreError> {
    if let Some(id) = record.remove("id") {
        record.insert("_id".to_string(), id);
    }
    to_document(&record).map_err(|e| StoreError::Backend(format!("Failed to encode record: {}", e)))
}

fn document_to_record(doc: Document) -> Result<Record, StoreError> {
    let mut record = match serde_json::to_value(&doc)? {
        Value::Object(map) => map,
        _ => return Err(StoreError::Backend("document is not an object".to_string())),
    };
    if let Some(id) = record.remove("_id") {
        record.insert("id".to_string(), id);
    }
    Ok(record)
}

#[async_trait]
impl ContentStore for MongoContentStore {
    async fn select(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Record>, StoreError> {
        let filter = filter_document(&query.filters)?;
        let mut options = FindOptions::default();
        if let Some(sort) = &query.sort {
            let direction = if sort.descending { -1 } else { 1 };
            options.sort = Some(doc! { field_name(&sort.field): direction });
        }
        options.limit = query.limit.map(|l| l as i64);

        let coll = self.collection(collection);
        let docs: Vec<Document> = track_store_operation("select", collection.name(), async {
            retry_async_with_config(RetryConfig::store_reads(), || async {
                coll.find(filter.clone())
                    .with_options(options.clone())
                    .await?
                    .try_collect()
                    .await
            })
            .await
            .map_err(backend)
        })
        .await?;

        docs.into_iter().map(document_to_record).collect()
    }

    async fn select_single(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Record, StoreError> {
        let filter = filter_document(filters)?;
        let coll = self.collection(collection);

        // Two rows are enough to tell "one" from "many"
        let docs: Vec<Document> = track_store_operation("select_single", collection.name(), async {
            retry_async_with_config(RetryConfig::store_reads(), || async {
                coll.find(filter.clone())
                    .limit(2)
                    .await?
                    .try_collect()
                    .await
            })
            .await
            .map_err(backend)
        })
        .await?;

        match docs.len() {
            0 => Err(StoreError::NotFound {
                collection: collection.name(),
            }),
            1 => docs
                .into_iter()
                .next()
                .map(document_to_record)
                .unwrap_or(Err(StoreError::NotFound {
                    collection: collection.name(),
                })),
            _ => {
                let found = coll.count_documents(filter).await.map_err(backend)?;
                Err(StoreError::MultipleRows {
                    collection: collection.name(),
                    found,
                })
            }
        }
    }

    async fn insert(&self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        let doc = record_to_document(record.clone())?;
        let coll = self.collection(collection);

        track_store_operation("insert", collection.name(), async {
            coll.insert_one(doc).await.map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::Conflict {
                        collection: collection.name(),
                    }
                } else {
                    backend(e)
                }
            })
        })
        .await?;

        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        mut patch: Record,
    ) -> Result<Record, StoreError> {
        patch.remove("id");
        let set = to_document(&patch)
            .map_err(|e| StoreError::Backend(format!("Failed to encode patch: {}", e)))?;
        let coll = self.collection(collection);

        let updated = track_store_operation("update", collection.name(), async {
            coll.find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
                .with_options(
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                )
                .await
                .map_err(backend)
        })
        .await?
        .ok_or(StoreError::NotFound {
            collection: collection.name(),
        })?;

        document_to_record(updated)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let coll = self.collection(collection);
        let result = track_store_operation("delete", collection.name(), async {
            coll.delete_one(doc! { "_id": id }).await.map_err(backend)
        })
        .await?;

        if result.deleted_count == 0 {
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
        let filter = filter_document(filters)?;
        let coll = self.collection(collection);
        let result = track_store_operation("delete_where", collection.name(), async {
            coll.delete_many(filter).await.map_err(backend)
        })
        .await?;

        Ok(result.deleted_count)
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, StoreError> {
        let filter = filter_document(filters)?;
        let coll = self.collection(collection);
        track_store_operation("count", collection.name(), async {
            retry_async_with_config(RetryConfig::store_reads(), || async {
                coll.count_documents(filter.clone()).await
            })
            .await
            .map_err(backend)
        })
        .await
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<Record, StoreError> {
        // Single-document pipeline update: read, add and clamp happen atomically
        let current = format!("${}", field);
        let pipeline = vec![doc! {
            "$set": {
                field: {
                    "$max": [
                        0_i64,
                        { "$add": [ { "$ifNull": [current, 0_i64] }, delta ] }
                    ]
                }
            }
        }];
        let coll = self.collection(collection);

        let updated = track_store_operation("increment", collection.name(), async {
            coll.find_one_and_update(doc! { "_id": id }, pipeline)
                .with_options(
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                )
                .await
                .map_err(backend)
        })
        .await?
        .ok_or(StoreError::NotFound {
            collection: collection.name(),
        })?;

        document_to_record(updated)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(backend)
    }
}
