//! # MongoDB
//!
//! Document store for survey responses.
//!
//! ## Requirements
//!
//! - One collection, `responses` unless configured otherwise
//! - Lookup by `ip` for the duplicate-IP guard
//! - Full listing sorted by `createdAt` descending
//! - Point delete and point update by `_id`
//!
//! ## Implementation
//!
//! - One [`Client`] per process, created on the first request that needs it
//! - The database is the one named by the connection string path
//! - [`OnceCell`] guards the first connection: concurrent cold-start requests
//!   wait on a single attempt instead of each opening a client
//! - A failed attempt leaves the cell empty so the next request retries
//! - No transactions: the duplicate-IP guard is a `find_one` followed by an
//!   `insert_one`, so two simultaneous submissions from one address can both
//!   pass the check. Strict mode adds a unique partial index on `ip` which
//!   turns the second insert into a duplicate-key error.
//! - The index build never fails the connection. A collection that already
//!   holds repeated ips cannot take the index; the store then logs a warning
//!   and keeps serving with the find-then-insert check only, so the admin
//!   endpoints stay usable for cleaning up the duplicates.
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{Bson, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    error::{ErrorKind, WriteError, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    config::Config,
    models::ResponseDocument,
    store::{ResponseStore, StoreError},
};

const DUPLICATE_KEY_CODE: i32 = 11000;

pub struct MongoStore {
    uri: String,
    database: String,
    collection: String,
    strict_ip_uniqueness: bool,
    ip_index_active: AtomicBool,
    handle: OnceCell<Collection<ResponseDocument>>,
}

impl MongoStore {
    pub fn new(config: &Config) -> Self {
        Self {
            uri: config.mongodb_uri.clone(),
            database: config.database.clone(),
            collection: config.collection.clone(),
            strict_ip_uniqueness: config.strict_ip_uniqueness,
            ip_index_active: AtomicBool::new(false),
            handle: OnceCell::new(),
        }
    }

    /// Returns the cached collection handle, connecting on first use.
    pub async fn acquire(&self) -> Result<&Collection<ResponseDocument>, StoreError> {
        self.handle.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<Collection<ResponseDocument>, StoreError> {
        info!("Connecting to MongoDB database {}", self.database);

        let client = Client::with_uri_str(&self.uri).await?;
        let database = client.database(&self.database);

        database.run_command(doc! { "ping": 1 }).await?;

        let collection = database.collection::<ResponseDocument>(&self.collection);

        if self.strict_ip_uniqueness {
            self.record_ip_index(ensure_ip_index(&collection).await);
        }

        info!("Connected to MongoDB collection {}", self.collection);

        Ok(collection)
    }

    /// Whether the unique `ip` index backs the duplicate-IP guard.
    pub fn ip_index_active(&self) -> bool {
        self.ip_index_active.load(Ordering::Relaxed)
    }

    fn record_ip_index(&self, outcome: Result<(), StoreError>) {
        match outcome {
            Ok(()) => self.ip_index_active.store(true, Ordering::Relaxed),
            Err(e) => {
                warn!("Unique ip index unavailable, falling back to lookup-only guard: {e}");
                self.ip_index_active.store(false, Ordering::Relaxed);
            }
        }
    }
}

async fn ensure_ip_index(collection: &Collection<ResponseDocument>) -> Result<(), StoreError> {
    // only string ips are constrained, cleared (null) ips may repeat
    let options = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! { "ip": { "$type": "string" } })
        .build();

    let index = IndexModel::builder()
        .keys(doc! { "ip": 1 })
        .options(options)
        .build();

    collection.create_index(index).await?;
    info!("Unique ip index ensured");

    Ok(())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError {
            code: DUPLICATE_KEY_CODE,
            ..
        }))
    )
}

#[async_trait]
impl ResponseStore for MongoStore {
    async fn find_by_ip(&self, ip: &str) -> Result<Option<ResponseDocument>, StoreError> {
        let collection = self.acquire().await?;

        Ok(collection.find_one(doc! { "ip": ip }).await?)
    }

    async fn insert(&self, document: ResponseDocument) -> Result<ObjectId, StoreError> {
        let collection = self.acquire().await?;

        let result = collection.insert_one(document).await.map_err(|e| {
            if is_duplicate_key(&e) {
                StoreError::DuplicateKey
            } else {
                StoreError::Mongo(e)
            }
        })?;

        result.inserted_id.as_object_id().ok_or(StoreError::UnexpectedId)
    }

    async fn list_newest_first(&self) -> Result<Vec<ResponseDocument>, StoreError> {
        let collection = self.acquire().await?;

        let cursor = collection
            .find(doc! {})
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .await?;

        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<u64, StoreError> {
        let collection = self.acquire().await?;

        Ok(collection.delete_one(doc! { "_id": id }).await?.deleted_count)
    }

    async fn clear_ip(&self, id: ObjectId) -> Result<u64, StoreError> {
        let collection = self.acquire().await?;

        let result = collection
            .update_one(doc! { "_id": id }, doc! { "$set": { "ip": Bson::Null } })
            .await?;

        Ok(result.matched_count)
    }
}
