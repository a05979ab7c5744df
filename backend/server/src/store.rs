use async_trait::async_trait;
use bson::oid::ObjectId;
use thiserror::Error;

use crate::models::{ResponseDocument, Summary};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Unique index violated")]
    DuplicateKey,

    #[error("Store returned a non-ObjectId identifier")]
    UnexpectedId,
}

/// Persistence operations needed by the request handlers.
///
/// Implementations share one handle across all in-flight requests. None of the
/// operations are combined into a transaction: a submission calls
/// [`find_by_ip`](ResponseStore::find_by_ip) and then
/// [`insert`](ResponseStore::insert) as two separate steps.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn find_by_ip(&self, ip: &str) -> Result<Option<ResponseDocument>, StoreError>;

    /// Stores a new response and returns its generated identifier.
    async fn insert(&self, document: ResponseDocument) -> Result<ObjectId, StoreError>;

    /// All responses, `createdAt` descending.
    async fn list_newest_first(&self) -> Result<Vec<ResponseDocument>, StoreError>;

    /// Number of removed documents.
    async fn delete_by_id(&self, id: ObjectId) -> Result<u64, StoreError>;

    /// Nulls the stored `ip`. Returns the number of matched documents.
    async fn clear_ip(&self, id: ObjectId) -> Result<u64, StoreError>;

    async fn summary(&self) -> Result<Summary, StoreError> {
        let documents = self.list_newest_first().await?;

        Ok(Summary::tally(&documents))
    }
}
