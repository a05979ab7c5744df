//! In-process [`ResponseStore`] backing the test suite.
use async_trait::async_trait;
use bson::oid::ObjectId;
use tokio::sync::Mutex;

use crate::{
    models::ResponseDocument,
    store::{ResponseStore, StoreError},
};

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<ResponseDocument>>,
    strict_ip_uniqueness: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects an insert whose `ip` is already stored, mirroring the unique
    /// index the Mongo store creates in strict mode.
    pub fn strict() -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            strict_ip_uniqueness: true,
        }
    }

    /// Raw stored documents in insertion order, `ip` included.
    pub async fn snapshot(&self) -> Vec<ResponseDocument> {
        self.documents.lock().await.clone()
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn find_by_ip(&self, ip: &str) -> Result<Option<ResponseDocument>, StoreError> {
        Ok(self
            .documents
            .lock()
            .await
            .iter()
            .find(|doc| doc.ip.as_deref() == Some(ip))
            .cloned())
    }

    async fn insert(&self, mut document: ResponseDocument) -> Result<ObjectId, StoreError> {
        let mut documents = self.documents.lock().await;

        if self.strict_ip_uniqueness {
            if let Some(ip) = document.ip.as_deref() {
                if documents.iter().any(|doc| doc.ip.as_deref() == Some(ip)) {
                    return Err(StoreError::DuplicateKey);
                }
            }
        }

        let id = ObjectId::new();
        document.id = Some(id);
        documents.push(document);

        Ok(id)
    }

    async fn list_newest_first(&self) -> Result<Vec<ResponseDocument>, StoreError> {
        let mut documents = self.documents.lock().await.clone();

        // stable sort: equal timestamps keep the later insert first
        documents.reverse();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(documents)
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<u64, StoreError> {
        let mut documents = self.documents.lock().await;
        let before = documents.len();
        documents.retain(|doc| doc.id != Some(id));

        Ok((before - documents.len()) as u64)
    }

    async fn clear_ip(&self, id: ObjectId) -> Result<u64, StoreError> {
        let mut documents = self.documents.lock().await;

        match documents.iter_mut().find(|doc| doc.id == Some(id)) {
            Some(doc) => {
                doc.ip = None;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
