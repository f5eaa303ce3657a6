//! In-memory interaction store.
//!
//! Backs the demo binary and the test suite. Records live in insertion
//! order, which makes "earliest completed" a plain forward scan.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;
use crate::pipeline::types::{ConversationStatus, InteractionRecord, Platform};
use crate::store::traits::InteractionStore;

/// Vec-backed store behind an async RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<InteractionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, in insertion order.
    pub async fn all(&self) -> Vec<InteractionRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn append(&self, record: &InteractionRecord) -> Result<(), StorageError> {
        debug!(
            record_id = %record.id,
            status = ?record.conversation_status,
            "Appending interaction record"
        );
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn find_completed(
        &self,
        platform: Platform,
        user_id: &str,
        campaign: &str,
    ) -> Result<Option<InteractionRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| {
                r.platform == platform
                    && r.user_id == user_id
                    && r.campaign == campaign
                    && r.conversation_status == ConversationStatus::Completed
                    && r.discount_code_sent.is_some()
            })
            .cloned())
    }
}
