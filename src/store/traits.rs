//! Storage capability for interaction records.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::pipeline::types::{InteractionRecord, Platform};

/// Append-only interaction log with one query shape.
///
/// Implementations must treat `append` as durable once it returns Ok and
/// must answer `find_completed` with the *earliest* completed record that
/// carries a code for the key, so the first issuance stays authoritative.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Persist one interaction record.
    async fn append(&self, record: &InteractionRecord) -> Result<(), StorageError>;

    /// Earliest completed-with-code record for (platform, user, campaign),
    /// if any.
    async fn find_completed(
        &self,
        platform: Platform,
        user_id: &str,
        campaign: &str,
    ) -> Result<Option<InteractionRecord>, StorageError>;
}
