//! Issuance policy — one code per (platform, user, campaign).
//!
//! The store lookup and the completed-record append must be atomic per
//! key, or two in-flight messages from the same user both see "no prior
//! code" and both issue. The guard serializes issuance per key with a
//! keyed async mutex while leaving different users fully concurrent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::pipeline::types::{
    ConversationStatus, DetectionMethod, IncomingMessage, InteractionRecord, Platform,
};
use crate::store::InteractionStore;

/// Which reply the issuance policy selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceDecision {
    /// First issuance for this key.
    New { code: String },
    /// Same creator as before; code re-sent.
    Repeat { code: String },
    /// User is committed to a different creator; the original handle and
    /// code are restated.
    Committed { handle: String, code: String },
}

type IssuanceKey = (Platform, String, String);

/// Serializes check-then-append per issuance key.
pub struct IssuanceGuard {
    store: Arc<dyn InteractionStore>,
    locks: Mutex<HashMap<IssuanceKey, Arc<AsyncMutex<()>>>>,
}

impl IssuanceGuard {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &IssuanceKey) -> Arc<AsyncMutex<()>> {
        match self.locks.lock() {
            Ok(mut map) => Arc::clone(map.entry(key.clone()).or_default()),
            // The map never holds partially-inserted state; reuse it.
            Err(poisoned) => Arc::clone(poisoned.into_inner().entry(key.clone()).or_default()),
        }
    }

    /// Drop the key's mutex once no task holds a clone of it, so the map
    /// tracks in-flight keys instead of every user ever seen.
    fn evict_idle(&self, key: &IssuanceKey) {
        let mut map = match self.locks.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.get(key).map_or(false, |l| Arc::strong_count(l) == 1) {
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        match self.locks.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Apply the issuance policy for an identified creator and persist the
    /// resulting record.
    ///
    /// The per-key lock is held across the prior-issuance lookup AND the
    /// append, so concurrent messages from one user resolve to exactly one
    /// `New` decision.
    pub async fn issue(
        &self,
        incoming: &IncomingMessage,
        campaign: &str,
        handle: &str,
        code: &str,
        method: DetectionMethod,
    ) -> Result<(IssuanceDecision, InteractionRecord), StorageError> {
        let key = (
            incoming.platform,
            incoming.user_id.clone(),
            campaign.to_string(),
        );
        let key_lock = self.lock_for(&key);
        let held = key_lock.lock().await;
        let result = self
            .decide_and_append(incoming, campaign, handle, code, method)
            .await;
        drop(held);
        drop(key_lock);
        self.evict_idle(&key);
        result
    }

    /// Policy body; caller holds the per-key lock.
    async fn decide_and_append(
        &self,
        incoming: &IncomingMessage,
        campaign: &str,
        handle: &str,
        code: &str,
        method: DetectionMethod,
    ) -> Result<(IssuanceDecision, InteractionRecord), StorageError> {
        let prior = self
            .store
            .find_completed(incoming.platform, &incoming.user_id, campaign)
            .await?;

        let (decision, record_creator, record_code) = match prior {
            None => {
                info!(
                    user_id = %incoming.user_id,
                    platform = %incoming.platform,
                    handle,
                    code,
                    "Issuing new code"
                );
                (
                    IssuanceDecision::New { code: code.to_string() },
                    handle.to_string(),
                    code.to_string(),
                )
            }
            Some(prev) => {
                let prev_handle = prev.identified_creator.unwrap_or_default();
                let prev_code = prev.discount_code_sent.unwrap_or_default();
                if prev_handle == handle {
                    debug!(user_id = %incoming.user_id, handle, "Re-sending existing code");
                    (
                        IssuanceDecision::Repeat { code: prev_code.clone() },
                        prev_handle,
                        prev_code,
                    )
                } else {
                    // Committed to the first creator: the record restates
                    // the original issuance, never the new candidate.
                    debug!(
                        user_id = %incoming.user_id,
                        committed = %prev_handle,
                        attempted = handle,
                        "User already committed to another creator"
                    );
                    (
                        IssuanceDecision::Committed {
                            handle: prev_handle.clone(),
                            code: prev_code.clone(),
                        },
                        prev_handle,
                        prev_code,
                    )
                }
            }
        };

        let record = InteractionRecord {
            id: Uuid::new_v4(),
            platform: incoming.platform,
            user_id: incoming.user_id.clone(),
            campaign: campaign.to_string(),
            ts: Utc::now(),
            raw_text: incoming.text.clone(),
            identified_creator: Some(record_creator),
            detection_method: method,
            discount_code_sent: Some(record_code),
            conversation_status: ConversationStatus::Completed,
        };
        self.store.append(&record).await?;

        Ok((decision, record))
    }
}
