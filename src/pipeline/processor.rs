//! Message processor — the single entry point for inbound messages.
//!
//! Orchestrates the full flow: validate, snapshot config, normalize,
//! intent-gate, run the detection cascade, apply issuance policy, compose
//! a reply, persist a record. Storage failures degrade to an apologetic
//! reply with an `error` record rather than surfacing to the caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConfigProvider, Snapshot};
use crate::detect::exact::ExactMatcher;
use crate::detect::fuzzy::FuzzyMatcher;
use crate::detect::intent::is_in_scope;
use crate::detect::normalize::normalize;
use crate::detect::DetectionStage;
use crate::fallback::{CreatorClassifier, FallbackConfig, FallbackStage};
use crate::pipeline::cascade::Cascade;
use crate::pipeline::issuance::{IssuanceDecision, IssuanceGuard};
use crate::pipeline::types::{
    ConversationStatus, DetectionMethod, DetectionResult, IncomingMessage, InteractionRecord,
    IssuanceKind, ProcessedInteraction,
};
use crate::reply::{compose, ReplyContext};
use crate::store::InteractionStore;

pub struct MessageProcessor {
    provider: Arc<ConfigProvider>,
    store: Arc<dyn InteractionStore>,
    guard: IssuanceGuard,
    classifier: Option<Arc<dyn CreatorClassifier>>,
    fallback_config: FallbackConfig,
}

impl MessageProcessor {
    pub fn new(
        provider: Arc<ConfigProvider>,
        store: Arc<dyn InteractionStore>,
        classifier: Option<Arc<dyn CreatorClassifier>>,
        fallback_config: FallbackConfig,
    ) -> Self {
        let guard = IssuanceGuard::new(store.clone());
        Self {
            provider,
            store,
            guard,
            classifier,
            fallback_config,
        }
    }

    /// Process one inbound message end to end.
    ///
    /// Returns `Err` only for caller mistakes (blank text); operational
    /// failures are absorbed into an `error`-status interaction.
    pub async fn process(
        &self,
        incoming: IncomingMessage,
    ) -> Result<ProcessedInteraction, crate::error::PipelineError> {
        if incoming.text.trim().is_empty() {
            return Err(crate::error::PipelineError::Validation(
                "message text must not be blank".into(),
            ));
        }

        let snapshot = self.provider.snapshot();
        let normalized = normalize(&incoming.text);
        let mut trace = vec![format!("normalized:{normalized}")];

        if !is_in_scope(&normalized, &snapshot.index, &snapshot.thresholds) {
            trace.push("gate:out_of_scope".to_string());
            info!(user_id = %incoming.user_id, "Message out of scope");
            let reply = compose(&snapshot.templates, "out_of_scope", &ReplyContext::default());
            return self
                .finish_without_code(
                    &incoming,
                    &snapshot,
                    reply,
                    ConversationStatus::OutOfScope,
                    DetectionResult::unresolved(),
                    trace,
                )
                .await;
        }
        trace.push("gate:in_scope".to_string());

        let cascade = self.build_cascade(&snapshot);
        let detection = cascade.run(&normalized, &snapshot.index, &mut trace).await;

        let handle = match &detection.creator {
            Some(handle) => handle.clone(),
            None => {
                info!(user_id = %incoming.user_id, "No creator identified, asking user");
                let reply =
                    compose(&snapshot.templates, "ask_creator", &ReplyContext::default());
                return self
                    .finish_without_code(
                        &incoming,
                        &snapshot,
                        reply,
                        ConversationStatus::PendingCreatorInfo,
                        detection,
                        trace,
                    )
                    .await;
            }
        };

        let creator = snapshot.index.creator(&handle).ok_or_else(|| {
            crate::error::PipelineError::UnknownCreator(handle.clone())
        })?;
        let code = creator.code.clone();

        match self
            .guard
            .issue(&incoming, &snapshot.campaign, &handle, &code, detection.method)
            .await
        {
            Ok((decision, record)) => {
                let (template_key, kind, ctx_creator, ctx_code, alternate) = match &decision {
                    IssuanceDecision::New { code } => {
                        ("issue_code", IssuanceKind::New, handle.as_str(), code.clone(), None)
                    }
                    IssuanceDecision::Repeat { code } => {
                        ("repeat_code", IssuanceKind::Repeat, handle.as_str(), code.clone(), None)
                    }
                    IssuanceDecision::Committed { handle: original, code } => (
                        "already_committed",
                        IssuanceKind::Committed,
                        original.as_str(),
                        code.clone(),
                        // The newly named creator the user cannot switch to.
                        Some(handle.as_str()),
                    ),
                };
                trace.push(format!("issuance:{kind:?}"));

                let reply = compose(
                    &snapshot.templates,
                    template_key,
                    &ReplyContext {
                        creator: Some(ctx_creator),
                        code: Some(&ctx_code),
                        alternate,
                    },
                );
                Ok(ProcessedInteraction {
                    reply_text: reply,
                    record,
                    method: detection.method,
                    confidence: detection.confidence,
                    issuance: Some(kind),
                    trace,
                })
            }
            Err(e) => {
                warn!(error = %e, user_id = %incoming.user_id, "Storage failed during issuance");
                trace.push("storage:error".to_string());
                let reply = compose(&snapshot.templates, "error", &ReplyContext::default());
                let record = self.build_record(
                    &incoming,
                    &snapshot,
                    Some(handle),
                    detection.method,
                    None,
                    ConversationStatus::Error,
                );
                // Best effort: the store just failed, it may fail again.
                if let Err(e) = self.store.append(&record).await {
                    warn!(error = %e, "Could not persist error record");
                }
                Ok(ProcessedInteraction {
                    reply_text: reply,
                    record,
                    method: detection.method,
                    confidence: detection.confidence,
                    issuance: None,
                    trace,
                })
            }
        }
    }

    /// Stages in fixed order; fuzzy and fallback are flag-gated.
    fn build_cascade(&self, snapshot: &Snapshot) -> Cascade {
        let mut stages: Vec<Arc<dyn DetectionStage>> = vec![Arc::new(ExactMatcher::new())];
        if snapshot.flags.enable_fuzzy_matching {
            stages.push(Arc::new(FuzzyMatcher::from_thresholds(&snapshot.thresholds)));
        }
        if snapshot.flags.enable_llm_fallback {
            if let Some(classifier) = &self.classifier {
                stages.push(Arc::new(FallbackStage::new(
                    classifier.clone(),
                    self.fallback_config.clone(),
                )));
            }
        }
        Cascade::new(stages)
    }

    async fn finish_without_code(
        &self,
        incoming: &IncomingMessage,
        snapshot: &Snapshot,
        reply: String,
        status: ConversationStatus,
        detection: DetectionResult,
        mut trace: Vec<String>,
    ) -> Result<ProcessedInteraction, crate::error::PipelineError> {
        let record =
            self.build_record(incoming, snapshot, detection.creator.clone(), detection.method, None, status);
        if let Err(e) = self.store.append(&record).await {
            warn!(error = %e, "Could not persist interaction record");
            trace.push("storage:error".to_string());
        }
        Ok(ProcessedInteraction {
            reply_text: reply,
            record,
            method: detection.method,
            confidence: detection.confidence,
            issuance: None,
            trace,
        })
    }

    fn build_record(
        &self,
        incoming: &IncomingMessage,
        snapshot: &Snapshot,
        creator: Option<String>,
        method: DetectionMethod,
        code: Option<String>,
        status: ConversationStatus,
    ) -> InteractionRecord {
        InteractionRecord {
            id: Uuid::new_v4(),
            platform: incoming.platform,
            user_id: incoming.user_id.clone(),
            campaign: snapshot.campaign.clone(),
            ts: Utc::now(),
            raw_text: incoming.text.clone(),
            identified_creator: creator,
            detection_method: method,
            discount_code_sent: code,
            conversation_status: status,
        }
    }
}
