//! Bounded fallback caller — the external-classifier tier of the cascade.
//!
//! The classifier itself is a capability behind [`CreatorClassifier`]:
//! text + hints + timeout in, raw model output back. Everything about
//! budget, retries, parsing, and the allow-list lives here, so tests can
//! drive the success, terminal-none, and exhaustion paths with trivial
//! fakes and never touch a real model vendor.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::detect::index::AliasIndex;
use crate::detect::{DetectionStage, StageInput, StageMatch, StageOutcome};
use crate::error::FallbackError;
use crate::pipeline::types::DetectionMethod;

// ── Capability ──────────────────────────────────────────────────────

/// External classifier capability.
///
/// Implementations perform one classification attempt and should respect
/// `timeout` themselves where possible; the bounded caller additionally
/// enforces it with a local wall clock and discards late results.
#[async_trait]
pub trait CreatorClassifier: Send + Sync {
    /// One attempt: returns the raw model output, expected to be the
    /// strict JSON object `{"creator": "<handle>|none"}`.
    async fn classify(
        &self,
        text: &str,
        hints: &[String],
        timeout: Duration,
    ) -> Result<String, FallbackError>;
}

/// A classifier that always answers a well-formed terminal "none".
///
/// Used by the demo binary when no real classifier is wired up, so the
/// cascade degrades to "ask the user" without spending budget on retries.
#[derive(Debug, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl CreatorClassifier for DisabledClassifier {
    async fn classify(
        &self,
        _text: &str,
        _hints: &[String],
        _timeout: Duration,
    ) -> Result<String, FallbackError> {
        Ok(r#"{"creator": "none"}"#.to_string())
    }
}

// ── Budget policy ───────────────────────────────────────────────────

/// Budget configuration for the fallback caller.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Maximum classification attempts per message.
    pub max_attempts: u32,
    /// Total wall-clock budget across all attempts.
    pub total_budget: Duration,
    /// Default per-attempt timeout; shrunk to the remaining budget on
    /// later attempts.
    pub per_attempt_timeout: Duration,
    /// Don't bother retrying with less than this much budget left.
    pub min_viable_timeout: Duration,
    /// Confidence reported for a positive classification.
    pub match_confidence: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            total_budget: Duration::from_millis(1000),
            per_attempt_timeout: Duration::from_millis(400),
            min_viable_timeout: Duration::from_millis(50),
            match_confidence: 0.8,
        }
    }
}

/// Outcome of the bounded fallback call.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    /// Allow-listed creator identified.
    Match { handle: String, confidence: f64 },
    /// The model looked and found nothing — terminal, no retry.
    None { attempts: u32 },
    /// Attempts or budget exhausted without an answer. Never a guess.
    Exhausted { attempts: u32, reason: String },
}

/// Wraps a [`CreatorClassifier`] in attempt/budget enforcement.
pub struct BoundedFallback {
    classifier: Arc<dyn CreatorClassifier>,
    config: FallbackConfig,
}

impl BoundedFallback {
    pub fn new(classifier: Arc<dyn CreatorClassifier>, config: FallbackConfig) -> Self {
        Self { classifier, config }
    }

    /// Run bounded classification against the active alias index.
    ///
    /// Retries only while attempts remain AND the remaining budget exceeds
    /// the minimal viable timeout; a later attempt's timeout is shrunk to
    /// the remaining budget so the total is never exceeded.
    pub async fn classify(
        &self,
        text: &str,
        index: &AliasIndex,
        near_miss: Option<&StageMatch>,
    ) -> FallbackOutcome {
        let allow: HashSet<&str> = index.allow_list().into_iter().collect();
        let mut hints = index.hint_list();
        if let Some(near) = near_miss {
            hints.push(format!("closest earlier candidate: {}", near.handle));
        }

        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = String::from("no attempts made");

        while attempts < self.config.max_attempts {
            let elapsed = start.elapsed();
            let remaining = self.config.total_budget.saturating_sub(elapsed);
            if remaining.is_zero() || (attempts > 0 && remaining <= self.config.min_viable_timeout)
            {
                debug!(attempts, ?remaining, "Fallback budget exhausted before retry");
                break;
            }

            attempts += 1;
            let attempt_timeout = self.config.per_attempt_timeout.min(remaining);
            debug!(
                attempt = attempts,
                max = self.config.max_attempts,
                ?attempt_timeout,
                remaining_ms = remaining.as_millis() as u64,
                "Fallback attempt"
            );

            let call = self.classifier.classify(text, &hints, attempt_timeout);
            match tokio::time::timeout(attempt_timeout, call).await {
                // Local wall-clock timeout: a late result is discarded with
                // the future, never merged into state.
                Err(_) => {
                    warn!(attempt = attempts, ?attempt_timeout, "Fallback attempt timed out");
                    last_error = format!("timeout after {attempt_timeout:?}");
                }
                Ok(Err(e)) => {
                    warn!(attempt = attempts, error = %e, "Fallback attempt failed");
                    last_error = e.to_string();
                }
                Ok(Ok(raw)) => match parse_verdict(&raw, &allow) {
                    Ok(Verdict::Creator(handle)) => {
                        let confidence = self.config.match_confidence.clamp(0.0, 1.0);
                        info!(
                            handle = %handle,
                            attempts,
                            latency_ms = start.elapsed().as_millis() as u64,
                            "Fallback identified creator"
                        );
                        return FallbackOutcome::Match { handle, confidence };
                    }
                    Ok(Verdict::None) => {
                        info!(attempts, "Fallback returned terminal none");
                        return FallbackOutcome::None { attempts };
                    }
                    Err(e) => {
                        warn!(attempt = attempts, error = %e, "Fallback response rejected");
                        last_error = e.to_string();
                    }
                },
            }
        }

        info!(
            attempts,
            latency_ms = start.elapsed().as_millis() as u64,
            reason = %last_error,
            "Fallback exhausted without a match"
        );
        FallbackOutcome::Exhausted {
            attempts,
            reason: last_error,
        }
    }
}

// ── Response validation ─────────────────────────────────────────────

enum Verdict {
    Creator(String),
    None,
}

/// Strict response shape: a single `creator` field, nothing else.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdict {
    creator: String,
}

/// Parse and allow-list-check one raw classifier response.
///
/// Anything malformed or outside the allow-list is an attempt failure —
/// explicitly not the same thing as a well-formed `"none"`.
fn parse_verdict(raw: &str, allow: &HashSet<&str>) -> Result<Verdict, FallbackError> {
    let parsed: RawVerdict = serde_json::from_str(raw.trim())
        .map_err(|e| FallbackError::Malformed(e.to_string()))?;
    if parsed.creator == "none" {
        return Ok(Verdict::None);
    }
    if allow.contains(parsed.creator.as_str()) {
        Ok(Verdict::Creator(parsed.creator))
    } else {
        Err(FallbackError::Disallowed(parsed.creator))
    }
}

// ── Stage adapter ───────────────────────────────────────────────────

/// Cascade stage wrapping the bounded fallback caller.
///
/// `None` and `Exhausted` both map to `Pass`; the distinction is logged
/// here and the cascade result is "unresolved" either way.
pub struct FallbackStage {
    inner: BoundedFallback,
}

impl FallbackStage {
    pub fn new(classifier: Arc<dyn CreatorClassifier>, config: FallbackConfig) -> Self {
        Self {
            inner: BoundedFallback::new(classifier, config),
        }
    }
}

#[async_trait]
impl DetectionStage for FallbackStage {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Llm
    }

    async fn detect(&self, input: StageInput<'_>) -> StageOutcome {
        match self
            .inner
            .classify(input.text, input.index, input.near_miss)
            .await
        {
            FallbackOutcome::Match { handle, confidence } => StageOutcome::Match(StageMatch {
                handle,
                confidence: confidence.clamp(0.0, 1.0),
            }),
            FallbackOutcome::None { .. } | FallbackOutcome::Exhausted { .. } => StageOutcome::Pass,
        }
    }
}
