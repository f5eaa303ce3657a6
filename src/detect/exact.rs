//! Exact matcher — deterministic token/substring lookup against the index.
//!
//! First tier of the cascade. A hit here is confidence 1.0 and stops the
//! cascade. If two *different* creators match, the message is ambiguous
//! and this tier declines rather than guessing; multiple aliases of the
//! same creator are not ambiguous (longest alias wins).

use async_trait::async_trait;
use tracing::debug;

use crate::detect::index::AliasIndex;
use crate::detect::{contains_bounded, hyphen_variants, DetectionStage, StageInput, StageMatch, StageOutcome};
use crate::pipeline::types::DetectionMethod;

/// Exact alias/handle matcher.
#[derive(Debug, Default)]
pub struct ExactMatcher;

impl ExactMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic membership test over all aliases.
    ///
    /// Returns the matched handle, or `None` when nothing matches or when
    /// distinct creators collide (ambiguity is no-match, not an error).
    pub fn match_exact(&self, text: &str, index: &AliasIndex) -> Option<String> {
        let views = hyphen_variants(text);

        // (handle, longest matching alias length)
        let mut hit: Option<(String, usize)> = None;

        for creator in index.creators() {
            for alias in &creator.aliases {
                let matched = hyphen_variants(alias)
                    .iter()
                    .any(|alias_view| views.iter().any(|v| contains_bounded(v, alias_view)));
                if !matched {
                    continue;
                }
                debug!(alias = %alias, handle = %creator.handle, "Exact alias hit");
                match &mut hit {
                    None => hit = Some((creator.handle.clone(), alias.len())),
                    Some((handle, best_len)) => {
                        if *handle != creator.handle {
                            // Two distinct creators in one message: ambiguous.
                            debug!(
                                first = %handle,
                                second = %creator.handle,
                                "Ambiguous exact match, declining"
                            );
                            return None;
                        }
                        if alias.len() > *best_len {
                            *best_len = alias.len();
                        }
                    }
                }
            }
        }

        hit.map(|(handle, _)| handle)
    }
}

#[async_trait]
impl DetectionStage for ExactMatcher {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Exact
    }

    async fn detect(&self, input: StageInput<'_>) -> StageOutcome {
        match self.match_exact(input.text, input.index) {
            Some(handle) => StageOutcome::Match(StageMatch {
                handle,
                confidence: 1.0,
            }),
            None => StageOutcome::Pass,
        }
    }
}
