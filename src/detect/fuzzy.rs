//! Fuzzy matcher — windowed approximate matching against aliases.
//!
//! Each alias is scored against contiguous token windows of the text
//! (window length = alias length in tokens, ±1) with Jaro-Winkler, so a
//! short alias buried in a longer sentence still scores on its own window
//! rather than being diluted by the whole string. Scores are clamped to
//! `[0, 1]` before any comparison or storage.

use async_trait::async_trait;
use tracing::debug;

use crate::config::Thresholds;
use crate::detect::index::AliasIndex;
use crate::detect::{DetectionStage, StageInput, StageMatch, StageOutcome};
use crate::pipeline::types::DetectionMethod;

/// Scored fuzzy result before threshold policy is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum FuzzyOutcome {
    /// Best score cleared the creator's acceptance threshold.
    Match(StageMatch),
    /// Best score landed between the reject floor and the threshold —
    /// rejected, but recorded as a hint for the fallback stage.
    NearMiss(StageMatch),
    /// Best score fell below the reject floor.
    NoMatch,
}

/// Approximate alias matcher with per-creator acceptance thresholds.
#[derive(Debug)]
pub struct FuzzyMatcher {
    accept_default: f64,
    reject_floor: f64,
}

impl FuzzyMatcher {
    pub fn new(accept_default: f64, reject_floor: f64) -> Self {
        Self {
            accept_default,
            reject_floor,
        }
    }

    pub fn from_thresholds(thresholds: &Thresholds) -> Self {
        Self::new(thresholds.fuzzy_accept, thresholds.fuzzy_reject_floor)
    }

    /// Score all aliases against the text and apply threshold policy.
    pub fn evaluate(&self, text: &str, index: &AliasIndex) -> FuzzyOutcome {
        // Fold hyphens to spaces up front; fuzzy scoring tolerates the
        // residual difference either way.
        let folded = text.replace('-', " ");
        let tokens: Vec<&str> = folded.split_whitespace().collect();
        if tokens.is_empty() {
            return FuzzyOutcome::NoMatch;
        }

        let mut best: Option<(f64, &str, &str)> = None; // (score, handle, alias)

        for creator in index.creators() {
            for alias in &creator.aliases {
                let alias_folded = alias.replace('-', " ");
                let score = best_window_score(&tokens, &alias_folded).clamp(0.0, 1.0);
                if best.map_or(true, |(s, _, _)| score > s) {
                    best = Some((score, creator.handle.as_str(), alias.as_str()));
                }
            }
        }

        let (score, handle, alias) = match best {
            Some(b) => b,
            None => return FuzzyOutcome::NoMatch,
        };

        let threshold = index.threshold_for(handle, self.accept_default);
        if score >= threshold {
            debug!(handle, alias, score, "Fuzzy match accepted");
            FuzzyOutcome::Match(StageMatch {
                handle: handle.to_string(),
                confidence: score,
            })
        } else if score >= self.reject_floor {
            debug!(handle, alias, score, threshold, "Fuzzy near-miss recorded");
            FuzzyOutcome::NearMiss(StageMatch {
                handle: handle.to_string(),
                confidence: score,
            })
        } else {
            FuzzyOutcome::NoMatch
        }
    }
}

/// Best Jaro-Winkler score of `alias` against any token window of the text.
fn best_window_score(tokens: &[&str], alias: &str) -> f64 {
    let alias_len = alias.split_whitespace().count().max(1);
    let lo = alias_len.saturating_sub(1).max(1);
    let hi = (alias_len + 1).min(tokens.len());

    let mut best = 0.0f64;
    for width in lo..=hi {
        if width > tokens.len() {
            break;
        }
        for start in 0..=(tokens.len() - width) {
            let window = tokens[start..start + width].join(" ");
            let score = strsim::jaro_winkler(&window, alias);
            if score > best {
                best = score;
            }
        }
    }
    best
}

#[async_trait]
impl DetectionStage for FuzzyMatcher {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Fuzzy
    }

    async fn detect(&self, input: StageInput<'_>) -> StageOutcome {
        match self.evaluate(input.text, input.index) {
            FuzzyOutcome::Match(m) => StageOutcome::Match(m),
            FuzzyOutcome::NearMiss(m) => StageOutcome::NearMiss(m),
            FuzzyOutcome::NoMatch => StageOutcome::Pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CampaignConfig;
    use crate::detect::normalize::normalize;

    fn index() -> AliasIndex {
        AliasIndex::from_config(&CampaignConfig::demo()).unwrap()
    }

    fn default_matcher() -> FuzzyMatcher {
        FuzzyMatcher::from_thresholds(&Thresholds::default())
    }

    #[test]
    fn accepts_misspelled_creator() {
        let outcome = default_matcher().evaluate(&normalize("marqes brwnli pls"), &index());
        match outcome {
            FuzzyOutcome::Match(m) => {
                assert_eq!(m.handle, "mkbhd");
                assert!(m.confidence >= 0.8 && m.confidence <= 1.0);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn short_alias_in_long_sentence_scores_on_its_window() {
        let text = normalize("hey there, I think it was peter mckinon who sent me over");
        let outcome = default_matcher().evaluate(&text, &index());
        match outcome {
            FuzzyOutcome::Match(m) => assert_eq!(m.handle, "peter_mckinnon"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn near_miss_when_threshold_raised() {
        // With an impossible acceptance bar, a strong candidate lands in
        // the near-miss band instead of matching.
        let matcher = FuzzyMatcher::new(0.99, 0.6);
        let outcome = matcher.evaluate(&normalize("marqes brwnli pls"), &index());
        match outcome {
            FuzzyOutcome::NearMiss(m) => {
                assert_eq!(m.handle, "mkbhd");
                assert!(m.confidence < 0.99 && m.confidence >= 0.6);
            }
            other => panic!("expected near-miss, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unrelated_text_below_floor() {
        let outcome = default_matcher().evaluate("zzz qqq xxx", &index());
        assert_eq!(outcome, FuzzyOutcome::NoMatch);
    }

    #[test]
    fn empty_text_is_no_match() {
        assert_eq!(default_matcher().evaluate("", &index()), FuzzyOutcome::NoMatch);
    }

    #[test]
    fn per_creator_threshold_override_applies() {
        let raw = r#"
campaign = "x"
[creators.strict_creator]
code = "S1"
aliases = ["strictly unique name"]
fuzzy_threshold = 0.999
"#;
        let config = CampaignConfig::from_toml(raw).unwrap();
        let idx = AliasIndex::from_config(&config).unwrap();
        let matcher = FuzzyMatcher::new(0.8, 0.6);
        // Near-perfect but not exact: blocked by the per-creator override.
        let outcome = matcher.evaluate("strictly unique nam", &idx);
        assert!(matches!(outcome, FuzzyOutcome::NearMiss(_)));
    }

    #[test]
    fn confidence_always_within_bounds() {
        let matcher = default_matcher();
        let idx = index();
        for text in ["mkbhd", "marqes brwnli", "casey neistt", "zzz", "peter mckinnon sent me"] {
            match matcher.evaluate(&normalize(text), &idx) {
                FuzzyOutcome::Match(m) | FuzzyOutcome::NearMiss(m) => {
                    assert!((0.0..=1.0).contains(&m.confidence), "confidence out of range for {text}");
                }
                FuzzyOutcome::NoMatch => {}
            }
        }
    }

    #[tokio::test]
    async fn stage_contract_maps_outcomes() {
        let idx = index();
        let matcher = default_matcher();
        let text = normalize("marqes brwnli pls");
        let outcome = matcher
            .detect(StageInput {
                text: &text,
                index: &idx,
                near_miss: None,
            })
            .await;
        assert!(matches!(outcome, StageOutcome::Match(_)));
        assert_eq!(matcher.method(), DetectionMethod::Fuzzy);
    }
}
