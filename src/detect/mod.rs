//! Creator detection — normalization, alias index, and the matching tiers.
//!
//! The three tiers (exact → fuzzy → fallback) share one stage contract:
//! normalized text in, optional match with confidence out. The decision
//! cascade in [`crate::pipeline::cascade`] is a plain loop over a slice of
//! stages with stop-at-first-success semantics.

pub mod exact;
pub mod fuzzy;
pub mod index;
pub mod intent;
pub mod normalize;

use async_trait::async_trait;

use crate::detect::index::AliasIndex;
use crate::pipeline::types::DetectionMethod;

/// A positive (or near-positive) identification from one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageMatch {
    /// Canonical creator handle.
    pub handle: String,
    /// Confidence in `[0, 1]` — clamped by the producing stage.
    pub confidence: f64,
}

/// Outcome of running one detection stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Confident identification; the cascade stops here.
    Match(StageMatch),
    /// Best candidate fell between the reject floor and the acceptance
    /// threshold. Not a match, but carried forward as a hint for the
    /// fallback stage.
    NearMiss(StageMatch),
    /// Nothing usable; the cascade moves on.
    Pass,
}

/// Input handed to every stage: the once-normalized text plus read-only
/// context.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// Normalized message text (see [`normalize::normalize`]).
    pub text: &'a str,
    /// Active alias index snapshot.
    pub index: &'a AliasIndex,
    /// Near-miss recorded by an earlier stage, if any.
    pub near_miss: Option<&'a StageMatch>,
}

/// One tier of the detection cascade.
#[async_trait]
pub trait DetectionStage: Send + Sync {
    /// Which method this stage reports on a match.
    fn method(&self) -> DetectionMethod;

    /// Attempt to identify a creator in the input.
    async fn detect(&self, input: StageInput<'_>) -> StageOutcome;
}

/// True if `needle` occurs in `text` bounded by non-alphanumerics.
///
/// "mkbhd sent me" contains "mkbhd"; "amkbhdz" does not. Multi-word
/// needles match across the same boundaries.
pub(crate) fn contains_bounded(text: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = text[from..].find(needle) {
        let begin = from + pos;
        let end = begin + needle.len();
        let before_ok = text[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        match text[begin..].chars().next() {
            Some(c) => from = begin + c.len_utf8(),
            None => break,
        }
    }
    false
}

/// Hyphenation views of a string: as-is, hyphens as spaces, hyphens removed.
///
/// Lets "mk-bhd" match the alias "mkbhd" and "casey-neistat" match
/// "casey neistat" without the normalizer destroying hyphenated tokens.
pub(crate) fn hyphen_variants(s: &str) -> [String; 3] {
    [s.to_string(), s.replace('-', " "), s.replace('-', "")]
}
