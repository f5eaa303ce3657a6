//! Intent gate — scope filter run before any detection effort.
//!
//! A message is in scope if it mentions a discount keyword, names a known
//! creator, or matches the "from <candidate>" referral pattern with a
//! fuzzy candidate. Messages failing all three are out of scope and never
//! reach the matchers or the fallback caller — that is the cost-control
//! contract, not an optimization.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::Thresholds;
use crate::detect::index::AliasIndex;
use crate::detect::{contains_bounded, hyphen_variants};

/// Keywords that mark a message as discount-related on their own.
const DISCOUNT_KEYWORDS: &[&str] = &[
    "discount", "code", "coupon", "promo", "voucher", "creator", "sent me", "referral", "story",
];

/// Minimum alias length considered by the substring check — two-letter
/// aliases produce too many accidental hits.
const MIN_ALIAS_LEN: usize = 3;

fn referral_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "from <candidate>" where the candidate is one or two tokens,
    // optionally @-prefixed (the normalizer strips leading @ already,
    // but keep the pattern tolerant).
    RE.get_or_init(|| {
        Regex::new(r"\bfrom\s+@?([a-z0-9'_-]+)(?:\s+([a-z0-9'_-]+))?")
            .unwrap_or_else(|e| unreachable!("referral regex is invalid: {e}"))
    })
}

/// Decide whether a normalized message plausibly concerns a discount or
/// creator at all.
pub fn is_in_scope(text: &str, index: &AliasIndex, thresholds: &Thresholds) -> bool {
    if text.is_empty() {
        return false;
    }

    for keyword in DISCOUNT_KEYWORDS {
        if contains_bounded(text, keyword) {
            debug!(keyword, "Intent gate: discount keyword hit");
            return true;
        }
    }

    if mentions_known_creator(text, index) {
        return true;
    }

    if let Some(candidate) = referral_candidate(text, index, thresholds.gate_referral) {
        debug!(candidate = %candidate, "Intent gate: referral pattern hit");
        return true;
    }

    false
}

/// Does the text contain any alias or handle as a bounded substring?
fn mentions_known_creator(text: &str, index: &AliasIndex) -> bool {
    let views = hyphen_variants(text);
    for creator in index.creators() {
        for alias in &creator.aliases {
            if alias.len() < MIN_ALIAS_LEN {
                continue;
            }
            for alias_view in hyphen_variants(alias) {
                if views.iter().any(|v| contains_bounded(v, &alias_view)) {
                    debug!(alias = %alias, handle = %creator.handle, "Intent gate: creator mention");
                    return true;
                }
            }
        }
    }
    false
}

/// Extract a "from <candidate>" mention and fuzzy-compare the candidate
/// against the alias set at the looser gate threshold.
///
/// The candidate does not need to be an exact alias — near-miss mentions
/// ("from marqes brwnli") still open the gate so the full cascade gets a
/// chance at them.
fn referral_candidate(text: &str, index: &AliasIndex, gate_threshold: f64) -> Option<String> {
    let caps = referral_regex().captures(text)?;
    let one = caps.get(1)?.as_str();
    let two = caps.get(2).map(|m| m.as_str());

    let mut candidates = vec![one.to_string()];
    if let Some(second) = two {
        candidates.push(format!("{one} {second}"));
    }

    for candidate in candidates.iter().rev() {
        for creator in index.creators() {
            for alias in &creator.aliases {
                let score = strsim::jaro_winkler(candidate, alias).clamp(0.0, 1.0);
                if score >= gate_threshold {
                    return Some(candidate.clone());
                }
            }
        }
    }
    None
}
