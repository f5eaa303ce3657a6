//! Text normalization — the single canonical form every matcher sees.
//!
//! `normalize` runs exactly once per message (in the processor); the intent
//! gate, exact matcher, and fuzzy matcher all receive the same output, so a
//! message can never pass one tier and miss another because of formatting.

/// Normalize raw inbound text into a canonical comparable form.
///
/// Pure and deterministic. Lower-cases, folds Unicode punctuation variants
/// to ASCII, drops emoji and pictographic noise, strips surrounding
/// punctuation per token (including a leading `@`), collapses whitespace.
/// Internal hyphens are preserved — hyphenation variants are handled at
/// match time, not by destroying the token here.
pub fn normalize(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match fold_char(ch) {
            Some(c) => folded.push(c),
            None => {}
        }
    }

    let lowered = folded.to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    for token in lowered.split_whitespace() {
        let trimmed = trim_token(token);
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    out
}

/// Fold one character: ASCII-ify punctuation variants, drop emoji, keep the rest.
fn fold_char(ch: char) -> Option<char> {
    match ch {
        // Smart quotes and apostrophe variants
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{02BC}' => Some('\''),
        '\u{201C}' | '\u{201D}' | '\u{201E}' => Some('"'),
        // En/em/horizontal-bar dashes
        '\u{2013}' | '\u{2014}' | '\u{2015}' => Some('-'),
        // Ellipsis reads as a token separator
        '\u{2026}' => Some(' '),
        // Ideographic space
        '\u{3000}' => Some(' '),
        // Full-width ASCII forms
        '\u{FF01}'..='\u{FF5E}' => {
            char::from_u32(ch as u32 - 0xFEE0)
        }
        // Zero-width joiner and variation selectors (emoji plumbing)
        '\u{200D}' | '\u{FE00}'..='\u{FE0F}' => None,
        c if is_pictographic(c) => None,
        c => Some(c),
    }
}

/// Emoji and pictographic blocks removed during normalization.
fn is_pictographic(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1F000..=0x1FAFF   // emoji, symbols, flags, pictographs
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF   // misc symbols and arrows
        | 0x2190..=0x21FF   // arrows
        | 0x2300..=0x23FF   // technical (watch, hourglass)
    )
}

/// Strip surrounding punctuation from a token, keeping internal characters.
///
/// A leading `@` (handle prefix) is punctuation and comes off here. Hyphens,
/// apostrophes, and anything else inside the token survive.
fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_ascii_punctuation() || c == '\u{00A1}' || c == '\u{00BF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("   MkBhD    SeNt   Me   "), "mkbhd sent me");
    }

    #[test]
    fn strips_leading_at() {
        assert_eq!(normalize("@mkbhd sent me"), "mkbhd sent me");
    }

    #[test]
    fn strips_trailing_punctuation() {
        assert_eq!(normalize("mkbhd!!!"), "mkbhd");
        assert_eq!(normalize("I came from @mkbhd, need code"), "i came from mkbhd need code");
    }

    #[test]
    fn folds_smart_quotes() {
        assert_eq!(normalize("Lily\u{2019}s video discount"), "lily's video discount");
    }

    #[test]
    fn folds_dashes_and_fullwidth() {
        // a free-standing dash is punctuation-only and drops out
        assert_eq!(normalize("code \u{2014} please"), "code please");
        assert_eq!(normalize("\u{FF4D}\u{FF4B}\u{FF42}\u{FF48}\u{FF44}\u{FF01}"), "mkbhd");
    }

    #[test]
    fn removes_emoji_noise() {
        assert_eq!(normalize("mkbhd \u{1F603}\u{1F525} sent me"), "mkbhd sent me");
        // emoji with variation selector + ZWJ sequence
        assert_eq!(normalize("hi \u{2764}\u{FE0F}\u{200D}\u{1F525} there"), "hi there");
    }

    #[test]
    fn preserves_internal_hyphens() {
        assert_eq!(normalize("mk-bhd sent me"), "mk-bhd sent me");
        assert_eq!(normalize("-wrapped-"), "wrapped");
    }

    #[test]
    fn empty_and_noise_only_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("\u{1F525}\u{1F603}"), "");
        assert_eq!(normalize("!!! ... ???"), "");
    }

    #[test]
    fn idempotent_on_varied_inputs() {
        let inputs = [
            "   MkBhD    SeNt   Me   ",
            "Lily\u{2019}s video \u{1F525} discount!!!",
            "I came from @mkbhd, need code",
            "casey-neistat discount",
            "\u{FF43}\u{FF4F}\u{FF44}\u{FF45} \u{2014} now",
            "",
        ];
        for raw in inputs {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }
}
