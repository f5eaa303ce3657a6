//! Reply composition from the active template set.
//!
//! Composition never fails: a missing template key is logged and replaced
//! by a neutral fallback line so the user always gets *something* back.

use tracing::warn;

use crate::config::TemplateSet;

/// Reply sent when a template key is missing from the active set.
pub const FALLBACK_REPLY: &str =
    "Thanks for reaching out! Could you tell us which creator sent you?";

/// Values available to template placeholders.
#[derive(Debug, Default, Clone)]
pub struct ReplyContext<'a> {
    /// Fills `{creator_handle}`.
    pub creator: Option<&'a str>,
    /// Fills `{discount_code}`.
    pub code: Option<&'a str>,
    /// Fills `{alternate_creator}`.
    pub alternate: Option<&'a str>,
}

/// Render the template under `key`, substituting known placeholders.
///
/// Placeholders with no value in the context are left untouched, which
/// makes a half-filled template visible in logs rather than silently
/// blank.
pub fn compose(templates: &TemplateSet, key: &str, ctx: &ReplyContext<'_>) -> String {
    let template = match templates.get(key) {
        Some(t) => t,
        None => {
            warn!(key, "Template key missing, using fallback reply");
            return FALLBACK_REPLY.to_string();
        }
    };

    let mut out = template.to_string();
    if let Some(creator) = ctx.creator {
        out = out.replace("{creator_handle}", creator);
    }
    if let Some(code) = ctx.code {
        out = out.replace("{discount_code}", code);
    }
    if let Some(alternate) = ctx.alternate {
        out = out.replace("{alternate_creator}", alternate);
    }
    out
}
