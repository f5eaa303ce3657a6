//! Core data types flowing through the pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Messaging platform the message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Tiktok,
    Whatsapp,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Whatsapp => "whatsapp",
        };
        f.write_str(s)
    }
}

impl FromStr for Platform {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            "whatsapp" => Ok(Platform::Whatsapp),
            other => Err(PipelineError::Validation(format!(
                "unknown platform: {other}"
            ))),
        }
    }
}

/// How a creator was identified, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Exact,
    Fuzzy,
    Llm,
    None,
}

/// Terminal status of one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// In scope, but no creator identified; user was asked to clarify.
    PendingCreatorInfo,
    /// Creator resolved and a reply with a code was sent.
    Completed,
    /// A downstream failure prevented normal handling.
    Error,
    /// Message was not about discounts or creators.
    OutOfScope,
}

/// One inbound message, already attributed to a platform user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub platform: Platform,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub message_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(platform: Platform, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            platform,
            user_id: user_id.into(),
            text: text.into(),
            message_id: None,
            received_at: Utc::now(),
        }
    }
}

/// Outcome of the detection cascade for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Canonical handle, when a stage matched.
    pub creator: Option<String>,
    pub method: DetectionMethod,
    /// Confidence in `[0, 1]`; 0.0 when nothing matched.
    pub confidence: f64,
}

impl DetectionResult {
    pub fn unresolved() -> Self {
        Self {
            creator: None,
            method: DetectionMethod::None,
            confidence: 0.0,
        }
    }
}

/// Persisted record of one processed interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: Uuid,
    pub platform: Platform,
    pub user_id: String,
    /// Campaign the record belongs to; part of the issuance key.
    pub campaign: String,
    pub ts: DateTime<Utc>,
    pub raw_text: String,
    pub identified_creator: Option<String>,
    pub detection_method: DetectionMethod,
    pub discount_code_sent: Option<String>,
    pub conversation_status: ConversationStatus,
}

/// Which branch of the issuance policy a completed reply took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceKind {
    /// First code for this (platform, user, campaign).
    New,
    /// Same creator again; code re-sent.
    Repeat,
    /// Different creator named; original code restated.
    Committed,
}

/// Everything the caller gets back for one processed message.
#[derive(Debug, Clone)]
pub struct ProcessedInteraction {
    /// Reply text ready to send back to the user.
    pub reply_text: String,
    /// The record as persisted.
    pub record: InteractionRecord,
    pub method: DetectionMethod,
    pub confidence: f64,
    /// Set only when a code-bearing reply was composed.
    pub issuance: Option<IssuanceKind>,
    /// Stage-by-stage trail for observability.
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_display_and_fromstr() {
        for p in [Platform::Instagram, Platform::Tiktok, Platform::Whatsapp] {
            assert_eq!(p.to_string().parse::<Platform>().unwrap(), p);
        }
        assert!("  WhatsApp ".parse::<Platform>().is_ok());
        assert!("carrier_pigeon".parse::<Platform>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&ConversationStatus::PendingCreatorInfo).unwrap();
        assert_eq!(json, "\"pending_creator_info\"");
        let json = serde_json::to_string(&DetectionMethod::Llm).unwrap();
        assert_eq!(json, "\"llm\"");
        let json = serde_json::to_string(&Platform::Tiktok).unwrap();
        assert_eq!(json, "\"tiktok\"");
    }

    #[test]
    fn record_serializes_with_all_fields() {
        let record = InteractionRecord {
            id: Uuid::new_v4(),
            platform: Platform::Instagram,
            user_id: "u1".into(),
            campaign: "spring".into(),
            ts: Utc::now(),
            raw_text: "mkbhd sent me".into(),
            identified_creator: Some("mkbhd".into()),
            detection_method: DetectionMethod::Exact,
            discount_code_sent: Some("MARQUES20".into()),
            conversation_status: ConversationStatus::Completed,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["conversation_status"], "completed");
        assert_eq!(json["detection_method"], "exact");
        assert_eq!(json["discount_code_sent"], "MARQUES20");
    }
}
