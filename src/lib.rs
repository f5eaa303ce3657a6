//! Discount-code agent for creator referral campaigns.
//!
//! Inbound platform messages are normalized, gated for intent, then run
//! through a tiered detection cascade (exact alias match, fuzzy match,
//! bounded external classifier) to identify the referring creator. A
//! keyed issuance guard enforces one code per user per campaign, replies
//! are composed from configurable templates, and every interaction is
//! persisted as an append-only record.
//!
//! [`pipeline::MessageProcessor`] is the front door; everything else is
//! plumbing behind it.

pub mod config;
pub mod detect;
pub mod error;
pub mod fallback;
pub mod pipeline;
pub mod reply;
pub mod store;

pub use error::{Error, Result};
