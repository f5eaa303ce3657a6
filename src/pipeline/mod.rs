//! Message pipeline: intent gate → detection cascade → issuance → reply.

pub mod cascade;
pub mod issuance;
pub mod processor;
pub mod types;

pub use cascade::Cascade;
pub use issuance::{IssuanceDecision, IssuanceGuard};
pub use processor::MessageProcessor;
