//! Token budget management for LLM conversations.
//!
//! - [`counter`]: approximate word-based token estimation
//! - [`profiles`]: per-model context window and summary-size metadata
//! - [`context`]: per-conversation usage accumulator and stateless validation
//! - [`trimming`]: fitting message lists into a window
//! - [`types`]: prepared-context types and conversational budget errors

pub mod context;
pub mod counter;
pub mod profiles;
pub mod trimming;
pub mod types;

pub use context::{
    advisory_for, validate_context, AdvisoryLevel, BudgetAdvisory, BudgetStatus, ContextBudget, UsageEntry,
};
pub use counter::{TokenEstimate, TokenEstimator};
pub use profiles::{ModelProfile, ModelProfileRegistry, ResolvedProfile};
pub use trimming::{clean_messages, filter_by_length, trim_to_context};
pub use types::{BudgetError, PreparedContext, TokenUsageBreakdown};
