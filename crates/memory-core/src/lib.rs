//! Thread memory: token budgeting and structured summarization for
//! long-running conversations.
//!
//! - [`budget`]: token estimation, model profiles and context accounting
//! - [`summary`]: summary records, size-class slicing, merging and extraction parsing
//! - [`orchestrator`]: the summarization workflow and chat-context preparation
//! - [`storage`]: thread message and summary persistence

pub mod budget;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod storage;
pub mod summary;
pub mod types;

pub use budget::{
    BudgetStatus, ContextBudget, ModelProfile, ModelProfileRegistry, PreparedContext,
    TokenEstimator,
};
pub use config::{ChatContextConfig, MemoryConfig, SummarizationConfig, TriggerPolicy};
pub use error::{ContextError, StorageError, SummarizationError};
pub use llm::{ModelCallError, ModelInvoker, ModelRequest, SharedModelInvoker};
pub use orchestrator::{SkipReason, SummarizationOrchestrator, SummarizationOutcome, ThreadPhase};
pub use storage::{InMemoryThreadStore, JsonlThreadStore, SharedThreadStore, ThreadStore};
pub use summary::{SizeClass, StoredSummary, SummaryRecord};
pub use types::{Message, PromptMessage, Role};
