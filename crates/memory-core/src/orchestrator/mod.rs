//! Summarization workflow for conversational threads.
//!
//! After each message the caller hands the thread to
//! [`SummarizationOrchestrator::maybe_summarize`]. Once enough new messages
//! have accumulated, the thread history (seeded with the previous summary)
//! is sent to an extraction model, the structured result is merged with the
//! previous record, and the merged record is appended to the store.
//!
//! Summarization never fails the conversation: every error is logged and
//! reported through [`SummarizationOutcome`].

pub mod chat_context;
pub mod prompt;

use crate::budget::{
    validate_context, BudgetStatus, ModelProfileRegistry, TokenEstimator,
};
use crate::config::{ChatContextConfig, SummarizationConfig, TriggerPolicy};
use crate::error::{StorageError, SummarizationError};
use crate::llm::SharedModelInvoker;
use crate::storage::SharedThreadStore;
use crate::summary::{
    merge, parse_extraction, render_for_prompt, select_class_for_model, stats, ExtractionOutcome,
    StoredSummary, SummaryRecord,
};
use crate::types::HasContent;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-thread workflow state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPhase {
    #[default]
    Accumulating,
    Summarizing,
}

/// Why a summarization attempt did nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    NoMessages,
    BelowThreshold { pending: usize, threshold: usize },
}

/// Result of one summarization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SummarizationOutcome {
    Skipped {
        reason: SkipReason,
    },
    Summarized {
        message_count_covered: usize,
        /// Extraction output was only partly usable
        degraded: bool,
        total_items: usize,
    },
    /// Nothing was persisted; the previous record stays authoritative
    Failed {
        reason: String,
    },
}

impl SummarizationOutcome {
    pub fn is_summarized(&self) -> bool {
        matches!(self, SummarizationOutcome::Summarized { .. })
    }
}

/// Counters over the orchestrator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizationCounters {
    pub attempts: u64,
    pub skipped: u64,
    pub summarized: u64,
    pub degraded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct AtomicCounters {
    attempts: AtomicU64,
    skipped: AtomicU64,
    summarized: AtomicU64,
    degraded: AtomicU64,
    failed: AtomicU64,
}

impl AtomicCounters {
    fn record(&self, outcome: &SummarizationOutcome) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            SummarizationOutcome::Skipped { .. } => &self.skipped,
            SummarizationOutcome::Summarized { degraded, .. } => {
                if *degraded {
                    self.degraded.fetch_add(1, Ordering::Relaxed);
                }
                &self.summarized
            }
            SummarizationOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SummarizationCounters {
        SummarizationCounters {
            attempts: self.attempts.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            summarized: self.summarized.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Decide whether a thread with `total` messages, `covered` of them already
/// summarized, is due.
pub fn check_trigger(
    policy: TriggerPolicy,
    threshold: usize,
    total: usize,
    covered: usize,
) -> Result<(), SkipReason> {
    if total == 0 {
        return Err(SkipReason::NoMessages);
    }
    let threshold = threshold.max(1);
    let pending = total.saturating_sub(covered);

    let due = match policy {
        TriggerPolicy::SinceLastSummary => pending >= threshold,
        TriggerPolicy::EveryNth => pending > 0 && total % threshold == 0,
    };

    if due {
        Ok(())
    } else {
        Err(SkipReason::BelowThreshold { pending, threshold })
    }
}

/// Resets the thread's phase when an attempt ends, cancellation included.
struct PhaseGuard<'a> {
    phases: &'a DashMap<String, ThreadPhase>,
    thread_id: String,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phases: &'a DashMap<String, ThreadPhase>, thread_id: &str) -> Self {
        phases.insert(thread_id.to_string(), ThreadPhase::Summarizing);
        Self {
            phases,
            thread_id: thread_id.to_string(),
        }
    }
}

/// Threads without an entry are accumulating.
impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phases.remove(&self.thread_id);
    }
}

/// Drives the summarization lifecycle for every thread of a store.
pub struct SummarizationOrchestrator {
    store: SharedThreadStore,
    invoker: SharedModelInvoker,
    profiles: Arc<ModelProfileRegistry>,
    estimator: TokenEstimator,
    config: SummarizationConfig,
    chat_config: ChatContextConfig,
    /// One lock per thread; attempts on the same thread run one at a time
    locks: DashMap<String, Arc<Mutex<()>>>,
    phases: DashMap<String, ThreadPhase>,
    counters: AtomicCounters,
}

impl std::fmt::Debug for SummarizationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizationOrchestrator")
            .field("config", &self.config)
            .field("threads", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl SummarizationOrchestrator {
    pub fn new(
        store: SharedThreadStore,
        invoker: SharedModelInvoker,
        profiles: Arc<ModelProfileRegistry>,
        config: SummarizationConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            estimator: TokenEstimator::new(profiles.clone()),
            profiles,
            config,
            chat_config: ChatContextConfig::default(),
            locks: DashMap::new(),
            phases: DashMap::new(),
            counters: AtomicCounters::default(),
        }
    }

    pub fn with_chat_config(mut self, chat_config: ChatContextConfig) -> Self {
        self.chat_config = chat_config;
        self
    }

    pub fn store(&self) -> &SharedThreadStore {
        &self.store
    }

    pub fn profiles(&self) -> &Arc<ModelProfileRegistry> {
        &self.profiles
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn config(&self) -> &SummarizationConfig {
        &self.config
    }

    pub fn counters(&self) -> SummarizationCounters {
        self.counters.snapshot()
    }

    pub fn phase(&self, thread_id: &str) -> ThreadPhase {
        self.phases
            .get(thread_id)
            .map(|p| *p.value())
            .unwrap_or_default()
    }

    /// Whether the thread is currently due, without doing anything.
    pub async fn should_summarize(&self, thread_id: &str) -> Result<bool, StorageError> {
        let total = self.store.get_messages(thread_id).await?.len();
        let covered = self.covered_count(thread_id, total).await?;
        Ok(check_trigger(self.config.trigger, self.config.threshold, total, covered).is_ok())
    }

    /// Summarize the thread if the trigger policy says it is due.
    ///
    /// Never returns an error; failures come back as
    /// [`SummarizationOutcome::Failed`] and leave the store untouched.
    pub async fn maybe_summarize(&self, thread_id: &str) -> SummarizationOutcome {
        self.run(thread_id, false).await
    }

    /// Summarize regardless of the trigger policy, as long as the thread has messages.
    pub async fn summarize_now(&self, thread_id: &str) -> SummarizationOutcome {
        self.run(thread_id, true).await
    }

    /// Run [`maybe_summarize`](Self::maybe_summarize) on a background task.
    pub fn spawn_maybe_summarize(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
    ) -> JoinHandle<SummarizationOutcome> {
        let orchestrator = Arc::clone(self);
        let thread_id = thread_id.into();
        tokio::spawn(async move { orchestrator.maybe_summarize(&thread_id).await })
    }

    /// The latest summary sliced and rendered for `model`; empty when the
    /// thread has no summary or the store cannot be read.
    pub async fn get_rendered_context(&self, thread_id: &str, model: &str) -> String {
        match self.store.get_latest_summary(thread_id).await {
            Ok(Some(stored)) => {
                let class = select_class_for_model(&self.profiles, model);
                render_for_prompt(&stored.record, class)
            }
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(thread_id, "Failed to load summary for rendering: {}", e);
                String::new()
            }
        }
    }

    pub async fn latest_summary(&self, thread_id: &str) -> Result<Option<StoredSummary>, StorageError> {
        self.store.get_latest_summary(thread_id).await
    }

    pub fn estimate_text(&self, text: &str, model: &str) -> u32 {
        self.estimator.estimate(text, model)
    }

    pub fn estimate_messages<M: HasContent>(
        &self,
        messages: &[M],
        model: &str,
        system_prompt: Option<&str>,
    ) -> u32 {
        self.estimator.estimate_messages(messages, model, system_prompt)
    }

    pub fn budget_status(&self, model: &str, used_tokens: u32, buffer: u32) -> BudgetStatus {
        validate_context(&self.profiles, model, used_tokens, buffer)
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    async fn covered_count(&self, thread_id: &str, total: usize) -> Result<usize, StorageError> {
        Ok(self
            .store
            .get_latest_summary(thread_id)
            .await?
            .map(|s| s.message_count_covered.min(total))
            .unwrap_or(0))
    }

    async fn run(&self, thread_id: &str, force: bool) -> SummarizationOutcome {
        let lock = self.thread_lock(thread_id);
        let guard = lock.lock().await;
        let result = self.summarize_locked(thread_id, force).await;
        drop(guard);
        drop(lock);
        // Waiters hold a clone, so a count of one means nobody needs this lock
        self.locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(thread_id, "Summarization failed, keeping previous summary: {}", e);
                SummarizationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.counters.record(&outcome);
        outcome
    }

    /// Caller holds the thread lock, so the trigger is evaluated against a
    /// state no other attempt can change underneath it.
    async fn summarize_locked(
        &self,
        thread_id: &str,
        force: bool,
    ) -> Result<SummarizationOutcome, SummarizationError> {
        let messages = self.store.get_messages(thread_id).await?;
        let previous = self.store.get_latest_summary(thread_id).await?;
        let total = messages.len();
        let covered = previous
            .as_ref()
            .map(|s| s.message_count_covered.min(total))
            .unwrap_or(0);

        let trigger = if force {
            if total == 0 {
                Err(SkipReason::NoMessages)
            } else {
                Ok(())
            }
        } else {
            check_trigger(self.config.trigger, self.config.threshold, total, covered)
        };
        if let Err(reason) = trigger {
            tracing::trace!(thread_id, ?reason, "Summarization not due");
            return Ok(SummarizationOutcome::Skipped { reason });
        }

        let _phase = PhaseGuard::enter(&self.phases, thread_id);
        let previous_record = previous.map(|s| s.record);

        // With a seed record only the uncovered tail needs reading
        let input = match &previous_record {
            Some(_) if covered < total => &messages[covered..],
            _ => &messages[..],
        };

        let prompt = prompt::build_extraction_request(
            &self.estimator,
            &self.config,
            previous_record.as_ref(),
            input,
        )?;
        tracing::info!(
            thread_id,
            model = %self.config.model,
            lines = prompt.lines_kept,
            "Summarizing {} messages",
            total
        );

        let timeout = self.config.timeout();
        let raw = tokio::time::timeout(timeout, self.invoker.invoke(prompt.request))
            .await
            .map_err(|_| SummarizationError::ExtractionTimeout(timeout))??;

        let (extracted, degraded) = match parse_extraction(&raw) {
            ExtractionOutcome::Complete(record) => (record, false),
            ExtractionOutcome::Partial { record, issues } => {
                tracing::warn!(thread_id, ?issues, "Extraction output partly usable");
                (record, true)
            }
            ExtractionOutcome::Failed { reason } => {
                return Err(SummarizationError::ExtractionParse(reason));
            }
        };

        let merged = match &previous_record {
            Some(prev) => merge(prev, &extracted),
            None => merge(&SummaryRecord::default(), &extracted),
        };
        let stored = self.store.save_summary(thread_id, &merged, total).await?;
        let total_items = stats(&stored.record).total_items;

        tracing::info!(
            thread_id,
            covered = stored.message_count_covered,
            total_items,
            degraded,
            "Summary saved"
        );

        Ok(SummarizationOutcome::Summarized {
            message_count_covered: stored.message_count_covered,
            degraded,
            total_items,
        })
    }
}
