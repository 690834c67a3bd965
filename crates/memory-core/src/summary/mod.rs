//! Structured conversation summaries.
//!
//! A [`SummaryRecord`] is the unit of compressed memory for one thread. The
//! [`slicer`] functions decide which parts a model sees and how records are
//! merged across summarization cycles; [`extraction`] turns raw model output
//! into a record.

pub mod extraction;
pub mod record;
pub mod slicer;

pub use extraction::{parse_extraction, ExtractionOutcome};
pub use record::{EntityMap, StoredSummary, SummaryField, SummaryRecord};
pub use slicer::{
    merge, render_for_prompt, select_class_for_model, slice, stats, SizeClass, SummaryStats,
};
