//! HTTP model invokers for thread memory.

pub mod openrouter;
pub mod protocol;

pub use openrouter::{OpenRouterInvoker, DEFAULT_BASE_URL};
