//! The resilient model invoker.
//!
//! Selects a model from the provider catalog, calls it with bounded retry
//! and fallback, and returns a schema-validated [`StructuredResult`] or a
//! classified [`AnalysisError`].
//!
//! [`StructuredResult`]: crate::core::StructuredResult
//! [`AnalysisError`]: crate::errors::AnalysisError

#[cfg(feature = "http")]
mod gemini;
mod parse;
mod prompt;
mod provider;
mod resilient;

#[cfg(feature = "http")]
pub use gemini::{GeminiModelProvider, DEFAULT_BASE_URL, DEFAULT_INLINE_LIMIT_BYTES};
pub use parse::{extract_json, parse_model_output};
pub use prompt::{analysis_prompt, strict_prompt};
pub use provider::{ModelInfo, ModelProvider, RawResponse};
pub use resilient::{ModelSelection, ResilientModelInvoker, ANALYSIS_STEP, SELECTION_STEP};
