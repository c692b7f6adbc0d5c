//! chart-coder library crate
//!
//! Turns clinical chart text into CPT/ICD coding suggestions, sectional
//! analysis, rationales and coding alerts via a remote language model, and
//! recovers structured JSON from whatever text the model sends back.

pub mod catalog;
pub mod config;
pub mod suggest;

pub use suggest::error::CodingError;
pub use suggest::llm::parse::recover;
pub use suggest::CodingAssistant;
