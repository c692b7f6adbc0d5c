pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;
pub mod schema;

pub use client::{GeminiClient, TextGenerator};
pub use models::{GenerationConfig, ModelRequest, DEFAULT_MODEL};
pub use parse::recover;
pub use prompts::{PromptTemplate, PromptTemplates, TemplateKind};
