pub mod ollama;

use anyhow::Result;

pub use ollama::OllamaClient;

/// Anything that turns a prompt into text.
pub trait TextGenerator: Send + Sync {
    /// `max_tokens` is a budget hint for the model, not a hard cut.
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}
