//! fluxion-llm: Model Backend Integration
//!
//! ## Supported Providers & Endpoints
//!
//! | Provider | Base URL | Auth Method |
//! |----------|----------|-------------|
//! | Ollama | `$URL_BASE_OLLAMA` + `/api/generate` | `X-API-Key: {KEY_OLLAMA}` (optional) |
//! | OpenAI | `https://api.openai.com/v1` + `/chat/completions` | `Bearer {KEY_OPENAI}` |
//!
//! ## Environment Variables
//!
//! ```bash
//! URL_BASE_OLLAMA=http://localhost:11434   # Ollama (required for ollama)
//! KEY_OLLAMA=xxx                           # Ollama (optional)
//! KEY_OPENAI=sk-xxx                        # OpenAI
//! URL_BASE_OPENAI=https://api.openai.com/v1
//! ```

pub mod factory;
pub mod lines;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod scripted;

pub use factory::{create_provider, provider_from_tag};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{
    BoxedProvider, ChatMessage, ChatRole, GenerationOptions, LlmProvider, LlmResponse,
    ProviderType, TextStream, TokenUsage,
};
pub use scripted::{RecordedCall, ScriptedProvider};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::provider::{
        BoxedProvider, ChatMessage, ChatRole, GenerationOptions, LlmProvider, LlmResponse,
        ProviderType,
    };
}
