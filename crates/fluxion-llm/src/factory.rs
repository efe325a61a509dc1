//! Provider factory
//!
//! The only place that maps a provider tag onto a concrete backend.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

use crate::ollama::{self, OllamaProvider};
use crate::openai::{self, OpenAiProvider};
use crate::provider::{BoxedProvider, ProviderType};

/// Build a provider for `provider_type`.
///
/// `model` defaults to the backend's own default; `api_key` and `base_url`
/// fall back to the backend's environment variables.
pub fn create_provider(
    provider_type: ProviderType,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
) -> Result<BoxedProvider> {
    let provider: BoxedProvider = match provider_type {
        ProviderType::Ollama => Arc::new(OllamaProvider::new(
            api_key,
            base_url,
            model.unwrap_or_else(|| ollama::DEFAULT_MODEL.to_string()),
        )?),
        ProviderType::OpenAI => Arc::new(OpenAiProvider::new(
            api_key,
            base_url,
            model.unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
        )?),
    };

    info!(
        "Created {} provider with model {}",
        provider.provider_type(),
        provider.default_model()
    );
    Ok(provider)
}

/// Same as [`create_provider`] but keyed by a string tag such as `"ollama"`.
pub fn provider_from_tag(
    tag: &str,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
) -> Result<BoxedProvider> {
    let provider_type: ProviderType = tag.parse().map_err(|e: String| anyhow!(e))?;
    create_provider(provider_type, model, api_key, base_url)
}
