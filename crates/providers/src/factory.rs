use lifeos_core::{Config, Error, Result};
use std::sync::Arc;
use tracing::info;

use crate::{GroqProvider, Provider};

/// Build the configured LLM provider. Fails fast when no API key is
/// resolvable; the orchestration pipeline has nothing to do without one.
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let api_key = config.resolve_api_key().ok_or_else(|| {
        Error::Config(
            "No API key configured. Set provider.apiKey in config.json or GROQ_API_KEY."
                .to_string(),
        )
    })?;

    info!(model = %config.provider.model, "Creating LLM provider");

    Ok(Arc::new(GroqProvider::new(
        &api_key,
        config.provider.api_base.as_deref(),
        &config.provider.model,
    )))
}
