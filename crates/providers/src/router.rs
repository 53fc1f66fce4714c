//! Builds the provider stack from configuration.

use crate::anthropic::AnthropicProvider;
use crate::retry::{RetryPolicy, RetryProvider};
use settlr_core::error::ProviderError;
use settlr_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Build the Anthropic provider wrapped in the configured retry policy.
///
/// Fails with [`ProviderError::NotConfigured`] when no API key is set.
pub fn build_from_config(
    config: &settlr_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "no Anthropic API key (set SETTLR_API_KEY or ANTHROPIC_API_KEY)".into(),
            )
        })?;

    let provider = AnthropicProvider::with_timeout(
        api_key,
        Duration::from_secs(config.provider.request_timeout_secs),
    )
    .with_base_url(&config.provider.base_url);

    let policy = RetryPolicy::new(
        config.provider.max_retries,
        Duration::from_millis(config.provider.initial_backoff_ms),
    );

    Ok(Arc::new(RetryProvider::new(Arc::new(provider), policy)))
}
