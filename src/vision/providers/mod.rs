pub mod agent;
pub mod anthropic;
pub mod openai_compatible;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{resolve_api_key, AgentEnvironment, ProviderEntry};
use crate::errors::{ProbeError, ProbeResult};
use crate::vision::types::CallOutput;

/// One vision-model call: system + user prompt and a single base64 image in,
/// assistant text and reported usage out. Providers differ only in transport.
#[async_trait]
pub trait VisionCall: Send + Sync {
    /// Identifier matching the pricing table / config key.
    fn provider_id(&self) -> &str;

    fn model(&self) -> &str;

    async fn call(&self, system: &str, user: &str, image_b64: &str) -> ProbeResult<CallOutput>;
}

/// Closed set of provider families. New vendors are new variants, not new
/// string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAiCompatible,
    Agent,
}

impl ProviderKind {
    /// Maps a config `adapter` field to a family; absent means
    /// OpenAI-compatible, matching how most endpoints advertise themselves.
    pub fn from_adapter(adapter: Option<&str>) -> ProbeResult<Self> {
        match adapter {
            Some("anthropic") => Ok(ProviderKind::Anthropic),
            Some("agent") => Ok(ProviderKind::Agent),
            None | Some("openai") => Ok(ProviderKind::OpenAiCompatible),
            Some(other) => Err(ProbeError::Config(format!(
                "unknown vision adapter '{other}'"
            ))),
        }
    }
}

/// Builds the call strategy for one configured provider.
pub fn build_provider(
    id: &str,
    entry: &ProviderEntry,
    agent_env: &AgentEnvironment,
    http_timeout: Duration,
) -> ProbeResult<Arc<dyn VisionCall>> {
    let kind = ProviderKind::from_adapter(entry.adapter.as_deref())?;
    let api_key = resolve_api_key(id, entry);
    let provider: Arc<dyn VisionCall> = match kind {
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicVision::new(
            id.to_string(),
            entry.api_base.clone(),
            api_key,
            entry.model.clone(),
            entry.max_tokens,
            http_timeout,
        )?),
        ProviderKind::OpenAiCompatible => Arc::new(openai_compatible::OpenAiCompatibleVision::new(
            id.to_string(),
            entry.api_base.clone(),
            api_key,
            entry.model.clone(),
            entry.max_tokens,
            http_timeout,
        )?),
        ProviderKind::Agent => Arc::new(agent::AgentVision::new(
            id.to_string(),
            agent_env.clone(),
            http_timeout,
        )),
    };
    Ok(provider)
}
