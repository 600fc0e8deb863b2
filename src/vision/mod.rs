//! Visual (vision-language-model) resolution tier.
//!
//! Strictly last-resort: the only tier with real monetary cost and
//! nondeterministic accuracy. Every completed call is priced through the
//! shared [`CostTracker`]; transport failures are never priced.

pub mod parse;
pub mod prompts;
pub mod providers;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{AgentEnvironment, VisionConfig};
use crate::cost::{CostTracker, CostUsage};
use crate::errors::{ProbeError, ProbeResult};
use crate::vision::providers::{build_provider, VisionCall};
use crate::vision::types::{
    CallOutput, ElementLocation, FindElementParams, NextAction, NextActionParams,
};

/// A visual lookup plus what it cost.
#[derive(Debug, Clone)]
pub struct VisualLookup {
    pub location: ElementLocation,
    pub cost: f64,
}

pub struct VisualResolver {
    provider: Arc<dyn VisionCall>,
    cost: Arc<Mutex<CostTracker>>,
}

impl VisualResolver {
    pub fn new(provider: Arc<dyn VisionCall>, cost: Arc<Mutex<CostTracker>>) -> Self {
        Self { provider, cost }
    }

    /// Builds the resolver for the configured active provider, or `None`
    /// when the visual tier is not configured at all.
    pub fn from_config(
        config: &VisionConfig,
        agent_env: &AgentEnvironment,
        http_timeout: Duration,
        cost: Arc<Mutex<CostTracker>>,
    ) -> ProbeResult<Option<Self>> {
        if config.active_provider.is_empty() {
            return Ok(None);
        }
        let entry = config.providers.get(&config.active_provider).ok_or_else(|| {
            ProbeError::Config(format!(
                "active vision provider '{}' not found under [vision.providers]",
                config.active_provider
            ))
        })?;
        let provider = build_provider(&config.active_provider, entry, agent_env, http_timeout)?;
        Ok(Some(Self::new(provider, cost)))
    }

    async fn dispatch(&self, system: &str, user: &str, image_b64: &str, operation: &str)
        -> ProbeResult<(CallOutput, f64)>
    {
        let baseline = CostUsage {
            provider: self.provider.provider_id().to_string(),
            model: self.provider.model().to_string(),
            input_tokens: 0,
            output_tokens: 0,
            images: 1,
            operation: operation.to_string(),
        };
        {
            let tracker = self.cost.lock().await;
            tracing::debug!(
                provider = %baseline.provider,
                operation,
                estimated_floor = tracker.estimate(&baseline),
                "dispatching vision call"
            );
        }

        match self.provider.call(system, user, image_b64).await {
            Ok(output) => {
                let usage = CostUsage {
                    input_tokens: output.input_tokens,
                    output_tokens: output.output_tokens,
                    ..baseline
                };
                let entry = self.cost.lock().await.track(usage);
                Ok((output, entry.cost))
            }
            // The call completed with a parseable error response: priced.
            Err(err @ ProbeError::Provider(_)) => {
                self.cost.lock().await.track(baseline);
                Err(err)
            }
            // Transport never completed: not priced.
            Err(other) => Err(other),
        }
    }

    /// Sends the screenshot plus description and returns the model's point
    /// estimate. An unparsable response degrades to a not-found location,
    /// never a hard failure.
    pub async fn find_element(&self, params: &FindElementParams) -> ProbeResult<VisualLookup> {
        let user = prompts::build_find_user(&params.description, params.context.as_deref());
        let (output, cost) = self
            .dispatch(prompts::FIND_ELEMENT_SYSTEM, &user, &params.screenshot, "find_element")
            .await?;

        let location = match parse::decode::<ElementLocation>(&output.text) {
            Ok(location) => location,
            Err(ProbeError::ParseFailure(detail)) => {
                tracing::warn!(detail = %detail, "vision response unparsable, treating as not found");
                ElementLocation::unparsable(&detail)
            }
            Err(other) => return Err(other),
        };
        Ok(VisualLookup { location, cost })
    }

    /// One step of the autonomous action loop; same call/parse contract.
    pub async fn get_next_action(&self, params: &NextActionParams) -> ProbeResult<NextAction> {
        let user = prompts::build_next_action_user(&params.instruction, &params.action_spaces);
        let (output, _) = self
            .dispatch(prompts::NEXT_ACTION_SYSTEM, &user, &params.screenshot, "get_next_action")
            .await?;
        parse::decode::<NextAction>(&output.text)
    }
}
