//! Anthropic Messages API call strategy.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::errors::{ProbeError, ProbeResult};
use crate::vision::providers::VisionCall;
use crate::vision::types::CallOutput;

pub struct AnthropicVision {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicVision {
    pub fn new(
        id: String,
        api_base: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            id,
            api_base,
            api_key,
            model,
            max_tokens,
            client,
        })
    }
}

#[async_trait]
impl VisionCall for AnthropicVision {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, system: &str, user: &str, image_b64: &str) -> ProbeResult<CallOutput> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": image_b64,
                        },
                    },
                    { "type": "text", "text": user },
                ],
            }],
        });

        let url = format!("{}/messages", self.api_base.trim_end_matches('/'));
        tracing::debug!(provider = %self.id, model = %self.model, "sending vision request");

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Provider(format!("{status}: {err_body}")));
        }

        let payload: serde_json::Value = response.json().await?;

        let text = payload["content"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProbeError::Provider("empty assistant response".into()));
        }

        let output = CallOutput {
            text,
            input_tokens: payload["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: payload["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };
        tracing::debug!(
            provider = %self.id,
            input_tokens = output.input_tokens,
            output_tokens = output.output_tokens,
            "vision response received"
        );
        Ok(output)
    }
}
