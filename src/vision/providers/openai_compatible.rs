//! OpenAI-compatible chat/completions call strategy. Covers every endpoint
//! that speaks the same wire shape (OpenAI, GLM, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::errors::{ProbeError, ProbeResult};
use crate::vision::providers::VisionCall;
use crate::vision::types::CallOutput;

pub struct OpenAiCompatibleVision {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleVision {
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
impl VisionCall for OpenAiCompatibleVision {
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
            "messages": [
                { "role": "system", "content": system },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:image/png;base64,{image_b64}") },
                        },
                    ],
                },
            ],
        });

        tracing::debug!(provider = %self.id, model = %self.model, "sending vision request");
        tracing::trace!(
            body = %{
                // Sanitize only for logging; the actual request keeps the image.
                let mut log_body = body.clone();
                if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
                    for msg in msgs {
                        if let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) {
                            for part in parts {
                                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                                    part["image_url"]["url"] =
                                        serde_json::Value::String("<omitted_base64_image>".into());
                                }
                            }
                        }
                    }
                }
                serde_json::to_string(&log_body).unwrap_or_default()
            },
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Provider(format!("{status}: {err_body}")));
        }

        let payload: serde_json::Value = response.json().await?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.is_empty() {
            return Err(ProbeError::Provider("empty assistant response".into()));
        }

        let output = CallOutput {
            text,
            input_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0),
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
