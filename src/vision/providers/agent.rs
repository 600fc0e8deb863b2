//! Agent-in-the-loop call strategy.
//!
//! Instead of an HTTP vendor, the analysis is deferred to whoever watches
//! the bridge directory: the request (prompts + screenshot) is written as a
//! JSON file and the answer is polled from a sibling response file. A fixed
//! answer can also be injected up front via configuration, which makes the
//! tier fully deterministic in CI.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::config::AgentEnvironment;
use crate::errors::{ProbeError, ProbeResult};
use crate::vision::providers::VisionCall;
use crate::vision::types::CallOutput;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct AgentVision {
    id: String,
    environment: AgentEnvironment,
    timeout: Duration,
}

impl AgentVision {
    pub fn new(id: String, environment: AgentEnvironment, timeout: Duration) -> Self {
        Self {
            id,
            environment,
            timeout,
        }
    }

    async fn call_file_bridge(
        &self,
        dir: &PathBuf,
        system: &str,
        user: &str,
        image_b64: &str,
    ) -> ProbeResult<String> {
        tokio::fs::create_dir_all(dir).await?;

        let request_id = Uuid::new_v4().to_string();
        let request_path = dir.join(format!("{request_id}.request.json"));
        let response_path = dir.join(format!("{request_id}.response.json"));

        let request = json!({
            "id": request_id,
            "system": system,
            "user": user,
            "image": image_b64,
        });
        tokio::fs::write(&request_path, request.to_string()).await?;
        tracing::info!(path = %request_path.display(), "agent request written, waiting for answer");

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                let _ = tokio::fs::remove_file(&request_path).await;
                return Err(ProbeError::Provider(format!(
                    "no agent answer within {:?}",
                    self.timeout
                )));
            }
            if let Ok(content) = tokio::fs::read_to_string(&response_path).await {
                let _ = tokio::fs::remove_file(&request_path).await;
                let _ = tokio::fs::remove_file(&response_path).await;
                return Ok(content);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl VisionCall for AgentVision {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        "agent"
    }

    async fn call(&self, system: &str, user: &str, image_b64: &str) -> ProbeResult<CallOutput> {
        let text = match &self.environment {
            AgentEnvironment::Disabled => {
                return Err(ProbeError::Provider(
                    "agent environment not configured".into(),
                ))
            }
            AgentEnvironment::EnvAnswer { answer } => answer.clone(),
            AgentEnvironment::FileBridge { dir } => {
                self.call_file_bridge(dir, system, user, image_b64).await?
            }
        };
        // The in-the-loop agent reports no token usage.
        Ok(CallOutput {
            text,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}
