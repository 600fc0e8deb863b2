//! Structural automation over an external driver CLI.
//!
//! Every operation shells out to the configured command with a subcommand,
//! a `--params` JSON argument, and `--json`, then parses stdout as a
//! `{success, data|error}` envelope.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::backends::{
    ActionTarget, AutomationBackend, BackendKind, InitError, SnapshotOptions, SnapshotPayload,
    StructuralAutomation,
};
use crate::config::StructuralConfig;
use crate::element::{ElementHandle, Point, Rect};
use crate::errors::{ProbeError, ProbeResult};
use crate::locator::Locator;

pub struct StructuralCli {
    config: StructuralConfig,
    available: AtomicBool,
}

/// Handle shape the driver CLI emits.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHandle {
    id: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    bounding_box: Option<Rect>,
}

impl RawHandle {
    fn into_handle(self) -> ElementHandle {
        let mut handle = ElementHandle::dom(self.id, self.role, self.name);
        if let Some(rect) = self.bounding_box {
            handle = handle.with_bounding_box(rect);
        }
        handle
    }
}

impl StructuralCli {
    pub fn new(config: StructuralConfig) -> Self {
        Self {
            config,
            available: AtomicBool::new(false),
        }
    }

    /// Runs `<command> <args..> <method> --params <json> --json` and unwraps
    /// the `{success, data|error}` envelope.
    async fn run(&self, method: &str, params: Value) -> ProbeResult<Value> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        cmd.arg(method);
        if !params.is_null() {
            cmd.arg("--params").arg(params.to_string());
        }
        if let Some(endpoint) = &self.config.endpoint {
            cmd.arg("--endpoint").arg(endpoint);
        }
        cmd.arg("--json");
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        tracing::debug!(command = %self.config.command, method, "driver call");

        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                ProbeError::BackendUnavailable(format!(
                    "driver command '{method}' exceeded {}ms",
                    self.config.command_timeout_ms
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let envelope: Value = serde_json::from_str(stdout.trim()).map_err(|e| {
            ProbeError::BackendUnavailable(format!(
                "driver '{method}' returned unparsable output: {e}"
            ))
        })?;

        if envelope["success"].as_bool().unwrap_or(false) {
            Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
        } else {
            let message = envelope["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("driver '{method}' failed without an error message"));
            Err(ProbeError::BackendUnavailable(message))
        }
    }

    fn target_params(target: &ActionTarget) -> Value {
        match &target.handle {
            Some(handle) => json!({ "id": handle.id }),
            None => match target.point {
                Some(p) => json!({ "x": p.x, "y": p.y }),
                None => Value::Null,
            },
        }
    }
}

#[async_trait]
impl AutomationBackend for StructuralCli {
    fn kind(&self) -> BackendKind {
        BackendKind::Structural
    }

    /// Probes the driver binary once. A missing or broken binary leaves the
    /// adapter unavailable instead of failing the engine.
    async fn initialize(&self) -> Result<(), InitError> {
        let probe = Command::new(&self.config.command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match probe {
            Ok(_) => {
                self.available.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => Err(InitError::Spawn {
                command: self.config.command.clone(),
                message: e.to_string(),
            }),
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn click(&self, target: &ActionTarget) -> ProbeResult<()> {
        self.run("click", Self::target_params(target)).await.map(|_| ())
    }

    async fn type_text(&self, target: &ActionTarget, text: &str) -> ProbeResult<()> {
        let mut params = Self::target_params(target);
        params["text"] = Value::String(text.to_string());
        self.run("type", params).await.map(|_| ())
    }

    async fn press(&self, target: &ActionTarget, key: &str) -> ProbeResult<()> {
        let mut params = Self::target_params(target);
        params["key"] = Value::String(key.to_string());
        self.run("press", params).await.map(|_| ())
    }

    async fn hover(&self, target: &ActionTarget) -> ProbeResult<()> {
        self.run("hover", Self::target_params(target)).await.map(|_| ())
    }

    async fn scroll(&self, target: &ActionTarget, dx: f64, dy: f64) -> ProbeResult<()> {
        let mut params = Self::target_params(target);
        params["dx"] = json!(dx);
        params["dy"] = json!(dy);
        self.run("scroll", params).await.map(|_| ())
    }

    async fn drag(&self, target: &ActionTarget, to: Point) -> ProbeResult<()> {
        let mut params = Self::target_params(target);
        params["toX"] = json!(to.x);
        params["toY"] = json!(to.y);
        self.run("drag", params).await.map(|_| ())
    }
}

#[async_trait]
impl StructuralAutomation for StructuralCli {
    async fn connect(&self) -> ProbeResult<()> {
        self.run("connect", Value::Null).await.map(|_| ())
    }

    async fn disconnect(&self) -> ProbeResult<()> {
        self.run("disconnect", Value::Null).await.map(|_| ())
    }

    async fn get_snapshot(&self, options: SnapshotOptions) -> ProbeResult<SnapshotPayload> {
        let data = self
            .run("snapshot", json!({ "interactive": options.interactive }))
            .await?;
        let payload: SnapshotPayload = serde_json::from_value(data)?;
        Ok(payload)
    }

    async fn find(&self, locator: &Locator) -> ProbeResult<Option<ElementHandle>> {
        let data = self
            .run(
                "find",
                json!({ "strategy": locator.strategy.name(), "value": locator.value }),
            )
            .await;
        match data {
            Ok(Value::Null) => Ok(None),
            Ok(value) => {
                let raw: RawHandle = serde_json::from_value(value)?;
                Ok(Some(raw.into_handle()))
            }
            // A failed query is a miss for the resolution tiering, not a fault.
            Err(e) => {
                tracing::debug!(error = %e, strategy = locator.strategy.name(), "structural find missed");
                Ok(None)
            }
        }
    }

    async fn find_all(&self, locator: &Locator) -> ProbeResult<Vec<ElementHandle>> {
        let data = self
            .run(
                "findAll",
                json!({ "strategy": locator.strategy.name(), "value": locator.value }),
            )
            .await;
        match data {
            Ok(Value::Array(items)) => {
                let mut handles = Vec::with_capacity(items.len());
                for (nth, item) in items.into_iter().enumerate() {
                    let raw: RawHandle = serde_json::from_value(item)?;
                    handles.push(raw.into_handle().with_nth(nth));
                }
                Ok(handles)
            }
            Ok(_) => Ok(Vec::new()),
            Err(e) => {
                tracing::debug!(error = %e, "structural findAll failed, returning empty");
                Ok(Vec::new())
            }
        }
    }

    async fn get_text(&self, handle: &ElementHandle) -> ProbeResult<String> {
        let data = self.run("getText", json!({ "id": handle.id })).await?;
        Ok(data.as_str().unwrap_or_default().to_string())
    }

    async fn get_value(&self, handle: &ElementHandle) -> ProbeResult<String> {
        let data = self.run("getValue", json!({ "id": handle.id })).await?;
        Ok(data.as_str().unwrap_or_default().to_string())
    }

    async fn get_attribute(&self, handle: &ElementHandle, name: &str) -> ProbeResult<Option<String>> {
        let data = self
            .run("getAttribute", json!({ "id": handle.id, "name": name }))
            .await?;
        Ok(data.as_str().map(str::to_string))
    }

    async fn is_visible(&self, handle: &ElementHandle) -> ProbeResult<bool> {
        let data = self.run("isVisible", json!({ "id": handle.id })).await?;
        Ok(data.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> ProbeResult<bool> {
        let data = self.run("isEnabled", json!({ "id": handle.id })).await?;
        Ok(data.as_bool().unwrap_or(false))
    }

    async fn get_url(&self) -> ProbeResult<String> {
        let data = self.run("getUrl", Value::Null).await?;
        Ok(data.as_str().unwrap_or_default().to_string())
    }

    async fn get_title(&self) -> ProbeResult<String> {
        let data = self.run("getTitle", Value::Null).await?;
        Ok(data.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, script: &str) -> ProbeResult<Value> {
        self.run("evaluate", json!({ "script": script })).await
    }

    async fn screenshot(&self) -> ProbeResult<String> {
        let data = self.run("screenshot", Value::Null).await?;
        data.as_str()
            .map(str::to_string)
            .or_else(|| data["image"].as_str().map(str::to_string))
            .ok_or_else(|| {
                ProbeError::BackendUnavailable("driver screenshot returned no image".into())
            })
    }

    async fn start_recording(&self, path: &str) -> ProbeResult<()> {
        self.run("startRecording", json!({ "path": path })).await.map(|_| ())
    }

    async fn stop_recording(&self) -> ProbeResult<()> {
        self.run("stopRecording", Value::Null).await.map(|_| ())
    }
}
