//! Action dispatch across the interchangeable backends.
//!
//! Backend priority per action: coordinate-based native input when the
//! handle has a bounding box, then the external-process bridge, then the
//! structural backend's element-native command. Availability is re-checked
//! on every action because it can change mid-run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::{ActionTarget, AutomationBackend};
use crate::element::{ElementHandle, HandleSource, Point};
use crate::errors::{ProbeError, ProbeResult};
use crate::locator::LocatorInput;
use crate::vision::types::{NextAction, NextActionParams};

use super::Session;

/// Upper bound on autonomous loop iterations, enforced even if the model
/// never reports `finished`.
const MAX_ACTION_STEPS: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click,
    Type { text: String },
    Hover,
    Drag { to: Point },
    Scroll { dx: f64, dy: f64 },
    Press { key: String },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Type { .. } => "type",
            Action::Hover => "hover",
            Action::Drag { .. } => "drag",
            Action::Scroll { .. } => "scroll",
            Action::Press { .. } => "press",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
    Timeout,
    NotFound,
    /// The action succeeded, but the locator was resolved by the visual
    /// tier. Lets reports separate deterministic from AI-assisted passes.
    VlmFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub duration_ms: u64,
    pub used_vlm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlm_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn not_found(duration_ms: u64) -> Self {
        Self {
            status: ActionStatus::NotFound,
            duration_ms,
            used_vlm: false,
            vlm_cost: None,
            error: None,
        }
    }

    pub fn ok(&self) -> bool {
        matches!(self.status, ActionStatus::Success | ActionStatus::VlmFallback)
    }
}

impl Session {
    /// Resolves the locator and executes the action, folding every failure
    /// into the result instead of throwing (only `NotConnected` is thrown).
    pub async fn perform(
        &self,
        locator: impl Into<LocatorInput>,
        action: Action,
    ) -> ProbeResult<ActionResult> {
        self.ensure_connected()?;
        let started = tokio::time::Instant::now();

        let resolved = self.resolve(&crate::locator::normalize_input(locator)).await?;
        let Some(resolved) = resolved else {
            return Ok(ActionResult::not_found(started.elapsed().as_millis() as u64));
        };

        let used_vlm = resolved.handle.source == HandleSource::Vlm;
        let outcome = self.execute(&resolved.handle, &action).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(()) => ActionResult {
                status: if used_vlm {
                    ActionStatus::VlmFallback
                } else {
                    ActionStatus::Success
                },
                duration_ms,
                used_vlm,
                vlm_cost: resolved.vlm_cost,
                error: None,
            },
            Err(e) => ActionResult {
                status: match &e {
                    ProbeError::BridgeTimeout { .. } => ActionStatus::Timeout,
                    _ => ActionStatus::Failed,
                },
                duration_ms,
                used_vlm,
                vlm_cost: resolved.vlm_cost,
                error: Some(e.to_string()),
            },
        };
        tracing::info!(
            action = action.name(),
            status = ?result.status,
            duration_ms = result.duration_ms,
            used_vlm = result.used_vlm,
            "action dispatched"
        );
        Ok(result)
    }

    pub async fn click(&self, locator: impl Into<LocatorInput>) -> ProbeResult<ActionResult> {
        self.perform(locator, Action::Click).await
    }

    pub async fn type_text(
        &self,
        locator: impl Into<LocatorInput>,
        text: impl Into<String>,
    ) -> ProbeResult<ActionResult> {
        self.perform(locator, Action::Type { text: text.into() }).await
    }

    pub async fn hover(&self, locator: impl Into<LocatorInput>) -> ProbeResult<ActionResult> {
        self.perform(locator, Action::Hover).await
    }

    pub async fn drag(
        &self,
        locator: impl Into<LocatorInput>,
        to: Point,
    ) -> ProbeResult<ActionResult> {
        self.perform(locator, Action::Drag { to }).await
    }

    pub async fn scroll(
        &self,
        locator: impl Into<LocatorInput>,
        dx: f64,
        dy: f64,
    ) -> ProbeResult<ActionResult> {
        self.perform(locator, Action::Scroll { dx, dy }).await
    }

    pub async fn press(
        &self,
        locator: impl Into<LocatorInput>,
        key: impl Into<String>,
    ) -> ProbeResult<ActionResult> {
        self.perform(locator, Action::Press { key: key.into() }).await
    }

    /// Picks a backend by priority and runs the action through it.
    async fn execute(&self, handle: &ElementHandle, action: &Action) -> ProbeResult<()> {
        let target = ActionTarget::from_handle(handle);
        let backend = self.pick_backend(&target)?;
        run_action(&*backend, &target, action).await
    }

    fn pick_backend(&self, target: &ActionTarget) -> ProbeResult<Arc<dyn AutomationBackend>> {
        if target.point.is_some() {
            if let Some(native) = &self.native {
                if native.is_available() {
                    return Ok(native.clone());
                }
            }
        }
        if let Some(bridge) = &self.bridge {
            if bridge.is_available() {
                return Ok(bridge.clone());
            }
        }
        if self.structural.is_available() {
            return Ok(self.structural.clone());
        }
        Err(ProbeError::BackendUnavailable(
            "no adapter can service this action".into(),
        ))
    }

    /// Runs the bounded autonomous loop: screenshot → model step → input,
    /// until the model reports `finished` or the step cap is reached.
    pub async fn run_action_loop(
        &self,
        instruction: &str,
        action_spaces: &[String],
    ) -> ProbeResult<Vec<NextAction>> {
        self.ensure_connected()?;
        let Some(visual) = &self.visual else {
            return Err(ProbeError::BackendUnavailable(
                "no visual resolver configured for the action loop".into(),
            ));
        };

        let mut steps = Vec::new();
        for step_index in 0..MAX_ACTION_STEPS {
            let screenshot = self.screenshot().await?;
            let step = visual
                .get_next_action(&NextActionParams {
                    screenshot,
                    instruction: instruction.to_string(),
                    action_spaces: action_spaces.to_vec(),
                })
                .await?;
            tracing::info!(
                step = step_index,
                action = %step.action_type,
                finished = step.finished,
                thought = %step.thought,
                "action loop step"
            );
            let finished = step.finished;
            let decided = step.clone();
            steps.push(step);
            if finished {
                break;
            }
            if let Err(e) = self.execute_loop_step(&decided).await {
                tracing::warn!(error = %e, action = %decided.action_type, "loop step failed");
            }
        }
        Ok(steps)
    }

    async fn execute_loop_step(&self, step: &NextAction) -> ProbeResult<()> {
        let params = &step.action_params;
        let point = match (params["x"].as_f64(), params["y"].as_f64()) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        };
        let target = match point {
            Some(p) => ActionTarget::at_point(p),
            None => ActionTarget {
                handle: None,
                point: None,
            },
        };
        let action = match step.action_type.as_str() {
            "click" => Action::Click,
            "hover" => Action::Hover,
            "type" => Action::Type {
                text: params["text"].as_str().unwrap_or_default().to_string(),
            },
            "press" => Action::Press {
                key: params["key"].as_str().unwrap_or_default().to_string(),
            },
            "scroll" => Action::Scroll {
                dx: params["dx"].as_f64().unwrap_or(0.0),
                dy: params["dy"].as_f64().unwrap_or(0.0),
            },
            other => {
                return Err(ProbeError::BackendUnavailable(format!(
                    "model requested unsupported action '{other}'"
                )))
            }
        };
        let backend = self.pick_backend(&target)?;
        run_action(&*backend, &target, &action).await
    }
}

async fn run_action(
    backend: &dyn AutomationBackend,
    target: &ActionTarget,
    action: &Action,
) -> ProbeResult<()> {
    match action {
        Action::Click => backend.click(target).await,
        Action::Type { text } => backend.type_text(target, text).await,
        Action::Hover => backend.hover(target).await,
        Action::Drag { to } => backend.drag(target, *to).await,
        Action::Scroll { dx, dy } => backend.scroll(target, *dx, *dy).await,
        Action::Press { key } => backend.press(target, key).await,
    }
}
