//! Tiered locator resolution.
//!
//! Tier order: cached ref lookup (free, no side effects) → structural query
//! (deterministic, one backend round-trip) → visual model (costs money,
//! nondeterministic, strictly last and skippable via configuration).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::ElementHandle;
use crate::errors::{ProbeError, ProbeResult};
use crate::locator::{normalize_input, Locator, LocatorInput, Strategy};
use crate::vision::types::FindElementParams;

use super::Session;

/// Minimum model confidence accepted as a visual hit.
const MIN_VISUAL_CONFIDENCE: f64 = 0.5;

/// A resolution plus how it was paid for.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub handle: ElementHandle,
    /// Cost of the visual call that produced the handle, if any.
    pub vlm_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    /// Falls back to the configured wait timeout.
    pub timeout: Option<Duration>,
    /// Falls back to the configured poll interval.
    pub interval: Option<Duration>,
    pub state: WaitState,
}

impl Session {
    /// Resolves a locator to one actionable element, or `None` when every
    /// permitted tier missed.
    pub async fn find(&self, locator: impl Into<LocatorInput>) -> ProbeResult<Option<ElementHandle>> {
        Ok(self.resolve(&normalize_input(locator)).await?.map(|r| r.handle))
    }

    pub(crate) async fn resolve(&self, locator: &Locator) -> ProbeResult<Option<Resolved>> {
        let mode = self.config.resolution_mode;

        if mode.allows_deterministic() {
            // Tier 1: snapshot-scoped ref. Free and side-effect free on hit.
            if locator.strategy == Strategy::Ref {
                if let Some(handle) = self.resolve_ref(&locator.value).await? {
                    tracing::debug!(reference = %locator.value, "resolved from snapshot cache");
                    return Ok(Some(Resolved {
                        handle,
                        vlm_cost: None,
                    }));
                }
            }

            // Tier 2: structural query against live elements.
            if locator.strategy != Strategy::Visual {
                if let Some(handle) = self.structural.find(locator).await? {
                    tracing::debug!(
                        strategy = locator.strategy.name(),
                        value = %locator.value,
                        "resolved structurally"
                    );
                    return Ok(Some(Resolved {
                        handle,
                        vlm_cost: None,
                    }));
                }
            }
        }

        if !mode.allows_visual() {
            return Ok(None);
        }
        let Some(visual) = &self.visual else {
            return Ok(None);
        };

        // Tier 3: paid visual lookup against a fresh screenshot.
        let screenshot = match self.screenshot().await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "no screenshot for visual tier");
                return Ok(None);
            }
        };
        let description = locator.describe_for_vision();
        let lookup = match visual
            .find_element(&FindElementParams {
                screenshot,
                description: description.clone(),
                context: None,
            })
            .await
        {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(error = %e, "visual tier failed");
                return Ok(None);
            }
        };

        if lookup.location.not_found || lookup.location.confidence < MIN_VISUAL_CONFIDENCE {
            if let Some(alternative) = &lookup.location.alternative {
                tracing::info!(alternative = %alternative, "visual tier offered an alternative");
            }
            return Ok(None);
        }
        let Some(point) = lookup.location.coordinates else {
            return Ok(None);
        };

        tracing::info!(
            x = point.x,
            y = point.y,
            confidence = lookup.location.confidence,
            cost = lookup.cost,
            "resolved visually"
        );
        Ok(Some(Resolved {
            handle: ElementHandle::from_vision_point(point, &description),
            vlm_cost: Some(lookup.cost),
        }))
    }

    /// Structural-only multi-match lookup; the visual tier cannot enumerate.
    /// Backend absence or error yields an empty list.
    pub async fn find_all(&self, locator: impl Into<LocatorInput>) -> ProbeResult<Vec<ElementHandle>> {
        let locator = normalize_input(locator);
        match self.structural.find_all(&locator).await {
            Ok(handles) => Ok(handles),
            Err(e) => {
                tracing::debug!(error = %e, "find_all degraded to empty");
                Ok(Vec::new())
            }
        }
    }

    /// Polls `find` until the requested state holds or the timeout elapses.
    /// Exhaustion is one of the two hard failures in the crate.
    ///
    /// Returns the handle for `WaitState::Visible`; `None` marks a satisfied
    /// `WaitState::Hidden` wait.
    pub async fn wait_for(
        &self,
        locator: impl Into<LocatorInput>,
        options: WaitOptions,
    ) -> ProbeResult<Option<ElementHandle>> {
        let locator = normalize_input(locator);
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(self.config.timeouts.wait_timeout_ms));
        let interval = options
            .interval
            .unwrap_or(Duration::from_millis(self.config.timeouts.wait_interval_ms));
        let start = tokio::time::Instant::now();

        loop {
            let hit = self.resolve(&locator).await?;
            match options.state {
                WaitState::Visible => {
                    if let Some(resolved) = hit {
                        return Ok(Some(resolved.handle));
                    }
                }
                // A find success means "not yet satisfied" when waiting for
                // absence.
                WaitState::Hidden => {
                    if hit.is_none() {
                        return Ok(None);
                    }
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(ProbeError::NotFound {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
            tokio::time::sleep(interval).await;
        }
    }
}
