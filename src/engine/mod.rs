//! The session facade: one engine instance per application under test.
//!
//! Owns the only piece of engine-level mutable shared state (the current
//! snapshot), the backend adapters, the visual resolver, and the cost
//! tracker. Independent sessions share nothing.

pub mod dispatcher;
pub mod resolver;
pub mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::backends::bridge::BridgeBackend;
use crate::backends::native::NativeInputBackend;
use crate::backends::structural::StructuralCli;
use crate::backends::{
    AutomationBackend, NativeInput, SnapshotOptions, StructuralAutomation,
};
use crate::config::ProbeConfig;
use crate::cost::{CostSummary, CostTracker, Pricing};
use crate::element::ElementHandle;
use crate::errors::{ProbeError, ProbeResult};
use crate::vision::VisualResolver;

use self::snapshot::Snapshot;

pub struct Session {
    config: ProbeConfig,
    structural: Arc<dyn StructuralAutomation>,
    native: Option<Arc<dyn NativeInput>>,
    bridge: Option<Arc<dyn AutomationBackend>>,
    visual: Option<VisualResolver>,
    cost: Arc<Mutex<CostTracker>>,
    snapshot: Mutex<Option<Snapshot>>,
    connected: AtomicBool,
}

impl Session {
    /// Builds a session from configuration: concrete adapters, the visual
    /// resolver for the active provider, and pricing overrides. Adapter
    /// initialization failures degrade availability and are logged, never
    /// propagated.
    pub async fn new(config: ProbeConfig) -> ProbeResult<Self> {
        let structural = Arc::new(StructuralCli::new(config.structural.clone()));
        if let Err(e) = structural.initialize().await {
            tracing::warn!(error = %e, "structural backend unavailable");
        }

        let native = Arc::new(NativeInputBackend::new());
        if let Err(e) = native.initialize().await {
            tracing::warn!(error = %e, "native input unavailable");
        }

        let bridge: Option<Arc<dyn AutomationBackend>> = match &config.bridge {
            Some(bridge_config) => {
                let backend = Arc::new(BridgeBackend::new(bridge_config.clone()));
                if let Err(e) = backend.initialize().await {
                    tracing::warn!(error = %e, "bridge backend unavailable");
                }
                Some(backend)
            }
            None => None,
        };

        let mut tracker = CostTracker::new();
        for (id, entry) in &config.vision.providers {
            if let Some(p) = entry.pricing {
                tracker.set_pricing(
                    id.clone(),
                    Pricing::new(p.input_token_price, p.output_token_price, p.image_price),
                );
            }
        }
        let cost = Arc::new(Mutex::new(tracker));

        let visual = VisualResolver::from_config(
            &config.vision,
            &config.agent,
            Duration::from_millis(config.timeouts.vision_http_ms),
            Arc::clone(&cost),
        )?;

        Ok(Self {
            config,
            structural,
            native: Some(native),
            bridge,
            visual,
            cost,
            snapshot: Mutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Wires an engine from caller-supplied adapters. Widget testers and the
    /// test suites use this to substitute doubles for real backends.
    pub fn with_backends(
        config: ProbeConfig,
        structural: Arc<dyn StructuralAutomation>,
        native: Option<Arc<dyn NativeInput>>,
        bridge: Option<Arc<dyn AutomationBackend>>,
        visual: Option<VisualResolver>,
    ) -> Self {
        Self {
            config,
            structural,
            native,
            bridge,
            visual,
            cost: Arc::new(Mutex::new(CostTracker::new())),
            snapshot: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Shares the given tracker with the visual resolver so visual-tier
    /// spend shows up in [`Session::cost_summary`].
    pub fn with_cost_tracker(mut self, cost: Arc<Mutex<CostTracker>>) -> Self {
        self.cost = cost;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn connect(&self) -> ProbeResult<()> {
        self.structural.connect().await?;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("session connected");
        Ok(())
    }

    pub async fn disconnect(&self) -> ProbeResult<()> {
        let result = self.structural.disconnect().await;
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("session disconnected");
        result
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The one programmer-misuse hard failure: acting before `connect()`.
    pub(crate) fn ensure_connected(&self) -> ProbeResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProbeError::NotConnected)
        }
    }

    /// Captures the interactive-element set and replaces the current
    /// snapshot wholesale.
    pub async fn snapshot(&self, options: SnapshotOptions) -> ProbeResult<Snapshot> {
        self.ensure_connected()?;
        let payload = self.structural.get_snapshot(options).await?;
        let snapshot = Snapshot::from_payload(&payload, options);
        tracing::debug!(refs = snapshot.len(), "snapshot captured");
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Resolves a snapshot-scoped ref, implicitly capturing a snapshot when
    /// none exists yet. A miss is `None`, not an error.
    pub async fn resolve_ref(&self, ref_id: &str) -> ProbeResult<Option<ElementHandle>> {
        let existing = self.snapshot.lock().await.clone();
        let snapshot = match existing {
            Some(snapshot) => snapshot,
            None => self.snapshot(SnapshotOptions::default()).await?,
        };
        Ok(snapshot.resolve(ref_id))
    }

    // ── Element-native queries (structural passthrough) ────────────────────

    pub async fn get_text(&self, handle: &ElementHandle) -> ProbeResult<String> {
        self.ensure_connected()?;
        self.structural.get_text(handle).await
    }

    pub async fn get_value(&self, handle: &ElementHandle) -> ProbeResult<String> {
        self.ensure_connected()?;
        self.structural.get_value(handle).await
    }

    pub async fn get_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> ProbeResult<Option<String>> {
        self.ensure_connected()?;
        self.structural.get_attribute(handle, name).await
    }

    pub async fn is_visible(&self, handle: &ElementHandle) -> ProbeResult<bool> {
        self.ensure_connected()?;
        self.structural.is_visible(handle).await
    }

    pub async fn is_enabled(&self, handle: &ElementHandle) -> ProbeResult<bool> {
        self.ensure_connected()?;
        self.structural.is_enabled(handle).await
    }

    pub async fn get_url(&self) -> ProbeResult<String> {
        self.ensure_connected()?;
        self.structural.get_url().await
    }

    pub async fn get_title(&self) -> ProbeResult<String> {
        self.ensure_connected()?;
        self.structural.get_title().await
    }

    pub async fn evaluate(&self, script: &str) -> ProbeResult<serde_json::Value> {
        self.ensure_connected()?;
        self.structural.evaluate(script).await
    }

    pub async fn start_recording(&self, path: &str) -> ProbeResult<()> {
        self.ensure_connected()?;
        self.structural.start_recording(path).await
    }

    pub async fn stop_recording(&self) -> ProbeResult<()> {
        self.ensure_connected()?;
        self.structural.stop_recording().await
    }

    /// Base64 PNG of the current UI surface: the structural backend when it
    /// can capture, otherwise native screen capture.
    pub async fn screenshot(&self) -> ProbeResult<String> {
        if self.structural.is_available() {
            if let Ok(image) = self.structural.screenshot().await {
                return Ok(image);
            }
        }
        if let Some(native) = &self.native {
            if native.is_available() {
                return native.screenshot().await;
            }
        }
        Err(ProbeError::BackendUnavailable(
            "no backend can capture a screenshot".into(),
        ))
    }

    pub async fn cost_summary(&self) -> CostSummary {
        self.cost.lock().await.summary()
    }

    pub async fn reset_costs(&self) {
        self.cost.lock().await.reset();
    }

    pub fn cost_tracker(&self) -> Arc<Mutex<CostTracker>> {
        Arc::clone(&self.cost)
    }
}
