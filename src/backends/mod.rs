pub mod bridge;
pub mod native;
pub mod structural;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::{ElementHandle, Point};
use crate::errors::ProbeResult;
use crate::locator::Locator;

/// Why an adapter failed to come up. The engine maps any variant to
/// "unavailable" rather than crashing, but the cause stays visible.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("native input library unavailable: {0}")]
    NativeLibrary(String),

    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("backend probe failed: {0}")]
    Probe(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Structural,
    NativeInput,
    Bridge,
}

/// What an action operates on. Coordinate-capable backends use `point`;
/// element-native backends use the handle's id.
#[derive(Debug, Clone)]
pub struct ActionTarget {
    pub handle: Option<ElementHandle>,
    pub point: Option<Point>,
}

impl ActionTarget {
    pub fn from_handle(handle: &ElementHandle) -> Self {
        Self {
            handle: Some(handle.clone()),
            point: handle.anchor(),
        }
    }

    pub fn at_point(point: Point) -> Self {
        Self {
            handle: None,
            point: Some(point),
        }
    }
}

/// One capability interface, three interchangeable implementations.
/// Availability is re-checked on every dispatch because it can change at
/// runtime (an external process can exit mid-run).
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Bring the adapter up. Errors degrade `is_available()`; the engine
    /// never treats them as fatal.
    async fn initialize(&self) -> Result<(), InitError>;

    fn is_available(&self) -> bool;

    async fn click(&self, target: &ActionTarget) -> ProbeResult<()>;
    async fn type_text(&self, target: &ActionTarget, text: &str) -> ProbeResult<()>;
    async fn press(&self, target: &ActionTarget, key: &str) -> ProbeResult<()>;
    async fn hover(&self, target: &ActionTarget) -> ProbeResult<()>;
    async fn scroll(&self, target: &ActionTarget, dx: f64, dy: f64) -> ProbeResult<()>;
    async fn drag(&self, target: &ActionTarget, to: Point) -> ProbeResult<()>;
}

/// Options for a snapshot capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Restrict the capture to interactive elements.
    pub interactive: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self { interactive: true }
    }
}

/// One element as reported by the structural backend, before the engine
/// assigns it a snapshot-scoped ref.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotElement {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bounding_box: Option<crate::element::Rect>,
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

fn default_interactive() -> bool {
    true
}

/// Payload of one `get_snapshot` round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub elements: Vec<SnapshotElement>,
    /// Base64 PNG, when the backend can capture one in the same pass.
    pub screenshot: Option<String>,
}

/// Full structural-automation contract. The engine's deterministic tier and
/// all element-native queries go through this.
#[async_trait]
pub trait StructuralAutomation: AutomationBackend {
    async fn connect(&self) -> ProbeResult<()>;
    async fn disconnect(&self) -> ProbeResult<()>;

    async fn get_snapshot(&self, options: SnapshotOptions) -> ProbeResult<SnapshotPayload>;

    /// Translate the locator into a backend-native selector and query live
    /// element existence. `Ok(None)` is a miss, not an error.
    async fn find(&self, locator: &Locator) -> ProbeResult<Option<ElementHandle>>;
    async fn find_all(&self, locator: &Locator) -> ProbeResult<Vec<ElementHandle>>;

    async fn get_text(&self, handle: &ElementHandle) -> ProbeResult<String>;
    async fn get_value(&self, handle: &ElementHandle) -> ProbeResult<String>;
    async fn get_attribute(&self, handle: &ElementHandle, name: &str) -> ProbeResult<Option<String>>;
    async fn is_visible(&self, handle: &ElementHandle) -> ProbeResult<bool>;
    async fn is_enabled(&self, handle: &ElementHandle) -> ProbeResult<bool>;

    async fn get_url(&self) -> ProbeResult<String>;
    async fn get_title(&self) -> ProbeResult<String>;
    async fn evaluate(&self, script: &str) -> ProbeResult<serde_json::Value>;

    /// Base64 PNG of the current UI surface.
    async fn screenshot(&self) -> ProbeResult<String>;
    async fn start_recording(&self, path: &str) -> ProbeResult<()>;
    async fn stop_recording(&self) -> ProbeResult<()>;
}

/// Native OS input surface, beyond the shared action methods.
#[async_trait]
pub trait NativeInput: AutomationBackend {
    async fn move_to(&self, point: Point) -> ProbeResult<()>;
    async fn screenshot(&self) -> ProbeResult<String>;
    async fn screen_size(&self) -> ProbeResult<(u32, u32)>;
}
