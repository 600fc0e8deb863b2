//! End-to-end engine behavior against scripted backend doubles: tier
//! ordering, ref round-trips, wait bounds, and dispatch priority.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use uiprobe::backends::{
    ActionTarget, AutomationBackend, BackendKind, InitError, NativeInput, SnapshotElement,
    SnapshotOptions, SnapshotPayload, StructuralAutomation,
};
use uiprobe::cost::CostTracker;
use uiprobe::engine::Session;
use uiprobe::errors::{ProbeError, ProbeResult};
use uiprobe::locator::Locator;
use uiprobe::vision::providers::VisionCall;
use uiprobe::vision::types::CallOutput;
use uiprobe::vision::VisualResolver;
use uiprobe::{
    ActionStatus, ElementHandle, HandleSource, Point, ProbeConfig, Rect, WaitOptions, WaitState,
};

// ── Backend doubles ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedStructural {
    elements: Vec<SnapshotElement>,
    find_map: HashMap<String, ElementHandle>,
    find_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
    click_calls: AtomicUsize,
}

impl ScriptedStructural {
    fn with_elements(elements: Vec<SnapshotElement>) -> Self {
        Self {
            elements,
            ..Default::default()
        }
    }

    fn with_find(mut self, key: &str, handle: ElementHandle) -> Self {
        self.find_map.insert(key.to_string(), handle);
        self
    }
}

#[async_trait]
impl AutomationBackend for ScriptedStructural {
    fn kind(&self) -> BackendKind {
        BackendKind::Structural
    }

    async fn initialize(&self) -> Result<(), InitError> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn click(&self, _target: &ActionTarget) -> ProbeResult<()> {
        self.click_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn type_text(&self, _target: &ActionTarget, _text: &str) -> ProbeResult<()> {
        Ok(())
    }

    async fn press(&self, _target: &ActionTarget, _key: &str) -> ProbeResult<()> {
        Ok(())
    }

    async fn hover(&self, _target: &ActionTarget) -> ProbeResult<()> {
        Ok(())
    }

    async fn scroll(&self, _target: &ActionTarget, _dx: f64, _dy: f64) -> ProbeResult<()> {
        Ok(())
    }

    async fn drag(&self, _target: &ActionTarget, _to: Point) -> ProbeResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StructuralAutomation for ScriptedStructural {
    async fn connect(&self) -> ProbeResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> ProbeResult<()> {
        Ok(())
    }

    async fn get_snapshot(&self, _options: SnapshotOptions) -> ProbeResult<SnapshotPayload> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SnapshotPayload {
            elements: self.elements.clone(),
            screenshot: None,
        })
    }

    async fn find(&self, locator: &Locator) -> ProbeResult<Option<ElementHandle>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.find_map.get(&locator.value).cloned())
    }

    async fn find_all(&self, locator: &Locator) -> ProbeResult<Vec<ElementHandle>> {
        Ok(self
            .find_map
            .get(&locator.value)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn get_text(&self, _handle: &ElementHandle) -> ProbeResult<String> {
        Ok("text".into())
    }

    async fn get_value(&self, _handle: &ElementHandle) -> ProbeResult<String> {
        Ok(String::new())
    }

    async fn get_attribute(
        &self,
        _handle: &ElementHandle,
        _name: &str,
    ) -> ProbeResult<Option<String>> {
        Ok(None)
    }

    async fn is_visible(&self, _handle: &ElementHandle) -> ProbeResult<bool> {
        Ok(true)
    }

    async fn is_enabled(&self, _handle: &ElementHandle) -> ProbeResult<bool> {
        Ok(true)
    }

    async fn get_url(&self) -> ProbeResult<String> {
        Ok("app://main".into())
    }

    async fn get_title(&self) -> ProbeResult<String> {
        Ok("Main".into())
    }

    async fn evaluate(&self, _script: &str) -> ProbeResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self) -> ProbeResult<String> {
        Ok("iVBORw0KGgo=".into())
    }

    async fn start_recording(&self, _path: &str) -> ProbeResult<()> {
        Ok(())
    }

    async fn stop_recording(&self) -> ProbeResult<()> {
        Ok(())
    }
}

struct ScriptedNative {
    available: AtomicBool,
    click_calls: AtomicUsize,
}

impl ScriptedNative {
    fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            click_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AutomationBackend for ScriptedNative {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeInput
    }

    async fn initialize(&self) -> Result<(), InitError> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn click(&self, target: &ActionTarget) -> ProbeResult<()> {
        assert!(target.point.is_some(), "native input needs coordinates");
        self.click_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn type_text(&self, _target: &ActionTarget, _text: &str) -> ProbeResult<()> {
        Ok(())
    }

    async fn press(&self, _target: &ActionTarget, _key: &str) -> ProbeResult<()> {
        Ok(())
    }

    async fn hover(&self, _target: &ActionTarget) -> ProbeResult<()> {
        Ok(())
    }

    async fn scroll(&self, _target: &ActionTarget, _dx: f64, _dy: f64) -> ProbeResult<()> {
        Ok(())
    }

    async fn drag(&self, _target: &ActionTarget, _to: Point) -> ProbeResult<()> {
        Ok(())
    }
}

#[async_trait]
impl NativeInput for ScriptedNative {
    async fn move_to(&self, _point: Point) -> ProbeResult<()> {
        Ok(())
    }

    async fn screenshot(&self) -> ProbeResult<String> {
        Ok("iVBORw0KGgo=".into())
    }

    async fn screen_size(&self) -> ProbeResult<(u32, u32)> {
        Ok((1920, 1080))
    }
}

/// Vision double: serves a canned answer and counts calls.
struct ScriptedVision {
    answer: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl VisionCall for ScriptedVision {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn call(&self, _system: &str, _user: &str, _image: &str) -> ProbeResult<CallOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CallOutput {
            text: self.answer.clone(),
            input_tokens: 1000,
            output_tokens: 500,
        })
    }
}

fn submit_button() -> SnapshotElement {
    SnapshotElement {
        role: "button".into(),
        name: "Submit".into(),
        bounding_box: Some(Rect::new(100.0, 100.0, 80.0, 24.0)),
        interactive: true,
    }
}

fn scripted_visual(answer: &str) -> (VisualResolver, Arc<AtomicUsize>, Arc<Mutex<CostTracker>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let tracker = Arc::new(Mutex::new(CostTracker::new()));
    let resolver = VisualResolver::new(
        Arc::new(ScriptedVision {
            answer: answer.to_string(),
            calls: Arc::clone(&calls),
        }),
        Arc::clone(&tracker),
    );
    (resolver, calls, tracker)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ref_resolution_skips_backend_round_trip() {
    let structural = Arc::new(ScriptedStructural::with_elements(vec![submit_button()]));
    let session = Session::with_backends(
        ProbeConfig::default(),
        structural.clone(),
        None,
        None,
        None,
    );
    session.connect().await.unwrap();

    session.snapshot(SnapshotOptions::default()).await.unwrap();
    let handle = session.find("@e1").await.unwrap().expect("cached ref");

    assert_eq!(handle.id, "e1");
    assert_eq!(handle.role, "button");
    assert_eq!(handle.name, "Submit");
    assert_eq!(handle.source, HandleSource::Dom);
    assert_eq!(structural.find_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ref_against_missing_snapshot_triggers_one_implicitly() {
    let structural = Arc::new(ScriptedStructural::with_elements(vec![submit_button()]));
    let session = Session::with_backends(
        ProbeConfig::default(),
        structural.clone(),
        None,
        None,
        None,
    );
    session.connect().await.unwrap();

    let handle = session.find("@e1").await.unwrap().expect("implicit snapshot");
    assert_eq!(handle.name, "Submit");
    assert_eq!(structural.snapshot_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn structural_hit_never_reaches_the_visual_tier() {
    let structural = Arc::new(
        ScriptedStructural::default()
            .with_find(".save", ElementHandle::dom("n7", "button", "Save")),
    );
    let (visual, vision_calls, _) = scripted_visual("{}");
    let session = Session::with_backends(
        ProbeConfig::default(),
        structural,
        None,
        None,
        Some(visual),
    );
    session.connect().await.unwrap();

    let handle = session.find(".save").await.unwrap().expect("structural hit");
    assert_eq!(handle.id, "n7");
    assert_eq!(vision_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn visual_locator_without_resolver_returns_none() {
    let session = Session::with_backends(
        ProbeConfig::default(),
        Arc::new(ScriptedStructural::default()),
        None,
        None,
        None,
    );
    session.connect().await.unwrap();

    let result = session
        .find(Locator::visual("red delete icon"))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn visual_fallback_synthesizes_point_handle_and_tags_result() {
    let answer = r#"{"coordinates": {"x": 320, "y": 240}, "confidence": 0.92,
                     "reasoning": "matches the description", "not_found": false}"#;
    let (visual, vision_calls, tracker) = scripted_visual(answer);
    let native = Arc::new(ScriptedNative::new(true));
    let session = Session::with_backends(
        ProbeConfig::default(),
        Arc::new(ScriptedStructural::default()),
        Some(native.clone()),
        None,
        Some(visual),
    )
    .with_cost_tracker(Arc::clone(&tracker));
    session.connect().await.unwrap();

    let result = session.click(Locator::visual("red delete icon")).await.unwrap();

    assert_eq!(result.status, ActionStatus::VlmFallback);
    assert!(result.used_vlm);
    let cost = result.vlm_cost.expect("priced resolution");
    // anthropic: 1 * 0.003 + 0.5 * 0.015 + 1 * 0.0048
    assert!((cost - 0.0153).abs() < 1e-9);
    assert_eq!(vision_calls.load(Ordering::SeqCst), 1);
    assert_eq!(native.click_calls.load(Ordering::SeqCst), 1);

    let summary = tracker.lock().await.summary();
    assert_eq!(summary.calls, 1);
    assert!((summary.total_cost - 0.0153).abs() < 1e-9);
}

#[tokio::test]
async fn unavailable_native_routes_boxed_click_through_structural() {
    let structural = Arc::new(ScriptedStructural::default().with_find(
        ".boxed",
        ElementHandle::dom("n1", "button", "Boxed")
            .with_bounding_box(Rect::new(0.0, 0.0, 10.0, 10.0)),
    ));
    let native = Arc::new(ScriptedNative::new(false));
    let session = Session::with_backends(
        ProbeConfig::default(),
        structural.clone(),
        Some(native.clone()),
        None,
        None,
    );
    session.connect().await.unwrap();

    let result = session.click(".boxed").await.unwrap();

    assert_eq!(result.status, ActionStatus::Success);
    assert_eq!(native.click_calls.load(Ordering::SeqCst), 0);
    assert_eq!(structural.click_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn available_native_takes_priority_for_boxed_handles() {
    let structural = Arc::new(ScriptedStructural::default().with_find(
        ".boxed",
        ElementHandle::dom("n1", "button", "Boxed")
            .with_bounding_box(Rect::new(0.0, 0.0, 10.0, 10.0)),
    ));
    let native = Arc::new(ScriptedNative::new(true));
    let session = Session::with_backends(
        ProbeConfig::default(),
        structural.clone(),
        Some(native.clone()),
        None,
        None,
    );
    session.connect().await.unwrap();

    let result = session.click(".boxed").await.unwrap();
    assert_eq!(result.status, ActionStatus::Success);
    assert_eq!(native.click_calls.load(Ordering::SeqCst), 1);
    assert_eq!(structural.click_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_element_is_a_not_found_result_not_an_error() {
    let session = Session::with_backends(
        ProbeConfig::default(),
        Arc::new(ScriptedStructural::default()),
        None,
        None,
        None,
    );
    session.connect().await.unwrap();

    let result = session.click(".ghost").await.unwrap();
    assert_eq!(result.status, ActionStatus::NotFound);
    assert!(!result.used_vlm);
}

#[tokio::test]
async fn acting_before_connect_is_a_hard_failure() {
    let session = Session::with_backends(
        ProbeConfig::default(),
        Arc::new(ScriptedStructural::default()),
        None,
        None,
        None,
    );
    let err = session.click(".anything").await.unwrap_err();
    assert!(matches!(err, ProbeError::NotConnected));
}

#[tokio::test]
async fn wait_for_fails_within_one_interval_of_the_timeout() {
    let session = Session::with_backends(
        ProbeConfig::default(),
        Arc::new(ScriptedStructural::default()),
        None,
        None,
        None,
    );
    session.connect().await.unwrap();

    let started = std::time::Instant::now();
    let err = session
        .wait_for(
            ".never",
            WaitOptions {
                timeout: Some(Duration::from_millis(200)),
                interval: Some(Duration::from_millis(50)),
                state: WaitState::Visible,
            },
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    let ProbeError::NotFound { elapsed_ms } = err else {
        panic!("expected NotFound, got {err:?}");
    };
    assert!(elapsed_ms >= 200);
    assert!(elapsed >= Duration::from_millis(200));
    // One extra poll interval of slack, plus scheduler noise.
    assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
}

#[tokio::test]
async fn wait_for_hidden_succeeds_when_element_is_absent() {
    let session = Session::with_backends(
        ProbeConfig::default(),
        Arc::new(ScriptedStructural::default()),
        None,
        None,
        None,
    );
    session.connect().await.unwrap();

    let result = session
        .wait_for(
            ".gone",
            WaitOptions {
                timeout: Some(Duration::from_millis(200)),
                interval: Some(Duration::from_millis(50)),
                state: WaitState::Hidden,
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn find_all_is_structural_only_and_degrades_to_empty() {
    let structural = Arc::new(
        ScriptedStructural::default().with_find(".row", ElementHandle::dom("n1", "row", "Row")),
    );
    let (visual, vision_calls, _) = scripted_visual("{}");
    let session = Session::with_backends(
        ProbeConfig::default(),
        structural,
        None,
        None,
        Some(visual),
    );
    session.connect().await.unwrap();

    let rows = session.find_all(".row").await.unwrap();
    assert_eq!(rows.len(), 1);
    let empty = session.find_all(".nothing").await.unwrap();
    assert!(empty.is_empty());
    assert_eq!(vision_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deterministic_mode_never_pays_for_vision() {
    let answer = r#"{"coordinates": {"x": 1, "y": 1}, "confidence": 0.9, "not_found": false}"#;
    let (visual, vision_calls, _) = scripted_visual(answer);
    let config = ProbeConfig {
        resolution_mode: uiprobe::ResolutionMode::DeterministicOnly,
        ..ProbeConfig::default()
    };
    let session = Session::with_backends(
        config,
        Arc::new(ScriptedStructural::default()),
        None,
        None,
        Some(visual),
    );
    session.connect().await.unwrap();

    assert!(session.find(".missing").await.unwrap().is_none());
    assert_eq!(vision_calls.load(Ordering::SeqCst), 0);
}
