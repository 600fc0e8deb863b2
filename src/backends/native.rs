//! Native OS input simulation and screen capture.
//!
//! Input goes through `enigo`, capture through `xcap`. The adapter comes up
//! lazily: if the native input library cannot be loaded, `initialize`
//! reports the cause and the adapter stays unavailable — it never panics
//! and never fails the engine.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::backends::{ActionTarget, AutomationBackend, BackendKind, InitError, NativeInput};
use crate::element::Point;
use crate::errors::{ProbeError, ProbeResult};

pub struct NativeInputBackend {
    available: AtomicBool,
}

impl NativeInputBackend {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(false),
        }
    }

    /// Enigo handles are created per operation and dropped before any await;
    /// nothing platform-specific is held across suspension points.
    fn with_enigo<T>(
        &self,
        f: impl FnOnce(&mut Enigo) -> Result<T, enigo::InputError>,
    ) -> ProbeResult<T> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| ProbeError::BackendUnavailable(format!("enigo: {e}")))?;
        f(&mut enigo).map_err(|e| ProbeError::BackendUnavailable(format!("native input: {e}")))
    }

    fn require_point(target: &ActionTarget) -> ProbeResult<Point> {
        target.point.ok_or_else(|| {
            ProbeError::BackendUnavailable("native input needs coordinates".into())
        })
    }
}

impl Default for NativeInputBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a key name to an enigo key. Single characters type as unicode.
fn parse_key(name: &str) -> Option<Key> {
    let key = match name.to_ascii_lowercase().as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "up" | "arrowup" => Key::UpArrow,
        "down" | "arrowdown" => Key::DownArrow,
        "left" | "arrowleft" => Key::LeftArrow,
        "right" | "arrowright" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "shift" => Key::Shift,
        "control" | "ctrl" => Key::Control,
        "alt" => Key::Alt,
        "meta" | "cmd" | "super" => Key::Meta,
        other => {
            let mut chars = other.chars();
            let first = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Key::Unicode(first)
        }
    };
    Some(key)
}

#[async_trait]
impl AutomationBackend for NativeInputBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeInput
    }

    async fn initialize(&self) -> Result<(), InitError> {
        match Enigo::new(&Settings::default()) {
            Ok(_) => {
                self.available.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => Err(InitError::NativeLibrary(e.to_string())),
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn click(&self, target: &ActionTarget) -> ProbeResult<()> {
        let p = Self::require_point(target)?;
        self.with_enigo(|enigo| {
            enigo.move_mouse(p.x as i32, p.y as i32, Coordinate::Abs)?;
            enigo.button(Button::Left, Direction::Click)
        })
    }

    async fn type_text(&self, target: &ActionTarget, text: &str) -> ProbeResult<()> {
        // Focus the element first when we know where it is.
        if target.point.is_some() {
            self.click(target).await?;
        }
        self.with_enigo(|enigo| enigo.text(text))
    }

    async fn press(&self, _target: &ActionTarget, key: &str) -> ProbeResult<()> {
        let parsed = parse_key(key)
            .ok_or_else(|| ProbeError::BackendUnavailable(format!("unknown key '{key}'")))?;
        self.with_enigo(|enigo| enigo.key(parsed, Direction::Click))
    }

    async fn hover(&self, target: &ActionTarget) -> ProbeResult<()> {
        let p = Self::require_point(target)?;
        self.with_enigo(|enigo| enigo.move_mouse(p.x as i32, p.y as i32, Coordinate::Abs))
    }

    async fn scroll(&self, target: &ActionTarget, dx: f64, dy: f64) -> ProbeResult<()> {
        if let Some(p) = target.point {
            self.with_enigo(|enigo| enigo.move_mouse(p.x as i32, p.y as i32, Coordinate::Abs))?;
        }
        self.with_enigo(|enigo| {
            if dx.abs() >= 1.0 {
                enigo.scroll(dx as i32, Axis::Horizontal)?;
            }
            if dy.abs() >= 1.0 {
                enigo.scroll(dy as i32, Axis::Vertical)?;
            }
            Ok(())
        })
    }

    async fn drag(&self, target: &ActionTarget, to: Point) -> ProbeResult<()> {
        let from = Self::require_point(target)?;
        self.with_enigo(|enigo| {
            enigo.move_mouse(from.x as i32, from.y as i32, Coordinate::Abs)?;
            enigo.button(Button::Left, Direction::Press)?;
            enigo.move_mouse(to.x as i32, to.y as i32, Coordinate::Abs)?;
            enigo.button(Button::Left, Direction::Release)
        })
    }
}

#[async_trait]
impl NativeInput for NativeInputBackend {
    async fn move_to(&self, point: Point) -> ProbeResult<()> {
        self.with_enigo(|enigo| enigo.move_mouse(point.x as i32, point.y as i32, Coordinate::Abs))
    }

    /// Captures the primary monitor and returns base64 PNG.
    async fn screenshot(&self) -> ProbeResult<String> {
        tokio::task::spawn_blocking(capture_primary_png)
            .await
            .map_err(|e| ProbeError::BackendUnavailable(format!("capture task: {e}")))?
    }

    async fn screen_size(&self) -> ProbeResult<(u32, u32)> {
        tokio::task::spawn_blocking(|| {
            let monitors = xcap::Monitor::all()
                .map_err(|e| ProbeError::BackendUnavailable(format!("xcap: {e}")))?;
            let monitor = monitors
                .iter()
                .find(|m| m.is_primary())
                .or_else(|| monitors.first())
                .ok_or_else(|| ProbeError::BackendUnavailable("no monitor found".into()))?;
            Ok((monitor.width(), monitor.height()))
        })
        .await
        .map_err(|e| ProbeError::BackendUnavailable(format!("capture task: {e}")))?
    }
}

fn capture_primary_png() -> ProbeResult<String> {
    let monitors =
        xcap::Monitor::all().map_err(|e| ProbeError::BackendUnavailable(format!("xcap: {e}")))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| ProbeError::BackendUnavailable("no monitor found".into()))?;
    let image = monitor
        .capture_image()
        .map_err(|e| ProbeError::BackendUnavailable(format!("capture: {e}")))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ProbeError::BackendUnavailable(format!("png encode: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_parse() {
        assert!(parse_key("Enter").is_some());
        assert!(parse_key("ctrl").is_some());
        assert!(parse_key("a").is_some());
        assert!(parse_key("definitely-not-a-key").is_none());
    }

    #[tokio::test]
    async fn uninitialized_backend_reports_unavailable() {
        let backend = NativeInputBackend::new();
        assert!(!backend.is_available());
    }
}
