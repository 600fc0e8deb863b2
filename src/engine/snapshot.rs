//! Reference-indexed snapshot of the interactive element set.
//!
//! Refs (`e1`, `e2`, …) are keys into the snapshot that produced them and
//! carry no cross-snapshot guarantees. The engine replaces the whole
//! snapshot on every capture; nothing is ever patched in place.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backends::{SnapshotOptions, SnapshotPayload};
use crate::element::{ElementHandle, HandleSource};

fn ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^e\d+$").unwrap())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub refs: HashMap<String, ElementHandle>,
}

impl Snapshot {
    /// Assigns monotonically increasing refs, scoped to this snapshot, to
    /// every element the backend reported (interactive ones only when the
    /// options say so).
    pub fn from_payload(payload: &SnapshotPayload, options: SnapshotOptions) -> Self {
        let mut refs = HashMap::new();
        let mut next = 0usize;
        for element in &payload.elements {
            if options.interactive && !element.interactive {
                continue;
            }
            next += 1;
            let ref_id = format!("e{next}");
            let mut handle = ElementHandle {
                id: ref_id.clone(),
                role: element.role.clone(),
                name: element.name.clone(),
                source: HandleSource::Dom,
                bounding_box: element.bounding_box,
                nth: None,
            };
            if handle.role.is_empty() {
                handle.role = "element".to_string();
            }
            refs.insert(ref_id, handle);
        }
        Self {
            timestamp: Utc::now(),
            refs,
        }
    }

    /// Looks up a ref, tolerating the `@` prefix. An absent or malformed id
    /// is a miss, never an error.
    pub fn resolve(&self, ref_id: &str) -> Option<ElementHandle> {
        let key = ref_id.strip_prefix('@').unwrap_or(ref_id);
        if !ref_pattern().is_match(key) {
            return None;
        }
        self.refs.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SnapshotElement;
    use crate::element::Rect;

    fn payload() -> SnapshotPayload {
        SnapshotPayload {
            elements: vec![
                SnapshotElement {
                    role: "button".into(),
                    name: "Submit".into(),
                    bounding_box: Some(Rect::new(0.0, 0.0, 80.0, 24.0)),
                    interactive: true,
                },
                SnapshotElement {
                    role: "paragraph".into(),
                    name: "fine print".into(),
                    bounding_box: None,
                    interactive: false,
                },
                SnapshotElement {
                    role: "textbox".into(),
                    name: "Email".into(),
                    bounding_box: None,
                    interactive: true,
                },
            ],
            screenshot: None,
        }
    }

    #[test]
    fn refs_are_monotonic_and_interactive_only() {
        let snapshot = Snapshot::from_payload(&payload(), SnapshotOptions { interactive: true });
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.resolve("e1").unwrap().name, "Submit");
        assert_eq!(snapshot.resolve("e2").unwrap().role, "textbox");
    }

    #[test]
    fn full_capture_keeps_everything() {
        let snapshot = Snapshot::from_payload(&payload(), SnapshotOptions { interactive: false });
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn resolve_round_trips_every_ref() {
        let snapshot = Snapshot::from_payload(&payload(), SnapshotOptions::default());
        for (ref_id, handle) in &snapshot.refs {
            let resolved = snapshot.resolve(ref_id).expect("round trip");
            assert_eq!(resolved.role, handle.role);
            assert_eq!(resolved.name, handle.name);
        }
    }

    #[test]
    fn at_prefix_is_stripped_and_garbage_misses() {
        let snapshot = Snapshot::from_payload(&payload(), SnapshotOptions::default());
        assert!(snapshot.resolve("@e1").is_some());
        assert!(snapshot.resolve("e99").is_none());
        assert!(snapshot.resolve("not-a-ref").is_none());
        assert!(snapshot.resolve("@").is_none());
    }
}
