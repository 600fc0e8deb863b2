use serde::{Deserialize, Serialize};

/// Screen-space point in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box in physical pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// A degenerate 1×1 box centred on `point`. Used for visual-tier hits,
    /// where the model only yields a point, not an extent.
    pub fn around_point(point: Point) -> Self {
        Self {
            x: point.x - 0.5,
            y: point.y - 0.5,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Centre of the box — the anchor for coordinate-based input.
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// Which tier produced a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleSource {
    Dom,
    Vlm,
}

/// A resolved, actionable UI element.
///
/// Never mutated after creation; a stale handle is simply re-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: String,
    pub role: String,
    pub name: String,
    pub source: HandleSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<Rect>,
    /// Index among duplicates returned by `find_all`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,
}

impl ElementHandle {
    /// Handle for a structurally resolved element.
    pub fn dom(id: impl Into<String>, role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            name: name.into(),
            source: HandleSource::Dom,
            bounding_box: None,
            nth: None,
        }
    }

    /// Handle synthesized from a visual-tier point estimate.
    pub fn from_vision_point(point: Point, description: &str) -> Self {
        Self {
            id: format!("vlm:{:.0},{:.0}", point.x, point.y),
            role: "element".to_string(),
            name: description.to_string(),
            source: HandleSource::Vlm,
            bounding_box: Some(Rect::around_point(point)),
            nth: None,
        }
    }

    pub fn with_bounding_box(mut self, rect: Rect) -> Self {
        self.bounding_box = Some(rect);
        self
    }

    pub fn with_nth(mut self, nth: usize) -> Self {
        self.nth = Some(nth);
        self
    }

    /// Anchor point for coordinate-based input, when a box is known.
    pub fn anchor(&self) -> Option<Point> {
        self.bounding_box.map(|b| b.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_center() {
        let r = Rect::new(10.0, 20.0, 100.0, 40.0);
        assert_eq!(r.center(), Point::new(60.0, 40.0));
    }

    #[test]
    fn vision_point_box_is_unit_sized_and_centred() {
        let h = ElementHandle::from_vision_point(Point::new(300.0, 200.0), "red delete icon");
        let b = h.bounding_box.expect("box");
        assert_eq!((b.width, b.height), (1.0, 1.0));
        assert_eq!(b.center(), Point::new(300.0, 200.0));
        assert_eq!(h.source, HandleSource::Vlm);
    }
}
