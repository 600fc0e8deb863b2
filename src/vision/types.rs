use serde::{Deserialize, Serialize};

use crate::element::Point;

/// Input to one visual element lookup.
#[derive(Debug, Clone)]
pub struct FindElementParams {
    /// Base64 PNG of the current UI surface.
    pub screenshot: String,
    /// Natural-language description of the target element.
    pub description: String,
    /// Extra hints (surrounding widget, test intent).
    pub context: Option<String>,
}

/// What the model reported for an element lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementLocation {
    #[serde(default)]
    pub coordinates: Option<Point>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub not_found: bool,
    /// A close-but-not-exact candidate the model offered instead.
    #[serde(default)]
    pub alternative: Option<String>,
}

impl ElementLocation {
    /// Miss result used when the response could not be decoded.
    pub fn unparsable(detail: &str) -> Self {
        Self {
            coordinates: None,
            confidence: 0.0,
            reasoning: format!("unparsable model response: {detail}"),
            not_found: true,
            alternative: None,
        }
    }
}

/// Input to one step of the autonomous action loop.
#[derive(Debug, Clone)]
pub struct NextActionParams {
    pub screenshot: String,
    pub instruction: String,
    /// Action vocabulary the model may pick from.
    pub action_spaces: Vec<String>,
}

/// One step decided by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub action_params: serde_json::Value,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub finished: bool,
}

/// Raw output of one provider call: assistant text plus reported usage.
#[derive(Debug, Clone)]
pub struct CallOutput {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
