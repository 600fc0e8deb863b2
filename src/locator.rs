use serde::{Deserialize, Serialize};

/// How a locator value should be interpreted during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Snapshot-scoped reference id (`@e12`).
    Ref,
    Css,
    Xpath,
    Text,
    Role,
    Testid,
    /// Natural-language description, resolvable only by the visual tier.
    Visual,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Ref => "ref",
            Strategy::Css => "css",
            Strategy::Xpath => "xpath",
            Strategy::Text => "text",
            Strategy::Role => "role",
            Strategy::Testid => "testid",
            Strategy::Visual => "visual",
        }
    }
}

/// A normalized, strategy-tagged locator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(Strategy::Css, value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Strategy::Text, value)
    }

    pub fn role(value: impl Into<String>) -> Self {
        Self::new(Strategy::Role, value)
    }

    /// Test-id locators have no raw-string prefix; they are only built here.
    pub fn testid(value: impl Into<String>) -> Self {
        Self::new(Strategy::Testid, value)
    }

    /// Natural-language locator for the visual tier.
    pub fn visual(value: impl Into<String>) -> Self {
        Self::new(Strategy::Visual, value)
    }

    /// Natural-language rendering handed to the visual tier when the
    /// deterministic tiers come up empty. Role/text hints survive; everything
    /// else degrades to "element matching `<value>`".
    pub fn describe_for_vision(&self) -> String {
        match self.strategy {
            Strategy::Visual => self.value.clone(),
            Strategy::Text => format!("element with text \"{}\"", self.value),
            Strategy::Role => format!("{} element", self.value),
            Strategy::Testid => format!("element with test id \"{}\"", self.value),
            Strategy::Ref | Strategy::Css | Strategy::Xpath => {
                format!("element matching `{}`", self.value)
            }
        }
    }
}

/// Raw or already-normalized locator input. Lets `normalize_input` accept
/// both without losing idempotence over structured locators.
#[derive(Debug, Clone)]
pub enum LocatorInput {
    Raw(String),
    Structured(Locator),
}

impl From<&str> for LocatorInput {
    fn from(raw: &str) -> Self {
        LocatorInput::Raw(raw.to_string())
    }
}

impl From<String> for LocatorInput {
    fn from(raw: String) -> Self {
        LocatorInput::Raw(raw)
    }
}

impl From<Locator> for LocatorInput {
    fn from(locator: Locator) -> Self {
        LocatorInput::Structured(locator)
    }
}

impl From<&Locator> for LocatorInput {
    fn from(locator: &Locator) -> Self {
        LocatorInput::Structured(locator.clone())
    }
}

/// Classifies a raw string locator by prefix. Never fails: unrecognized
/// strings are CSS selectors.
pub fn normalize(raw: &str) -> Locator {
    if let Some(rest) = raw.strip_prefix('@') {
        return Locator::new(Strategy::Ref, rest);
    }
    if raw.starts_with("//") {
        return Locator::new(Strategy::Xpath, raw);
    }
    if let Some(rest) = raw.strip_prefix("text=") {
        return Locator::new(Strategy::Text, rest);
    }
    if let Some(rest) = raw.strip_prefix("role=") {
        return Locator::new(Strategy::Role, rest);
    }
    Locator::new(Strategy::Css, raw)
}

/// Normalizes either form; structured locators pass through unchanged.
pub fn normalize_input(input: impl Into<LocatorInput>) -> Locator {
    match input.into() {
        LocatorInput::Raw(raw) => normalize(&raw),
        LocatorInput::Structured(locator) => locator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(normalize("@e3").strategy, Strategy::Ref);
        assert_eq!(normalize("@e3").value, "e3");
        assert_eq!(normalize("//div[@id='x']").strategy, Strategy::Xpath);
        assert_eq!(normalize("text=Submit").strategy, Strategy::Text);
        assert_eq!(normalize("text=Submit").value, "Submit");
        assert_eq!(normalize("role=button").strategy, Strategy::Role);
        assert_eq!(normalize("#app .toolbar").strategy, Strategy::Css);
    }

    #[test]
    fn xpath_keeps_full_value() {
        assert_eq!(normalize("//button").value, "//button");
    }

    #[test]
    fn normalize_is_idempotent_over_structured() {
        let locator = Locator::testid("save-button");
        assert_eq!(normalize_input(locator.clone()), locator);

        let visual = Locator::visual("red delete icon");
        assert_eq!(normalize_input(visual.clone()), visual);
    }

    #[test]
    fn vision_description_preserves_hints() {
        assert_eq!(
            normalize("text=Save").describe_for_vision(),
            "element with text \"Save\""
        );
        assert_eq!(normalize("role=button").describe_for_vision(), "button element");
        assert_eq!(
            normalize(".btn-primary").describe_for_vision(),
            "element matching `.btn-primary`"
        );
        assert_eq!(
            Locator::visual("red delete icon").describe_for_vision(),
            "red delete icon"
        );
    }
}
