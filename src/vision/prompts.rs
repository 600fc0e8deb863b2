//! Prompt text for the vision tier. One prompt-and-parse contract shared by
//! every provider; only transport differs.

pub const FIND_ELEMENT_SYSTEM: &str = "\
You are a UI element locator for desktop application testing.
You receive one screenshot and a description of a target element.

Rules:
- Respond with a single JSON object, nothing else.
- Schema: {\"coordinates\": {\"x\": <px>, \"y\": <px>}, \"confidence\": <0..1>, \
\"reasoning\": \"<short>\", \"not_found\": <bool>, \"alternative\": \"<desc or null>\"}
- Coordinates are physical pixels into the screenshot, pointing at the
  element's visual center.
- If the element is absent, set not_found to true and omit coordinates.
- If a near match exists, describe it in \"alternative\".";

pub fn build_find_user(description: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!(
            "Locate this element: {description}\nContext: {context}"
        ),
        None => format!("Locate this element: {description}"),
    }
}

pub const NEXT_ACTION_SYSTEM: &str = "\
You are driving a desktop application one input action at a time.
You receive the current screenshot and the overall instruction.

Rules:
- Respond with a single JSON object, nothing else.
- Schema: {\"action_type\": \"<one of the allowed actions>\", \
\"action_params\": {..}, \"thought\": \"<short>\", \"finished\": <bool>}
- click/hover take {\"x\", \"y\"}; type takes {\"text\"}; press takes {\"key\"}; \
scroll takes {\"dx\", \"dy\"}.
- Set finished to true once the instruction is satisfied, with no action.";

pub fn build_next_action_user(instruction: &str, action_spaces: &[String]) -> String {
    format!(
        "Instruction: {instruction}\nAllowed actions: {}",
        action_spaces.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_includes_context_only_when_present() {
        assert!(!build_find_user("Save button", None).contains("Context"));
        assert!(build_find_user("Save button", Some("toolbar")).contains("Context: toolbar"));
    }
}
