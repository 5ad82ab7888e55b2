use serde_json::Value;

use crate::types::Action;

/// The closed action vocabulary advertised to white agents.
pub const ALLOWED_ACTIONS: [&str; 6] = ["click", "type", "select", "scroll", "wait", "stop"];

/// Structurally validate a raw agent action and turn it into a typed one.
///
/// Fails closed: a missing `type`, a type outside the closed vocabulary, or
/// a missing type-specific field rejects the action with a reason naming the
/// problem. This gate runs before execution so malformed agent output never
/// reaches the browser layer. No side effects.
pub fn validate_action(raw: &Value) -> Result<Action, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "Action must be a JSON object".to_string())?;

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(k) if !k.is_empty() => k,
        _ => return Err("Action missing 'type' field".to_string()),
    };

    if !ALLOWED_ACTIONS.contains(&kind) {
        return Err(format!(
            "Invalid action type '{kind}'. Allowed: {}",
            ALLOWED_ACTIONS.join(", ")
        ));
    }

    let required: &[&str] = match kind {
        "click" => &["selector"],
        "type" => &["selector", "text"],
        "select" => &["selector", "value"],
        "scroll" => &["delta_y"],
        "wait" => &["ms"],
        "stop" => &["reason"],
        _ => unreachable!("kind checked against ALLOWED_ACTIONS"),
    };

    for field in required {
        if !obj.contains_key(*field) {
            return Err(format!(
                "{} action missing '{field}' field",
                capitalize(kind)
            ));
        }
    }

    serde_json::from_value(raw.clone()).map_err(|e| format!("Malformed action payload: {e}"))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_requires_selector() {
        let err = validate_action(&json!({"type": "click"})).unwrap_err();
        assert_eq!(err, "Click action missing 'selector' field");

        let action = validate_action(&json!({"type": "click", "selector": "#x"})).unwrap();
        assert_eq!(
            action,
            Action::Click {
                selector: "#x".into()
            }
        );
    }

    #[test]
    fn type_requires_selector_and_text() {
        let err = validate_action(&json!({"type": "type", "selector": "#q"})).unwrap_err();
        assert_eq!(err, "Type action missing 'text' field");

        let action =
            validate_action(&json!({"type": "type", "selector": "#q", "text": "rust"})).unwrap();
        assert_eq!(
            action,
            Action::Type {
                selector: "#q".into(),
                text: "rust".into(),
                press_enter: false,
            }
        );
    }

    #[test]
    fn missing_or_unknown_type_is_rejected() {
        assert_eq!(
            validate_action(&json!({"selector": "#x"})).unwrap_err(),
            "Action missing 'type' field"
        );
        assert!(
            validate_action(&json!({"type": "hover", "selector": "#x"}))
                .unwrap_err()
                .starts_with("Invalid action type 'hover'")
        );
        assert_eq!(
            validate_action(&json!("click")).unwrap_err(),
            "Action must be a JSON object"
        );
    }

    #[test]
    fn each_kind_checks_its_required_fields() {
        assert_eq!(
            validate_action(&json!({"type": "select", "selector": "#s"})).unwrap_err(),
            "Select action missing 'value' field"
        );
        assert_eq!(
            validate_action(&json!({"type": "scroll"})).unwrap_err(),
            "Scroll action missing 'delta_y' field"
        );
        assert_eq!(
            validate_action(&json!({"type": "wait"})).unwrap_err(),
            "Wait action missing 'ms' field"
        );
        assert_eq!(
            validate_action(&json!({"type": "stop"})).unwrap_err(),
            "Stop action missing 'reason' field"
        );
    }

    #[test]
    fn wrong_field_types_fail_closed() {
        let err =
            validate_action(&json!({"type": "click", "selector": 42})).unwrap_err();
        assert!(err.starts_with("Malformed action payload"));
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let action = validate_action(
            &json!({"type": "scroll", "delta_y": 500, "confidence": 0.9}),
        )
        .unwrap();
        assert_eq!(action, Action::Scroll { delta_y: 500 });
    }
}
