// Template interpolation for action text fields
//
// Literal `{{key}}` substitution from a flat map of event values. No
// nesting, conditionals or escaping; a `{{` inside a substituted value is
// left as-is.

use serde_json::Value;

use super::EventData;

/// Display form of an event value. Null becomes the empty string.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Replace every `{{key}}` in `text` for every key present in `data`.
/// Placeholders without a matching key are kept verbatim.
pub fn interpolate(text: &str, data: &EventData) -> String {
    let mut result = text.to_string();

    for (key, value) in data {
        let placeholder = format!("{{{{{}}}}}", key);
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, &display_value(value));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> EventData {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_replaces_every_occurrence() {
        let data = data(json!({ "client_name": "Ada" }));
        assert_eq!(
            interpolate("Hi {{client_name}}, welcome {{client_name}}!", &data),
            "Hi Ada, welcome Ada!"
        );
    }

    #[test]
    fn test_null_becomes_empty_and_numbers_are_displayed() {
        let data = data(json!({ "note": null, "amount": 150, "paid": true }));
        assert_eq!(
            interpolate("[{{note}}] {{amount}} {{paid}}", &data),
            "[] 150 true"
        );
    }

    #[test]
    fn test_unknown_placeholders_are_left_alone() {
        let data = data(json!({ "a": "1" }));
        assert_eq!(interpolate("{{a}} {{b}}", &data), "1 {{b}}");
    }

    #[test]
    fn test_braces_in_values_are_not_escaped() {
        let data = data(json!({ "title": "{{secret}}" }));
        assert_eq!(interpolate("Task: {{title}}", &data), "Task: {{secret}}");
    }
}
