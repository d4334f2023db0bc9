use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::EditCommand;

/// JSON objects nested at most two levels deep.
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("valid json object pattern")
});

/// Find the first embedded JSON object in `reply` that carries a string
/// `command` key.
pub fn extract_command(reply: &str) -> Option<EditCommand> {
    JSON_OBJECT.find_iter(reply).find_map(|m| {
        let value: Value = serde_json::from_str(m.as_str()).ok()?;
        if !value.get("command").is_some_and(Value::is_string) {
            return None;
        }
        serde_json::from_value(value).ok()
    })
}
