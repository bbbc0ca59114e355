// ABOUTME: Best-effort unwrapping of the backend's double-encoded tool results
// ABOUTME: Parses the first text content item as JSON, falling back to the raw text
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use serde_json::Value;

/// Unwrap a tool-call `result` into its canonical value
///
/// The backend wraps tool output as `{"content": [{"type": "text", "text": "..."}]}`
/// where `text` is usually serialized JSON. This is a heuristic, not a schema:
///
/// 1. `result.content` is an array with an item whose `type` is `"text"`:
///    the first such item's `text` is parsed as JSON and returned, or returned
///    as a plain string when it is not JSON.
/// 2. Anything else is returned unchanged.
///
/// Only one level is unwrapped. Callers must accept strings, mappings and
/// sequences interchangeably.
pub fn normalize(result: Value) -> Value {
    match first_text_item(&result) {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned())),
        None => result,
    }
}

fn first_text_item(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .iter()
        .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .map(|item| item.get("text").and_then(Value::as_str).unwrap_or_default())
}
