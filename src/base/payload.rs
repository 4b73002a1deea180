//! Dot-path access into instance payloads (e.g. "applicant.score")

use crate::base::instance::Payload;
use serde_json::Value;

/// Get a nested field value using dot notation
pub fn get_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

/// Set a nested field, creating intermediate objects. A non-object value in
/// the way is replaced.
pub fn set_path(payload: &mut Payload, path: &str, value: Value) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut current = payload;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Payload::new()));
        if !entry.is_object() {
            *entry = Value::Object(Payload::new());
        }
        current = match entry.as_object_mut() {
            Some(map) => map,
            None => return,
        };
    }
    current.insert(last.to_string(), value);
}

/// Copy `from` in `source` to `to` in `target`. Returns false when the source
/// path does not exist.
pub fn copy_path(source: &Payload, from: &str, target: &mut Payload, to: &str) -> bool {
    match get_path(source, from) {
        Some(value) => {
            set_path(target, to, value.clone());
            true
        }
        None => false,
    }
}
