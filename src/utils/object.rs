//! Object manipulation utilities
//!
//! Dot-separated path access over shared [`Object`] graphs. Missing segments
//! are never an error on the read side: they simply resolve to `None`.

use crate::error::{Error, Result};
use crate::value::{Object, Value};

/// Get a nested property using a dot-separated path
///
/// # Example
/// ```rust
/// use weft::utils::object;
/// use weft::Value;
/// use serde_json::json;
///
/// let data = Value::from(json!({"user": {"profile": {"name": "Ada"}}}));
/// assert_eq!(object::get(&data, "user.profile.name").unwrap().to_text(), "Ada");
/// assert!(object::get(&data, "user.email").is_none());
/// ```
pub fn get(obj: &Value, path: &str) -> Option<Value> {
    let mut current = obj.clone();

    for part in path.split('.') {
        let next = match &current {
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
        current = next;
    }

    Some(current)
}

/// Check whether every segment of `path` exists
pub fn has(obj: &Value, path: &str) -> bool {
    get(obj, path).is_some()
}

/// Set a nested property, creating intermediate objects as needed
pub fn set(obj: &Object, path: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::invalid_argument(format!("Invalid path '{}'", path)));
    }

    let mut current = obj.clone();

    // Navigate to the parent of the target property
    for part in &parts[..parts.len() - 1] {
        let next = match current.get(part) {
            Some(Value::Object(child)) => child,
            Some(_) => {
                return Err(Error::template(format!(
                    "Cannot set property '{}' on non-object",
                    part
                )))
            }
            None => {
                let child = Object::new();
                current.insert(*part, child.clone());
                child
            }
        };
        current = next;
    }

    current.insert(parts[parts.len() - 1], value);
    Ok(())
}

/// Shallow merge: copies top-level entries of `source` into `target`
///
/// Non-object sources contribute nothing.
pub fn shallow_merge(target: &Object, source: &Value) {
    if let Value::Object(source_map) = source {
        if Object::ptr_eq(target, source_map) {
            return;
        }
        for (key, value) in source_map.entries() {
            target.insert(key, value);
        }
    }
}
