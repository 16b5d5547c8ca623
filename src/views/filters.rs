//! Named, priority-ordered filter chains
//!
//! A chain is folded over a payload: each filter receives the previous result
//! plus the caller's extra arguments. Lower priorities run first; filters with
//! equal priority run in registration order.

use crate::error::{Error, Result};
use crate::utils::object;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Filter function: `(payload, extra) -> new payload`
///
/// Returning `Ok(None)` collapses the payload to empty text.
pub type FilterFn = dyn Fn(Value, &[Value]) -> Result<Option<Value>>;

/// Priority for filter execution (lower values execute first)
pub type Priority = i32;

/// Chain resolving a token name against the render data
pub const TOKEN: &str = "token";

/// Chain every inline scalar passes through before it is appended
pub const OUTPUT: &str = "output";

/// Prefix turning a path lookup into a truthiness test
const CONDITIONAL_PREFIX: &str = "if.";

#[derive(Clone)]
struct FilterEntry {
    filter: Rc<FilterFn>,
    priority: Priority,
}

/// Registry of filter chains keyed by name
#[derive(Clone, Default)]
pub struct FilterRegistry {
    chains: HashMap<String, Vec<FilterEntry>>,
}

impl FilterRegistry {
    /// Empty registry, without the built-in `token` resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `token` resolver at priority 0
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(TOKEN, Rc::new(resolve_token), 0);
        registry
    }

    /// Register a filter under `name`
    pub fn register<F>(&mut self, name: &str, filter: F, priority: Priority) -> Result<()>
    where
        F: Fn(Value, &[Value]) -> Result<Option<Value>> + 'static,
    {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(Error::invalid_argument(format!(
                "Filter name must be non-empty text without whitespace, got {:?}",
                name
            )));
        }

        self.insert(name, Rc::new(filter), priority);
        log::debug!(
            "Registered filter for '{}' with priority {} ({} in chain)",
            name,
            priority,
            self.chains.get(name).map_or(0, Vec::len)
        );
        Ok(())
    }

    fn insert(&mut self, name: &str, filter: Rc<FilterFn>, priority: Priority) {
        let chain = self.chains.entry(name.to_string()).or_default();
        chain.push(FilterEntry { filter, priority });
        // Stable sort keeps registration order among equal priorities
        chain.sort_by_key(|entry| entry.priority);
    }

    /// Remove every filter registered under `name`
    pub fn unregister(&mut self, name: &str) -> bool {
        self.chains.remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.chains.get(name).is_some_and(|c| !c.is_empty())
    }

    /// Snapshot of a chain in execution order
    pub fn chain(&self, name: &str) -> Vec<Rc<FilterFn>> {
        self.chains
            .get(name)
            .map(|chain| chain.iter().map(|e| Rc::clone(&e.filter)).collect())
            .unwrap_or_default()
    }

    /// Fold the chain registered under `name` over `payload`
    pub fn apply(&self, name: &str, payload: Value, extra: &[Value]) -> Result<Value> {
        fold(&self.chain(name), payload, extra)
    }

    pub fn clear(&mut self) {
        self.chains.clear();
    }
}

/// Fold an already-snapshotted chain over `payload`
///
/// Callers holding the registry behind a `RefCell` snapshot the chain first so
/// filters are free to touch the registry themselves.
pub fn fold(chain: &[Rc<FilterFn>], payload: Value, extra: &[Value]) -> Result<Value> {
    let mut current = payload;
    for filter in chain {
        current = filter(current, extra)?.unwrap_or_else(|| Value::String(String::new()));
    }
    Ok(current)
}

/// Built-in `token` filter: resolve a dotted path against `extra[0]`
fn resolve_token(payload: Value, extra: &[Value]) -> Result<Option<Value>> {
    let Value::String(name) = &payload else {
        return Ok(Some(payload));
    };
    let data = extra.first().cloned().unwrap_or_default();

    if let Some(path) = name.strip_prefix(CONDITIONAL_PREFIX) {
        let truthy = object::get(&data, path).is_some_and(|v| v.is_truthy());
        return Ok(Some(Value::Bool(truthy)));
    }

    Ok(Some(
        object::get(&data, name).unwrap_or_else(|| Value::String(String::new())),
    ))
}

/// HTML-escape string payloads; meant for the `output` chain
pub fn escape_html(payload: Value, _extra: &[Value]) -> Result<Option<Value>> {
    Ok(Some(match payload {
        Value::String(s) => Value::String(
            s.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
                .replace('\'', "&#x27;"),
        ),
        other => other,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn test_chain_runs_in_priority_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = FilterRegistry::new();

        for priority in [5, 1, 3] {
            let calls = Rc::clone(&calls);
            registry
                .register(
                    "trace",
                    move |payload, _| {
                        calls.borrow_mut().push(priority);
                        Ok(Some(payload))
                    },
                    priority,
                )
                .unwrap();
        }

        registry.apply("trace", Value::Null, &[]).unwrap();
        assert_eq!(*calls.borrow(), vec![1, 3, 5]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = FilterRegistry::new();
        registry
            .register("f", |p, _| Ok(Some(Value::from(format!("{}a", p.to_text())))), 0)
            .unwrap();
        registry
            .register("f", |p, _| Ok(Some(Value::from(format!("{}b", p.to_text())))), 0)
            .unwrap();
        let out = registry.apply("f", Value::from(""), &[]).unwrap();
        assert_eq!(out.to_text(), "ab");
    }

    #[test]
    fn test_missing_return_collapses_to_empty_text() {
        let mut registry = FilterRegistry::new();
        registry.register("forgetful", |_, _| Ok(None), 0).unwrap();
        let out = registry.apply("forgetful", Value::from(42), &[]).unwrap();
        assert_eq!(out.as_str(), Some(""));
    }

    #[test]
    fn test_unknown_chain_is_identity() {
        let registry = FilterRegistry::new();
        let out = registry.apply("nothing", Value::from(7), &[]).unwrap();
        assert_eq!(out.as_f64(), Some(7.0));
    }

    #[test]
    fn test_rejects_invalid_names() {
        let mut registry = FilterRegistry::new();
        let err = registry.register("", |p, _| Ok(Some(p)), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(registry.register("two words", |p, _| Ok(Some(p)), 0).is_err());
    }

    #[test]
    fn test_filter_errors_propagate() {
        let mut registry = FilterRegistry::new();
        registry
            .register("boom", |_, _| Err(Error::template("exploded")), 0)
            .unwrap();
        assert!(registry.apply("boom", Value::Null, &[]).is_err());
    }

    #[test]
    fn test_token_resolver() {
        let registry = FilterRegistry::with_builtins();
        let data = Value::from(json!({"user": {"name": "Ada"}, "count": 0}));

        let name = registry
            .apply(TOKEN, Value::from("user.name"), &[data.clone()])
            .unwrap();
        assert_eq!(name.to_text(), "Ada");

        let missing = registry
            .apply(TOKEN, Value::from("user.email.domain"), &[data.clone()])
            .unwrap();
        assert_eq!(missing.as_str(), Some(""));

        let flag = registry
            .apply(TOKEN, Value::from("if.count"), &[data])
            .unwrap();
        assert_eq!(flag.as_bool(), Some(false));
    }

    #[test]
    fn test_escape_html() {
        let out = escape_html(Value::from("<a href=\"x\">"), &[]).unwrap().unwrap();
        assert_eq!(out.to_text(), "&lt;a href=&quot;x&quot;&gt;");
        let n = escape_html(Value::from(3), &[]).unwrap().unwrap();
        assert_eq!(n.as_f64(), Some(3.0));
    }
}
