//! Directive attribute grammar
//!
//! `@click.prevent.once="select(item.id, 'x', 3)"` splits into an event name
//! with modifiers (the attribute name) and a handler call (the value).

use crate::dom::events::ListenerOptions;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static EVENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_:-]*$").expect("valid event name pattern"));

static HANDLER_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*(?:\((.*)\))?\s*$")
        .expect("valid handler call pattern")
});

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[\w$]+)*$").expect("valid identifier pattern")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Only fire when the bound element itself is the event target
    pub self_only: bool,
    pub prevent: bool,
    pub stop: bool,
    pub stop_immediate: bool,
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
}

impl Modifiers {
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            capture: self.capture,
            once: self.once,
            passive: self.passive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventName {
    pub event: String,
    pub modifiers: Modifiers,
}

/// Parse `click.prevent.stop` (the attribute name without its prefix)
///
/// Modifier names are matched case-insensitively since HTML parsing lowercases
/// attribute names. Unknown modifiers are logged and ignored.
pub fn parse_event_name(name: &str) -> Result<EventName> {
    let mut parts = name.split('.');
    let event = parts.next().unwrap_or_default().to_ascii_lowercase();

    if !EVENT_NAME.is_match(&event) {
        return Err(Error::directive(format!("Invalid event name '{}'", name)));
    }

    let mut modifiers = Modifiers::default();
    for modifier in parts {
        match modifier.to_ascii_lowercase().as_str() {
            "self" => modifiers.self_only = true,
            "prevent" => modifiers.prevent = true,
            "stop" => modifiers.stop = true,
            "stopimmediate" => modifiers.stop_immediate = true,
            "capture" => modifiers.capture = true,
            "once" => modifiers.once = true,
            "passive" => modifiers.passive = true,
            other => log::warn!("Ignoring unknown modifier '{}' on '{}'", other, name),
        }
    }

    Ok(EventName { event, modifiers })
}

/// Literal or identifier argument of a handler call
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bool(bool),
    Number(f64),
    Str(String),
    /// Resolved against the local context when the handler fires
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    pub name: String,
    pub args: Vec<Arg>,
}

/// Parse `name`, `name()` or `name(arg, ...)`
pub fn parse_handler_call(expr: &str) -> Result<HandlerCall> {
    let caps = HANDLER_CALL
        .captures(expr)
        .ok_or_else(|| Error::directive(format!("Malformed handler expression '{}'", expr)))?;

    let name = caps[1].to_string();
    let args = match caps.get(2) {
        Some(list) if !list.as_str().trim().is_empty() => split_args(list.as_str())?
            .iter()
            .map(|raw| parse_arg(raw))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.with_context(format!("in handler expression '{}'", expr)))?,
        _ => Vec::new(),
    };

    Ok(HandlerCall { name, args })
}

/// Split on top-level commas, honouring quotes and backslash escapes
fn split_args(list: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in list.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => {
                current.push(c);
                escaped = true;
            }
            (Some(q), c) if c == q => {
                current.push(c);
                quote = None;
            }
            (None, '\'' | '"') => {
                current.push(c);
                quote = Some(c);
            }
            (None, ',') => args.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(Error::directive(format!("Unterminated string in '{}'", list)));
    }
    args.push(current);
    Ok(args)
}

fn parse_arg(raw: &str) -> Result<Arg> {
    let arg = raw.trim();

    match arg {
        "" => return Err(Error::directive("Empty argument")),
        "true" => return Ok(Arg::Bool(true)),
        "false" => return Ok(Arg::Bool(false)),
        _ => {}
    }

    if let Some(quote) = arg.chars().next().filter(|c| *c == '\'' || *c == '"') {
        if arg.len() < 2 || !arg.ends_with(quote) {
            return Err(Error::directive(format!("Malformed string argument {}", arg)));
        }
        return Ok(Arg::Str(unescape(&arg[1..arg.len() - 1])));
    }

    let numeric_start = arg
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric_start {
        return arg
            .parse::<f64>()
            .map(Arg::Number)
            .map_err(|_| Error::directive(format!("Malformed number argument '{}'", arg)));
    }

    if IDENTIFIER.is_match(arg) {
        return Ok(Arg::Ident(arg.to_string()));
    }

    Err(Error::directive(format!("Unsupported argument '{}'", arg)))
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_with_modifiers() {
        let parsed = parse_event_name("click.prevent.once").unwrap();
        assert_eq!(parsed.event, "click");
        assert!(parsed.modifiers.prevent);
        assert!(parsed.modifiers.once);
        assert!(!parsed.modifiers.stop);
        assert!(parsed.modifiers.listener_options().once);
    }

    #[test]
    fn test_modifiers_are_case_insensitive() {
        let parsed = parse_event_name("click.stopImmediate").unwrap();
        assert!(parsed.modifiers.stop_immediate);
        let lowered = parse_event_name("click.stopimmediate").unwrap();
        assert_eq!(parsed, lowered);
    }

    #[test]
    fn test_unknown_modifier_is_ignored() {
        let parsed = parse_event_name("keyup.enter").unwrap();
        assert_eq!(parsed.modifiers, Modifiers::default());
    }

    #[test]
    fn test_invalid_event_name() {
        assert!(parse_event_name("").is_err());
        assert!(parse_event_name(".prevent").is_err());
        assert!(parse_event_name("cl ick").is_err());
    }

    #[test]
    fn test_bare_name_and_empty_call() {
        assert_eq!(parse_handler_call("save").unwrap().args, vec![]);
        let call = parse_handler_call(" save() ").unwrap();
        assert_eq!(call.name, "save");
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_argument_grammar() {
        let call =
            parse_handler_call(r#"pick(true, -2.5, 'a, b', "it\"s", item.id, false)"#).unwrap();
        assert_eq!(call.name, "pick");
        assert_eq!(
            call.args,
            vec![
                Arg::Bool(true),
                Arg::Number(-2.5),
                Arg::Str("a, b".to_string()),
                Arg::Str("it\"s".to_string()),
                Arg::Ident("item.id".to_string()),
                Arg::Bool(false),
            ]
        );
    }

    #[test]
    fn test_dotted_handler_name() {
        assert_eq!(parse_handler_call("actions.save(1)").unwrap().name, "actions.save");
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(parse_handler_call("save(").is_err());
        assert!(parse_handler_call("1save()").is_err());
        assert!(parse_handler_call("save(1,)").is_err());
        assert!(parse_handler_call("save('open)").is_err());
        assert!(parse_handler_call("save(a + b)").is_err());
        assert!(parse_handler_call("save(1x)").is_err());
    }
}
