//! Substitution engine
//!
//! Walks cached tokens and produces markup. An opening token with a matching
//! close token forms a block whose meaning depends on what its name resolves
//! to: a flag renders the block conditionally, a collection renders it once per
//! entry, anything else is printed in place of the whole block.

use super::context::{ContextId, ContextTable};
use super::filters::{self, FilterRegistry, OUTPUT, TOKEN};
use super::lexer::{Flag, Token, TokenCache, TokenKind};
use crate::error::ErrorChain;
use crate::utils::object;
use crate::value::{Object, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;

static LEADING_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([A-Za-z][A-Za-z0-9-]*)([^>]*)>").expect("valid leading tag pattern"));

/// One attribute inside an opening tag; quoted values are consumed whole
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'=/>]+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?"#)
        .expect("valid attribute pattern")
});

/// Outcome of resolving a token name
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Conditional block
    Flag(bool),
    /// Iteration block
    Collection(Object),
    /// Printed as text
    Scalar(Value),
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Resolved::Flag(b),
            Value::Object(o) => Resolved::Collection(o),
            other => Resolved::Scalar(other),
        }
    }
}

impl Resolved {
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Flag(b) => Value::Bool(b),
            Resolved::Collection(o) => Value::Object(o),
            Resolved::Scalar(v) => v,
        }
    }
}

/// Template renderer
pub struct Renderer<'a> {
    tokens: &'a TokenCache,
    filters: &'a RefCell<FilterRegistry>,
    contexts: &'a RefCell<ContextTable>,
    context_attr: &'a str,
    allocated: Vec<ContextId>,
}

impl<'a> Renderer<'a> {
    pub fn new(
        tokens: &'a TokenCache,
        filters: &'a RefCell<FilterRegistry>,
        contexts: &'a RefCell<ContextTable>,
        context_attr: &'a str,
    ) -> Self {
        Self {
            tokens,
            filters,
            contexts,
            context_attr,
            allocated: Vec::new(),
        }
    }

    /// Context identifiers allocated by this renderer so far
    pub fn allocated(&self) -> &[ContextId] {
        &self.allocated
    }

    pub fn into_allocated(self) -> Vec<ContextId> {
        self.allocated
    }

    /// Render `template` against `data`
    pub fn render(&mut self, template: &str, data: &Value) -> String {
        let tokens = self.tokens.tokens(template);
        let mut output = String::with_capacity(template.len());
        let mut cursor = 0;

        while cursor < tokens.len() {
            let token = &tokens[cursor];

            if token.kind == TokenKind::Static {
                output.push_str(&token.text);
                cursor += 1;
                continue;
            }

            if token.flag == Flag::Close {
                log::debug!("Skipping unmatched close token '{}'", token.text);
                cursor += 1;
                continue;
            }

            let resolved = self.resolve(&token.text, data, template);

            let Some(close) = find_close(&tokens, cursor) else {
                self.push_scalar(&mut output, resolved.into_value());
                cursor += 1;
                continue;
            };

            let inner = &template[token.span.end..tokens[close].span.start];
            match resolved {
                Resolved::Flag(true) => {
                    let rendered = self.render(inner, data);
                    output.push_str(&rendered);
                }
                Resolved::Flag(false) => {}
                Resolved::Collection(collection) => {
                    self.render_iteration(&mut output, inner, &collection);
                }
                Resolved::Scalar(value) => self.push_scalar(&mut output, value),
            }
            cursor = close + 1;
        }

        output
    }

    fn resolve(&self, name: &str, data: &Value, template: &str) -> Resolved {
        let chain = self.filters.borrow().chain(TOKEN);
        let extra = [data.clone(), Value::from(template)];

        match filters::fold(&chain, Value::from(name), &extra) {
            Ok(value) => Resolved::from(value),
            Err(e) => {
                log::warn!(
                    "Failed to resolve token '{}': {}",
                    name,
                    ErrorChain::new(&e).format_for_log()
                );
                Resolved::Scalar(Value::String(String::new()))
            }
        }
    }

    fn push_scalar(&self, output: &mut String, value: Value) {
        let chain = self.filters.borrow().chain(OUTPUT);
        match filters::fold(&chain, value, &[]) {
            Ok(value) => output.push_str(&value.to_text()),
            Err(e) => log::warn!(
                "Output filter failed: {}",
                ErrorChain::new(&e).format_for_log()
            ),
        }
    }

    fn render_iteration(&mut self, output: &mut String, inner: &str, collection: &Object) {
        for (key, value) in collection.entries() {
            let local = Object::new();
            object::shallow_merge(&local, &value);
            local.insert("_key", key);
            local.insert("_value", value);
            let local = Value::Object(local);

            let rendered = self.render(inner, &local);
            let fragment = rendered.trim();

            let id = self.contexts.borrow_mut().allocate(local);
            self.allocated.push(id);
            output.push_str(&stamp_leading_tag(fragment, self.context_attr, id));
        }
    }
}

/// Index of the close token matching the open token at `open`
///
/// Same-named opens in between raise the depth so nested blocks of one name
/// pair up correctly.
fn find_close(tokens: &[Token], open: usize) -> Option<usize> {
    let name = &tokens[open].text;
    let mut depth = 0usize;

    for (offset, token) in tokens[open + 1..].iter().enumerate() {
        if token.kind != TokenKind::Directive || &token.text != name {
            continue;
        }
        if token.is_open() {
            depth += 1;
        } else if depth == 0 {
            return Some(open + 1 + offset);
        } else {
            depth -= 1;
        }
    }

    None
}

/// Add `attr="id"` to the fragment's leading opening tag, if it has one
fn stamp_leading_tag(fragment: &str, attr: &str, id: ContextId) -> String {
    let Some(caps) = LEADING_TAG.captures(fragment) else {
        return fragment.to_string();
    };
    let (Some(tag), Some(rest)) = (caps.get(1), caps.get(2)) else {
        return fragment.to_string();
    };

    // An inner iteration already claimed this element
    if has_attribute(rest.as_str(), attr) {
        return fragment.to_string();
    }

    let at = tag.end();
    format!(
        "{} {}=\"{}\"{}",
        &fragment[..at],
        attr,
        id,
        &fragment[at..]
    )
}

fn has_attribute(attrs: &str, name: &str) -> bool {
    ATTRIBUTE
        .captures_iter(attrs)
        .filter_map(|caps| caps.get(1))
        .any(|m| m.as_str().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSettings;
    use crate::views::lexer::Lexer;
    use serde_json::json;

    struct Fixture {
        tokens: TokenCache,
        filters: RefCell<FilterRegistry>,
        contexts: RefCell<ContextTable>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tokens: TokenCache::new(Lexer::new(&TemplateSettings::default()).unwrap()),
                filters: RefCell::new(FilterRegistry::with_builtins()),
                contexts: RefCell::new(ContextTable::new()),
            }
        }

        fn render(&self, template: &str, data: serde_json::Value) -> String {
            Renderer::new(&self.tokens, &self.filters, &self.contexts, "data-ctx")
                .render(template, &Value::from(data))
        }
    }

    #[test]
    fn test_inline_interpolation() {
        let f = Fixture::new();
        let out = f.render("Hello [user.name]!", json!({"user": {"name": "Ada"}}));
        assert_eq!(out, "Hello Ada!");
    }

    #[test]
    fn test_missing_path_renders_empty() {
        let f = Fixture::new();
        assert_eq!(f.render("<p>[a.b.c]</p>", json!({})), "<p></p>");
    }

    #[test]
    fn test_conditional_block() {
        let f = Fixture::new();
        assert_eq!(f.render("[if.flag]yes[/if.flag]", json!({"flag": true})), "yes");
        assert_eq!(f.render("[if.flag]yes[/if.flag]", json!({"flag": false})), "");
        assert_eq!(f.render("[flag]on[/flag]", json!({"flag": true})), "on");
    }

    #[test]
    fn test_scalar_block_prints_value() {
        let f = Fixture::new();
        assert_eq!(f.render("[title]ignored[/title]", json!({"title": "T"})), "T");
    }

    #[test]
    fn test_iteration_tags_each_entry() {
        let f = Fixture::new();
        let out = f.render(
            "[items]<li>[_value.name]</li>[/items]",
            json!({"items": {"a": {"name": "X"}, "b": {"name": "Y"}}}),
        );
        assert_eq!(
            out,
            r#"<li data-ctx="1">X</li><li data-ctx="2">Y</li>"#
        );

        let contexts = f.contexts.borrow();
        let first = contexts.get("1".parse().unwrap()).unwrap();
        assert_eq!(object::get(&first, "_key").unwrap().to_text(), "a");
        assert_eq!(object::get(&first, "name").unwrap().to_text(), "X");
    }

    #[test]
    fn test_iteration_without_leading_tag_is_not_stamped() {
        let f = Fixture::new();
        let out = f.render("[tags] [_value] [/tags]", json!({"tags": ["x", "y"]}));
        assert_eq!(out, "xy");
        assert_eq!(f.contexts.borrow().len(), 2);
    }

    #[test]
    fn test_nested_same_name_blocks_pair_by_depth() {
        let f = Fixture::new();
        let out = f.render(
            "[if.a]<p>[if.a]inner[/if.a]</p>[/if.a]",
            json!({"a": true}),
        );
        assert_eq!(out, "<p>inner</p>");
    }

    #[test]
    fn test_inline_use_before_block_of_same_name() {
        let f = Fixture::new();
        let out = f.render("[n] [n]x[/n]", json!({"n": 3}));
        assert_eq!(out, "3 3");
    }

    #[test]
    fn test_stray_close_is_skipped() {
        let f = Fixture::new();
        assert_eq!(f.render("a[/b]c", json!({})), "ac");
    }

    #[test]
    fn test_failing_filter_degrades_to_empty() {
        let f = Fixture::new();
        f.filters
            .borrow_mut()
            .register(
                TOKEN,
                |p, _| match p.as_str() {
                    Some("boom") => Err(crate::Error::template("boom")),
                    _ => Ok(Some(p)),
                },
                10,
            )
            .unwrap();
        assert_eq!(f.render("<i>[boom]</i>", json!({"boom": "boom"})), "<i></i>");
    }

    #[test]
    fn test_render_is_idempotent() {
        let f = Fixture::new();
        let data = json!({"title": "T", "on": true});
        let a = f.render("<h1>[title]</h1>[on]<b>!</b>[/on]", data.clone());
        let b = f.render("<h1>[title]</h1>[on]<b>!</b>[/on]", data);
        assert_eq!(a, b);
    }

    #[test]
    fn test_stamp_skips_already_stamped_tag() {
        let id: ContextId = "9".parse().unwrap();
        assert_eq!(
            stamp_leading_tag(r#"<td data-ctx="3">x</td>"#, "data-ctx", id),
            r#"<td data-ctx="3">x</td>"#
        );
        assert_eq!(
            stamp_leading_tag("<br/>", "data-ctx", id),
            r#"<br data-ctx="9"/>"#
        );
    }

    #[test]
    fn test_stamp_matches_attribute_names_only() {
        let id: ContextId = "4".parse().unwrap();
        assert_eq!(
            stamp_leading_tag(r#"<p title="data-ctx=1">x</p>"#, "data-ctx", id),
            r#"<p data-ctx="4" title="data-ctx=1">x</p>"#
        );
        assert_eq!(
            stamp_leading_tag(r#"<p data-ctx-extra="1">x</p>"#, "data-ctx", id),
            r#"<p data-ctx="4" data-ctx-extra="1">x</p>"#
        );
        assert_eq!(
            stamp_leading_tag(r#"<p class='a' data-ctx='2'>x</p>"#, "data-ctx", id),
            r#"<p class='a' data-ctx='2'>x</p>"#
        );
    }

    #[test]
    fn test_outer_entry_stamped_despite_lookalike_value() {
        let f = Fixture::new();
        let out = f.render(
            r#"[rows]<tr title="data-ctx=">[_value]</tr>[/rows]"#,
            json!({"rows": ["a"]}),
        );
        assert_eq!(out, r#"<tr data-ctx="1" title="data-ctx=">a</tr>"#);
        assert_eq!(f.contexts.borrow().len(), 1);
    }
}
