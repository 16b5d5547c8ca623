//! Template rendering: tokenizer, filters, substitution and named templates

use crate::dom::{Document, NodeId};
use crate::error::{Error, Result};
use indexmap::IndexMap;

pub mod context;
pub mod filters;
pub mod lexer;
pub mod renderer;

pub use context::{ContextId, ContextTable};
pub use filters::{FilterRegistry, Priority, OUTPUT, TOKEN};
pub use lexer::{Flag, Lexer, Token, TokenCache, TokenKind};
pub use renderer::{Renderer, Resolved};

/// `type` attribute of script elements holding template text
pub const TEMPLATE_SCRIPT_TYPE: &str = "text/template";

/// Attribute naming a template script
pub const TEMPLATE_NAME_ATTR: &str = "data-template";

/// Named template texts
#[derive(Debug, Default, Clone)]
pub struct TemplateRegistry {
    templates: IndexMap<String, String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, text: impl Into<String>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("Template name cannot be empty"));
        }
        if self.templates.insert(name.to_string(), text.into()).is_some() {
            log::debug!("Replaced template '{}'", name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.templates.shift_remove(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }

    /// Register every template script in `document`, returning how many were found
    pub fn load_from(&mut self, document: &Document) -> usize {
        let mut loaded = 0;
        for (name, _, text) in template_scripts(document) {
            self.templates.insert(name, text);
            loaded += 1;
        }
        log::debug!("Loaded {} template(s) from document", loaded);
        loaded
    }
}

/// The template script called `name`, with its text
pub fn find_template_script(document: &Document, name: &str) -> Option<(NodeId, String)> {
    template_scripts(document)
        .into_iter()
        .find(|(n, _, _)| n == name)
        .map(|(_, node, text)| (node, text))
}

fn template_scripts(document: &Document) -> Vec<(String, NodeId, String)> {
    document
        .descendants(document.root())
        .into_iter()
        .filter(|&node| {
            document.tag(node) == Some("script")
                && document.attr(node, "type") == Some(TEMPLATE_SCRIPT_TYPE)
        })
        .filter_map(|node| {
            let name = document.attr(node, TEMPLATE_NAME_ATTR)?.trim();
            if name.is_empty() {
                return None;
            }
            let text = document.text_content(node).trim().to_string();
            Some((name.to_string(), node, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <script type="text/template" data-template="greeting">
            <p>Hello [name]</p>
        </script>
        <script type="text/javascript" data-template="ignored">var x = 1;</script>
        <script type="text/template" data-template="list"><ul>[items]<li>[_value]</li>[/items]</ul></script>
    </body></html>"#;

    #[test]
    fn test_loads_template_scripts_only() {
        let doc = Document::parse(PAGE).unwrap();
        let mut registry = TemplateRegistry::new();
        assert_eq!(registry.load_from(&doc), 2);
        assert_eq!(registry.get("greeting"), Some("<p>Hello [name]</p>"));
        assert!(!registry.contains("ignored"));
        assert_eq!(registry.names(), vec!["greeting", "list"]);
    }

    #[test]
    fn test_script_text_is_not_parsed_as_markup() {
        let doc = Document::parse(PAGE).unwrap();
        let (_, text) = find_template_script(&doc, "list").unwrap();
        assert_eq!(text, "<ul>[items]<li>[_value]</li>[/items]</ul>");
    }

    #[test]
    fn test_rejects_blank_names() {
        let mut registry = TemplateRegistry::new();
        assert!(registry.register(" ", "x").is_err());
        registry.register("a", "x").unwrap();
        registry.register("a", "y").unwrap();
        assert_eq!(registry.get("a"), Some("y"));
        assert_eq!(registry.len(), 1);
    }
}
