//! Live document tree
//!
//! An arena of element, text and comment nodes. Node handles are
//! generation-checked, so a handle to a removed node never aliases a node
//! created later. Markup is parsed with html5ever and copied into the arena;
//! every node of one document lives in the same arena, which lets the
//! reconciler move freshly parsed subtrees into the live tree.

pub mod events;
pub mod reconcile;

use crate::error::{OptionExt, Result};
use self::events::{Listener, ListenerOptions};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, ParseOpts};
use indexmap::IndexMap;
use indextree::Arena;
use markup5ever::{LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, NodeData as DomData, RcDom};

pub use indextree::NodeId;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements serialized without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose text children are serialized without escaping
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug)]
pub enum NodeData {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: IndexMap<String, String>,
    listeners: IndexMap<String, Listener>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// Same node kind with the same tag name
pub fn same_kind(a: &NodeData, b: &NodeData) -> bool {
    match (a, b) {
        (NodeData::Element(x), NodeData::Element(y)) => x.tag == y.tag,
        (NodeData::Text(_), NodeData::Text(_))
        | (NodeData::Comment(_), NodeData::Comment(_))
        | (NodeData::Document, NodeData::Document) => true,
        _ => false,
    }
}

pub struct Document {
    arena: Arena<NodeData>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData::Document);
        Self { arena, root }
    }

    /// Parse a complete HTML page
    pub fn parse(html: &str) -> Result<Self> {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);

        let mut document = Self::new();
        let root = document.root;
        for child in dom.document.children.borrow().iter() {
            document.import(child, root)?;
        }

        log::debug!("Parsed document with {} nodes", document.arena.count());
        Ok(document)
    }

    /// Parse `html` as the content of a `<tag>` element
    ///
    /// Returns a new detached `<tag>` element holding the parsed nodes.
    pub fn parse_fragment(&mut self, html: &str, tag: &str) -> Result<NodeId> {
        let context = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag),
        );
        let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![]).one(html);

        let wrapper = self.create_element(tag);
        // The fragment parser places content under a synthetic <html> element
        let document_children = dom.document.children.borrow();
        for html_root in document_children.iter() {
            for child in html_root.children.borrow().iter() {
                self.import(child, wrapper)?;
            }
        }

        Ok(wrapper)
    }

    fn import(&mut self, handle: &Handle, parent: NodeId) -> Result<()> {
        let node = match &handle.data {
            DomData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => {
                let mut element = Element::new(&*name.local);
                for attr in attrs.borrow().iter() {
                    element
                        .attrs
                        .insert(attr.name.local.to_string(), attr.value.to_string());
                }
                let id = self.arena.new_node(NodeData::Element(element));
                parent.checked_append(id, &mut self.arena)?;

                if let Some(contents) = template_contents.borrow().as_ref() {
                    for child in contents.children.borrow().iter() {
                        self.import(child, id)?;
                    }
                }
                id
            }
            DomData::Text { contents } => {
                let id = self
                    .arena
                    .new_node(NodeData::Text(contents.borrow().to_string()));
                parent.checked_append(id, &mut self.arena)?;
                return Ok(());
            }
            DomData::Comment { contents } => {
                let id = self.arena.new_node(NodeData::Comment(contents.to_string()));
                parent.checked_append(id, &mut self.arena)?;
                return Ok(());
            }
            DomData::Document => parent,
            DomData::Doctype { .. } | DomData::ProcessingInstruction { .. } => return Ok(()),
        };

        for child in handle.children.borrow().iter() {
            self.import(child, node)?;
        }
        Ok(())
    }

    /// The document node every attached node descends from
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// First `<body>` element, if the document has one
    pub fn body(&self) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.tag(id) == Some("body"))
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.arena.new_node(NodeData::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena.new_node(NodeData::Text(text.to_string()))
    }

    /// Whether `id` still refers to a node of this document
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some() && !id.is_removed(&self.arena)
    }

    /// Whether `id` is reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(id) && id.ancestors(&self.arena).any(|a| a == self.root)
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        if !self.contains(id) {
            return None;
        }
        self.arena.get(id).map(|node| node.get())
    }

    fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        if !self.contains(id) {
            return None;
        }
        self.arena.get_mut(id).map(|node| node.get_mut())
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.data_mut(id)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attrs.get(name).map(String::as_str)
    }

    /// Attribute names and values in document order
    pub fn attrs(&self, id: NodeId) -> Vec<(String, String)> {
        self.element(id)
            .map(|e| {
                e.attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let element = self
            .element_mut(id)
            .context(format!("cannot set '{}' on a non-element node", name))?;
        element.attrs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)?.attrs.shift_remove(name)
    }

    /// Text of a text or comment node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(text) | NodeData::Comment(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        match self.data_mut(id) {
            Some(NodeData::Text(current)) | Some(NodeData::Comment(current)) => {
                *current = text.to_string();
                Ok(())
            }
            _ => Err(crate::Error::dom("set_text on a node without text")),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        if !self.contains(id) {
            return None;
        }
        self.arena.get(id)?.parent()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        id.children(&self.arena).collect()
    }

    /// `id` followed by its ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        id.ancestors(&self.arena).collect()
    }

    /// `id` and all of its descendants in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        id.descendants(&self.arena).collect()
    }

    /// First element under `scope` (inclusive) whose `name` attribute equals `value`
    pub fn find_by_attr(&self, scope: NodeId, name: &str, value: &str) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&id| self.attr(id, name) == Some(value))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        child.detach(&mut self.arena);
        parent.checked_append(child, &mut self.arena)?;
        Ok(())
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<()> {
        node.detach(&mut self.arena);
        reference.checked_insert_after(node, &mut self.arena)?;
        Ok(())
    }

    /// Put `new` where `old` is and delete `old` with its subtree
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        new.detach(&mut self.arena);
        old.checked_insert_before(new, &mut self.arena)?;
        self.remove(old);
        Ok(())
    }

    /// Delete `id` and its subtree from the arena
    pub fn remove(&mut self, id: NodeId) {
        if self.contains(id) && id != self.root {
            id.remove_subtree(&mut self.arena);
        }
    }

    /// Number of live nodes in the arena
    pub fn node_count(&self) -> usize {
        self.arena.iter().filter(|n| !n.is_removed()).count()
    }

    /// Concatenated text of every text node under `id`
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match self.data(n)? {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_html(child, false, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, false, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, raw_text: bool, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Document) => {
                for child in self.children(id) {
                    self.write_html(child, false, out);
                }
            }
            Some(NodeData::Text(text)) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
            Some(NodeData::Comment(text)) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Some(NodeData::Element(element)) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }

                let raw = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                for child in self.children(id) {
                    self.write_html(child, raw, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
            None => {}
        }
    }

    /// Install `listener` for `event_type`, returning the one it replaced
    pub fn set_listener(
        &mut self,
        id: NodeId,
        event_type: &str,
        listener: Listener,
    ) -> Result<Option<Listener>> {
        let element = self
            .element_mut(id)
            .context(format!("cannot listen for '{}' on a non-element", event_type))?;
        Ok(element.listeners.insert(event_type.to_string(), listener))
    }

    pub fn remove_listener(&mut self, id: NodeId, event_type: &str) -> Option<Listener> {
        self.element_mut(id)?.listeners.shift_remove(event_type)
    }

    pub fn listener(&self, id: NodeId, event_type: &str) -> Option<Listener> {
        self.element(id)?.listeners.get(event_type).cloned()
    }

    pub fn listener_options(&self, id: NodeId, event_type: &str) -> Option<ListenerOptions> {
        self.element(id)?.listeners.get(event_type).map(|l| l.options)
    }

    /// Event types with an active listener on `id`
    pub fn listened_events(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|e| e.listeners.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
