//! Event and reference directives
//!
//! Binding runs in two passes over a mounted subtree. `scan` is pure: it
//! walks the tree once and reports every directive attribute it finds.
//! `Binder::bind` then registers references, attaches listeners and strips
//! the consumed attributes so they never show up in a later diff.

pub mod parse;

pub use parse::{parse_event_name, parse_handler_call, Arg, EventName, HandlerCall, Modifiers};

use crate::config::DirectiveSettings;
use crate::dom::events::{Event, Listener};
use crate::dom::{Document, NodeId};
use crate::error::{Error, ErrorChain, OptionExt, Result};
use crate::reactive::{Reactive, Wrapped};
use crate::utils::object;
use crate::value::{Callback, Object, Value};
use crate::views::context::{ContextId, ContextTable};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A directive attribute found on an element
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Reference {
        node: NodeId,
        attr: String,
        name: String,
    },
    Event {
        node: NodeId,
        attr: String,
        event: EventName,
        call: HandlerCall,
    },
    /// Directive attribute that failed to parse
    Invalid {
        node: NodeId,
        attr: String,
        reason: String,
    },
}

impl Directive {
    pub fn node(&self) -> NodeId {
        match self {
            Directive::Reference { node, .. }
            | Directive::Event { node, .. }
            | Directive::Invalid { node, .. } => *node,
        }
    }

    pub fn attr(&self) -> &str {
        match self {
            Directive::Reference { attr, .. }
            | Directive::Event { attr, .. }
            | Directive::Invalid { attr, .. } => attr,
        }
    }
}

/// Collect every directive under `root` (inclusive) in document order
pub fn scan(document: &Document, root: NodeId, settings: &DirectiveSettings) -> Vec<Directive> {
    let mut found = Vec::new();

    for node in document.descendants(root) {
        for (attr, value) in document.attrs(node) {
            if attr == settings.ref_attr {
                let name = value.trim();
                found.push(if name.is_empty() {
                    Directive::Invalid {
                        node,
                        attr,
                        reason: "empty reference name".to_string(),
                    }
                } else {
                    Directive::Reference {
                        node,
                        name: name.to_string(),
                        attr,
                    }
                });
            } else if settings.is_event_attr(&attr) {
                let parsed = parse_event_name(&attr[settings.event_prefix.len()..])
                    .and_then(|event| Ok((event, parse_handler_call(&value)?)));
                found.push(match parsed {
                    Ok((event, call)) => Directive::Event {
                        node,
                        attr,
                        event,
                        call,
                    },
                    Err(e) => Directive::Invalid {
                        node,
                        attr,
                        reason: ErrorChain::new(&e).format_for_log(),
                    },
                });
            }
        }
    }

    found
}

/// What a callback sees when its event fires
///
/// Reads look in the nearest iteration context first, then in the root data.
/// Writes go through the reactive root state and therefore re-render.
#[derive(Clone)]
pub struct Scope {
    state: Reactive,
    local: Option<Value>,
    element: NodeId,
}

impl Scope {
    pub fn new(state: Reactive, local: Option<Value>, element: NodeId) -> Self {
        Self {
            state,
            local,
            element,
        }
    }

    pub fn lookup(&self, path: &str) -> Option<Value> {
        self.local
            .as_ref()
            .and_then(|local| object::get(local, path))
            .or_else(|| self.state.get_path(path).map(Wrapped::into_value))
    }

    /// Value at `path`, or `Null`
    pub fn get(&self, path: &str) -> Value {
        self.lookup(path).unwrap_or_default()
    }

    /// Write into the root state, notifying on change
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        self.state.set_path(path, value)
    }

    pub fn state(&self) -> &Reactive {
        &self.state
    }

    pub fn local(&self) -> Option<&Value> {
        self.local.as_ref()
    }

    /// The element carrying the directive
    pub fn element(&self) -> NodeId {
        self.element
    }

    fn callback(&self, name: &str) -> Option<Callback> {
        let from_local = self
            .local
            .as_ref()
            .and_then(|local| object::get(local, name))
            .and_then(|v| v.as_callback().cloned());

        from_local.or_else(|| {
            self.state
                .get_path(name)
                .and_then(|w| w.into_value().as_callback().cloned())
        })
    }

    fn resolve_arg(&self, arg: &Arg) -> Value {
        match arg {
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Number(n) => Value::Number(*n),
            Arg::Str(s) => Value::String(s.clone()),
            Arg::Ident(path) => {
                let resolved = match &self.local {
                    Some(local) => object::get(local, path),
                    None => self.state.get_path(path).map(Wrapped::into_value),
                };
                resolved.unwrap_or_else(|| Value::String(path.clone()))
            }
        }
    }
}

/// Counts from one bind pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindStats {
    pub references: usize,
    pub events: usize,
    pub skipped: usize,
}

struct Env {
    document: Weak<RefCell<Document>>,
    contexts: Rc<RefCell<ContextTable>>,
    state: Reactive,
    refs: Object,
    directives: DirectiveSettings,
    context_attr: String,
}

/// Attaches directives of one mounted instance
pub struct Binder {
    env: Rc<Env>,
}

impl Binder {
    pub fn new(
        document: &Rc<RefCell<Document>>,
        contexts: Rc<RefCell<ContextTable>>,
        state: Reactive,
        directives: DirectiveSettings,
        context_attr: impl Into<String>,
    ) -> Self {
        let refs = match state.get_raw("$refs") {
            Some(Value::Object(refs)) => refs,
            _ => {
                let refs = Object::new();
                // Raw insert: registering references must not trigger a render
                state.target().insert("$refs", refs.clone());
                refs
            }
        };

        Self {
            env: Rc::new(Env {
                document: Rc::downgrade(document),
                contexts,
                state,
                refs,
                directives,
                context_attr: context_attr.into(),
            }),
        }
    }

    /// The `$refs` map references are registered into
    pub fn refs(&self) -> &Object {
        &self.env.refs
    }

    /// Register references and attach listeners for everything under `root`
    pub fn bind(&self, root: NodeId) -> Result<BindStats> {
        let document = self.env.document()?;
        let directives = scan(&document.borrow(), root, &self.env.directives);
        self.env.prune_refs(&document.borrow());

        let mut stats = BindStats::default();
        let (references, others): (Vec<_>, Vec<_>) = directives
            .into_iter()
            .partition(|d| matches!(d, Directive::Reference { .. }));

        for directive in references.into_iter().chain(others) {
            match directive {
                Directive::Reference { node, attr, name } => {
                    self.env.refs.insert(name, Value::Node(node));
                    document.borrow_mut().remove_attr(node, &attr);
                    stats.references += 1;
                }
                Directive::Event {
                    node,
                    attr,
                    event,
                    call,
                } => match self.attach(&document, node, &event, &call) {
                    Ok(()) => {
                        document.borrow_mut().remove_attr(node, &attr);
                        stats.events += 1;
                    }
                    Err(e) => {
                        // Left in place so a later pass can bind it once the handler exists
                        log::warn!("Skipping {}: {}", attr, ErrorChain::new(&e).format_for_log());
                        stats.skipped += 1;
                    }
                },
                Directive::Invalid { node, attr, reason } => {
                    log::warn!("Dropping malformed directive {}: {}", attr, reason);
                    document.borrow_mut().remove_attr(node, &attr);
                    stats.skipped += 1;
                }
            }
        }

        log::debug!("Bound {:?}", stats);
        Ok(stats)
    }

    fn attach(
        &self,
        document: &Rc<RefCell<Document>>,
        node: NodeId,
        event: &EventName,
        call: &HandlerCall,
    ) -> Result<()> {
        let scope = self.env.scope(&document.borrow(), node);
        if scope.callback(&call.name).is_none() {
            return Err(Error::directive(format!(
                "'{}' is not a callable in scope",
                call.name
            )));
        }

        let env = Rc::downgrade(&self.env);
        let modifiers = event.modifiers;
        let call = call.clone();
        let listener = Listener::new(modifiers.listener_options(), move |ev: &mut Event| {
            let Some(env) = env.upgrade() else {
                return;
            };
            if modifiers.self_only && ev.target != node {
                return;
            }
            if modifiers.prevent {
                ev.prevent_default();
            }
            if modifiers.stop {
                ev.stop_propagation();
            }
            if modifiers.stop_immediate {
                ev.stop_immediate_propagation();
            }
            if let Err(e) = env.fire(node, &call, ev) {
                log::warn!(
                    "Handler '{}' for '{}' failed: {}",
                    call.name,
                    ev.event_type,
                    ErrorChain::new(&e).format_for_log()
                );
            }
        });

        document
            .borrow_mut()
            .set_listener(node, &event.event, listener)?;
        Ok(())
    }
}

impl Env {
    fn document(&self) -> Result<Rc<RefCell<Document>>> {
        self.document.upgrade().context("document was dropped")
    }

    /// Nearest iteration context on `node` or its ancestors
    fn local_context(&self, document: &Document, node: NodeId) -> Option<Value> {
        let contexts = self.contexts.borrow();
        document.ancestors(node).into_iter().find_map(|id| {
            let raw = document.attr(id, &self.context_attr)?;
            let context_id: ContextId = raw.parse().ok()?;
            contexts.get(context_id)
        })
    }

    fn scope(&self, document: &Document, node: NodeId) -> Scope {
        Scope::new(
            self.state.clone(),
            self.local_context(document, node),
            node,
        )
    }

    /// Resolve context, callback and arguments again, then run the callback
    fn fire(&self, node: NodeId, call: &HandlerCall, event: &mut Event) -> Result<()> {
        let scope = {
            let document = self.document()?;
            let document = document.borrow();
            self.scope(&document, node)
        };

        let callback = scope
            .callback(&call.name)
            .ok_or_else(|| Error::directive(format!("'{}' is no longer callable", call.name)))?;
        let args: Vec<Value> = call.args.iter().map(|a| scope.resolve_arg(a)).collect();

        callback.call(&scope, event, &args)
    }

    /// Forget references whose element left the document
    fn prune_refs(&self, document: &Document) {
        for (name, value) in self.refs.entries() {
            if let Value::Node(node) = value {
                if !document.is_attached(node) {
                    self.refs.remove(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::events::dispatch;
    use crate::reactive::Observer;
    use std::cell::Cell;

    struct Fixture {
        document: Rc<RefCell<Document>>,
        container: NodeId,
        contexts: Rc<RefCell<ContextTable>>,
        state: Reactive,
        renders: Rc<Cell<usize>>,
    }

    fn fixture(markup: &str, data: Object) -> Fixture {
        let mut doc = Document::new();
        let root = doc.root();
        let container = doc.parse_fragment(markup, "div").unwrap();
        doc.append_child(root, container).unwrap();

        let renders = Rc::new(Cell::new(0));
        let counter = renders.clone();
        let observer = Observer::new(move || counter.set(counter.get() + 1), None);
        let state = observer.wrap_object(data, 0);

        Fixture {
            document: Rc::new(RefCell::new(doc)),
            container,
            contexts: Rc::new(RefCell::new(ContextTable::new())),
            state,
            renders,
        }
    }

    impl Fixture {
        fn binder(&self) -> Binder {
            Binder::new(
                &self.document,
                self.contexts.clone(),
                self.state.clone(),
                DirectiveSettings::default(),
                "data-ctx",
            )
        }

        fn first(&self, tag: &str) -> NodeId {
            let doc = self.document.borrow();
            doc.descendants(self.container)
                .into_iter()
                .find(|&n| doc.tag(n) == Some(tag))
                .unwrap()
        }
    }

    fn incrementer() -> Value {
        Value::function(|scope, _event, args| {
            let step = args.first().and_then(Value::as_f64).unwrap_or(1.0);
            let count = scope.get("count").as_f64().unwrap_or(0.0);
            scope.set("count", count + step)?;
            Ok(())
        })
    }

    #[test]
    fn test_scan_reports_directives_without_touching_tree() {
        let f = fixture(
            r##"<p #ref="title">t</p><button @click="go(1)" @keyup.bad="(">b</button>"##,
            Object::new(),
        );
        let doc = f.document.borrow();
        let found = scan(&doc, f.container, &DirectiveSettings::default());

        assert_eq!(found.len(), 3);
        assert!(matches!(&found[0], Directive::Reference { name, .. } if name == "title"));
        assert!(matches!(&found[1], Directive::Event { event, .. } if event.event == "click"));
        assert!(matches!(&found[2], Directive::Invalid { attr, .. } if attr == "@keyup.bad"));
        assert!(doc.attr(found[0].node(), "#ref").is_some());
    }

    #[test]
    fn test_click_invokes_callback_with_args() {
        let data: Object = [("count", Value::from(0)), ("inc", incrementer())]
            .into_iter()
            .collect();
        let f = fixture(r#"<button @click="inc(2)">+</button>"#, data);
        let stats = f.binder().bind(f.container).unwrap();
        assert_eq!(stats.events, 1);

        let button = f.first("button");
        assert!(f.document.borrow().attr(button, "@click").is_none());

        dispatch(&f.document, button, "click");
        assert_eq!(f.state.get_raw("count").unwrap().as_f64(), Some(2.0));
        assert_eq!(f.renders.get(), 1);
    }

    #[test]
    fn test_rebinding_replaces_listener() {
        let data: Object = [("count", Value::from(0)), ("inc", incrementer())]
            .into_iter()
            .collect();
        let f = fixture(r#"<button @click="inc">+</button>"#, data);
        let binder = f.binder();
        binder.bind(f.container).unwrap();

        let button = f.first("button");
        f.document
            .borrow_mut()
            .set_attr(button, "@click", "inc")
            .unwrap();
        binder.bind(f.container).unwrap();

        dispatch(&f.document, button, "click");
        assert_eq!(f.state.get_raw("count").unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn test_references_land_in_refs() {
        let f = fixture(r##"<input #ref="field">"##, Object::new());
        let binder = f.binder();
        let stats = binder.bind(f.container).unwrap();
        assert_eq!(stats.references, 1);

        let input = f.first("input");
        assert_eq!(binder.refs().get("field").unwrap().as_node(), Some(input));
        assert!(f.document.borrow().attr(input, "#ref").is_none());
        assert_eq!(f.renders.get(), 0);
    }

    #[test]
    fn test_missing_handler_is_skipped_and_kept() {
        let f = fixture(r#"<a @click="nowhere()">x</a>"#, Object::new());
        let stats = f.binder().bind(f.container).unwrap();
        assert_eq!(stats.skipped, 1);
        let a = f.first("a");
        assert_eq!(f.document.borrow().attr(a, "@click"), Some("nowhere()"));
    }

    #[test]
    fn test_local_context_resolves_identifiers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let pick = Value::function(move |_scope, _event, args| {
            sink.borrow_mut().push(args[0].to_text());
            Ok(())
        });
        let data: Object = [("pick", pick)].into_iter().collect();
        let f = fixture(r#"<li data-ctx="1"><b @click="pick(name)">x</b></li>"#, data);

        let local: Object = [("name", "Ada")].into_iter().collect();
        let id = f.contexts.borrow_mut().allocate(Value::Object(local));
        assert_eq!(id.get(), 1);

        f.binder().bind(f.container).unwrap();
        dispatch(&f.document, f.first("b"), "click");
        assert_eq!(*seen.borrow(), vec!["Ada"]);
    }

    #[test]
    fn test_self_modifier_ignores_bubbled_events() {
        let data: Object = [("count", Value::from(0)), ("inc", incrementer())]
            .into_iter()
            .collect();
        let f = fixture(r#"<div @click.self="inc"><span>x</span></div>"#, data);
        f.binder().bind(f.container).unwrap();

        dispatch(&f.document, f.first("span"), "click");
        assert_eq!(f.state.get_raw("count").unwrap().as_f64(), Some(0.0));

        dispatch(&f.document, f.first("div"), "click");
        assert_eq!(f.state.get_raw("count").unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn test_listener_options_follow_modifiers() {
        let data: Object = [("noop", Value::function(|_, _, _| Ok(())))]
            .into_iter()
            .collect();
        let f = fixture(r#"<a @click.capture.once="noop">x</a><b @scroll.passive="noop">y</b>"#, data);
        f.binder().bind(f.container).unwrap();

        let doc = f.document.borrow();
        let a = doc.listener_options(f.first("a"), "click").unwrap();
        assert!(a.capture && a.once && !a.passive);
        let b = doc.listener_options(f.first("b"), "scroll").unwrap();
        assert!(b.passive);
    }

    #[test]
    fn test_prevent_and_stop_modifiers() {
        let data: Object = [("noop", Value::function(|_, _, _| Ok(())))]
            .into_iter()
            .collect();
        let f = fixture(r#"<form @submit.prevent.stop="noop"><i>x</i></form>"#, data);
        f.binder().bind(f.container).unwrap();

        let event = dispatch(&f.document, f.first("form"), "submit");
        assert!(event.default_prevented());
        assert!(event.propagation_stopped());
    }

    #[test]
    fn test_stop_immediate_modifier_halts_dispatch() {
        let data: Object = [("count", Value::from(0)), ("inc", incrementer())]
            .into_iter()
            .collect();
        let f = fixture(
            r#"<div @click="inc(10)"><span @click.stopImmediate="inc">x</span></div>"#,
            data,
        );
        f.binder().bind(f.container).unwrap();

        let event = dispatch(&f.document, f.first("span"), "click");
        assert!(event.immediate_propagation_stopped());
        assert!(event.propagation_stopped());
        assert_eq!(f.state.get_raw("count").unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn test_unresolved_identifier_passes_as_text() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let pick = Value::function(move |_scope, _event, args| {
            sink.borrow_mut().extend(args.iter().map(Value::to_text));
            Ok(())
        });
        let data: Object = [("pick", pick), ("known", Value::from(7))]
            .into_iter()
            .collect();
        let f = fixture(r#"<b @click="pick(nothere, known)">x</b>"#, data);
        f.binder().bind(f.container).unwrap();

        dispatch(&f.document, f.first("b"), "click");
        assert_eq!(*seen.borrow(), vec!["nothere", "7"]);
    }
}
