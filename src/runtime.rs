//! Render orchestration
//!
//! A [`Runtime`] owns everything that used to be process-wide: settings, the
//! filter registry, the token cache, the iteration context table and the named
//! templates. It renders one-shot markup and mounts reactive instances into a
//! live document. Each [`Mounted`] instance runs the loop
//! mutation → render → reconcile → bind whenever its state changes.

use crate::binder::Binder;
use crate::config::Config;
use crate::dom::reconcile::{reconcile, Patch};
use crate::dom::{Document, NodeId};
use crate::error::{Error, ErrorChain, ErrorContext, OptionExt, Result};
use crate::reactive::{Observer, Reactive};
use crate::value::{Object, Value};
use crate::views::filters::{FilterRegistry, Priority};
use crate::views::lexer::{Lexer, Token, TokenCache};
use crate::views::{find_template_script, ContextId, ContextTable, Renderer, TemplateRegistry};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

/// Attribute naming the template a container element was mounted from
pub const MOUNT_ATTR: &str = "data-mount";

/// Shared rendering state with a create → mount → dispose lifecycle
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    config: Config,
    tokens: TokenCache,
    filters: RefCell<FilterRegistry>,
    contexts: Rc<RefCell<ContextTable>>,
    templates: RefCell<TemplateRegistry>,
    store: RefCell<Value>,
    /// Live mounts; each stays reactive until it or the runtime is disposed
    mounts: RefCell<Vec<Rc<MountInner>>>,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let lexer = Lexer::new(&config.template)?;

        log::debug!(
            "Created runtime with delimiters '{}' '{}'",
            config.template.open,
            config.template.close
        );

        Ok(Self {
            inner: Rc::new(RuntimeInner {
                tokens: TokenCache::new(lexer),
                filters: RefCell::new(FilterRegistry::with_builtins()),
                contexts: Rc::new(RefCell::new(ContextTable::new())),
                templates: RefCell::new(TemplateRegistry::new()),
                store: RefCell::new(Value::Object(Object::new())),
                mounts: RefCell::new(Vec::new()),
                config,
            }),
        })
    }

    /// Runtime configured from a TOML file
    #[cfg(feature = "config")]
    pub fn from_config_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::new(Config::from_file(path)?)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn register_filter<F>(&self, name: &str, filter: F, priority: Priority) -> Result<()>
    where
        F: Fn(Value, &[Value]) -> Result<Option<Value>> + 'static,
    {
        self.inner
            .filters
            .borrow_mut()
            .register(name, filter, priority)
    }

    pub fn unregister_filter(&self, name: &str) -> bool {
        self.inner.filters.borrow_mut().unregister(name)
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.inner.filters.borrow().has(name)
    }

    pub fn apply_filter(&self, name: &str, payload: Value, extra: &[Value]) -> Result<Value> {
        let chain = self.inner.filters.borrow().chain(name);
        crate::views::filters::fold(&chain, payload, extra)
    }

    pub fn register_template(&self, name: &str, text: impl Into<String>) -> Result<()> {
        self.inner.templates.borrow_mut().register(name, text)
    }

    /// Register every `<script type="text/template" data-template="…">` in `document`
    pub fn load_templates(&self, document: &Document) -> usize {
        self.inner.templates.borrow_mut().load_from(document)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.inner.templates.borrow().contains(name)
    }

    /// Ambient value injected as `$store` into every mount
    pub fn set_store(&self, store: impl Into<Value>) {
        *self.inner.store.borrow_mut() = store.into();
    }

    pub fn store(&self) -> Value {
        self.inner.store.borrow().clone()
    }

    /// Cached tokens for `text`
    pub fn tokenize(&self, text: &str) -> Rc<[Token]> {
        self.inner.tokens.tokens(text)
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.inner.tokens
    }

    /// Local context stored under `id`
    pub fn context(&self, id: ContextId) -> Option<Value> {
        self.inner.contexts.borrow().get(id)
    }

    pub fn context_count(&self) -> usize {
        self.inner.contexts.borrow().len()
    }

    pub fn mount_count(&self) -> usize {
        self.inner.mounts.borrow().len()
    }

    /// Render a registered template, or `name_or_text` itself as template text
    ///
    /// Nothing binds one-shot output, so its iteration contexts are released
    /// before returning.
    pub fn render(&self, name_or_text: &str, data: &Value) -> String {
        let registered = self.inner.templates.borrow().get(name_or_text).map(str::to_string);
        let template = registered.as_deref().unwrap_or(name_or_text);
        let (markup, allocated) = self.inner.render(template, data);

        let allocated: HashSet<ContextId> = allocated.into_iter().collect();
        self.inner
            .contexts
            .borrow_mut()
            .evict_unused(&allocated, &HashSet::new());
        markup
    }

    /// Mount the template `name` into `document` and keep it in sync with `data`
    ///
    /// The template comes from the registry, else from a template script in
    /// the document. Its container is the existing `<container_tag
    /// data-mount="name">` element, or a new one placed right after the
    /// script (or at the end of `<body>`).
    pub fn mount(
        &self,
        document: &Rc<RefCell<Document>>,
        name: &str,
        data: impl Into<Value>,
    ) -> Result<Mounted> {
        self.mount_inner(document, name, data.into())
            .with_context(|| format!("Failed to mount '{}'", name))
    }

    fn mount_inner(
        &self,
        document: &Rc<RefCell<Document>>,
        name: &str,
        data: Value,
    ) -> Result<Mounted> {
        let data = match data {
            Value::Object(object) => object,
            Value::Null => Object::new(),
            other => {
                return Err(Error::invalid_argument(format!(
                    "Mount data must be an object, got {}",
                    other.to_text()
                )))
            }
        };

        let (template, root) = {
            let mut doc = document.borrow_mut();
            let script = find_template_script(&doc, name);
            let registered = self.inner.templates.borrow().get(name).map(str::to_string);
            let template = registered
                .or_else(|| script.as_ref().map(|(_, text)| text.clone()))
                .ok_or_else(|| Error::template_not_found(name))?;
            let root = self.container(&mut doc, name, script.map(|(node, _)| node))?;
            (template, root)
        };

        data.insert("$store", self.store());
        data.insert("$root", Value::Node(root));
        if !data.contains_key("$refs") {
            data.insert("$refs", Object::new());
        }

        let config = &self.inner.config;
        let inner = Rc::new_cyclic(|weak: &Weak<MountInner>| {
            let weak = weak.clone();
            let observer = Observer::new(
                move || {
                    if let Some(mount) = weak.upgrade() {
                        mount.schedule();
                    }
                },
                config.reactive.max_depth,
            );
            let state = observer.wrap_object(data, 0);
            let binder = Binder::new(
                document,
                Rc::clone(&self.inner.contexts),
                state.clone(),
                config.directives.clone(),
                config.template.context_attr.clone(),
            );

            MountInner {
                name: name.to_string(),
                template,
                runtime: Rc::downgrade(&self.inner),
                document: Rc::downgrade(document),
                root,
                state,
                binder,
                owned: RefCell::new(HashSet::new()),
                rendering: Cell::new(false),
                pending: Cell::new(false),
                disposed: Cell::new(false),
                passes: Cell::new(0),
            }
        });

        inner.update()?;
        self.inner.mounts.borrow_mut().push(Rc::clone(&inner));
        log::debug!("Mounted '{}'", name);
        Ok(Mounted { inner })
    }

    fn container(&self, doc: &mut Document, name: &str, script: Option<NodeId>) -> Result<NodeId> {
        let tag = &self.inner.config.template.container_tag;

        let existing = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(tag.as_str()) && doc.attr(n, MOUNT_ATTR) == Some(name));
        if let Some(node) = existing {
            return Ok(node);
        }

        let node = doc.create_element(tag);
        doc.set_attr(node, MOUNT_ATTR, name)?;
        match script {
            Some(script) => doc.insert_after(script, node)?,
            None => {
                let parent = doc.body().unwrap_or_else(|| doc.root());
                doc.append_child(parent, node)?;
            }
        }
        Ok(node)
    }

    /// Dispose every live mount, then drop cached tokens, templates, stored
    /// contexts and registered filters
    ///
    /// The built-in `token` resolver is restored so the runtime stays usable.
    /// Context identifiers keep counting from where they were.
    pub fn dispose(&self) {
        let mounts = std::mem::take(&mut *self.inner.mounts.borrow_mut());
        for mount in &mounts {
            mount.dispose();
        }

        self.inner.tokens.clear();
        *self.inner.filters.borrow_mut() = FilterRegistry::with_builtins();
        self.inner.templates.borrow_mut().clear();
        self.inner.contexts.borrow_mut().clear();
        log::debug!("Runtime disposed ({} mounts torn down)", mounts.len());
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("template", &self.inner.config.template)
            .field("cached_templates", &self.inner.tokens.len())
            .finish_non_exhaustive()
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        for mount in self.mounts.get_mut().drain(..) {
            mount.dispose();
        }
    }
}

impl RuntimeInner {
    fn render(&self, template: &str, data: &Value) -> (String, Vec<ContextId>) {
        let mut renderer = Renderer::new(
            &self.tokens,
            &self.filters,
            &self.contexts,
            &self.config.template.context_attr,
        );
        let markup = renderer.render(template, data);
        (markup, renderer.into_allocated())
    }
}

/// Handle to one mounted, reactive template instance
///
/// The runtime keeps the instance alive, so dropping the handle leaves it
/// bound and reactive. It is torn down by [`Mounted::dispose`],
/// [`Runtime::dispose`] or dropping the last runtime handle.
#[derive(Clone)]
pub struct Mounted {
    inner: Rc<MountInner>,
}

struct MountInner {
    name: String,
    template: String,
    runtime: Weak<RuntimeInner>,
    document: Weak<RefCell<Document>>,
    root: NodeId,
    state: Reactive,
    binder: Binder,
    /// Context identifiers allocated by this instance and not yet evicted
    owned: RefCell<HashSet<ContextId>>,
    rendering: Cell<bool>,
    pending: Cell<bool>,
    disposed: Cell<bool>,
    passes: Cell<usize>,
}

impl Mounted {
    /// Reactive root state; writes through it re-render
    pub fn state(&self) -> Reactive {
        self.inner.state.clone()
    }

    /// The container element
    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// References registered by `#ref` attributes
    pub fn refs(&self) -> Object {
        self.inner.binder.refs().clone()
    }

    /// Number of render passes run so far
    pub fn passes(&self) -> usize {
        self.inner.passes.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Re-render now, e.g. after mutating the raw data behind the wrapper
    pub fn refresh(&self) -> Result<()> {
        if self.inner.rendering.get() {
            self.inner.pending.set(true);
            return Ok(());
        }
        self.inner.update()
    }

    /// Stop reacting, unbind listeners and release stored contexts
    ///
    /// The rendered markup stays in the document.
    pub fn dispose(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime
                .mounts
                .borrow_mut()
                .retain(|m| !Rc::ptr_eq(m, &self.inner));
        }
        self.inner.dispose();
    }
}

impl fmt::Debug for Mounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("passes", &self.inner.passes.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl MountInner {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        if let Some(document) = self.document.upgrade() {
            let mut doc = document.borrow_mut();
            for node in doc.descendants(self.root) {
                for event in doc.listened_events(node) {
                    doc.remove_listener(node, &event);
                }
            }
        }

        let owned = std::mem::take(&mut *self.owned.borrow_mut());
        let evicted = self.runtime.upgrade().map_or(0, |runtime| {
            runtime
                .contexts
                .borrow_mut()
                .evict_unused(&owned, &HashSet::new())
        });
        log::debug!("Disposed '{}' ({} contexts released)", self.name, evicted);
    }

    /// Change notification from the observer
    fn schedule(&self) {
        if self.disposed.get() {
            return;
        }
        if self.rendering.get() {
            // Picked up by the loop in `update` once the current pass ends
            self.pending.set(true);
            return;
        }
        if let Err(e) = self.update() {
            log::warn!(
                "Re-render of '{}' failed: {}",
                self.name,
                ErrorChain::new(&e).format_for_log()
            );
        }
    }

    fn update(&self) -> Result<()> {
        if self.disposed.get() {
            return Ok(());
        }

        let runtime = self.runtime.upgrade().context("runtime was dropped")?;
        let limit = runtime.config.reactive.max_rerenders;
        self.rendering.set(true);

        let mut runs = 0;
        let result = loop {
            self.pending.set(false);
            if let Err(e) = self.pass(&runtime) {
                break Err(e);
            }
            runs += 1;

            if !self.pending.get() {
                break Ok(());
            }
            if runs >= limit {
                log::error!(
                    "'{}' kept changing during render; stopped after {} passes",
                    self.name,
                    runs
                );
                self.pending.set(false);
                break Ok(());
            }
        };

        self.rendering.set(false);
        result
    }

    fn pass(&self, runtime: &RuntimeInner) -> Result<Patch> {
        let document = self.document.upgrade().context("document was dropped")?;
        let data = Value::Object(self.state.target().clone());

        let (markup, allocated) = runtime.render(&self.template, &data);
        self.owned.borrow_mut().extend(allocated);

        let patch = reconcile(
            &mut document.borrow_mut(),
            self.root,
            &markup,
            &runtime.config.directives,
        )?;
        self.binder.bind(self.root)?;
        self.evict(runtime, &document.borrow());

        self.passes.set(self.passes.get() + 1);
        Ok(patch)
    }

    /// Release contexts this instance allocated whose marker left the tree
    fn evict(&self, runtime: &RuntimeInner, document: &Document) {
        let attr = &runtime.config.template.context_attr;
        let live: HashSet<ContextId> = document
            .descendants(self.root)
            .into_iter()
            .filter_map(|node| document.attr(node, attr)?.parse().ok())
            .collect();

        let mut owned = self.owned.borrow_mut();
        let evicted = runtime.contexts.borrow_mut().evict_unused(&owned, &live);
        owned.retain(|id| live.contains(id));

        if evicted > 0 {
            log::debug!("Evicted {} stale context(s) from '{}'", evicted, self.name);
        }
    }
}
