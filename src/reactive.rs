//! Reactive state wrapper
//!
//! An [`Observer`] owns a change callback and an identity-keyed map from source
//! objects to their wrappers. Reading an object-valued property through a
//! [`Reactive`] yields the cached wrapper for that object (one level deeper),
//! so shared sub-objects are observed once and compare equal by identity.
//! Writes that change a value invoke the callback synchronously, once per
//! write.

use crate::error::{Error, Result};
use crate::utils::object;
use crate::value::{Object, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Owner of the change callback and the wrapper map
pub struct Observer {
    on_change: Box<dyn Fn()>,
    max_depth: Option<usize>,
    wrappers: RefCell<HashMap<usize, Weak<ReactiveInner>>>,
}

/// Observing handle over one object
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

struct ReactiveInner {
    target: Object,
    /// Shallowest depth the object has been reached at
    depth: Cell<usize>,
    observer: Rc<Observer>,
}

/// Result of reading through a wrapper
#[derive(Clone, Debug)]
pub enum Wrapped {
    Reactive(Reactive),
    /// Primitive, callback, node, or an object past the depth bound
    Raw(Value),
}

/// Wrap `target`, notifying `on_change` on every effective write
///
/// Non-object values come back unchanged as [`Wrapped::Raw`].
pub fn wrap<F>(target: Value, on_change: F, max_depth: Option<usize>) -> Wrapped
where
    F: Fn() + 'static,
{
    Observer::new(on_change, max_depth).wrap(target)
}

impl Observer {
    pub fn new<F>(on_change: F, max_depth: Option<usize>) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        Rc::new(Self {
            on_change: Box::new(on_change),
            max_depth,
            wrappers: RefCell::new(HashMap::new()),
        })
    }

    /// Wrap a root value at depth 0
    pub fn wrap(self: &Rc<Self>, target: Value) -> Wrapped {
        match target {
            Value::Object(object) => Wrapped::Reactive(self.wrap_object(object, 0)),
            other => Wrapped::Raw(other),
        }
    }

    /// Cached wrapper for `object`
    ///
    /// A shared object reached again at a shallower `depth` keeps its wrapper
    /// and adopts that depth, so the bound does not depend on read order.
    pub fn wrap_object(self: &Rc<Self>, object: Object, depth: usize) -> Reactive {
        let key = object.identity();

        if let Some(existing) = self.wrappers.borrow().get(&key).and_then(Weak::upgrade) {
            if Object::ptr_eq(&existing.target, &object) {
                if depth < existing.depth.get() {
                    existing.depth.set(depth);
                }
                return Reactive { inner: existing };
            }
        }

        let inner = Rc::new(ReactiveInner {
            target: object,
            depth: Cell::new(depth),
            observer: Rc::clone(self),
        });

        let mut wrappers = self.wrappers.borrow_mut();
        wrappers.retain(|_, w| w.strong_count() > 0);
        wrappers.insert(key, Rc::downgrade(&inner));

        Reactive { inner }
    }

    /// Number of live wrappers
    pub fn wrapper_count(&self) -> usize {
        self.wrappers
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn allows(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth <= max)
    }

    fn notify(&self) {
        (self.on_change)();
    }
}

impl Reactive {
    /// Read `key`, wrapping object values one level deeper
    pub fn get(&self, key: &str) -> Option<Wrapped> {
        let value = self.inner.target.get(key)?;
        Some(self.wrap_child(value))
    }

    /// Read a dotted path through nested wrappers
    pub fn get_path(&self, path: &str) -> Option<Wrapped> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;

        for part in parts {
            current = match current {
                Wrapped::Reactive(r) => r.get(part)?,
                Wrapped::Raw(Value::Object(o)) => Wrapped::Raw(o.get(part)?),
                Wrapped::Raw(_) => return None,
            };
        }

        Some(current)
    }

    /// Raw value at `key`, never wrapped
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.inner.target.get(key)
    }

    /// Write `key`; notifies when the stored value actually changed
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let previous = self.inner.target.insert(key, value.clone());
        let changed = previous.map_or(true, |old| !old.same(&value));

        if changed {
            self.inner.observer.notify();
        }
        changed
    }

    /// Write through a dotted path
    ///
    /// Segments beyond the depth bound are written without notification.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let Some((parent, key)) = path.rsplit_once('.') else {
            return Ok(self.set(path, value));
        };

        match self.get_path(parent) {
            Some(Wrapped::Reactive(r)) => Ok(r.set(key, value)),
            Some(Wrapped::Raw(Value::Object(o))) => {
                object::set(&o, key, value.into())?;
                Ok(false)
            }
            _ => Err(Error::invalid_argument(format!(
                "Cannot set '{}': '{}' is not an object",
                path, parent
            ))),
        }
    }

    /// Delete `key`; notifies when it existed
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.target.remove(key);
        if removed.is_some() {
            self.inner.observer.notify();
        }
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.target.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.target.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.target.is_empty()
    }

    /// The observed object itself
    pub fn target(&self) -> &Object {
        &self.inner.target
    }

    pub fn depth(&self) -> usize {
        self.inner.depth.get()
    }

    pub fn ptr_eq(a: &Reactive, b: &Reactive) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    fn wrap_child(&self, value: Value) -> Wrapped {
        let observer = &self.inner.observer;
        let depth = self.inner.depth.get() + 1;

        match value {
            Value::Object(object) if observer.allows(depth) => {
                Wrapped::Reactive(observer.wrap_object(object, depth))
            }
            other => Wrapped::Raw(other),
        }
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("depth", &self.inner.depth.get())
            .field("target", &self.inner.target)
            .finish()
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Object(r.inner.target.clone())
    }
}

impl Wrapped {
    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Wrapped::Reactive(r) => Some(r),
            Wrapped::Raw(_) => None,
        }
    }

    /// Underlying value; wrappers give back their target object
    pub fn into_value(self) -> Value {
        match self {
            Wrapped::Reactive(r) => r.into(),
            Wrapped::Raw(v) => v,
        }
    }
}
