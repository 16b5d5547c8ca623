//! Event objects, listeners and propagation
//!
//! Dispatch walks the target's ancestor path twice: capture listeners from
//! the outermost ancestor down to the target, then the target, then bubble
//! listeners back up. The document is never borrowed while a listener runs,
//! so handlers are free to mutate the tree.

use super::{Document, NodeId};
use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub target: NodeId,
    pub current_target: Option<NodeId>,
    pub detail: Value,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_stopped: bool,
    in_passive: bool,
}

impl Event {
    pub fn new(event_type: impl Into<String>, target: NodeId) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            current_target: None,
            detail: Value::Null,
            default_prevented: false,
            propagation_stopped: false,
            immediate_stopped: false,
            in_passive: false,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Ignored while a passive listener is running
    pub fn prevent_default(&mut self) {
        if self.in_passive {
            log::debug!(
                "preventDefault ignored inside passive '{}' listener",
                self.event_type
            );
            return;
        }
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_stopped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
}

type HandlerFn = dyn Fn(&mut Event);

#[derive(Clone)]
pub struct Listener {
    handler: Rc<HandlerFn>,
    pub options: ListenerOptions,
}

impl Listener {
    pub fn new<F>(options: ListenerOptions, handler: F) -> Self
    where
        F: Fn(&mut Event) + 'static,
    {
        Self {
            handler: Rc::new(handler),
            options,
        }
    }

    pub fn call(&self, event: &mut Event) {
        (self.handler)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Fire a plain event of `event_type` at `target`
pub fn dispatch(document: &RefCell<Document>, target: NodeId, event_type: &str) -> Event {
    dispatch_event(document, Event::new(event_type, target))
}

/// Propagate `event` and return it with its final flags
pub fn dispatch_event(document: &RefCell<Document>, mut event: Event) -> Event {
    // target first, outermost ancestor last
    let path = document.borrow().ancestors(event.target);
    if path.is_empty() {
        log::warn!("Dropped '{}' event for a removed node", event.event_type);
        return event;
    }

    for &node in path.iter().skip(1).rev() {
        invoke(document, node, &mut event, Phase::Capture);
        if event.propagation_stopped {
            return finish(event);
        }
    }

    invoke(document, path[0], &mut event, Phase::Target);
    if event.propagation_stopped {
        return finish(event);
    }

    for &node in path.iter().skip(1) {
        invoke(document, node, &mut event, Phase::Bubble);
        if event.propagation_stopped {
            break;
        }
    }

    finish(event)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capture,
    Target,
    Bubble,
}

fn invoke(document: &RefCell<Document>, node: NodeId, event: &mut Event, phase: Phase) {
    let listener = {
        let mut doc = document.borrow_mut();
        let Some(listener) = doc.listener(node, &event.event_type) else {
            return;
        };
        let wanted = match phase {
            Phase::Capture => listener.options.capture,
            Phase::Target => true,
            Phase::Bubble => !listener.options.capture,
        };
        if !wanted {
            return;
        }
        if listener.options.once {
            doc.remove_listener(node, &event.event_type);
        }
        listener
    };

    event.current_target = Some(node);
    event.in_passive = listener.options.passive;
    listener.call(event);
    event.in_passive = false;
}

fn finish(mut event: Event) -> Event {
    event.current_target = None;
    event
}
