//! Weft - delimiter templates kept in sync with reactive state
//!
//! Weft renders small HTML templates against plain data and keeps the result
//! alive inside an existing document:
//! - `[path]` interpolation with conditional and iteration blocks
//! - Named, priority-ordered filter chains
//! - A reactive wrapper that re-renders on every effective write
//! - A reconciler that patches the live tree instead of replacing it
//! - `@event.modifier="handler(args)"` and `#ref="name"` directives
//!
//! ```
//! use weft::{Config, Runtime, Value};
//!
//! let runtime = Runtime::new(Config::default())?;
//! let data = Value::from(serde_json::json!({"user": {"name": "Ada"}}));
//! assert_eq!(runtime.render("Hello [user.name]", &data), "Hello Ada");
//! # Ok::<(), weft::Error>(())
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod binder;
pub mod config;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod runtime;
pub mod utils;
pub mod value;
pub mod views;

// Re-export main types for public API
pub use binder::{Directive, Scope};
pub use config::{Config, DirectiveSettings, ReactiveConfig, TemplateSettings};
pub use dom::events::{dispatch, Event};
pub use dom::reconcile::{reconcile, Patch};
pub use dom::{Document, NodeId};
pub use error::{Error, Result};
pub use reactive::{wrap, Observer, Reactive, Wrapped};
pub use runtime::{Mounted, Runtime};
pub use value::{Callback, Object, Value};
pub use views::{ContextId, FilterRegistry, Resolved, TemplateRegistry};
