//! Helpers shared by the renderer, the binder and the reactive layer

pub mod object;
