//! # tapestry-core
//!
//! Reactive evaluation core for structured interactive documents.
//!
//! A document arrives as a parsed source tree ([`dast::DastRoot`]), becomes a
//! tree of typed components, and is rendered as a flat element list
//! ([`dast::FlatDastRoot`]). Between the two sits a bidirectional
//! state-variable graph: every component declares variables with dependency
//! rules and pure definitions, user interaction routes back through inverse
//! definitions to essential state, and everything recomputes lazily.
//!
//! ## Architecture
//!
//! ```text
//! DastRoot → ComponentTree → state-variable graph → FlatDastRoot
//!                 ↑                   │
//!                 └── actions ← inverse definitions
//! ```
//!
//! Components live in a generational arena rather than as free objects;
//! composites (`repeat`, `conditional`, `copy`) expand into replacement
//! subtrees that are reconciled in place, so component identity and user
//! state survive re-expansion.
//!
//! ## Modules
//!
//! - [`types`] - Value and component-type vocabulary
//! - [`dast`] - Source and flat render trees, diffing
//! - [`engine`] - Arena, dependency graph, resolver, inverse solver, composites
//! - [`components`] - Per-type profiles (variables, actions, references)
//! - [`core`] - The outer lifecycle boundary

pub mod components;
pub mod core;
pub mod dast;
pub mod engine;
pub mod error;
pub mod flags;
pub mod types;

// Re-export the boundary surface
pub use crate::core::{Action, Core};
pub use dast::{
    diff_flat_dast, DastElement, DastNode, DastRoot, FlatDastChild, FlatDastElement,
    FlatDastError, FlatDastNode, FlatDastRoot, FlatDastUpdate,
};
pub use error::CoreError;
pub use flags::DocumentFlags;
pub use types::{ComponentType, StateValue};

pub use engine::{ComponentKey, Document, VarPtr};
