//! Document Engine - component arena and state-variable graph.
//!
//! The engine manages the core data structures:
//! - Tree: generational component arena, name registry, renderer id mapping
//! - Variable: state-variable descriptors and runtime cells
//! - Dependency: dependency specifications, instantiated edges, value plumbing
//! - Resolver: lazy memoized recomputation with staleness and cycle tracking
//! - Inverse: routes desired values back through inverse definitions
//! - Composite: replacement expansion and reconciliation
//! - Flatten: produces the flat render tree from resolved state
//!
//! # Architecture
//!
//! Components are not free-floating objects. They live in a slotmap arena and
//! refer to each other with generation-counted keys:
//!
//! ```text
//! Key 1v1: document (children=[2v1, 3v1])
//! Key 2v1: numberInput "n"  (cells: value=3, ...)
//! Key 3v1: repeat (count=$n, replacements=[4v1, 5v1, 6v1])
//! ```
//!
//! When a composite re-expands, destroyed replacements leave dead keys behind;
//! a dependency edge still pointing at one resolves to an error value instead
//! of aliased data. The only mutable state in the graph are per-variable
//! essential slots; every other value is a pure function of those, the tree
//! shape, and the document flags.

pub mod composite;
pub mod dependency;
pub mod flatten;
pub mod inverse;
pub mod resolver;
pub mod tree;
pub mod variable;

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::dast::DastRoot;
use crate::flags::DocumentFlags;
use crate::types::StateValue;

pub use composite::{CompositeState, RenderedChild, ReplacementItem, ReplacementShape};
pub use dependency::{
    ChildDep, DepSource, DepTag, DependencyEdge, DependencySpec, DependencyValues, ResolvedDep,
    ShapeInput,
};
pub use tree::{AttrValue, Component, ComponentChild, ComponentTree};
pub use variable::{
    Definition, DependencyRule, Inverse, InverseInstruction, InverseResult, StateVarDef, VarCell,
    VarFlags, VarKind,
};

slotmap::new_key_type! {
    /// Generation-counted handle to a component in the arena.
    pub struct ComponentKey;
}

/// Address of one state variable: a component plus an index into its
/// variable table. Stable for the component's lifetime; dangling after the
/// component is destroyed, which lookups detect and report as an error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarPtr {
    pub component: ComponentKey,
    pub var: usize,
}

// =============================================================================
// Document-scoped counters
// =============================================================================

/// Document-scoped serial counters (paragraph numbering and the like).
///
/// Explicit state threaded through resolution rather than a process global,
/// so two documents in one process never interfere and tests reset
/// deterministically. A counter value is allocated once per dependency edge,
/// in document order, and then memoized with the variable that read it.
#[derive(Debug, Default)]
pub struct Counters {
    counts: IndexMap<&'static str, i64>,
}

impl Counters {
    /// Allocate the next serial number for a counter kind (1-based).
    pub fn next(&mut self, kind: &'static str) -> i64 {
        let entry = self.counts.entry(kind).or_insert(0);
        *entry += 1;
        *entry
    }
}

// =============================================================================
// Document
// =============================================================================

/// One live document: the component tree plus all graph bookkeeping.
///
/// Everything the resolver, inverse solver, and reconciler touch hangs off
/// this struct, so a `&mut Document` is the whole mutation capability — there
/// is no hidden global state and no cross-document sharing.
#[derive(Debug)]
pub struct Document {
    pub(crate) tree: ComponentTree,
    pub(crate) flags: DocumentFlags,
    pub(crate) counters: Counters,
    /// Flag name -> variables whose dependency set read that flag.
    pub(crate) flag_subscribers: IndexMap<String, Vec<VarPtr>>,
    /// Component -> variables whose dependency *shape* read its rendered
    /// children. Re-expansion of a composite under that component marks them
    /// shape-stale.
    pub(crate) child_subscribers: HashMap<ComponentKey, Vec<VarPtr>>,
    /// Active resolution chain, for cycle detection.
    pub(crate) resolve_stack: Vec<VarPtr>,
}

impl Document {
    /// Build a document from a parsed source tree. Flags start empty and are
    /// installed separately via [`Document::install_flags`].
    pub fn new(dast: &DastRoot) -> Self {
        Self {
            tree: ComponentTree::build(dast),
            flags: DocumentFlags::default(),
            counters: Counters::default(),
            flag_subscribers: IndexMap::new(),
            child_subscribers: HashMap::new(),
            resolve_stack: Vec::new(),
        }
    }

    /// Current document flags.
    pub fn flags(&self) -> &DocumentFlags {
        &self.flags
    }

    /// Read access to the component tree.
    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    /// Install a new flag map, invalidating every variable subscribed to a
    /// flag whose value changed.
    pub fn install_flags(&mut self, flags: DocumentFlags) {
        let changed = flags.changed_from(&self.flags);
        self.flags = flags;
        for name in changed {
            let subscribers = self
                .flag_subscribers
                .get(&name)
                .cloned()
                .unwrap_or_default();
            for ptr in subscribers {
                self.invalidate(ptr);
            }
        }
    }

    /// Address of a named variable on a component.
    pub fn var_ptr(&self, component: ComponentKey, name: &str) -> Option<VarPtr> {
        let comp = self.tree.get(component)?;
        let var = comp.var_index(name)?;
        Some(VarPtr { component, var })
    }

    /// Resolve a variable to its current value, computing on demand.
    pub fn get_value(&mut self, ptr: VarPtr) -> StateValue {
        self.resolve(ptr)
    }
}
