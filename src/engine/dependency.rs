//! Dependency specifications, instantiated edges, and value plumbing.
//!
//! A shape function produces [`DependencySpec`]s — symbolic descriptions like
//! "my `count` attribute" or "the `value` variable of each rendered child".
//! The resolver instantiates specs into [`DependencyEdge`]s: concrete sources
//! addressed by arena keys. Definitions never see edges; they receive a
//! [`DependencyValues`] view of resolved values keyed by [`DepTag`].

use crate::types::{ComponentType, StateValue};

use super::tree::Component;
use super::VarPtr;
use crate::flags::DocumentFlags;

// =============================================================================
// Specifications
// =============================================================================

/// A child-variable dependency: one edge per matching rendered child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildDep {
    /// Variable to read on each component child.
    pub var: &'static str,
    /// Whether literal text children participate (as string values).
    pub include_text: bool,
    /// Restrict to these component types; `None` accepts any child that
    /// carries the variable.
    pub types: Option<&'static [ComponentType]>,
}

/// Symbolic description of one dependency, produced by shape functions.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencySpec {
    /// A specific variable on a specific component.
    StateVar { ptr: VarPtr, tag: &'static str },
    /// An attribute of the owning component; references (`count="$n"`) chase
    /// through the name registry to the target's primary variable.
    Attribute {
        name: &'static str,
        default: StateValue,
    },
    /// The owning component's rendered children (composites expanded).
    Children(ChildDep),
    /// A document flag; changing it via `set_flags` invalidates the variable.
    Flag { name: &'static str },
    /// The variable's own essential slot.
    Essential,
    /// A document-scoped serial counter, allocated once in document order.
    Counter { kind: &'static str },
}

// =============================================================================
// Instantiated edges
// =============================================================================

/// How a definition addresses a resolved dependency value.
#[derive(Debug, Clone, PartialEq)]
pub enum DepTag {
    Attribute(&'static str),
    Child(usize),
    Flag(&'static str),
    Var(&'static str),
    Essential,
    Counter(&'static str),
}

/// Where an edge's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DepSource {
    /// Another variable in the graph (the only source that creates a
    /// reverse subscription).
    StateVar(VarPtr),
    /// The owning variable's essential slot.
    OwnEssential,
    /// A document flag, read at resolution time.
    Flag(&'static str),
    /// A fixed value: literal markup text, attribute defaults, allocated
    /// counter values, and unresolvable references (as error values).
    Literal(StateValue),
}

/// One instantiated dependency edge.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    pub tag: DepTag,
    pub source: DepSource,
}

/// A resolved dependency value as handed to definitions. `value` is `None`
/// only for an unset essential slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDep {
    pub tag: DepTag,
    pub value: Option<StateValue>,
}

// =============================================================================
// The view definitions receive
// =============================================================================

/// Read-only view of resolved dependency values, indexed by edge order and
/// addressable by tag.
#[derive(Debug)]
pub struct DependencyValues<'a> {
    deps: &'a [ResolvedDep],
}

impl<'a> DependencyValues<'a> {
    pub fn new(deps: &'a [ResolvedDep]) -> Self {
        Self { deps }
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Value of the dependency at edge index `i`.
    pub fn value(&self, i: usize) -> Option<&StateValue> {
        self.deps.get(i).and_then(|d| d.value.as_ref())
    }

    /// Edge index of the first dependency with this tag.
    pub fn index_of(&self, tag: &DepTag) -> Option<usize> {
        self.deps.iter().position(|d| d.tag == *tag)
    }

    /// Value of an attribute dependency.
    pub fn attribute(&self, name: &str) -> Option<&StateValue> {
        self.tagged(|t| matches!(t, DepTag::Attribute(n) if *n == name))
    }

    /// Value of a flag dependency.
    pub fn flag(&self, name: &str) -> Option<&StateValue> {
        self.tagged(|t| matches!(t, DepTag::Flag(n) if *n == name))
    }

    /// Value of a sibling-variable dependency.
    pub fn var(&self, name: &str) -> Option<&StateValue> {
        self.tagged(|t| matches!(t, DepTag::Var(n) if *n == name))
    }

    /// Value of a counter dependency.
    pub fn counter(&self, kind: &str) -> Option<&StateValue> {
        self.tagged(|t| matches!(t, DepTag::Counter(n) if *n == kind))
    }

    /// The essential slot, `None` when it has never been written.
    pub fn essential(&self) -> Option<&StateValue> {
        self.deps
            .iter()
            .find(|d| d.tag == DepTag::Essential)
            .and_then(|d| d.value.as_ref())
    }

    /// Values of all child dependencies, in child order.
    pub fn children(&self) -> impl Iterator<Item = &StateValue> {
        self.deps.iter().filter_map(|d| match d.tag {
            DepTag::Child(_) => d.value.as_ref(),
            _ => None,
        })
    }

    /// Edge indices and values of all child dependencies.
    pub fn child_entries(&self) -> impl Iterator<Item = (usize, &StateValue)> {
        self.deps.iter().enumerate().filter_map(|(i, d)| match d.tag {
            DepTag::Child(_) => d.value.as_ref().map(|v| (i, v)),
            _ => None,
        })
    }

    /// If there is exactly one dependency, its edge index and value.
    /// Inverse definitions use this to decide invertibility.
    pub fn single(&self) -> Option<(usize, Option<&StateValue>)> {
        if self.deps.len() == 1 {
            Some((0, self.deps[0].value.as_ref()))
        } else {
            None
        }
    }

    /// The first error value among the dependencies, if any.
    pub fn first_error(&self) -> Option<&StateValue> {
        self.deps
            .iter()
            .filter_map(|d| d.value.as_ref())
            .find(|v| v.is_error())
    }

    fn tagged(&self, pred: impl Fn(&DepTag) -> bool) -> Option<&StateValue> {
        self.deps
            .iter()
            .find(|d| pred(&d.tag))
            .and_then(|d| d.value.as_ref())
    }
}

/// Input to a shape function: the component as it currently stands, the
/// resolved determining values, and the document flags.
#[derive(Debug)]
pub struct ShapeInput<'a> {
    pub component: &'a Component,
    pub determining: &'a [ResolvedDep],
    pub flags: &'a DocumentFlags,
}

// =============================================================================
// Tests
// =============================================================================
