//! State variable descriptors and runtime cells.
//!
//! A [`StateVarDef`] is the declarative half of a variable: its name, render
//! flags, and a [`VarKind`] carrying the pure functions that define it. The
//! resolver owns the runtime half, a [`VarCell`] per variable, holding the
//! memoized value, staleness flags, and the instantiated dependency edges.
//!
//! Definitions and inverses are plain function pointers: they receive only
//! the resolved dependency values and return a value (or instructions), so
//! they cannot reach around the graph and the resolver can reason about them
//! exhaustively by matching on `VarKind`.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::types::StateValue;

use super::dependency::{DependencyEdge, DependencySpec, DependencyValues, ShapeInput};
use super::tree::Component;
use super::VarPtr;

// =============================================================================
// Definition function types
// =============================================================================

/// Forward compute: dependency values in, variable value out.
pub type Definition = fn(&DependencyValues<'_>) -> StateValue;

/// Right inverse of a definition: desired value plus current dependency
/// values in, mutation instructions (or failure) out.
pub type Inverse = fn(&StateValue, &DependencyValues<'_>) -> InverseResult;

/// Phase one of dependency shaping: which values determine the shape.
pub type DeterminingFn = fn(&Component) -> Vec<DependencySpec>;

/// Phase two: given the determining values, the actual dependency set.
pub type ShapeFn = fn(&ShapeInput<'_>) -> Vec<DependencySpec>;

/// The two-phase dependency rule of a computed variable.
///
/// `determining` is resolved first; its values (plus the component's current
/// children, attributes, and the document flags) feed `shape`, which produces
/// the dependency set proper. When a determining value changes, both phases
/// re-run and the resolver re-subscribes to whatever the new set names.
#[derive(Debug, Clone, Copy)]
pub struct DependencyRule {
    pub determining: DeterminingFn,
    pub shape: ShapeFn,
}

fn no_determining(_: &Component) -> Vec<DependencySpec> {
    Vec::new()
}

impl DependencyRule {
    /// A rule whose shape depends only on tree structure, not variable values.
    pub fn fixed(shape: ShapeFn) -> Self {
        Self {
            determining: no_determining,
            shape,
        }
    }
}

// =============================================================================
// Variable kinds
// =============================================================================

/// What kind of variable this is, with its defining functions.
#[derive(Debug, Clone, Copy)]
pub enum VarKind {
    /// Pure function of its dependencies; cannot be set.
    Computed {
        rule: DependencyRule,
        definition: Definition,
    },
    /// Pure function of its dependencies with a right inverse.
    ComputedWithInverse {
        rule: DependencyRule,
        definition: Definition,
        inverse: Inverse,
    },
    /// A leaf backed directly by its essential slot.
    Essential { default: fn() -> StateValue },
}

impl VarKind {
    /// The dependency rule, if this kind has one.
    pub fn rule(&self) -> Option<DependencyRule> {
        match self {
            Self::Computed { rule, .. } | Self::ComputedWithInverse { rule, .. } => Some(*rule),
            Self::Essential { .. } => None,
        }
    }
}

/// Declarative description of one state variable.
#[derive(Debug, Clone, Copy)]
pub struct StateVarDef {
    pub name: &'static str,
    /// Included in the flattened element's `state` map.
    pub for_render: bool,
    /// Evaluated on every full flattening even if nothing reads it
    /// (numbering-style registries must stay consistent).
    pub must_evaluate: bool,
    /// Dimensionality marker; shipped profiles are all scalar.
    pub is_array: bool,
    pub kind: VarKind,
}

impl StateVarDef {
    pub fn computed(name: &'static str, rule: DependencyRule, definition: Definition) -> Self {
        Self {
            name,
            for_render: false,
            must_evaluate: false,
            is_array: false,
            kind: VarKind::Computed { rule, definition },
        }
    }

    pub fn computed_with_inverse(
        name: &'static str,
        rule: DependencyRule,
        definition: Definition,
        inverse: Inverse,
    ) -> Self {
        Self {
            name,
            for_render: false,
            must_evaluate: false,
            is_array: false,
            kind: VarKind::ComputedWithInverse {
                rule,
                definition,
                inverse,
            },
        }
    }

    pub fn essential(name: &'static str, default: fn() -> StateValue) -> Self {
        Self {
            name,
            for_render: false,
            must_evaluate: false,
            is_array: false,
            kind: VarKind::Essential { default },
        }
    }

    pub fn for_render(mut self) -> Self {
        self.for_render = true;
        self
    }

    pub fn must_evaluate(mut self) -> Self {
        self.must_evaluate = true;
        self
    }
}

// =============================================================================
// Inverse instructions
// =============================================================================

/// One upstream mutation requested by an inverse definition.
#[derive(Debug, Clone, PartialEq)]
pub enum InverseInstruction {
    /// Push a desired value into dependency `index` (edge order).
    SetDependency { index: usize, value: StateValue },
    /// Write the variable's own essential slot.
    SetEssential { value: StateValue },
}

/// Outcome of an inverse definition.
#[derive(Debug, Clone, PartialEq)]
pub enum InverseResult {
    /// Apply these instructions (the solver recurses per instruction).
    Set(Vec<InverseInstruction>),
    /// The desired value cannot be produced; nothing will be written.
    Failure(&'static str),
}

// =============================================================================
// Runtime cells
// =============================================================================

bitflags! {
    /// Per-variable status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarFlags: u8 {
        /// Value may be out of date; recompute on next read.
        const STALE = 1 << 0;
        /// Dependency set may be out of date; re-run both shape phases.
        const SHAPE_STALE = 1 << 1;
        /// Currently on the resolution stack.
        const RESOLVING = 1 << 2;
        /// Member of a dependency cycle; permanently an error value.
        const CYCLE = 1 << 3;
    }
}

/// Runtime state of one variable, owned by its component.
#[derive(Debug, Clone)]
pub struct VarCell {
    pub flags: VarFlags,
    /// Memoized value; `None` until first resolution.
    pub value: Option<StateValue>,
    /// Instantiated dependency edges, in the order definitions address them.
    pub edges: SmallVec<[DependencyEdge; 4]>,
    /// Instantiated determining edges (shape phase one).
    pub shape_edges: SmallVec<[DependencyEdge; 2]>,
    /// Dependency values as of the last computation, for the value-level
    /// unchanged check and as input to inverse definitions.
    pub last_values: SmallVec<[Option<StateValue>; 4]>,
    /// Variables whose value depends on this one (reverse edges).
    pub dependents: SmallVec<[VarPtr; 4]>,
    /// Variables whose dependency *shape* depends on this one.
    pub shape_dependents: SmallVec<[VarPtr; 2]>,
    /// The essential slot: the only true mutable state in the graph.
    pub essential: Option<StateValue>,
}

impl Default for VarCell {
    fn default() -> Self {
        Self {
            // Fresh cells need both a shape pass and a value pass.
            flags: VarFlags::STALE | VarFlags::SHAPE_STALE,
            value: None,
            edges: SmallVec::new(),
            shape_edges: SmallVec::new(),
            last_values: SmallVec::new(),
            dependents: SmallVec::new(),
            shape_dependents: SmallVec::new(),
            essential: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_cell_is_fully_stale() {
        let cell = VarCell::default();
        assert!(cell.flags.contains(VarFlags::STALE));
        assert!(cell.flags.contains(VarFlags::SHAPE_STALE));
        assert!(!cell.flags.contains(VarFlags::CYCLE));
        assert!(cell.value.is_none());
    }

    #[test]
    fn test_def_builders() {
        fn shape(_: &ShapeInput<'_>) -> Vec<DependencySpec> {
            vec![DependencySpec::Essential]
        }
        fn definition(d: &DependencyValues<'_>) -> StateValue {
            d.essential().cloned().unwrap_or(StateValue::from(""))
        }

        let def = StateVarDef::computed("value", DependencyRule::fixed(shape), definition)
            .for_render()
            .must_evaluate();
        assert_eq!(def.name, "value");
        assert!(def.for_render);
        assert!(def.must_evaluate);
        assert!(def.kind.rule().is_some());

        let ess = StateVarDef::essential("raw", || StateValue::from(""));
        assert!(ess.kind.rule().is_none());
    }
}
