//! Dependency Resolver - lazy memoized recomputation.
//!
//! The contract: `resolve` returns the current correct value of any variable,
//! computing exactly what is needed. Mutations never recompute — they walk
//! reverse edges marking dependents stale, and the next read pulls fresh
//! values ("push invalidation, pull computation").
//!
//! # Resolution of one variable
//!
//! 1. If the cached value is fresh, return it.
//! 2. If the dependency shape is stale, re-run the two-phase shape
//!    computation: resolve the determining values, call the shape function,
//!    instantiate the resulting specs into edges, and diff subscriptions
//!    against the previous edge set.
//! 3. Resolve every edge value (depth-first recursion).
//! 4. If all dependency values match the last computation, keep the cached
//!    value; otherwise run the definition.
//!
//! A variable encountered while already on the resolution stack closes a
//! cycle: every variable on the active chain becomes a permanent error value
//! for this document instance. Error values otherwise propagate structurally
//! (a dependency in error makes the dependent an error) without running the
//! definition, so one broken expression never aborts unrelated subtrees.

use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::types::StateValue;

use super::composite::RenderedChild;
use super::dependency::{
    DepSource, DepTag, DependencyEdge, DependencySpec, DependencyValues, ResolvedDep, ShapeInput,
};
use super::tree::AttrValue;
use super::variable::{StateVarDef, VarCell, VarFlags, VarKind};
use super::{ComponentKey, Document, VarPtr};

fn vanished() -> StateValue {
    StateValue::Error("component no longer exists".into())
}

fn cycle_error() -> StateValue {
    StateValue::Error("circular dependency detected".into())
}

impl Document {
    // =========================================================================
    // Cell access
    // =========================================================================

    pub(crate) fn cell(&self, ptr: VarPtr) -> Option<&VarCell> {
        self.tree.get(ptr.component)?.cells.get(ptr.var)
    }

    pub(crate) fn cell_mut(&mut self, ptr: VarPtr) -> Option<&mut VarCell> {
        self.tree.get_mut(ptr.component)?.cells.get_mut(ptr.var)
    }

    pub(crate) fn def(&self, ptr: VarPtr) -> Option<StateVarDef> {
        self.tree.get(ptr.component)?.defs.get(ptr.var).copied()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve one variable, computing on demand.
    pub fn resolve(&mut self, ptr: VarPtr) -> StateValue {
        let Some(cell) = self.cell(ptr) else {
            return vanished();
        };
        let flags = cell.flags;

        if flags.contains(VarFlags::CYCLE) {
            return cell.value.clone().unwrap_or_else(cycle_error);
        }
        if !flags.intersects(VarFlags::STALE | VarFlags::SHAPE_STALE) {
            if let Some(value) = &cell.value {
                return value.clone();
            }
        }
        if flags.contains(VarFlags::RESOLVING) {
            return self.mark_cycle(ptr);
        }

        if let Some(cell) = self.cell_mut(ptr) {
            cell.flags.insert(VarFlags::RESOLVING);
        }
        self.resolve_stack.push(ptr);

        let value = self.resolve_inner(ptr);

        self.resolve_stack.pop();
        if let Some(cell) = self.cell_mut(ptr) {
            cell.flags.remove(VarFlags::RESOLVING);
        }
        value
    }

    fn resolve_inner(&mut self, ptr: VarPtr) -> StateValue {
        if self
            .cell(ptr)
            .is_some_and(|c| c.flags.contains(VarFlags::SHAPE_STALE))
        {
            self.instantiate_edges(ptr);
        }

        // The shape pass resolves determining values and may expand
        // composites; either can close a cycle through this variable.
        if self
            .cell(ptr)
            .is_some_and(|c| c.flags.contains(VarFlags::CYCLE))
        {
            return self
                .cell(ptr)
                .and_then(|c| c.value.clone())
                .unwrap_or_else(cycle_error);
        }

        let edges: SmallVec<[DependencyEdge; 4]> = match self.cell(ptr) {
            Some(cell) => cell.edges.clone(),
            None => return vanished(),
        };
        let mut resolved: Vec<ResolvedDep> = Vec::with_capacity(edges.len());
        for edge in &edges {
            let value = self.edge_value(ptr, edge);
            resolved.push(ResolvedDep {
                tag: edge.tag.clone(),
                value,
            });
        }

        let Some(cell) = self.cell(ptr) else {
            return vanished();
        };
        if cell.flags.contains(VarFlags::CYCLE) {
            return cell.value.clone().unwrap_or_else(cycle_error);
        }

        let Some(def) = self.def(ptr) else {
            return vanished();
        };
        // Essential variables read their slot directly and skip the memo
        // check; their "dependency set" is empty either way.
        let unchanged = !matches!(def.kind, VarKind::Essential { .. })
            && cell.value.is_some()
            && cell.last_values.len() == resolved.len()
            && cell
                .last_values
                .iter()
                .zip(&resolved)
                .all(|(old, new)| *old == new.value);

        let value = if unchanged {
            trace!(?ptr, "dependencies unchanged, keeping memoized value");
            cell.value.clone().expect("cached value present")
        } else {
            match def.kind {
                VarKind::Essential { default } => self
                    .cell(ptr)
                    .and_then(|c| c.essential.clone())
                    .unwrap_or_else(default),
                VarKind::Computed { definition, .. }
                | VarKind::ComputedWithInverse { definition, .. } => {
                    let view = DependencyValues::new(&resolved);
                    match view.first_error() {
                        // Errors propagate structurally; the definition
                        // never sees one.
                        Some(err) => err.clone(),
                        None => definition(&view),
                    }
                }
            }
        };

        if let Some(cell) = self.cell_mut(ptr) {
            cell.value = Some(value.clone());
            cell.last_values = resolved.into_iter().map(|d| d.value).collect();
            cell.flags.remove(VarFlags::STALE | VarFlags::SHAPE_STALE);
        }
        value
    }

    /// A variable on the active resolution stack was requested again: no
    /// valid evaluation order exists. Every variable on the chain becomes a
    /// permanent error value for this document instance.
    fn mark_cycle(&mut self, ptr: VarPtr) -> StateValue {
        let err = cycle_error();
        let pos = self
            .resolve_stack
            .iter()
            .position(|p| *p == ptr)
            .unwrap_or(0);
        let chain: Vec<VarPtr> = self.resolve_stack[pos..].to_vec();
        warn!(len = chain.len(), "dependency cycle detected");
        for p in chain {
            if let Some(cell) = self.cell_mut(p) {
                cell.flags.insert(VarFlags::CYCLE);
                cell.flags
                    .remove(VarFlags::STALE | VarFlags::SHAPE_STALE);
                cell.value = Some(err.clone());
            }
        }
        err
    }

    fn edge_value(&mut self, ptr: VarPtr, edge: &DependencyEdge) -> Option<StateValue> {
        match &edge.source {
            DepSource::StateVar(target) => Some(self.resolve(*target)),
            DepSource::OwnEssential => self.cell(ptr).and_then(|c| c.essential.clone()),
            DepSource::Flag(name) => Some(self.flags.state_value(name)),
            DepSource::Literal(value) => Some(value.clone()),
        }
    }

    // =========================================================================
    // Dependency shape (two phases)
    // =========================================================================

    fn instantiate_edges(&mut self, ptr: VarPtr) {
        let Some(def) = self.def(ptr) else { return };
        let Some(rule) = def.kind.rule() else {
            if let Some(cell) = self.cell_mut(ptr) {
                cell.flags.remove(VarFlags::SHAPE_STALE);
            }
            return;
        };

        let (old_edges, old_shape_edges) = match self.cell(ptr) {
            Some(cell) => (cell.edges.clone(), cell.shape_edges.clone()),
            None => return,
        };

        // Phase one: resolve the determining values.
        let det_specs = {
            let Some(comp) = self.tree.get(ptr.component) else {
                return;
            };
            (rule.determining)(comp)
        };
        let mut shape_vec: Vec<DependencyEdge> = Vec::new();
        for spec in &det_specs {
            self.instantiate_spec(ptr, spec, &old_shape_edges, &mut shape_vec);
        }
        let shape_edges: SmallVec<[DependencyEdge; 2]> = shape_vec.into();
        let mut determining: Vec<ResolvedDep> = Vec::with_capacity(shape_edges.len());
        for edge in shape_edges.clone() {
            let value = self.edge_value(ptr, &edge);
            determining.push(ResolvedDep {
                tag: edge.tag,
                value,
            });
        }
        if self
            .cell(ptr)
            .is_none_or(|c| c.flags.contains(VarFlags::CYCLE))
        {
            return;
        }

        // Phase two: compute the dependency set from the determining values.
        let specs = {
            let Some(comp) = self.tree.get(ptr.component) else {
                return;
            };
            let input = ShapeInput {
                component: comp,
                determining: &determining,
                flags: &self.flags,
            };
            (rule.shape)(&input)
        };
        let mut edge_vec: Vec<DependencyEdge> = Vec::new();
        for spec in &specs {
            self.instantiate_spec(ptr, spec, &old_edges, &mut edge_vec);
        }
        let edges: SmallVec<[DependencyEdge; 4]> = edge_vec.into();

        self.update_subscriptions(ptr, &old_edges, &edges, &old_shape_edges, &shape_edges);

        if let Some(cell) = self.cell_mut(ptr) {
            if edges != old_edges {
                trace!(?ptr, from = old_edges.len(), to = edges.len(), "dependency shape changed");
                // Old dependency values no longer line up; force recompute.
                cell.last_values.clear();
            }
            cell.edges = edges;
            cell.shape_edges = shape_edges;
            cell.flags.remove(VarFlags::SHAPE_STALE);
        }
    }

    /// Turn one symbolic spec into zero or more concrete edges.
    fn instantiate_spec(
        &mut self,
        ptr: VarPtr,
        spec: &DependencySpec,
        old_edges: &[DependencyEdge],
        out: &mut Vec<DependencyEdge>,
    ) {
        match spec {
            DependencySpec::StateVar { ptr: target, tag } => out.push(DependencyEdge {
                tag: DepTag::Var(*tag),
                source: DepSource::StateVar(*target),
            }),
            DependencySpec::Attribute { name, default } => {
                let attr = self
                    .tree
                    .get(ptr.component)
                    .and_then(|c| c.attributes.get(*name).cloned());
                let source = match attr {
                    None => DepSource::Literal(default.clone()),
                    Some(AttrValue::Literal(s)) => DepSource::Literal(StateValue::String(s)),
                    Some(AttrValue::Ref(target_name)) => self.reference_source(&target_name),
                };
                out.push(DependencyEdge {
                    tag: DepTag::Attribute(*name),
                    source,
                });
            }
            DependencySpec::Children(child_dep) => {
                let subscribers = self.child_subscribers.entry(ptr.component).or_default();
                if !subscribers.contains(&ptr) {
                    subscribers.push(ptr);
                }
                let rendered = self.rendered_children_for(ptr.component, Some(ptr));
                let mut sources: Vec<DepSource> = Vec::new();
                for child in rendered {
                    match child {
                        RenderedChild::Text(s) => {
                            if child_dep.include_text {
                                sources.push(DepSource::Literal(StateValue::String(s)));
                            }
                        }
                        RenderedChild::ErrorMarker { message, .. } => {
                            sources.push(DepSource::Literal(StateValue::Error(message)));
                        }
                        RenderedChild::Component(ck) => {
                            let Some(comp) = self.tree.get(ck) else {
                                continue;
                            };
                            if comp.component_type == crate::types::ComponentType::Error {
                                let message = comp
                                    .error_message
                                    .clone()
                                    .unwrap_or_else(|| "invalid component".to_string());
                                sources.push(DepSource::Literal(StateValue::Error(message)));
                                continue;
                            }
                            if let Some(types) = child_dep.types {
                                if !types.contains(&comp.component_type) {
                                    continue;
                                }
                            }
                            if let Some(var) = comp.var_index(child_dep.var) {
                                sources
                                    .push(DepSource::StateVar(VarPtr { component: ck, var }));
                            }
                        }
                    }
                }
                for (index, source) in sources.into_iter().enumerate() {
                    out.push(DependencyEdge {
                        tag: DepTag::Child(index),
                        source,
                    });
                }
            }
            DependencySpec::Flag { name } => {
                let subscribers = self.flag_subscribers.entry(name.to_string()).or_default();
                if !subscribers.contains(&ptr) {
                    subscribers.push(ptr);
                }
                out.push(DependencyEdge {
                    tag: DepTag::Flag(*name),
                    source: DepSource::Flag(name),
                });
            }
            DependencySpec::Essential => out.push(DependencyEdge {
                tag: DepTag::Essential,
                source: DepSource::OwnEssential,
            }),
            DependencySpec::Counter { kind } => {
                // Serial numbers are allocated once, in document order, and
                // survive re-instantiation of the shape.
                let previous = old_edges
                    .iter()
                    .find(|e| e.tag == DepTag::Counter(*kind))
                    .cloned();
                match previous {
                    Some(edge) => out.push(edge),
                    None => {
                        let n = self.counters.next(*kind);
                        out.push(DependencyEdge {
                            tag: DepTag::Counter(*kind),
                            source: DepSource::Literal(StateValue::Integer(n)),
                        });
                    }
                }
            }
        }
    }

    /// Resolve a `$name` attribute reference to the target's primary
    /// variable, or an error literal when it cannot be chased.
    pub(crate) fn reference_source(&self, target_name: &str) -> DepSource {
        let Some(target_key) = self.tree.by_name(target_name) else {
            return DepSource::Literal(StateValue::Error(format!(
                "no component named `{target_name}`"
            )));
        };
        let Some(target) = self.tree.get(target_key) else {
            return DepSource::Literal(vanished());
        };
        let primary = crate::components::profile(target.component_type).primary_var;
        match primary.and_then(|name| target.var_index(name)) {
            Some(var) => DepSource::StateVar(VarPtr {
                component: target_key,
                var,
            }),
            None => DepSource::Literal(StateValue::Error(format!(
                "component `{target_name}` cannot be referenced by value"
            ))),
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    fn update_subscriptions(
        &mut self,
        ptr: VarPtr,
        old_edges: &[DependencyEdge],
        new_edges: &[DependencyEdge],
        old_shape: &[DependencyEdge],
        new_shape: &[DependencyEdge],
    ) {
        let sources = |edges: &[DependencyEdge]| -> Vec<VarPtr> {
            edges
                .iter()
                .filter_map(|e| match e.source {
                    DepSource::StateVar(p) => Some(p),
                    _ => None,
                })
                .collect()
        };

        let (old, new) = (sources(old_edges), sources(new_edges));
        for src in &old {
            if !new.contains(src) {
                if let Some(cell) = self.cell_mut(*src) {
                    cell.dependents.retain(|d| *d != ptr);
                }
            }
        }
        for src in &new {
            if let Some(cell) = self.cell_mut(*src) {
                if !cell.dependents.contains(&ptr) {
                    cell.dependents.push(ptr);
                }
            }
        }

        let (old, new) = (sources(old_shape), sources(new_shape));
        for src in &old {
            if !new.contains(src) {
                if let Some(cell) = self.cell_mut(*src) {
                    cell.shape_dependents.retain(|d| *d != ptr);
                }
            }
        }
        for src in &new {
            if let Some(cell) = self.cell_mut(*src) {
                if !cell.shape_dependents.contains(&ptr) {
                    cell.shape_dependents.push(ptr);
                }
            }
        }
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Mark a variable stale and walk reverse edges marking all transitive
    /// dependents; value-shape dependents additionally get a shape pass.
    /// Nothing is recomputed here.
    pub(crate) fn invalidate(&mut self, ptr: VarPtr) {
        if let Some(cell) = self.cell_mut(ptr) {
            cell.flags.insert(VarFlags::STALE);
        } else {
            return;
        }
        let mut work = vec![ptr];
        while let Some(p) = work.pop() {
            let (dependents, shape_dependents) = match self.cell(p) {
                Some(cell) => (cell.dependents.clone(), cell.shape_dependents.clone()),
                None => continue,
            };
            for d in dependents {
                if let Some(cell) = self.cell_mut(d) {
                    if !cell.flags.contains(VarFlags::STALE) {
                        cell.flags.insert(VarFlags::STALE);
                        work.push(d);
                    }
                }
            }
            for d in shape_dependents {
                if let Some(cell) = self.cell_mut(d) {
                    if !cell.flags.contains(VarFlags::SHAPE_STALE) {
                        cell.flags.insert(VarFlags::STALE | VarFlags::SHAPE_STALE);
                        work.push(d);
                    }
                }
            }
        }
    }

    /// A component's rendered child list changed (composite re-expansion):
    /// every variable whose shape read those children must re-shape.
    pub(crate) fn notify_child_shape(&mut self, parent: ComponentKey) {
        let subscribers = self
            .child_subscribers
            .get(&parent)
            .cloned()
            .unwrap_or_default();
        for ptr in subscribers {
            if let Some(cell) = self.cell_mut(ptr) {
                cell.flags.insert(VarFlags::STALE | VarFlags::SHAPE_STALE);
            }
            self.invalidate(ptr);
        }
    }

    /// Write an essential slot and push invalidation to all dependents.
    pub(crate) fn write_essential(&mut self, ptr: VarPtr, value: StateValue) {
        trace!(?ptr, "essential write");
        if let Some(cell) = self.cell_mut(ptr) {
            cell.essential = Some(value);
        }
        self.invalidate(ptr);
    }
}

// =============================================================================
// Tests
// =============================================================================
