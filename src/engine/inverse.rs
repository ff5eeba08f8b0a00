//! Inverse Resolution - routing requested values back to essential state.
//!
//! A forward definition computes a value from dependencies; an inverse
//! definition answers "what should my dependencies become so that I take
//! this value". Requests chain downward until they land on essential
//! slots, the only true mutable state.
//!
//! Application is atomic: the full chain is planned first, and only a plan
//! that reaches essential slots everywhere is applied. Any failure along
//! the way (a variable with no inverse, a fixed dependency, an
//! over-deep chain) leaves the document untouched.

use tracing::{debug, trace};

use crate::types::StateValue;

use super::dependency::{DepSource, DependencyValues, ResolvedDep};
use super::variable::{InverseInstruction, InverseResult, VarFlags, VarKind};
use super::{Document, VarPtr};

/// Guards against inverse chains that never reach essential state.
const MAX_INVERSE_DEPTH: usize = 32;

#[derive(Debug)]
struct EssentialWrite {
    ptr: VarPtr,
    value: StateValue,
}

impl Document {
    /// Request that one variable take a value.
    pub fn request_value(&mut self, ptr: VarPtr, value: StateValue) -> Result<(), String> {
        self.request_values(vec![(ptr, value)])
    }

    /// Request that several variables take values, atomically: either
    /// every request lands on essential state, or nothing changes.
    pub fn request_values(
        &mut self,
        requests: Vec<(VarPtr, StateValue)>,
    ) -> Result<(), String> {
        let mut plan: Vec<EssentialWrite> = Vec::new();
        for (ptr, value) in requests {
            self.plan_inverse(ptr, value, 0, &mut plan)?;
        }
        debug!(writes = plan.len(), "applying inverse plan");
        for write in plan {
            self.write_essential(write.ptr, write.value);
        }
        Ok(())
    }

    fn plan_inverse(
        &mut self,
        ptr: VarPtr,
        value: StateValue,
        depth: usize,
        plan: &mut Vec<EssentialWrite>,
    ) -> Result<(), String> {
        if depth > MAX_INVERSE_DEPTH {
            return Err("inverse chain exceeds maximum depth".to_string());
        }
        let def = self
            .def(ptr)
            .ok_or_else(|| "component no longer exists".to_string())?;
        trace!(var = def.name, depth, "planning inverse");

        let inverse = match def.kind {
            VarKind::Essential { .. } => {
                plan.push(EssentialWrite { ptr, value });
                return Ok(());
            }
            VarKind::Computed { .. } => {
                return Err(format!("variable `{}` cannot be changed", def.name));
            }
            VarKind::ComputedWithInverse { inverse, .. } => inverse,
        };

        // The inverse reads current dependency values; bring them up to
        // date so the edge list and memoized values line up.
        self.resolve(ptr);
        let (edges, resolved) = {
            let cell = self
                .cell(ptr)
                .ok_or_else(|| "component no longer exists".to_string())?;
            if cell.flags.contains(VarFlags::CYCLE) {
                return Err("circular dependency detected".to_string());
            }
            let resolved: Vec<ResolvedDep> = cell
                .edges
                .iter()
                .zip(cell.last_values.iter())
                .map(|(edge, value)| ResolvedDep {
                    tag: edge.tag.clone(),
                    value: value.clone(),
                })
                .collect();
            (cell.edges.clone(), resolved)
        };

        let view = DependencyValues::new(&resolved);
        let instructions = match inverse(&value, &view) {
            InverseResult::Set(instructions) => instructions,
            InverseResult::Failure(reason) => return Err(reason.to_string()),
        };

        for instruction in instructions {
            match instruction {
                InverseInstruction::SetEssential { value } => {
                    plan.push(EssentialWrite { ptr, value });
                }
                InverseInstruction::SetDependency { index, value } => {
                    match edges.get(index).map(|e| &e.source) {
                        Some(DepSource::StateVar(target)) => {
                            self.plan_inverse(*target, value, depth + 1, plan)?;
                        }
                        Some(DepSource::OwnEssential) => {
                            plan.push(EssentialWrite { ptr, value });
                        }
                        Some(DepSource::Flag(name)) => {
                            return Err(format!("cannot change document flag `{name}`"));
                        }
                        Some(DepSource::Literal(_)) => {
                            return Err(format!(
                                "variable `{}` depends on a fixed value",
                                def.name
                            ));
                        }
                        None => {
                            return Err(format!(
                                "inverse of `{}` addressed a missing dependency",
                                def.name
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dast::DastRoot;
    use crate::engine::dependency::DependencySpec;
    use crate::engine::variable::{DependencyRule, StateVarDef};
    use crate::engine::ShapeInput;
    use crate::types::ComponentType;

    fn shape_raw(input: &ShapeInput<'_>) -> Vec<DependencySpec> {
        vec![DependencySpec::StateVar {
            ptr: VarPtr {
                component: input.component.key,
                var: input.component.var_index("raw").unwrap(),
            },
            tag: "src",
        }]
    }

    fn shape_double(input: &ShapeInput<'_>) -> Vec<DependencySpec> {
        vec![DependencySpec::StateVar {
            ptr: VarPtr {
                component: input.component.key,
                var: input.component.var_index("double").unwrap(),
            },
            tag: "src",
        }]
    }

    fn def_twice(d: &DependencyValues<'_>) -> StateValue {
        let n = d.var("src").map(|v| v.to_number()).unwrap_or(f64::NAN);
        StateValue::Number(n * 2.0)
    }

    fn inv_half(requested: &StateValue, _d: &DependencyValues<'_>) -> InverseResult {
        InverseResult::Set(vec![InverseInstruction::SetDependency {
            index: 0,
            value: StateValue::Number(requested.to_number() / 2.0),
        }])
    }

    fn def_identity(d: &DependencyValues<'_>) -> StateValue {
        d.var("src")
            .cloned()
            .unwrap_or(StateValue::Number(f64::NAN))
    }

    fn setup() -> (Document, VarPtr, VarPtr, VarPtr, VarPtr) {
        let mut doc = Document::new(&DastRoot::default());
        let root = doc.tree.root;
        let defs = vec![
            StateVarDef::essential("raw", || StateValue::Number(1.0)),
            StateVarDef::computed_with_inverse(
                "double",
                DependencyRule::fixed(shape_raw),
                def_twice,
                inv_half,
            ),
            StateVarDef::computed_with_inverse(
                "quad",
                DependencyRule::fixed(shape_double),
                def_twice,
                inv_half,
            ),
            StateVarDef::computed("frozen", DependencyRule::fixed(shape_raw), def_identity),
        ];
        let key = doc
            .tree
            .create_with_defs(ComponentType::Number, Some(root), None, defs);
        let raw = doc.var_ptr(key, "raw").unwrap();
        let double = doc.var_ptr(key, "double").unwrap();
        let quad = doc.var_ptr(key, "quad").unwrap();
        let frozen = doc.var_ptr(key, "frozen").unwrap();
        (doc, raw, double, quad, frozen)
    }

    #[test]
    fn test_round_trip_through_chain() {
        let (mut doc, raw, double, quad, _) = setup();
        assert_eq!(doc.resolve(quad), StateValue::Number(4.0));

        doc.request_value(quad, StateValue::Number(40.0)).unwrap();
        assert_eq!(doc.resolve(raw), StateValue::Number(10.0));
        assert_eq!(doc.resolve(double), StateValue::Number(20.0));
        assert_eq!(doc.resolve(quad), StateValue::Number(40.0));
    }

    #[test]
    fn test_no_inverse_fails_without_side_effects() {
        let (mut doc, raw, _, _, frozen) = setup();
        assert_eq!(doc.resolve(frozen), StateValue::Number(1.0));

        let err = doc
            .request_value(frozen, StateValue::Number(9.0))
            .unwrap_err();
        assert!(err.contains("cannot be changed"));
        assert_eq!(doc.resolve(raw), StateValue::Number(1.0));
        assert_eq!(doc.resolve(frozen), StateValue::Number(1.0));
    }

    #[test]
    fn test_batch_is_atomic() {
        let (mut doc, raw, double, _, frozen) = setup();
        // The second request fails, so the first must not land either.
        let result = doc.request_values(vec![
            (double, StateValue::Number(100.0)),
            (frozen, StateValue::Number(1.0)),
        ]);
        assert!(result.is_err());
        assert_eq!(doc.resolve(raw), StateValue::Number(1.0));
        assert_eq!(doc.resolve(double), StateValue::Number(2.0));
    }
}
