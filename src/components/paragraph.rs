//! Paragraph: a container that carries a document-order serial number.

use crate::engine::{
    DependencyRule, DependencySpec, DependencyValues, ShapeInput, StateVarDef,
};
use crate::types::{ComponentType, StateValue};

use super::Profile;

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Paragraph,
    vars,
    actions: &[],
    primary_var: None,
};

fn vars() -> Vec<StateVarDef> {
    // Serial numbers must be assigned even if nothing reads them, so the
    // paragraph is numbered in document order rather than access order.
    vec![
        StateVarDef::computed("number", DependencyRule::fixed(number_shape), number_def)
            .for_render()
            .must_evaluate(),
    ]
}

fn number_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![DependencySpec::Counter { kind: "p" }]
}

fn number_def(d: &DependencyValues<'_>) -> StateValue {
    d.counter("p")
        .cloned()
        .unwrap_or(StateValue::Integer(0))
}
