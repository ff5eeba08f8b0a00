//! Conditional: a composite showing its template when `condition` is true.

use crate::engine::{
    DependencyRule, DependencySpec, DependencyValues, ShapeInput, StateVarDef,
};
use crate::types::{ComponentType, StateValue};

use super::Profile;

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Conditional,
    vars,
    actions: &[],
    primary_var: None,
};

fn vars() -> Vec<StateVarDef> {
    vec![StateVarDef::computed(
        "condition",
        DependencyRule::fixed(condition_shape),
        condition_def,
    )]
}

fn condition_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![DependencySpec::Attribute {
        name: "condition",
        default: StateValue::String("false".to_string()),
    }]
}

fn condition_def(d: &DependencyValues<'_>) -> StateValue {
    StateValue::Boolean(
        d.attribute("condition")
            .map(|v| v.to_boolean())
            .unwrap_or(false),
    )
}
