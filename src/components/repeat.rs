//! Repeat: a composite that instantiates its template `count` times.
//! Expansion itself lives in the engine; the profile only defines how
//! `count` is computed.

use crate::engine::{
    DependencyRule, DependencySpec, DependencyValues, ShapeInput, StateVarDef,
};
use crate::types::{ComponentType, StateValue};

use super::Profile;

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Repeat,
    vars,
    actions: &[],
    primary_var: None,
};

fn vars() -> Vec<StateVarDef> {
    vec![StateVarDef::computed(
        "count",
        DependencyRule::fixed(count_shape),
        count_def,
    )]
}

fn count_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![DependencySpec::Attribute {
        name: "count",
        default: StateValue::String("0".to_string()),
    }]
}

fn count_def(d: &DependencyValues<'_>) -> StateValue {
    let Some(raw) = d.attribute("count") else {
        return StateValue::Integer(0);
    };
    match raw.as_integer() {
        Some(n) => StateValue::Integer(n),
        None => StateValue::Error(format!("invalid repeat count `{}`", raw.to_text())),
    }
}
