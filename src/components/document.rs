//! Document: the root container.
//!
//! Carries one rendered variable, `showCorrectness`, mirroring the
//! document-wide flag so renderers pick flag changes up through the
//! ordinary diff instead of a side channel.

use crate::engine::{DependencyRule, DependencySpec, DependencyValues, ShapeInput, StateVarDef};
use crate::flags::FLAG_SHOW_CORRECTNESS;
use crate::types::{ComponentType, StateValue};

use super::Profile;

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Document,
    vars,
    actions: &[],
    primary_var: None,
};

fn vars() -> Vec<StateVarDef> {
    vec![StateVarDef::computed(
        "showCorrectness",
        DependencyRule::fixed(show_correctness_shape),
        show_correctness_def,
    )
    .for_render()]
}

fn show_correctness_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![DependencySpec::Flag {
        name: FLAG_SHOW_CORRECTNESS,
    }]
}

fn show_correctness_def(d: &DependencyValues<'_>) -> StateValue {
    StateValue::Boolean(
        d.flag(FLAG_SHOW_CORRECTNESS)
            .map(|v| v.to_boolean())
            .unwrap_or(false),
    )
}
