//! Text component: renders the concatenated text of its children, or holds
//! its own essential string when it has none.

use crate::engine::{
    ChildDep, DepTag, DependencyRule, DependencySpec, DependencyValues, InverseInstruction,
    InverseResult, ShapeInput, StateVarDef,
};
use crate::types::{ComponentType, StateValue};

use super::{own_var, Profile};

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Text,
    vars,
    actions: &[],
    primary_var: Some("value"),
};

fn vars() -> Vec<StateVarDef> {
    vec![
        StateVarDef::computed_with_inverse(
            "value",
            DependencyRule::fixed(value_shape),
            value_def,
            value_inverse,
        ),
        StateVarDef::computed("text", DependencyRule::fixed(text_shape), text_def).for_render(),
    ]
}

fn value_shape(input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    if input.component.children.is_empty() {
        vec![DependencySpec::Essential]
    } else {
        vec![DependencySpec::Children(ChildDep {
            var: "value",
            include_text: true,
            types: None,
        })]
    }
}

fn value_def(d: &DependencyValues<'_>) -> StateValue {
    if d.index_of(&DepTag::Essential).is_some() {
        return d
            .essential()
            .cloned()
            .unwrap_or_else(|| StateValue::String(String::new()));
    }
    let mut text = String::new();
    for value in d.children() {
        text.push_str(&value.to_text());
    }
    StateValue::String(text)
}

fn value_inverse(requested: &StateValue, d: &DependencyValues<'_>) -> InverseResult {
    if d.index_of(&DepTag::Essential).is_some() {
        return InverseResult::Set(vec![InverseInstruction::SetEssential {
            value: StateValue::String(requested.to_text()),
        }]);
    }
    match d.single() {
        Some((index, _)) => InverseResult::Set(vec![InverseInstruction::SetDependency {
            index,
            value: requested.clone(),
        }]),
        None => InverseResult::Failure("cannot assign to text with multiple children"),
    }
}

fn text_shape(input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    own_var(input, "value", "value")
}

fn text_def(d: &DependencyValues<'_>) -> StateValue {
    match d.var("value") {
        Some(value) => StateValue::String(value.to_text()),
        None => StateValue::String(String::new()),
    }
}
