//! Sum: the numeric total of its component children. Forward-only: it has
//! no inverse, so attempts to assign it fail cleanly.

use crate::core::Action;
use crate::engine::{
    ChildDep, ComponentKey, DependencyRule, DependencySpec, DependencyValues, Document,
    ShapeInput, StateVarDef,
};
use crate::error::CoreError;
use crate::types::{ComponentType, StateValue};

use super::{own_var, required_arg, var_ptr, Profile};

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Sum,
    vars,
    actions: &["updateValue"],
    primary_var: Some("value"),
};

fn vars() -> Vec<StateVarDef> {
    vec![
        StateVarDef::computed("value", DependencyRule::fixed(value_shape), value_def),
        StateVarDef::computed("text", DependencyRule::fixed(text_shape), text_def).for_render(),
    ]
}

fn value_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![DependencySpec::Children(ChildDep {
        var: "value",
        include_text: false,
        types: None,
    })]
}

fn value_def(d: &DependencyValues<'_>) -> StateValue {
    StateValue::Number(d.children().map(|v| v.to_number()).sum())
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

/// The action exists so clients can try; the request always fails at the
/// planning stage and leaves the document untouched.
pub(super) fn update_value(
    doc: &mut Document,
    key: ComponentKey,
    action: &Action,
) -> Result<(), CoreError> {
    let value = StateValue::Number(required_arg(&action.args, "value")?.to_number());
    let value_ptr = var_ptr(doc, key, "value")?;
    doc.request_value(value_ptr, value)
        .map_err(CoreError::ActionFailed)
}
