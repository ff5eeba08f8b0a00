//! Number input: like the text input, but values coerce to numbers at the
//! commit boundary. An unparseable entry commits as NaN.

use crate::core::Action;
use crate::engine::{
    ComponentKey, DependencyRule, DependencySpec, DependencyValues, Document, InverseInstruction,
    InverseResult, ShapeInput, StateVarDef,
};
use crate::error::CoreError;
use crate::types::{ComponentType, StateValue};

use super::{own_var, required_arg, var_ptr, Profile};

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::NumberInput,
    vars,
    actions: &["updateValue", "updateImmediateValue"],
    primary_var: Some("value"),
};

fn vars() -> Vec<StateVarDef> {
    vec![
        StateVarDef::computed_with_inverse(
            "value",
            DependencyRule::fixed(value_shape),
            value_def,
            set_essential_number,
        )
        .for_render(),
        StateVarDef::computed_with_inverse(
            "immediateValue",
            DependencyRule::fixed(immediate_shape),
            immediate_def,
            set_essential_number,
        )
        .for_render(),
        StateVarDef::computed("disabled", DependencyRule::fixed(disabled_shape), disabled_def)
            .for_render(),
    ]
}

fn value_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![
        DependencySpec::Attribute {
            name: "prefill",
            default: StateValue::String("0".to_string()),
        },
        DependencySpec::Essential,
    ]
}

fn value_def(d: &DependencyValues<'_>) -> StateValue {
    match d.essential() {
        Some(value) => value.clone(),
        None => StateValue::Number(
            d.attribute("prefill").map(|v| v.to_number()).unwrap_or(0.0),
        ),
    }
}

fn immediate_shape(input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    let mut specs = own_var(input, "value", "value");
    specs.push(DependencySpec::Essential);
    specs
}

fn immediate_def(d: &DependencyValues<'_>) -> StateValue {
    match d.essential() {
        Some(value) => value.clone(),
        None => d
            .var("value")
            .cloned()
            .unwrap_or(StateValue::Number(0.0)),
    }
}

// Re-resolved when `set_flags` changes the readOnly flag.
fn disabled_shape(_input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    vec![DependencySpec::Flag {
        name: crate::flags::FLAG_READ_ONLY,
    }]
}

fn disabled_def(d: &DependencyValues<'_>) -> StateValue {
    StateValue::Boolean(
        d.flag(crate::flags::FLAG_READ_ONLY)
            .map(|v| v.to_boolean())
            .unwrap_or(false),
    )
}

fn set_essential_number(requested: &StateValue, _d: &DependencyValues<'_>) -> InverseResult {
    InverseResult::Set(vec![InverseInstruction::SetEssential {
        value: StateValue::Number(requested.to_number()),
    }])
}

// =============================================================================
// Actions
// =============================================================================

pub(super) fn update_value(
    doc: &mut Document,
    key: ComponentKey,
    action: &Action,
) -> Result<(), CoreError> {
    let value = StateValue::Number(required_arg(&action.args, "value")?.to_number());
    let value_ptr = var_ptr(doc, key, "value")?;
    let immediate_ptr = var_ptr(doc, key, "immediateValue")?;
    doc.request_values(vec![(value_ptr, value.clone()), (immediate_ptr, value)])
        .map_err(CoreError::ActionFailed)
}

pub(super) fn update_immediate_value(
    doc: &mut Document,
    key: ComponentKey,
    action: &Action,
) -> Result<(), CoreError> {
    let value = StateValue::Number(required_arg(&action.args, "value")?.to_number());
    let immediate_ptr = var_ptr(doc, key, "immediateValue")?;
    doc.request_value(immediate_ptr, value)
        .map_err(CoreError::ActionFailed)
}
