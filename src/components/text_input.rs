//! Text input: user-editable text with a committed value and a
//! keystroke-level immediate value.
//!
//! Both variables are inverse-capable views over essential state; the
//! `prefill` attribute supplies the value before the first edit.

use crate::core::Action;
use crate::engine::{
    ComponentKey, DependencyRule, DependencySpec, DependencyValues, Document, InverseInstruction,
    InverseResult, ShapeInput, StateVarDef,
};
use crate::error::CoreError;
use crate::types::{ComponentType, StateValue};

use super::{own_var, required_arg, var_ptr, Profile};

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::TextInput,
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
            set_essential_string,
        )
        .for_render(),
        StateVarDef::computed_with_inverse(
            "immediateValue",
            DependencyRule::fixed(immediate_shape),
            immediate_def,
            set_essential_string,
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
            default: StateValue::String(String::new()),
        },
        DependencySpec::Essential,
    ]
}

fn value_def(d: &DependencyValues<'_>) -> StateValue {
    match d.essential() {
        Some(value) => value.clone(),
        None => StateValue::String(
            d.attribute("prefill").map(|v| v.to_text()).unwrap_or_default(),
        ),
    }
}

fn immediate_shape(input: &ShapeInput<'_>) -> Vec<DependencySpec> {
    let mut specs = own_var(input, "value", "value");
    specs.push(DependencySpec::Essential);
    specs
}

// Tracks the committed value until the user starts typing.
fn immediate_def(d: &DependencyValues<'_>) -> StateValue {
    match d.essential() {
        Some(value) => value.clone(),
        None => d
            .var("value")
            .cloned()
            .unwrap_or_else(|| StateValue::String(String::new())),
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

fn set_essential_string(requested: &StateValue, _d: &DependencyValues<'_>) -> InverseResult {
    InverseResult::Set(vec![InverseInstruction::SetEssential {
        value: StateValue::String(requested.to_text()),
    }])
}

// =============================================================================
// Actions
// =============================================================================

/// Commit a value: both the committed and immediate views move together.
pub(super) fn update_value(
    doc: &mut Document,
    key: ComponentKey,
    action: &Action,
) -> Result<(), CoreError> {
    let value = StateValue::String(required_arg(&action.args, "value")?.to_text());
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
    let value = StateValue::String(required_arg(&action.args, "value")?.to_text());
    let immediate_ptr = var_ptr(doc, key, "immediateValue")?;
    doc.request_value(immediate_ptr, value)
        .map_err(CoreError::ActionFailed)
}
