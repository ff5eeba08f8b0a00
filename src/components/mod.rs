//! Component Profiles - the per-type catalog of variables and actions.
//!
//! A profile is static data: which state variables a component type
//! declares (with their dependency rules, definitions, and inverses),
//! which actions it accepts, and which variable a `$name` reference
//! resolves to. The engine owns all evaluation; profiles only describe.

pub mod boolean;
pub mod conditional;
pub mod copy;
pub mod document;
pub mod number;
pub mod number_input;
pub mod paragraph;
pub mod repeat;
pub mod sum;
pub mod text;
pub mod text_input;

use indexmap::IndexMap;

use crate::core::Action;
use crate::engine::{ComponentKey, DependencySpec, Document, ShapeInput, StateVarDef, VarPtr};
use crate::error::CoreError;
use crate::types::{ComponentType, StateValue};

/// Static description of one component type.
pub struct Profile {
    pub component_type: ComponentType,
    /// Fresh variable definitions for a new instance.
    pub vars: fn() -> Vec<StateVarDef>,
    /// Action names this type accepts.
    pub actions: &'static [&'static str],
    /// The variable a `$name` reference reads, if the type has one.
    pub primary_var: Option<&'static str>,
}

pub(crate) fn no_vars() -> Vec<StateVarDef> {
    Vec::new()
}

static ERROR: Profile = Profile {
    component_type: ComponentType::Error,
    vars: no_vars,
    actions: &[],
    primary_var: None,
};

pub fn profile(component_type: ComponentType) -> &'static Profile {
    match component_type {
        ComponentType::Document => &document::PROFILE,
        ComponentType::Text => &text::PROFILE,
        ComponentType::Number => &number::PROFILE,
        ComponentType::Boolean => &boolean::PROFILE,
        ComponentType::Paragraph => &paragraph::PROFILE,
        ComponentType::TextInput => &text_input::PROFILE,
        ComponentType::NumberInput => &number_input::PROFILE,
        ComponentType::Sum => &sum::PROFILE,
        ComponentType::Repeat => &repeat::PROFILE,
        ComponentType::Conditional => &conditional::PROFILE,
        ComponentType::Copy => &copy::PROFILE,
        ComponentType::Error => &ERROR,
    }
}

/// Run an action against a component. The caller has already checked the
/// action name against the profile.
pub fn handle_action(
    doc: &mut Document,
    key: ComponentKey,
    action: &Action,
) -> Result<(), CoreError> {
    if doc.flags().read_only() {
        return Err(CoreError::ActionFailed("document is read-only".to_string()));
    }
    let component_type = doc
        .tree()
        .get(key)
        .map(|c| c.component_type)
        .ok_or_else(|| CoreError::ActionFailed("component no longer exists".to_string()))?;
    match (component_type, action.action_name.as_str()) {
        (ComponentType::TextInput, "updateValue") => text_input::update_value(doc, key, action),
        (ComponentType::TextInput, "updateImmediateValue") => {
            text_input::update_immediate_value(doc, key, action)
        }
        (ComponentType::NumberInput, "updateValue") => number_input::update_value(doc, key, action),
        (ComponentType::NumberInput, "updateImmediateValue") => {
            number_input::update_immediate_value(doc, key, action)
        }
        (ComponentType::Sum, "updateValue") => sum::update_value(doc, key, action),
        _ => Err(CoreError::UnknownAction {
            component_type: component_type.tag(),
            action: action.action_name.clone(),
        }),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// A dependency on a sibling variable of the same component, by name.
pub(crate) fn own_var(
    input: &ShapeInput<'_>,
    name: &str,
    tag: &'static str,
) -> Vec<DependencySpec> {
    input
        .component
        .var_index(name)
        .map(|var| DependencySpec::StateVar {
            ptr: VarPtr {
                component: input.component.key,
                var,
            },
            tag,
        })
        .into_iter()
        .collect()
}

/// Fetch a required action argument as a state value.
pub(crate) fn required_arg(
    args: &IndexMap<String, serde_json::Value>,
    name: &str,
) -> Result<StateValue, CoreError> {
    args.get(name)
        .and_then(StateValue::from_json)
        .ok_or_else(|| CoreError::InvalidArgument(format!("missing or invalid argument `{name}`")))
}

pub(crate) fn var_ptr(
    doc: &Document,
    key: ComponentKey,
    name: &str,
) -> Result<VarPtr, CoreError> {
    doc.var_ptr(key, name)
        .ok_or_else(|| CoreError::ActionFailed(format!("component has no variable `{name}`")))
}
