//! Copy: a composite that expands to an independent snapshot of the
//! component its `source` attribute names. It declares no variables of
//! its own; the snapshot is taken by the engine's expansion pass.

use crate::types::ComponentType;

use super::{no_vars, Profile};

pub static PROFILE: Profile = Profile {
    component_type: ComponentType::Copy,
    vars: no_vars,
    actions: &[],
    primary_var: None,
};
