//! Core Boundary - the document lifecycle surface.
//!
//! Everything outside talks to a [`Core`]: feed it source, install flags,
//! ask for the rendered document, dispatch user actions, tear it down.
//! Inside, the core owns at most one live [`Document`] and the previously
//! returned flat tree, so action dispatch can answer with a minimal diff.
//!
//! All methods take `&mut self`: actions are inherently serialized, so two
//! dispatches can never interleave mid-update.
//!
//! Boundary failures (no document yet, unknown component id, unknown
//! action) are [`CoreError`]s. Content failures (a bad count, an
//! unresolvable reference) never surface here; they stay inside the
//! document as error values and render as error nodes.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::components;
use crate::dast::{diff_flat_dast, DastRoot, FlatDastRoot, FlatDastUpdate};
use crate::engine::Document;
use crate::error::CoreError;
use crate::flags::DocumentFlags;

/// A user-triggered action addressed to a rendered component.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Renderer id of the target component.
    pub component_id: usize,
    pub action_name: String,
    #[serde(default)]
    pub args: IndexMap<String, serde_json::Value>,
}

/// The outer shell around one document.
#[derive(Debug, Default)]
pub struct Core {
    document: Option<Document>,
    flags_installed: bool,
    terminated: bool,
    /// The flat tree as last handed out, the baseline for action diffs.
    previous_flat: Option<FlatDastRoot>,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install document source, replacing any previous document and all of
    /// its state. Also revives a terminated core.
    pub fn set_source(&mut self, dast: &DastRoot) {
        info!("installing document source");
        self.document = Some(Document::new(dast));
        self.flags_installed = false;
        self.terminated = false;
        self.previous_flat = None;
    }

    /// Install document flags. Requires source; variables that read a
    /// changed flag are invalidated, everything else keeps its cache.
    pub fn set_flags(&mut self, flags: DocumentFlags) -> Result<(), CoreError> {
        self.check_live()?;
        let document = self.document.as_mut().ok_or(CoreError::NotInitialized)?;
        document.install_flags(flags);
        self.flags_installed = true;
        Ok(())
    }

    /// Return the full rendered document, evaluating whatever it needs.
    /// This also becomes the baseline for subsequent action diffs.
    pub fn return_dast(&mut self) -> Result<FlatDastRoot, CoreError> {
        let document = self.ready()?;
        let flat = document.flatten();
        self.previous_flat = Some(flat.clone());
        Ok(flat)
    }

    /// Dispatch a user action and return the per-element updates it caused
    /// relative to the last returned tree.
    pub fn dispatch_action(
        &mut self,
        action: &Action,
    ) -> Result<IndexMap<usize, FlatDastUpdate>, CoreError> {
        let document = self.ready()?;
        let key = document
            .tree()
            .by_id(action.component_id)
            .ok_or(CoreError::UnknownComponent(action.component_id))?;
        let component_type = document
            .tree()
            .get(key)
            .map(|c| c.component_type)
            .ok_or(CoreError::UnknownComponent(action.component_id))?;
        let profile = components::profile(component_type);
        if !profile.actions.contains(&action.action_name.as_str()) {
            return Err(CoreError::UnknownAction {
                component_type: component_type.tag(),
                action: action.action_name.clone(),
            });
        }
        debug!(
            id = action.component_id,
            action = %action.action_name,
            "dispatching action"
        );

        components::handle_action(document, key, action)?;

        let baseline = match self.previous_flat.take() {
            Some(flat) => flat,
            // No tree handed out yet; diff against the pre-action shape.
            None => {
                // The action already ran, so this baseline is post-action;
                // report the full elements as changed instead.
                FlatDastRoot::default()
            }
        };
        let document = self.ready()?;
        let current = document.flatten();
        let updates = diff_flat_dast(&baseline, &current);
        self.previous_flat = Some(current);
        Ok(updates)
    }

    /// Tear the document down. Further calls fail with
    /// [`CoreError::Terminated`] until new source arrives.
    pub fn terminate(&mut self) {
        info!("terminating core");
        self.document = None;
        self.previous_flat = None;
        self.flags_installed = false;
        self.terminated = true;
    }

    /// The live document, if source and flags have both been installed.
    fn ready(&mut self) -> Result<&mut Document, CoreError> {
        self.check_live()?;
        if !self.flags_installed {
            return Err(CoreError::NotInitialized);
        }
        self.document.as_mut().ok_or(CoreError::NotInitialized)
    }

    fn check_live(&self) -> Result<(), CoreError> {
        if self.terminated {
            return Err(CoreError::Terminated);
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dast::DastElement;
    use crate::types::StateValue;

    fn source() -> DastRoot {
        DastElement::new("document")
            .child(DastElement::new("textInput").attr("name", "t"))
            .into_root()
    }

    #[test]
    fn test_lifecycle_ordering() {
        let mut core = Core::new();
        assert!(matches!(
            core.set_flags(DocumentFlags::new()),
            Err(CoreError::NotInitialized)
        ));

        core.set_source(&source());
        // Flags still missing.
        assert!(matches!(
            core.return_dast(),
            Err(CoreError::NotInitialized)
        ));

        core.set_flags(DocumentFlags::new()).unwrap();
        assert!(core.return_dast().is_ok());
    }

    #[test]
    fn test_terminate_then_revive() {
        let mut core = Core::new();
        core.set_source(&source());
        core.set_flags(DocumentFlags::new()).unwrap();
        core.terminate();
        assert!(matches!(core.return_dast(), Err(CoreError::Terminated)));
        assert!(matches!(
            core.set_flags(DocumentFlags::new()),
            Err(CoreError::Terminated)
        ));

        core.set_source(&source());
        core.set_flags(DocumentFlags::new()).unwrap();
        assert!(core.return_dast().is_ok());
    }

    #[test]
    fn test_unknown_component_and_action() {
        let mut core = Core::new();
        core.set_source(&source());
        core.set_flags(DocumentFlags::new()).unwrap();
        let flat = core.return_dast().unwrap();

        let missing = Action {
            component_id: 9999,
            action_name: "updateValue".to_string(),
            args: IndexMap::new(),
        };
        assert!(matches!(
            core.dispatch_action(&missing),
            Err(CoreError::UnknownComponent(9999))
        ));

        let input_id = flat
            .elements
            .iter()
            .filter_map(|n| match n {
                crate::dast::FlatDastNode::Element(el)
                    if el.component_type == crate::types::ComponentType::TextInput =>
                {
                    Some(el.id)
                }
                _ => None,
            })
            .next()
            .unwrap();
        let bogus = Action {
            component_id: input_id,
            action_name: "selfDestruct".to_string(),
            args: IndexMap::new(),
        };
        assert!(matches!(
            core.dispatch_action(&bogus),
            Err(CoreError::UnknownAction { .. })
        ));
    }

    fn ready(root: DastRoot) -> Core {
        let mut core = Core::new();
        core.set_source(&root);
        core.set_flags(DocumentFlags::new()).unwrap();
        core
    }

    fn named<'a>(flat: &'a FlatDastRoot, name: &str) -> &'a crate::dast::FlatDastElement {
        flat.elements
            .iter()
            .find_map(|n| match n {
                crate::dast::FlatDastNode::Element(el) if el.name.as_deref() == Some(name) => {
                    Some(el)
                }
                _ => None,
            })
            .unwrap_or_else(|| panic!("no element named {name}"))
    }

    fn number_arg(value: f64) -> IndexMap<String, serde_json::Value> {
        let mut args = IndexMap::new();
        args.insert("value".to_string(), serde_json::json!(value));
        args
    }

    fn update_value(core: &mut Core, id: usize, value: f64) -> IndexMap<usize, FlatDastUpdate> {
        core.dispatch_action(&Action {
            component_id: id,
            action_name: "updateValue".to_string(),
            args: number_arg(value),
        })
        .unwrap()
    }

    fn live_sum() -> DastRoot {
        DastElement::new("document")
            .child(
                DastElement::new("sum")
                    .attr("name", "total")
                    .child(
                        DastElement::new("numberInput")
                            .attr("name", "a")
                            .attr("prefill", "2"),
                    )
                    .child(
                        DastElement::new("numberInput")
                            .attr("name", "b")
                            .attr("prefill", "3"),
                    ),
            )
            .into_root()
    }

    #[test]
    fn test_action_updates_flow_through_diff() {
        let mut core = ready(live_sum());
        let flat = core.return_dast().unwrap();
        assert_eq!(
            named(&flat, "total").state.get("text"),
            Some(&StateValue::String("5".into()))
        );

        let a_id = named(&flat, "a").id;
        let total_id = named(&flat, "total").id;
        let updates = update_value(&mut core, a_id, 10.0);

        // Both the input and the sum report changed state; untouched
        // elements are absent from the diff.
        assert!(updates.contains_key(&a_id));
        assert_eq!(
            updates.get(&total_id).unwrap().changed_state.get("text"),
            Some(&StateValue::String("13".into()))
        );
        assert!(!updates.contains_key(&named(&flat, "b").id));
    }

    #[test]
    fn test_sum_has_no_inverse_and_fails_atomically() {
        let mut core = ready(live_sum());
        let before = core.return_dast().unwrap();
        let total_id = named(&before, "total").id;

        let result = core.dispatch_action(&Action {
            component_id: total_id,
            action_name: "updateValue".to_string(),
            args: number_arg(100.0),
        });
        assert!(matches!(result, Err(CoreError::ActionFailed(_))));

        // Nothing changed anywhere.
        let after = core.return_dast().unwrap();
        assert_eq!(before, after);
    }

    fn repeat_inputs() -> DastRoot {
        DastElement::new("document")
            .child(
                DastElement::new("numberInput")
                    .attr("name", "n")
                    .attr("prefill", "3"),
            )
            .child(
                DastElement::new("repeat")
                    .ref_attr("count", "n")
                    .child(DastElement::new("textInput")),
            )
            .into_root()
    }

    fn text_input_ids(flat: &FlatDastRoot) -> Vec<usize> {
        let root_id = match flat.children[0] {
            crate::dast::FlatDastChild::Element { id } => id,
            _ => panic!("expected element root"),
        };
        let Some(crate::dast::FlatDastNode::Element(document)) = flat.element(root_id) else {
            panic!("expected document element");
        };
        document
            .children
            .iter()
            .filter_map(|c| match c {
                crate::dast::FlatDastChild::Element { id } => match flat.element(*id) {
                    Some(crate::dast::FlatDastNode::Element(el))
                        if el.component_type == crate::types::ComponentType::TextInput =>
                    {
                        Some(*id)
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_repeat_resize_preserves_surviving_state() {
        let mut core = ready(repeat_inputs());
        let flat = core.return_dast().unwrap();
        let inputs = text_input_ids(&flat);
        assert_eq!(inputs.len(), 3);
        let n_id = named(&flat, "n").id;

        // Type into the first instance.
        let mut args = IndexMap::new();
        args.insert("value".to_string(), serde_json::json!("kept"));
        core.dispatch_action(&Action {
            component_id: inputs[0],
            action_name: "updateValue".to_string(),
            args,
        })
        .unwrap();

        // Grow, then shrink back. Surviving instances keep their renderer
        // ids and their edited state.
        update_value(&mut core, n_id, 5.0);
        let grown = core.return_dast().unwrap();
        let grown_inputs = text_input_ids(&grown);
        assert_eq!(grown_inputs.len(), 5);
        assert_eq!(&grown_inputs[..3], &inputs[..]);

        update_value(&mut core, n_id, 3.0);
        let shrunk = core.return_dast().unwrap();
        assert_eq!(text_input_ids(&shrunk), inputs);
        let first = match shrunk.element(inputs[0]) {
            Some(crate::dast::FlatDastNode::Element(el)) => el,
            other => panic!("expected element, got {other:?}"),
        };
        assert_eq!(
            first.state.get("value"),
            Some(&StateValue::String("kept".into()))
        );
    }

    #[test]
    fn test_action_driving_count_negative_reports_error() {
        let mut core = ready(repeat_inputs());
        let flat = core.return_dast().unwrap();
        assert_eq!(text_input_ids(&flat).len(), 3);
        let n_id = named(&flat, "n").id;

        // Driving the count below zero flips the repeat into error state;
        // the incremental payload carries the message.
        let updates = update_value(&mut core, n_id, -2.0);
        let message = updates
            .values()
            .find_map(|u| u.error.as_deref())
            .unwrap_or_else(|| panic!("no error update in {updates:?}"));
        assert!(message.contains("negative"));

        // The full tree agrees: no replacements, one error node.
        let flat = core.return_dast().unwrap();
        assert!(text_input_ids(&flat).is_empty());
        assert!(flat
            .elements
            .iter()
            .any(|n| matches!(n, crate::dast::FlatDastNode::Error(_))));
    }

    #[test]
    fn test_content_errors_stay_local() {
        let root = DastElement::new("document")
            .child(
                DastElement::new("repeat")
                    .attr("count", "many")
                    .child(DastElement::new("text").text("x")),
            )
            .child(
                DastElement::new("textInput")
                    .attr("name", "t")
                    .attr("prefill", "fine"),
            )
            .into_root();
        let mut core = ready(root);

        // The broken repeat renders as an error node; the sibling input is
        // untouched and still interactive.
        let flat = core.return_dast().unwrap();
        assert!(flat
            .elements
            .iter()
            .any(|n| matches!(n, crate::dast::FlatDastNode::Error(_))));
        let t_id = named(&flat, "t").id;
        assert_eq!(
            named(&flat, "t").state.get("value"),
            Some(&StateValue::String("fine".into()))
        );

        let mut args = IndexMap::new();
        args.insert("value".to_string(), serde_json::json!("edited"));
        let updates = core
            .dispatch_action(&Action {
                component_id: t_id,
                action_name: "updateValue".to_string(),
                args,
            })
            .unwrap();
        assert!(updates.contains_key(&t_id));
    }

    #[test]
    fn test_read_only_flag_blocks_mutation() {
        let mut core = Core::new();
        core.set_source(&live_sum());
        core.set_flags(DocumentFlags::new().with(crate::flags::FLAG_READ_ONLY, serde_json::json!(true)))
            .unwrap();
        let flat = core.return_dast().unwrap();
        let a_id = named(&flat, "a").id;

        let result = core.dispatch_action(&Action {
            component_id: a_id,
            action_name: "updateValue".to_string(),
            args: number_arg(9.0),
        });
        assert!(matches!(result, Err(CoreError::ActionFailed(_))));

        // Flipping the flag back re-enables the same action.
        core.set_flags(DocumentFlags::new()).unwrap();
        update_value(&mut core, a_id, 9.0);
    }

    #[test]
    fn test_set_flags_invalidates_flag_dependents() {
        let mut core = ready(live_sum());
        let flat = core.return_dast().unwrap();
        let crate::dast::FlatDastChild::Element { id: root_id } = flat.children[0] else {
            panic!("expected element root");
        };
        let document = |flat: &FlatDastRoot| match flat.element(root_id) {
            Some(crate::dast::FlatDastNode::Element(el)) => el.state.clone(),
            other => panic!("expected document element, got {other:?}"),
        };
        assert_eq!(
            named(&flat, "a").state.get("disabled"),
            Some(&StateValue::Boolean(false))
        );
        assert_eq!(
            document(&flat).get("showCorrectness"),
            Some(&StateValue::Boolean(false))
        );

        // Installing new flags must reach the already-resolved variables
        // that depend on them; a stale memo here would keep them false.
        core.set_flags(
            DocumentFlags::new()
                .with(crate::flags::FLAG_READ_ONLY, serde_json::json!(true))
                .with(crate::flags::FLAG_SHOW_CORRECTNESS, serde_json::json!(true)),
        )
        .unwrap();
        let flat = core.return_dast().unwrap();
        assert_eq!(
            named(&flat, "a").state.get("disabled"),
            Some(&StateValue::Boolean(true))
        );
        assert_eq!(
            named(&flat, "b").state.get("disabled"),
            Some(&StateValue::Boolean(true))
        );
        assert_eq!(
            document(&flat).get("showCorrectness"),
            Some(&StateValue::Boolean(true))
        );
    }

    #[test]
    fn test_return_dast_is_deterministic() {
        let mut core = ready(live_sum());
        let first = core.return_dast().unwrap();
        let second = core.return_dast().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_action_json_shape() {
        let action: Action = serde_json::from_str(
            r#"{"componentId": 3, "actionName": "updateValue", "args": {"value": "hi"}}"#,
        )
        .unwrap();
        assert_eq!(action.component_id, 3);
        assert_eq!(action.action_name, "updateValue");
        assert_eq!(action.args.len(), 1);
    }
}
