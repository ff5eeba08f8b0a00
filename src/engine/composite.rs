//! Composite Expansion - templates that generate rendered children.
//!
//! Composite components (`repeat`, `conditional`, `copy`) do not render
//! themselves. Their literal markup children are a template; expansion
//! produces a list of replacements that are spliced into the parent's
//! rendered children in the composite's place. Expansion is pull-driven:
//! nothing re-expands until someone asks for rendered children.
//!
//! Re-expansion reconciles instead of rebuilding. Replacements are matched
//! to the new shape by (position, component type); a match keeps the
//! existing component, so its identity and accumulated essential state
//! survive. Unmatched replacements are destroyed after their dependents
//! are invalidated, and new positions get fresh deep copies of the
//! template.

use tracing::{debug, trace};

use crate::types::{ComponentType, StateValue};

use super::tree::{AttrValue, ComponentChild};
use super::{ComponentKey, Document, VarPtr};

/// One slot of a computed replacement shape, identified by position and
/// component type for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplacementItem {
    Text(String),
    Component {
        /// Template component to deep-copy when the slot needs a fresh
        /// instance.
        source: ComponentKey,
        component_type: ComponentType,
    },
}

/// What a composite should currently expand to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacementShape {
    pub items: Vec<ReplacementItem>,
    /// A shape-level failure (bad count, missing copy source) renders as a
    /// single error marker instead of replacements.
    pub error: Option<String>,
}

/// Per-composite expansion state.
#[derive(Debug, Default)]
pub struct CompositeState {
    pub expanded: bool,
    pub shape: ReplacementShape,
    pub replacements: Vec<ComponentChild>,
    pub error: Option<String>,
}

/// One entry of a component's rendered child list, after splicing
/// composite replacements.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedChild {
    Text(String),
    Component(ComponentKey),
    /// A composite whose expansion failed; carries the composite's
    /// renderer id so the failure is addressable.
    ErrorMarker { id: usize, message: String },
}

impl Document {
    // =========================================================================
    // Rendered children
    // =========================================================================

    /// The child list of `key` as rendered: text and non-composite
    /// components verbatim, composites replaced by their (recursively
    /// spliced) replacements. Expands composites on demand.
    ///
    /// `subscriber` is the variable whose dependency shape is being built
    /// from this list, if any; it gets re-shaped when a spliced composite's
    /// driving value changes.
    pub(crate) fn rendered_children_for(
        &mut self,
        key: ComponentKey,
        subscriber: Option<VarPtr>,
    ) -> Vec<RenderedChild> {
        let children = match self.tree.get(key) {
            Some(comp) => comp.children.clone(),
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        for child in &children {
            self.render_child(child, subscriber, &mut out);
        }
        out
    }

    pub(crate) fn rendered_children(&mut self, key: ComponentKey) -> Vec<RenderedChild> {
        self.rendered_children_for(key, None)
    }

    fn render_child(
        &mut self,
        child: &ComponentChild,
        subscriber: Option<VarPtr>,
        out: &mut Vec<RenderedChild>,
    ) {
        match child {
            ComponentChild::Text(s) => out.push(RenderedChild::Text(s.clone())),
            ComponentChild::Component(ck) => {
                let Some(comp) = self.tree.get(*ck) else { return };
                if comp.composite.is_none() {
                    out.push(RenderedChild::Component(*ck));
                    return;
                }
                let id = comp.id;
                self.ensure_expanded(*ck);
                if let (Some(ptr), Some(driver)) = (subscriber, self.driving_var(*ck)) {
                    // Changes to the driving value must re-shape the
                    // subscriber even though it holds no edge to it.
                    if let Some(cell) = self.cell_mut(driver) {
                        if !cell.shape_dependents.contains(&ptr) {
                            cell.shape_dependents.push(ptr);
                        }
                    }
                }
                let (replacements, error) =
                    match self.tree.get(*ck).and_then(|c| c.composite.as_ref()) {
                        Some(state) => (state.replacements.clone(), state.error.clone()),
                        None => (Vec::new(), None),
                    };
                if let Some(message) = error {
                    out.push(RenderedChild::ErrorMarker { id, message });
                    return;
                }
                for rep in &replacements {
                    self.render_child(rep, subscriber, out);
                }
            }
        }
    }

    /// The variable whose value determines a composite's shape, if any.
    fn driving_var(&self, key: ComponentKey) -> Option<VarPtr> {
        let comp = self.tree.get(key)?;
        let name = match comp.component_type {
            ComponentType::Repeat => "count",
            ComponentType::Conditional => "condition",
            _ => return None,
        };
        self.var_ptr(key, name)
    }

    // =========================================================================
    // Expansion
    // =========================================================================

    /// Bring a composite's expansion up to date with its current shape.
    /// No-op for non-composites and for composites whose shape is
    /// unchanged.
    pub(crate) fn ensure_expanded(&mut self, key: ComponentKey) {
        let Some(comp) = self.tree.get(key) else { return };
        if comp.composite.is_none() {
            return;
        }
        let shape = self.replacement_shape(key);
        if let Some(state) = self.tree.get(key).and_then(|c| c.composite.as_ref()) {
            if state.expanded && state.shape == shape {
                return;
            }
        }
        self.reconcile(key, shape);
    }

    fn replacement_shape(&mut self, key: ComponentKey) -> ReplacementShape {
        let Some(comp) = self.tree.get(key) else {
            return ReplacementShape::default();
        };
        match comp.component_type {
            ComponentType::Repeat => self.repeat_shape(key),
            ComponentType::Conditional => self.conditional_shape(key),
            ComponentType::Copy => self.copy_shape(key),
            _ => ReplacementShape::default(),
        }
    }

    fn repeat_shape(&mut self, key: ComponentKey) -> ReplacementShape {
        let Some(count_ptr) = self.var_ptr(key, "count") else {
            return ReplacementShape::default();
        };
        let count = match self.resolve(count_ptr) {
            StateValue::Error(message) => return shape_error(message),
            value => match value.as_integer() {
                Some(n) if n >= 0 => n,
                Some(n) => {
                    return shape_error(format!("repeat count must not be negative, got {n}"));
                }
                None => return shape_error("repeat count must be an integer".to_string()),
            },
        };
        let template = self
            .tree
            .get(key)
            .map(|c| c.children.clone())
            .unwrap_or_default();
        let mut items = Vec::new();
        for _ in 0..count {
            for child in &template {
                items.push(self.template_item(child));
            }
        }
        ReplacementShape { items, error: None }
    }

    fn conditional_shape(&mut self, key: ComponentKey) -> ReplacementShape {
        let Some(cond_ptr) = self.var_ptr(key, "condition") else {
            return ReplacementShape::default();
        };
        let condition = match self.resolve(cond_ptr) {
            StateValue::Error(message) => return shape_error(message),
            value => value.to_boolean(),
        };
        if !condition {
            return ReplacementShape::default();
        }
        let template = self
            .tree
            .get(key)
            .map(|c| c.children.clone())
            .unwrap_or_default();
        let items = template.iter().map(|c| self.template_item(c)).collect();
        ReplacementShape { items, error: None }
    }

    /// A copy expands to one deep snapshot of its target. Live references
    /// go through `$name` attributes instead.
    fn copy_shape(&mut self, key: ComponentKey) -> ReplacementShape {
        let source = self
            .tree
            .get(key)
            .and_then(|c| c.attributes.get("source").cloned());
        let name = match source {
            Some(AttrValue::Ref(name)) | Some(AttrValue::Literal(name)) => name,
            None => return shape_error("copy requires a source".to_string()),
        };
        let Some(target) = self.tree.by_name(&name) else {
            return shape_error(format!("no component named `{name}`"));
        };
        if target == key || self.tree.is_ancestor(target, key) {
            return shape_error(format!("circular copy of `{name}`"));
        }
        let component_type = match self.tree.get(target) {
            Some(comp) => comp.component_type,
            None => return shape_error(format!("no component named `{name}`")),
        };
        ReplacementShape {
            items: vec![ReplacementItem::Component {
                source: target,
                component_type,
            }],
            error: None,
        }
    }

    fn template_item(&self, child: &ComponentChild) -> ReplacementItem {
        match child {
            ComponentChild::Text(s) => ReplacementItem::Text(s.clone()),
            ComponentChild::Component(ck) => ReplacementItem::Component {
                source: *ck,
                component_type: self
                    .tree
                    .get(*ck)
                    .map(|c| c.component_type)
                    .unwrap_or(ComponentType::Error),
            },
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Match existing replacements to the new shape by (position, type);
    /// matches keep their component (identity and essential state intact),
    /// everything else is destroyed or freshly copied.
    fn reconcile(&mut self, key: ComponentKey, shape: ReplacementShape) {
        let old: Vec<ComponentChild> = self
            .tree
            .get_mut(key)
            .and_then(|c| c.composite.as_mut())
            .map(|state| std::mem::take(&mut state.replacements))
            .unwrap_or_default();

        let mut replacements: Vec<ComponentChild> = Vec::with_capacity(shape.items.len());
        let mut retired: Vec<ComponentKey> = Vec::new();

        for (position, item) in shape.items.iter().enumerate() {
            match item {
                ReplacementItem::Text(s) => {
                    if let Some(ComponentChild::Component(ck)) = old.get(position) {
                        retired.push(*ck);
                    }
                    replacements.push(ComponentChild::Text(s.clone()));
                }
                ReplacementItem::Component {
                    source,
                    component_type,
                } => {
                    let kept = match old.get(position) {
                        Some(ComponentChild::Component(ck))
                            if self.tree.get(*ck).map(|c| c.component_type)
                                == Some(*component_type) =>
                        {
                            Some(*ck)
                        }
                        other => {
                            if let Some(ComponentChild::Component(ck)) = other {
                                retired.push(*ck);
                            }
                            None
                        }
                    };
                    let ck = match kept {
                        Some(ck) => ck,
                        None => match self.tree.deep_copy(*source, Some(key)) {
                            Some(ck) => ck,
                            None => self.tree.create(
                                ComponentType::Error,
                                Some(key),
                                Some("template no longer exists".to_string()),
                            ),
                        },
                    };
                    replacements.push(ComponentChild::Component(ck));
                }
            }
        }
        for child in old.iter().skip(shape.items.len()) {
            if let ComponentChild::Component(ck) = child {
                retired.push(*ck);
            }
        }

        // Invalidate everything depending on the retired subtrees before
        // their keys die; later reads through a dead key yield an error.
        for ck in &retired {
            for k in self.tree.subtree_keys(*ck) {
                let cells = self.tree.get(k).map(|c| c.cells.len()).unwrap_or(0);
                for var in 0..cells {
                    self.invalidate(VarPtr { component: k, var });
                }
            }
        }
        for ck in &retired {
            self.tree.destroy_subtree(*ck);
        }

        let changed = {
            let Some(state) = self.tree.get_mut(key).and_then(|c| c.composite.as_mut()) else {
                return;
            };
            let changed =
                !state.expanded || state.replacements != replacements || state.error != shape.error;
            state.expanded = true;
            state.error = shape.error.clone();
            state.shape = shape;
            state.replacements = replacements;
            changed
        };

        if changed {
            debug!(retired = retired.len(), "composite re-expanded");
            if let Some(owner) = self.splice_owner(key) {
                self.notify_child_shape(owner);
            }
        } else {
            trace!("composite expansion unchanged");
        }
    }

    /// The nearest non-composite ancestor: the component whose rendered
    /// child list this composite's replacements are spliced into.
    fn splice_owner(&self, composite: ComponentKey) -> Option<ComponentKey> {
        let mut key = self.tree.get(composite)?.parent?;
        loop {
            let comp = self.tree.get(key)?;
            if comp.composite.is_none() {
                return Some(key);
            }
            key = comp.parent?;
        }
    }
}

fn shape_error(message: String) -> ReplacementShape {
    ReplacementShape {
        items: Vec::new(),
        error: Some(message),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dast::DastElement;

    // document > numberInput n (prefill 3), repeat count=$n > textInput
    fn setup() -> (Document, ComponentKey, ComponentKey) {
        let root = DastElement::new("document")
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
            .into_root();
        let doc = Document::new(&root);
        let n = doc.tree.by_name("n").unwrap();
        let repeat = match &doc.tree.get(doc.tree.root).unwrap().children[1] {
            ComponentChild::Component(ck) => *ck,
            _ => panic!("expected repeat component"),
        };
        (doc, n, repeat)
    }

    fn replacement_keys(doc: &Document, repeat: ComponentKey) -> Vec<ComponentKey> {
        doc.tree
            .get(repeat)
            .unwrap()
            .composite
            .as_ref()
            .unwrap()
            .replacements
            .iter()
            .filter_map(|c| match c {
                ComponentChild::Component(ck) => Some(*ck),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_repeat_expands_to_count() {
        let (mut doc, _, repeat) = setup();
        let rendered = doc.rendered_children(doc.tree.root);
        // numberInput plus three spliced textInputs; the repeat itself
        // does not appear.
        assert_eq!(rendered.len(), 4);
        assert!(matches!(rendered[0], RenderedChild::Component(_)));
        assert_eq!(replacement_keys(&doc, repeat).len(), 3);
    }

    #[test]
    fn test_reexpansion_preserves_identity_and_essential_state() {
        let (mut doc, n, repeat) = setup();
        doc.rendered_children(doc.tree.root);
        let before = replacement_keys(&doc, repeat);
        assert_eq!(before.len(), 3);

        // Give the first instance user state.
        let value = doc.var_ptr(before[0], "value").unwrap();
        doc.write_essential(value, StateValue::String("hello".into()));
        assert_eq!(doc.resolve(value), StateValue::String("hello".into()));

        // Grow to 5: first three keep their keys.
        let n_value = doc.var_ptr(n, "value").unwrap();
        doc.write_essential(n_value, StateValue::Number(5.0));
        doc.rendered_children(doc.tree.root);
        let grown = replacement_keys(&doc, repeat);
        assert_eq!(grown.len(), 5);
        assert_eq!(&grown[..3], &before[..]);

        // Shrink back to 3: survivors keep identity and essential state.
        doc.write_essential(n_value, StateValue::Number(3.0));
        doc.rendered_children(doc.tree.root);
        let shrunk = replacement_keys(&doc, repeat);
        assert_eq!(shrunk, before);
        assert_eq!(doc.resolve(value), StateValue::String("hello".into()));

        // The instances dropped in the shrink are really gone.
        assert!(!doc.tree.contains(grown[3]));
        assert!(!doc.tree.contains(grown[4]));
    }

    #[test]
    fn test_bad_count_renders_error_marker() {
        let root = DastElement::new("document")
            .child(
                DastElement::new("repeat")
                    .attr("count", "soon")
                    .child(DastElement::new("textInput")),
            )
            .into_root();
        let mut doc = Document::new(&root);
        let rendered = doc.rendered_children(doc.tree.root);
        assert_eq!(rendered.len(), 1);
        assert!(matches!(rendered[0], RenderedChild::ErrorMarker { .. }));
    }

    #[test]
    fn test_negative_count_renders_error_marker() {
        let root = DastElement::new("document")
            .child(
                DastElement::new("repeat")
                    .attr("count", "-2")
                    .child(DastElement::new("textInput")),
            )
            .into_root();
        let mut doc = Document::new(&root);
        let rendered = doc.rendered_children(doc.tree.root);
        // No replacements are produced; the marker carries the message.
        assert_eq!(rendered.len(), 1);
        match &rendered[0] {
            RenderedChild::ErrorMarker { message, .. } => {
                assert!(message.contains("negative"));
            }
            other => panic!("expected error marker, got {other:?}"),
        }
    }

    #[test]
    fn test_copy_snapshots_target() {
        let root = DastElement::new("document")
            .child(
                DastElement::new("textInput")
                    .attr("name", "src")
                    .attr("prefill", "orig"),
            )
            .child(DastElement::new("copy").ref_attr("source", "src"))
            .into_root();
        let mut doc = Document::new(&root);
        let rendered = doc.rendered_children(doc.tree.root);
        assert_eq!(rendered.len(), 2);

        let src = doc.tree.by_name("src").unwrap();
        let copy_key = match rendered[1] {
            RenderedChild::Component(ck) => ck,
            _ => panic!("expected component"),
        };
        assert_ne!(copy_key, src);
        // The snapshot has its own state: writing to the original does not
        // touch the copy.
        let src_value = doc.var_ptr(src, "value").unwrap();
        let copy_value = doc.var_ptr(copy_key, "value").unwrap();
        doc.write_essential(src_value, StateValue::String("changed".into()));
        assert_eq!(doc.resolve(copy_value), StateValue::String("orig".into()));
    }

    #[test]
    fn test_copy_unknown_source_is_error() {
        let root = DastElement::new("document")
            .child(DastElement::new("copy").ref_attr("source", "ghost"))
            .into_root();
        let mut doc = Document::new(&root);
        let rendered = doc.rendered_children(doc.tree.root);
        assert!(matches!(
            rendered[0],
            RenderedChild::ErrorMarker { .. }
        ));
    }

    #[test]
    fn test_conditional_toggles() {
        let root = DastElement::new("document")
            .child(
                DastElement::new("conditional")
                    .attr("condition", "true")
                    .child(DastElement::new("text").text("shown")),
            )
            .into_root();
        let mut doc = Document::new(&root);
        assert_eq!(doc.rendered_children(doc.tree.root).len(), 1);
    }
}
