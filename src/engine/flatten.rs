//! Flattening - projecting the component tree into renderer output.
//!
//! The flat form lists every rendered element by id, with its attribute
//! values, rendered children, and the subset of state marked for the
//! renderer. Composites never appear: their replacements are spliced in
//! their place, and a failed expansion becomes an error node.
//!
//! Flattening is also the evaluation sweep: every `for_render` variable is
//! resolved, and `must_evaluate` variables are resolved even when nothing
//! renders them, so their side conditions (counter assignment) happen in
//! document order.

use tracing::debug;

use crate::dast::{FlatDastChild, FlatDastElement, FlatDastError, FlatDastNode, FlatDastRoot};
use crate::types::StateValue;

use super::composite::RenderedChild;
use super::dependency::DepSource;
use super::tree::AttrValue;
use super::{ComponentKey, Document, VarPtr};

impl Document {
    /// Project the whole document into its flat rendered form.
    pub fn flatten(&mut self) -> FlatDastRoot {
        let mut elements = Vec::new();
        let root_id = self.flatten_component(self.tree.root, &mut elements);
        debug!(elements = elements.len(), "document flattened");
        FlatDastRoot {
            children: vec![FlatDastChild::Element { id: root_id }],
            elements,
        }
    }

    fn flatten_component(&mut self, key: ComponentKey, elements: &mut Vec<FlatDastNode>) -> usize {
        let (id, component_type, name, raw_attributes, defs) = match self.tree.get(key) {
            Some(comp) => (
                comp.id,
                comp.component_type,
                comp.name.clone(),
                comp.attributes.clone(),
                comp.defs.clone(),
            ),
            None => return 0,
        };

        if component_type == crate::types::ComponentType::Error {
            let message = self
                .tree
                .get(key)
                .and_then(|c| c.error_message.clone())
                .unwrap_or_else(|| "invalid component".to_string());
            elements.push(FlatDastNode::Error(FlatDastError { id, message }));
            return id;
        }

        let mut attributes = indexmap::IndexMap::new();
        for (attr_name, value) in raw_attributes {
            let resolved = match value {
                AttrValue::Literal(s) => StateValue::String(s),
                AttrValue::Ref(target) => match self.reference_source(&target) {
                    DepSource::StateVar(ptr) => self.resolve(ptr),
                    DepSource::Literal(v) => v,
                    _ => StateValue::String(String::new()),
                },
            };
            attributes.insert(attr_name, resolved);
        }

        let mut children = Vec::new();
        for child in self.rendered_children(key) {
            match child {
                RenderedChild::Text(s) => children.push(FlatDastChild::Text(s)),
                RenderedChild::Component(ck) => {
                    let child_id = self.flatten_component(ck, elements);
                    children.push(FlatDastChild::Element { id: child_id });
                }
                RenderedChild::ErrorMarker { id: marker_id, message } => {
                    elements.push(FlatDastNode::Error(FlatDastError {
                        id: marker_id,
                        message,
                    }));
                    children.push(FlatDastChild::Element { id: marker_id });
                }
            }
        }

        let mut state = indexmap::IndexMap::new();
        for (var, def) in defs.iter().enumerate() {
            if !def.for_render && !def.must_evaluate {
                continue;
            }
            let value = self.resolve(VarPtr { component: key, var });
            if def.for_render {
                state.insert(def.name.to_string(), value);
            }
        }

        elements.push(FlatDastNode::Element(FlatDastElement {
            id,
            component_type,
            name,
            attributes,
            children,
            state,
        }));
        id
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dast::DastElement;
    use crate::types::ComponentType;

    fn flat_element(root: &FlatDastRoot, id: usize) -> &FlatDastElement {
        match root.element(id) {
            Some(FlatDastNode::Element(el)) => el,
            other => panic!("expected element {id}, got {other:?}"),
        }
    }

    #[test]
    fn test_flatten_renders_state_and_children() {
        let root = DastElement::new("document")
            .child(DastElement::new("text").text("hello"))
            .into_root();
        let mut doc = Document::new(&root);
        let flat = doc.flatten();

        assert_eq!(flat.children.len(), 1);
        let FlatDastChild::Element { id: root_id } = flat.children[0] else {
            panic!("expected element root");
        };
        let document = flat_element(&flat, root_id);
        assert_eq!(document.component_type, ComponentType::Document);
        assert_eq!(document.children.len(), 1);

        let FlatDastChild::Element { id: text_id } = document.children[0] else {
            panic!("expected text element");
        };
        let text = flat_element(&flat, text_id);
        assert_eq!(
            text.state.get("text"),
            Some(&StateValue::String("hello".into()))
        );
        // "value" is internal, not marked for the renderer.
        assert!(text.state.get("value").is_none());
    }

    #[test]
    fn test_composites_are_spliced_not_rendered() {
        let root = DastElement::new("document")
            .child(
                DastElement::new("repeat")
                    .attr("count", "2")
                    .child(DastElement::new("text").text("x")),
            )
            .into_root();
        let mut doc = Document::new(&root);
        let flat = doc.flatten();

        let FlatDastChild::Element { id: root_id } = flat.children[0] else {
            panic!("expected element root");
        };
        let document = flat_element(&flat, root_id);
        assert_eq!(document.children.len(), 2);
        for node in &flat.elements {
            if let FlatDastNode::Element(el) = node {
                assert_ne!(el.component_type, ComponentType::Repeat);
            }
        }
    }

    #[test]
    fn test_unknown_tag_flattens_to_error_node() {
        let root = DastElement::new("document")
            .child(DastElement::new("blink"))
            .into_root();
        let mut doc = Document::new(&root);
        let flat = doc.flatten();

        let errors: Vec<_> = flat
            .elements
            .iter()
            .filter(|n| matches!(n, FlatDastNode::Error(_)))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_paragraph_numbering_in_document_order() {
        let root = DastElement::new("document")
            .child(DastElement::new("p").text("one"))
            .child(DastElement::new("p").text("two"))
            .into_root();
        let mut doc = Document::new(&root);
        let flat = doc.flatten();

        let numbers: Vec<_> = flat
            .elements
            .iter()
            .filter_map(|n| match n {
                FlatDastNode::Element(el) if el.component_type == ComponentType::Paragraph => {
                    el.state.get("number").cloned()
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            numbers,
            vec![StateValue::Integer(1), StateValue::Integer(2)]
        );
    }
}
