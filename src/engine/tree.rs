//! Component Tree - arena, identity, and construction from parsed source.
//!
//! Manages the lifecycle of components:
//! - Generational arena (stale keys fail lookups instead of aliasing)
//! - Renderer id <-> key bidirectional mapping
//! - Document-wide name registry for `$name` references
//! - Subtree destruction and deep copies for replacement expansion
//!
//! A component's renderer id is assigned once at creation and never reused
//! for a different component, so the embedder can address action targets
//! across re-flattenings as long as the component survives.

use indexmap::IndexMap;
use slotmap::SlotMap;
use tracing::trace;

use crate::dast::{DastAttribute, DastNode, DastRoot};
use crate::types::ComponentType;

use super::composite::CompositeState;
use super::variable::{StateVarDef, VarCell};
use super::ComponentKey;

// =============================================================================
// Components
// =============================================================================

/// One ordered child slot: a component or literal text.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentChild {
    Component(ComponentKey),
    Text(String),
}

/// An attribute as stored on a component: a literal string or a reference
/// to a named component.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Literal(String),
    Ref(String),
}

/// A typed node in the document's logical tree, owning its state variables.
#[derive(Debug)]
pub struct Component {
    pub key: ComponentKey,
    /// Stable renderer-facing id.
    pub id: usize,
    pub component_type: ComponentType,
    pub parent: Option<ComponentKey>,
    /// Literal markup children. For composites these are the replacement
    /// template, not what renders.
    pub children: Vec<ComponentChild>,
    pub attributes: IndexMap<String, AttrValue>,
    /// Registered name from the `name` attribute, if any. Replacement copies
    /// never carry names (the registry maps each name to one component).
    pub name: Option<String>,
    /// Variable table, fixed per component type.
    pub defs: Vec<StateVarDef>,
    /// Runtime cells parallel to `defs`.
    pub cells: Vec<VarCell>,
    /// Expansion state; `Some` exactly for composite types.
    pub composite: Option<CompositeState>,
    /// Message carried by `Error` components.
    pub error_message: Option<String>,
}

impl Component {
    /// Index of a variable by name.
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|def| def.name == name)
    }
}

// =============================================================================
// Tree
// =============================================================================

/// The arena of components plus identity registries.
#[derive(Debug)]
pub struct ComponentTree {
    components: SlotMap<ComponentKey, Component>,
    names: IndexMap<String, ComponentKey>,
    ids: IndexMap<usize, ComponentKey>,
    next_id: usize,
    pub root: ComponentKey,
}

impl ComponentTree {
    /// Build the tree from a parsed source document.
    ///
    /// A sole top-level `<document>` element becomes the root; any other
    /// top-level content is wrapped in a synthesized document component.
    pub fn build(dast: &DastRoot) -> Self {
        let mut tree = Self {
            components: SlotMap::with_key(),
            names: IndexMap::new(),
            ids: IndexMap::new(),
            next_id: 0,
            root: ComponentKey::default(),
        };

        let root = match dast.children.as_slice() {
            [DastNode::Element(el)] if el.name == "document" => {
                let key = tree.create(ComponentType::Document, None, None);
                tree.apply_element(key, el);
                key
            }
            _ => {
                let key = tree.create(ComponentType::Document, None, None);
                let children: Vec<ComponentChild> = dast
                    .children
                    .iter()
                    .filter_map(|node| tree.build_node(node, key))
                    .collect();
                tree.component_mut(key).children = children;
                key
            }
        };
        tree.root = root;
        tree
    }

    /// Create a bare component of a given type with its profile's variables.
    pub(crate) fn create(
        &mut self,
        component_type: ComponentType,
        parent: Option<ComponentKey>,
        error_message: Option<String>,
    ) -> ComponentKey {
        let defs = (crate::components::profile(component_type).vars)();
        self.create_with_defs(component_type, parent, error_message, defs)
    }

    /// Create a component with an explicit variable table. Production code
    /// always goes through [`ComponentTree::create`]; resolver unit tests use
    /// this to install synthetic definitions.
    pub(crate) fn create_with_defs(
        &mut self,
        component_type: ComponentType,
        parent: Option<ComponentKey>,
        error_message: Option<String>,
        defs: Vec<StateVarDef>,
    ) -> ComponentKey {
        let id = self.next_id;
        self.next_id += 1;
        let cells = defs.iter().map(|_| VarCell::default()).collect();
        let key = self.components.insert_with_key(|key| Component {
            key,
            id,
            component_type,
            parent,
            children: Vec::new(),
            attributes: IndexMap::new(),
            name: None,
            defs,
            cells,
            composite: component_type.is_composite().then(CompositeState::default),
            error_message,
        });
        self.ids.insert(id, key);
        trace!(id, ?component_type, "created component");
        key
    }

    fn build_node(&mut self, node: &DastNode, parent: ComponentKey) -> Option<ComponentChild> {
        match node {
            DastNode::Text { value } => Some(ComponentChild::Text(value.clone())),
            DastNode::Element(el) => {
                let key = match ComponentType::from_tag(&el.name) {
                    Some(ct) => {
                        let key = self.create(ct, Some(parent), None);
                        self.apply_element(key, el);
                        key
                    }
                    None => self.create(
                        ComponentType::Error,
                        Some(parent),
                        Some(format!("unknown component type <{}>", el.name)),
                    ),
                };
                Some(ComponentChild::Component(key))
            }
            // An inline `$name` macro renders as a copy of the target.
            DastNode::Ref { name } => {
                let key = self.create(ComponentType::Copy, Some(parent), None);
                self.component_mut(key)
                    .attributes
                    .insert("source".to_string(), AttrValue::Ref(name.clone()));
                Some(ComponentChild::Component(key))
            }
            DastNode::Error { message } => {
                let key = self.create(ComponentType::Error, Some(parent), Some(message.clone()));
                Some(ComponentChild::Component(key))
            }
        }
    }

    /// Fill a freshly created component from its parsed element.
    fn apply_element(&mut self, key: ComponentKey, el: &crate::dast::DastElement) {
        for (attr_name, attr) in &el.attributes {
            let value = parse_attribute(attr);
            if attr_name == "name" {
                if let AttrValue::Literal(name) = &value {
                    self.component_mut(key).name = Some(name.clone());
                    self.names.insert(name.clone(), key);
                }
                continue;
            }
            self.component_mut(key)
                .attributes
                .insert(attr_name.clone(), value);
        }
        let children: Vec<ComponentChild> = el
            .children
            .iter()
            .filter_map(|node| self.build_node(node, key))
            .collect();
        self.component_mut(key).children = children;
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get(&self, key: ComponentKey) -> Option<&Component> {
        self.components.get(key)
    }

    pub fn get_mut(&mut self, key: ComponentKey) -> Option<&mut Component> {
        self.components.get_mut(key)
    }

    /// Like `get_mut` but panics on dangling keys; for code paths that just
    /// created or verified the component.
    pub(crate) fn component_mut(&mut self, key: ComponentKey) -> &mut Component {
        &mut self.components[key]
    }

    pub fn by_name(&self, name: &str) -> Option<ComponentKey> {
        self.names.get(name).copied()
    }

    pub fn by_id(&self, id: usize) -> Option<ComponentKey> {
        self.ids.get(&id).copied()
    }

    pub fn contains(&self, key: ComponentKey) -> bool {
        self.components.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether `ancestor` is on `key`'s parent chain (or is `key` itself).
    pub fn is_ancestor(&self, ancestor: ComponentKey, key: ComponentKey) -> bool {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            if k == ancestor {
                return true;
            }
            cursor = self.get(k).and_then(|c| c.parent);
        }
        false
    }

    /// All keys in the subtree rooted at `key`, depth-first, root included.
    pub fn subtree_keys(&self, key: ComponentKey) -> Vec<ComponentKey> {
        let mut keys = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            let Some(comp) = self.get(k) else { continue };
            keys.push(k);
            for child in &comp.children {
                if let ComponentChild::Component(ck) = child {
                    stack.push(*ck);
                }
            }
            if let Some(state) = &comp.composite {
                for rep in &state.replacements {
                    if let ComponentChild::Component(ck) = rep {
                        stack.push(*ck);
                    }
                }
            }
        }
        keys
    }

    // =========================================================================
    // Destruction and copying
    // =========================================================================

    /// Remove a subtree from the arena, unregistering ids and names.
    ///
    /// Callers are responsible for invalidating dependents first (see the
    /// reconciler); afterwards any edge still pointing into the subtree
    /// resolves to an error value via its dead key.
    pub(crate) fn destroy_subtree(&mut self, key: ComponentKey) {
        for k in self.subtree_keys(key) {
            if let Some(comp) = self.components.remove(k) {
                self.ids.swap_remove(&comp.id);
                if let Some(name) = &comp.name {
                    if self.names.get(name) == Some(&k) {
                        self.names.swap_remove(name);
                    }
                }
                trace!(id = comp.id, "destroyed component");
            }
        }
    }

    /// Deep-copy a subtree under a new parent, with fresh ids and cells.
    ///
    /// Names are not copied: the registry maps each name to exactly one
    /// component, and replacement copies must not shadow their template.
    pub(crate) fn deep_copy(
        &mut self,
        source: ComponentKey,
        parent: Option<ComponentKey>,
    ) -> Option<ComponentKey> {
        let (component_type, error_message, attributes, children) = {
            let src = self.get(source)?;
            (
                src.component_type,
                src.error_message.clone(),
                src.attributes.clone(),
                src.children.clone(),
            )
        };
        let key = self.create(component_type, parent, error_message);
        self.component_mut(key).attributes = attributes;
        let copied: Vec<ComponentChild> = children
            .iter()
            .map(|child| match child {
                ComponentChild::Text(s) => ComponentChild::Text(s.clone()),
                ComponentChild::Component(ck) => match self.deep_copy(*ck, Some(key)) {
                    Some(copy) => ComponentChild::Component(copy),
                    // Dangling template key; keep a placeholder error node.
                    None => ComponentChild::Component(self.create(
                        ComponentType::Error,
                        Some(key),
                        Some("copy source no longer exists".to_string()),
                    )),
                },
            })
            .collect();
        self.component_mut(key).children = copied;
        Some(key)
    }
}

// =============================================================================
// Attribute parsing
// =============================================================================

/// Collapse an attribute's node list into a stored value. A sole `$name`
/// reference stays a reference; everything else concatenates its text.
fn parse_attribute(attr: &DastAttribute) -> AttrValue {
    if let [DastNode::Ref { name }] = attr.children.as_slice() {
        return AttrValue::Ref(name.clone());
    }
    let text: String = attr
        .children
        .iter()
        .filter_map(|node| match node {
            DastNode::Text { value } => Some(value.as_str()),
            _ => None,
        })
        .collect();
    AttrValue::Literal(text)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dast::DastElement;

    fn sample_tree() -> ComponentTree {
        let root = DastElement::new("document")
            .child(DastElement::new("numberInput").attr("name", "n").attr("prefill", "3"))
            .child(
                DastElement::new("repeat")
                    .ref_attr("count", "n")
                    .child(DastElement::new("textInput")),
            )
            .into_root();
        ComponentTree::build(&root)
    }

    #[test]
    fn test_build_assigns_types_and_ids() {
        let tree = sample_tree();
        let root = tree.get(tree.root).unwrap();
        assert_eq!(root.component_type, ComponentType::Document);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.id, 0);

        let ComponentChild::Component(input) = root.children[0] else {
            panic!("expected component child");
        };
        assert_eq!(
            tree.get(input).unwrap().component_type,
            ComponentType::NumberInput
        );
        assert_eq!(tree.by_id(tree.get(input).unwrap().id), Some(input));
    }

    #[test]
    fn test_name_registry() {
        let tree = sample_tree();
        let n = tree.by_name("n").unwrap();
        assert_eq!(tree.get(n).unwrap().name.as_deref(), Some("n"));
        // `name` is identity, not a rendered attribute.
        assert!(!tree.get(n).unwrap().attributes.contains_key("name"));
        assert!(tree.by_name("missing").is_none());
    }

    #[test]
    fn test_reference_attribute() {
        let tree = sample_tree();
        let root = tree.get(tree.root).unwrap();
        let ComponentChild::Component(repeat) = root.children[1] else {
            panic!("expected component child");
        };
        assert_eq!(
            tree.get(repeat).unwrap().attributes.get("count"),
            Some(&AttrValue::Ref("n".to_string()))
        );
        assert!(tree.get(repeat).unwrap().composite.is_some());
    }

    #[test]
    fn test_unknown_tag_becomes_error_component() {
        let root = DastElement::new("document")
            .child(DastElement::new("blink"))
            .into_root();
        let tree = ComponentTree::build(&root);
        let doc = tree.get(tree.root).unwrap();
        let ComponentChild::Component(err) = doc.children[0] else {
            panic!("expected component child");
        };
        let err = tree.get(err).unwrap();
        assert_eq!(err.component_type, ComponentType::Error);
        assert_eq!(
            err.error_message.as_deref(),
            Some("unknown component type <blink>")
        );
    }

    #[test]
    fn test_loose_content_gets_wrapped() {
        let root = DastElement::new("text").text("hi").into_root();
        let tree = ComponentTree::build(&root);
        let doc = tree.get(tree.root).unwrap();
        assert_eq!(doc.component_type, ComponentType::Document);
        assert_eq!(doc.children.len(), 1);
    }

    #[test]
    fn test_destroy_subtree_invalidates_keys() {
        let mut tree = sample_tree();
        let root = tree.get(tree.root).unwrap();
        let ComponentChild::Component(input) = root.children[0] else {
            panic!("expected component child");
        };
        let id = tree.get(input).unwrap().id;

        tree.destroy_subtree(input);
        assert!(!tree.contains(input));
        assert!(tree.by_id(id).is_none());
        assert!(tree.by_name("n").is_none());
        // Stale key lookups fail cleanly.
        assert!(tree.get(input).is_none());
    }

    #[test]
    fn test_deep_copy_fresh_identity() {
        let mut tree = sample_tree();
        let n = tree.by_name("n").unwrap();
        let copy = tree.deep_copy(n, Some(tree.root)).unwrap();
        assert_ne!(copy, n);
        assert_ne!(tree.get(copy).unwrap().id, tree.get(n).unwrap().id);
        // Copies keep attributes but not names.
        assert!(tree.get(copy).unwrap().name.is_none());
        assert_eq!(
            tree.get(copy).unwrap().attributes.get("prefill"),
            Some(&AttrValue::Literal("3".to_string()))
        );
        assert_eq!(tree.by_name("n"), Some(n));
    }
}
