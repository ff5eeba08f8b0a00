//! Boundary trees - parsed input and flattened output.
//!
//! The core does not parse markup. It receives an already-parsed document
//! tree ([`DastRoot`]) from the embedder, and hands back a fully resolved,
//! serializable render tree ([`FlatDastRoot`]) plus incremental per-element
//! updates ([`FlatDastUpdate`]) after each action.
//!
//! Input nodes mirror what a markup parser naturally produces: elements with
//! ordered attributes, literal text, `$name` reference macros, and parse
//! errors carried as error nodes so a syntax problem stays localized.
//!
//! Output elements are flat: children reference other elements by id, so the
//! rendering layer can index straight into `elements` without walking.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{ComponentType, StateValue};

// =============================================================================
// Input: parsed document tree
// =============================================================================

/// Root of the parsed document handed to `set_source`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DastRoot {
    #[serde(default)]
    pub children: Vec<DastNode>,
}

/// One parsed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DastNode {
    /// A markup element: `<text name="t">...</text>`.
    Element(DastElement),
    /// Literal text between elements.
    Text { value: String },
    /// A `$name` reference macro.
    Ref { name: String },
    /// A parse error the parser chose to carry instead of aborting.
    Error { message: String },
}

/// A parsed element node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DastElement {
    /// Tag name as written in the source.
    pub name: String,
    #[serde(default)]
    pub attributes: IndexMap<String, DastAttribute>,
    #[serde(default)]
    pub children: Vec<DastNode>,
}

/// An attribute value: a small node list (text and references).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DastAttribute {
    #[serde(default)]
    pub children: Vec<DastNode>,
}

impl DastElement {
    /// Start building an element with the given tag.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Add a literal string attribute.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(
            name.to_string(),
            DastAttribute {
                children: vec![DastNode::Text {
                    value: value.to_string(),
                }],
            },
        );
        self
    }

    /// Add an attribute referencing a named component (`count="$n"`).
    pub fn ref_attr(mut self, name: &str, target: &str) -> Self {
        self.attributes.insert(
            name.to_string(),
            DastAttribute {
                children: vec![DastNode::Ref {
                    name: target.to_string(),
                }],
            },
        );
        self
    }

    /// Append an element child.
    pub fn child(mut self, child: DastElement) -> Self {
        self.children.push(DastNode::Element(child));
        self
    }

    /// Append a text child.
    pub fn text(mut self, value: &str) -> Self {
        self.children.push(DastNode::Text {
            value: value.to_string(),
        });
        self
    }

    /// Append a `$name` reference child.
    pub fn reference(mut self, name: &str) -> Self {
        self.children.push(DastNode::Ref {
            name: name.to_string(),
        });
        self
    }

    /// Wrap this element as a one-child root.
    pub fn into_root(self) -> DastRoot {
        DastRoot {
            children: vec![DastNode::Element(self)],
        }
    }
}

// =============================================================================
// Output: flattened render tree
// =============================================================================

/// A child slot in a flattened element: inline text or a reference to
/// another element by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlatDastChild {
    Text(String),
    Element { id: usize },
}

/// One fully resolved element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatDastElement {
    pub id: usize,
    #[serde(rename = "componentType")]
    pub component_type: ComponentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Attributes resolved to concrete values (references chased).
    pub attributes: IndexMap<String, StateValue>,
    pub children: Vec<FlatDastChild>,
    /// The values of this component's render-facing state variables.
    pub state: IndexMap<String, StateValue>,
}

/// A localized failure rendered inline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatDastError {
    pub id: usize,
    pub message: String,
}

/// A node in the flattened output: a resolved element or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlatDastNode {
    Element(FlatDastElement),
    Error(FlatDastError),
}

impl FlatDastNode {
    /// The element id of this node.
    pub fn id(&self) -> usize {
        match self {
            Self::Element(el) => el.id,
            Self::Error(err) => err.id,
        }
    }
}

/// The full flattened render tree returned by `return_dast`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatDastRoot {
    pub children: Vec<FlatDastChild>,
    pub elements: Vec<FlatDastNode>,
}

impl FlatDastRoot {
    /// Look up an element by id.
    pub fn element(&self, id: usize) -> Option<&FlatDastNode> {
        self.elements.iter().find(|node| node.id() == id)
    }
}

// =============================================================================
// Incremental updates
// =============================================================================

/// Per-element incremental payload returned from `dispatch_action`.
///
/// `new_children` is present only when the child list itself changed (a
/// composite re-expanded); `changed_state` carries just the state entries
/// whose values differ from the previous flattening. `error` is present when
/// the node is an error node that is new or whose message changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatDastUpdate {
    #[serde(rename = "newChildren", skip_serializing_if = "Option::is_none")]
    pub new_children: Option<Vec<FlatDastChild>>,
    #[serde(rename = "changedState", skip_serializing_if = "IndexMap::is_empty")]
    pub changed_state: IndexMap<String, StateValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diff a fresh flattening against the previous one.
///
/// Mirrors a diff renderer: the previous output is kept and compared
/// node-for-node; only elements that changed produce an update. Elements new
/// to this flattening report their full children and state.
pub fn diff_flat_dast(
    previous: &FlatDastRoot,
    current: &FlatDastRoot,
) -> IndexMap<usize, FlatDastUpdate> {
    let mut updates = IndexMap::new();

    for node in &current.elements {
        let prev = previous.element(node.id());
        match node {
            FlatDastNode::Element(element) => match prev {
                Some(FlatDastNode::Element(prev_element)) => {
                    let mut update = FlatDastUpdate::default();
                    if prev_element.children != element.children {
                        update.new_children = Some(element.children.clone());
                    }
                    for (name, value) in &element.state {
                        if prev_element.state.get(name) != Some(value) {
                            update.changed_state.insert(name.clone(), value.clone());
                        }
                    }
                    if update.new_children.is_some() || !update.changed_state.is_empty() {
                        updates.insert(element.id, update);
                    }
                }
                // Previously an error node, or brand new: report everything.
                _ => {
                    updates.insert(
                        element.id,
                        FlatDastUpdate {
                            new_children: Some(element.children.clone()),
                            changed_state: element.state.clone(),
                            error: None,
                        },
                    );
                }
            },
            FlatDastNode::Error(error) => {
                let changed = match prev {
                    Some(FlatDastNode::Error(prev_error)) => prev_error.message != error.message,
                    _ => true,
                };
                if changed {
                    updates.insert(
                        error.id,
                        FlatDastUpdate {
                            error: Some(error.message.clone()),
                            ..FlatDastUpdate::default()
                        },
                    );
                }
            }
        }
    }

    updates
}

// =============================================================================
// Tests
// =============================================================================
