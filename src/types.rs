//! Core types for tapestry-core.
//!
//! These types define the foundation that everything builds on.
//! They flow through the dependency graph and define what the embedder understands.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

// =============================================================================
// State Values
// =============================================================================

/// The single value type flowing through the state-variable graph.
///
/// Equality is exact: numbers compare bit-for-bit so memoization and the
/// forward/inverse round-trip property hold without a floating-point epsilon.
/// `Error` is a first-class value, not an exception: a failed definition
/// produces an `Error` value that propagates to dependents and renders as an
/// inline error node, never aborting resolution of unrelated subtrees.
#[derive(Debug, Clone)]
pub enum StateValue {
    /// Floating-point number.
    Number(f64),
    /// Exact integer (counts, indices, serial numbers).
    Integer(i64),
    /// Text.
    String(String),
    /// Boolean.
    Boolean(bool),
    /// Localized failure: the message that renders inline.
    Error(String),
}

impl StateValue {
    /// Coerce to a number.
    ///
    /// Strings parse leniently (surrounding whitespace ignored); anything
    /// unparsable becomes NaN. Booleans map to 0/1. Errors are NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Integer(i) => *i as f64,
            Self::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            Self::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Error(_) => f64::NAN,
        }
    }

    /// Coerce to an exact integer, if the value represents one.
    ///
    /// `Number(3.0)` is an integer; `Number(3.5)` and NaN are not.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Number(_) | Self::String(_) => {
                let n = self.to_number();
                if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Some(n as i64)
                } else {
                    None
                }
            }
            Self::Boolean(_) | Self::Error(_) => None,
        }
    }

    /// Coerce to a boolean.
    ///
    /// Strings: case-insensitive "true"/"t" are true, everything else false.
    /// Numbers: nonzero is true. Errors are false.
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::String(s) => {
                let t = s.trim();
                t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("t")
            }
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Integer(i) => *i != 0,
            Self::Error(_) => false,
        }
    }

    /// Coerce to display text.
    ///
    /// Whole numbers render without a trailing `.0`.
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Error(message) => format!("[error: {message}]"),
        }
    }

    /// Whether this value is an error sentinel.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Build a value from a JSON action argument.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Integer(i))
                } else {
                    n.as_f64().map(Self::Number)
                }
            }
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// Format a float the way document text expects (no trailing `.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "∞".to_string() } else { "-∞".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for StateValue {
    /// Exact equality; numbers compare by bit pattern so NaN == NaN and
    /// -0.0 != 0.0. Memoization relies on this being reflexive.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for StateValue {}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::String(s) => serializer.serialize_str(s),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Error(message) => {
                let mut st = serializer.serialize_struct("StateValue", 2)?;
                st.serialize_field("type", "error")?;
                st.serialize_field("message", message)?;
                st.end()
            }
        }
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for StateValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for StateValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

// =============================================================================
// Component Types
// =============================================================================

/// The closed set of component tags the core understands.
///
/// Unknown tags in the source do not get a variant here; the tree builder
/// turns them into `Error` components carrying a message, so a typo in the
/// markup stays a localized error node instead of a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Document,
    Text,
    Number,
    Boolean,
    Paragraph,
    TextInput,
    NumberInput,
    Sum,
    Repeat,
    Conditional,
    Copy,
    Error,
}

impl ComponentType {
    /// Parse a source tag name.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "document" => Some(Self::Document),
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "p" => Some(Self::Paragraph),
            "textInput" => Some(Self::TextInput),
            "numberInput" => Some(Self::NumberInput),
            "sum" => Some(Self::Sum),
            "repeat" => Some(Self::Repeat),
            "conditional" => Some(Self::Conditional),
            "copy" => Some(Self::Copy),
            "_error" => Some(Self::Error),
            _ => None,
        }
    }

    /// The canonical tag name.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Paragraph => "p",
            Self::TextInput => "textInput",
            Self::NumberInput => "numberInput",
            Self::Sum => "sum",
            Self::Repeat => "repeat",
            Self::Conditional => "conditional",
            Self::Copy => "copy",
            Self::Error => "_error",
        }
    }

    /// Whether this component's rendered children are a computed replacement
    /// list rather than its literal markup children.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Repeat | Self::Conditional | Self::Copy)
    }
}

impl Serialize for ComponentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

// =============================================================================
// Tests
// =============================================================================
