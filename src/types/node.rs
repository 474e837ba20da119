//! Provenance nodes and their attribute values.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::name::QualifiedName;

/// Statement kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// `prov:Activity`
    #[serde(alias = "activity", alias = "PROV_ACTIVITY")]
    Activity,
    /// `prov:Entity`
    #[serde(alias = "entity", alias = "PROV_ENTITY")]
    Entity,
    /// `prov:Agent`
    #[serde(alias = "agent", alias = "PROV_AGENT")]
    Agent,
}

impl NodeKind {
    /// Parse a node kind, accepting `Activity`, `activity` and `PROV_ACTIVITY` spellings.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.strip_prefix("PROV_").unwrap_or(s);
        match s.to_ascii_lowercase().as_str() {
            "activity" => Some(Self::Activity),
            "entity" => Some(Self::Entity),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activity => write!(f, "Activity"),
            Self::Entity => write!(f, "Entity"),
            Self::Agent => write!(f, "Agent"),
        }
    }
}

/// One value of a node attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AttributeValue {
    /// Plain string.
    String {
        /// The string.
        value: String,
    },
    /// Language-tagged string.
    LangString {
        /// The string.
        value: String,
        /// Language tag, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
    /// Reference to another qualified name.
    QualifiedName {
        /// The referenced name.
        value: QualifiedName,
    },
    /// Point in time with offset.
    Timestamp {
        /// The timestamp.
        value: DateTime<FixedOffset>,
    },
}

impl AttributeValue {
    /// Build a plain string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String { value: value.into() }
    }

    /// Build a language-tagged string value.
    pub fn lang_string(value: impl Into<String>, lang: Option<&str>) -> Self {
        Self::LangString {
            value: value.into(),
            lang: lang.map(str::to_string),
        }
    }

    /// Build a qualified-name reference value.
    pub fn qualified_name(value: QualifiedName) -> Self {
        Self::QualifiedName { value }
    }

    /// Build a timestamp value.
    pub fn timestamp(value: DateTime<FixedOffset>) -> Self {
        Self::Timestamp { value }
    }

    /// Whether this value carries content.
    ///
    /// Empty strings and qualified names with no URI count as empty.
    pub fn is_present(&self) -> bool {
        match self {
            Self::String { value } | Self::LangString { value, .. } => !value.is_empty(),
            Self::QualifiedName { value } => !value.uri().is_empty(),
            Self::Timestamp { .. } => true,
        }
    }

    /// Textual content of string-like values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String { value } | Self::LangString { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The referenced name of a qualified-name value.
    pub fn as_qualified_name(&self) -> Option<&QualifiedName> {
        match self {
            Self::QualifiedName { value } => Some(value),
            _ => None,
        }
    }
}

/// A vertex of a bundle's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    pub id: QualifiedName,
    /// Statement kind.
    pub kind: NodeKind,
    /// Attribute multimap keyed by attribute-name URI.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl Node {
    /// Create a node without attributes.
    pub fn new(id: QualifiedName, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute value (builder style).
    pub fn with_attribute(mut self, name_uri: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.entry(name_uri.into()).or_default().push(value);
        self
    }

    /// All values of an attribute, empty if absent.
    pub fn values(&self, name_uri: &str) -> &[AttributeValue] {
        self.attributes
            .get(name_uri)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of an attribute.
    pub fn first_value(&self, name_uri: &str) -> Option<&AttributeValue> {
        self.values(name_uri).first()
    }

    /// First qualified-name value of an attribute.
    pub fn qualified_name_value(&self, name_uri: &str) -> Option<&QualifiedName> {
        self.values(name_uri).iter().find_map(AttributeValue::as_qualified_name)
    }

    /// First textual value of an attribute.
    pub fn text_value(&self, name_uri: &str) -> Option<&str> {
        self.values(name_uri).iter().find_map(AttributeValue::as_text)
    }

    /// Whether any qualified-name value of the attribute has the given URI.
    pub fn has_qualified_name_value(&self, name_uri: &str, value_uri: &str) -> bool {
        self.values(name_uri)
            .iter()
            .filter_map(AttributeValue::as_qualified_name)
            .any(|qn| qn.uri() == value_uri)
    }
}
