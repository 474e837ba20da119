//! Node-level predicates.

use chrono::{DateTime, FixedOffset};

use super::{ConditionError, Evaluate, Pattern};
use crate::types::{AttributeValue, Node, NodeKind};

/// Constraint on one attribute value, one variant per value kind.
#[derive(Debug, Clone)]
pub enum AttrSpec {
    /// Qualified-name value whose URI matches.
    QualifiedName {
        /// Pattern for the full URI.
        uri_regex: Option<Pattern>,
    },
    /// String or language-tagged string value.
    LangString {
        /// Pattern for the language tag.
        lang_regex: Option<Pattern>,
        /// Pattern for the text.
        value_regex: Option<Pattern>,
    },
    /// Timestamp value compared to reference points.
    Timestamp {
        /// Value must equal this instant.
        is_equal: Option<DateTime<FixedOffset>>,
        /// Value must be strictly before this instant.
        is_before: Option<DateTime<FixedOffset>>,
        /// Value must be strictly after this instant.
        is_after: Option<DateTime<FixedOffset>>,
    },
}

impl AttrSpec {
    fn variant(&self) -> &'static str {
        match self {
            Self::QualifiedName { .. } => "HasAttrQualifiedNameValue",
            Self::LangString { .. } => "HasAttrLangStringValue",
            Self::Timestamp { .. } => "HasAttrTimestampValue",
        }
    }

    fn validate(&self) -> Result<(), ConditionError> {
        match self {
            Self::QualifiedName { uri_regex: None } => Err(ConditionError::missing(self.variant(), "uriRegex")),
            Self::LangString { lang_regex: None, value_regex: None } => Err(ConditionError::Configuration(
                format!("At least one of langRegex or valueRegex must be set in {}", self.variant()),
            )),
            Self::Timestamp { is_equal: None, is_before: None, is_after: None } => Err(ConditionError::Configuration(
                format!("At least one of isEqual, isBefore or isAfter must be set in {}", self.variant()),
            )),
            _ => Ok(()),
        }
    }

    /// Whether a single value satisfies every supplied constraint.
    ///
    /// A value of the wrong kind never matches.
    fn matches(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (Self::QualifiedName { uri_regex: Some(p) }, AttributeValue::QualifiedName { value }) => {
                p.matches(&value.uri())
            }
            (Self::LangString { lang_regex, value_regex }, AttributeValue::LangString { value, lang }) => {
                let lang_ok = match (lang_regex, lang) {
                    (None, _) => true,
                    (Some(p), Some(lang)) => p.matches(lang),
                    (Some(_), None) => false,
                };
                lang_ok && value_regex.as_ref().map_or(true, |p| p.matches(value))
            }
            (Self::LangString { lang_regex: None, value_regex }, AttributeValue::String { value }) => {
                value_regex.as_ref().map_or(true, |p| p.matches(value))
            }
            (Self::Timestamp { is_equal, is_before, is_after }, AttributeValue::Timestamp { value }) => {
                is_equal.map_or(true, |t| *value == t)
                    && is_before.map_or(true, |t| *value < t)
                    && is_after.map_or(true, |t| *value > t)
            }
            _ => false,
        }
    }
}

/// Predicate over a single node.
#[derive(Debug, Clone)]
pub enum NodePredicate {
    /// Node id URI matches.
    HasId {
        /// Pattern for the id URI.
        id_uri_regex: Option<Pattern>,
    },
    /// Node carries at least one non-empty value for the attribute.
    HasAttr {
        /// Attribute-name URI.
        attribute_name_uri: Option<String>,
    },
    /// Some value of the attribute satisfies the value constraint.
    HasAttrValue {
        /// Attribute-name URI.
        attribute_name_uri: Option<String>,
        /// Value constraint.
        spec: Option<AttrSpec>,
    },
    /// Node is of the kind.
    IsKind(Option<NodeKind>),
    /// Node is not of the kind.
    IsNotKind(Option<NodeKind>),
}

impl NodePredicate {
    /// `IsKind(kind)`.
    pub fn is_kind(kind: NodeKind) -> Self {
        Self::IsKind(Some(kind))
    }

    /// `HasAttr(uri)`.
    pub fn has_attr(attribute_name_uri: impl Into<String>) -> Self {
        Self::HasAttr {
            attribute_name_uri: Some(attribute_name_uri.into()),
        }
    }

    /// `HasAttrValue(uri, QualifiedName)` with a full-match URI pattern.
    pub fn has_qualified_name_value(attribute_name_uri: impl Into<String>, uri_regex: &str) -> Result<Self, ConditionError> {
        Ok(Self::HasAttrValue {
            attribute_name_uri: Some(attribute_name_uri.into()),
            spec: Some(AttrSpec::QualifiedName {
                uri_regex: Some(Pattern::new(uri_regex)?),
            }),
        })
    }
}

impl Evaluate<Node> for NodePredicate {
    fn evaluate(&self, node: &Node) -> Result<bool, ConditionError> {
        match self {
            Self::HasId { id_uri_regex } => {
                let pattern = id_uri_regex
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("HasId", "idUriRegex"))?;
                Ok(pattern.matches(&node.id.uri()))
            }
            Self::HasAttr { attribute_name_uri } => {
                let uri = attribute_name_uri
                    .as_deref()
                    .ok_or_else(|| ConditionError::missing("HasAttr", "attributeNameUri"))?;
                Ok(node.values(uri).iter().any(AttributeValue::is_present))
            }
            Self::HasAttrValue { attribute_name_uri, spec } => {
                let spec = spec
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("HasAttrValue", "kind"))?;
                let uri = attribute_name_uri
                    .as_deref()
                    .ok_or_else(|| ConditionError::missing(spec.variant(), "attributeNameUri"))?;
                spec.validate()?;
                Ok(node.values(uri).iter().any(|value| spec.matches(value)))
            }
            Self::IsKind(kind) => {
                let kind = kind.ok_or_else(|| ConditionError::missing("IsKind", "kind"))?;
                Ok(node.kind == kind)
            }
            Self::IsNotKind(kind) => {
                let kind = kind.ok_or_else(|| ConditionError::missing("IsNotKind", "kind"))?;
                Ok(node.kind != kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::{attr, kind, BLANK_URI};
    use crate::types::QualifiedName;

    fn sample() -> Node {
        Node::new(QualifiedName::new(BLANK_URI, "StoredSampleCon_r1"), NodeKind::Entity)
            .with_attribute(attr::PROV_TYPE, AttributeValue::qualified_name(QualifiedName::from_uri(kind::FORWARD_CONNECTOR)))
            .with_attribute(attr::PROV_LABEL, AttributeValue::lang_string("Stored sample", Some("en")))
            .with_attribute(attr::PAV_VERSION, AttributeValue::string(""))
            .with_attribute(
                attr::PROV_START_TIME,
                AttributeValue::timestamp(DateTime::parse_from_rfc3339("2024-03-01T10:00:00+00:00").unwrap()),
            )
    }

    fn ts(s: &str) -> Option<DateTime<FixedOffset>> {
        Some(DateTime::parse_from_rfc3339(s).unwrap())
    }

    #[test]
    fn test_has_id_full_match() {
        let node = sample();
        let hit = NodePredicate::HasId { id_uri_regex: Some(Pattern::new(".*StoredSample.*").unwrap()) };
        let partial = NodePredicate::HasId { id_uri_regex: Some(Pattern::new("StoredSample").unwrap()) };
        assert_eq!(hit.evaluate(&node), Ok(true));
        assert_eq!(partial.evaluate(&node), Ok(false));
    }

    #[test]
    fn test_has_attr_ignores_empty_values() {
        let node = sample();
        assert_eq!(NodePredicate::has_attr(attr::PROV_LABEL).evaluate(&node), Ok(true));
        assert_eq!(NodePredicate::has_attr(attr::PAV_VERSION).evaluate(&node), Ok(false));
        assert_eq!(NodePredicate::has_attr(attr::PROV_LOCATION).evaluate(&node), Ok(false));
    }

    #[test]
    fn test_qualified_name_value() {
        let node = sample();
        let forward = NodePredicate::has_qualified_name_value(attr::PROV_TYPE, kind::FORWARD_CONNECTOR).unwrap();
        let either = NodePredicate::has_qualified_name_value(
            attr::PROV_TYPE,
            "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/(backward|forward)Connector",
        )
        .unwrap();
        let backward = NodePredicate::has_qualified_name_value(attr::PROV_TYPE, kind::BACKWARD_CONNECTOR).unwrap();
        assert_eq!(forward.evaluate(&node), Ok(true));
        assert_eq!(either.evaluate(&node), Ok(true));
        assert_eq!(backward.evaluate(&node), Ok(false));
    }

    #[test]
    fn test_lang_string_requires_one_regex() {
        let node = sample();
        let none = NodePredicate::HasAttrValue {
            attribute_name_uri: Some(attr::PROV_LABEL.to_string()),
            spec: Some(AttrSpec::LangString { lang_regex: None, value_regex: None }),
        };
        assert!(matches!(none.evaluate(&node), Err(ConditionError::Configuration(_))));

        let lang = NodePredicate::HasAttrValue {
            attribute_name_uri: Some(attr::PROV_LABEL.to_string()),
            spec: Some(AttrSpec::LangString { lang_regex: Some(Pattern::new("en").unwrap()), value_regex: None }),
        };
        assert_eq!(lang.evaluate(&node), Ok(true));
    }

    #[test]
    fn test_timestamp_constraints_all_apply() {
        let node = sample();
        let window = NodePredicate::HasAttrValue {
            attribute_name_uri: Some(attr::PROV_START_TIME.to_string()),
            spec: Some(AttrSpec::Timestamp {
                is_equal: None,
                is_before: ts("2024-03-02T00:00:00+00:00"),
                is_after: ts("2024-02-28T00:00:00+00:00"),
            }),
        };
        assert_eq!(window.evaluate(&node), Ok(true));

        let equal_other_offset = NodePredicate::HasAttrValue {
            attribute_name_uri: Some(attr::PROV_START_TIME.to_string()),
            spec: Some(AttrSpec::Timestamp { is_equal: ts("2024-03-01T11:00:00+01:00"), is_before: None, is_after: None }),
        };
        assert_eq!(equal_other_offset.evaluate(&node), Ok(true));

        let too_late = NodePredicate::HasAttrValue {
            attribute_name_uri: Some(attr::PROV_START_TIME.to_string()),
            spec: Some(AttrSpec::Timestamp { is_equal: None, is_before: None, is_after: ts("2025-01-01T00:00:00+00:00") }),
        };
        assert_eq!(too_late.evaluate(&node), Ok(false));
    }

    #[test]
    fn test_value_of_wrong_kind_is_false_not_error() {
        let node = sample();
        let ts_on_label = NodePredicate::HasAttrValue {
            attribute_name_uri: Some(attr::PROV_LABEL.to_string()),
            spec: Some(AttrSpec::Timestamp { is_equal: ts("2024-03-01T10:00:00+00:00"), is_before: None, is_after: None }),
        };
        assert_eq!(ts_on_label.evaluate(&node), Ok(false));
    }

    #[test]
    fn test_missing_kind_fails_lazily() {
        assert!(NodePredicate::IsKind(None).evaluate(&sample()).is_err());
        assert_eq!(NodePredicate::IsNotKind(Some(NodeKind::Agent)).evaluate(&sample()), Ok(true));
    }
}
