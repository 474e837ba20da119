//! JSON wire form of conditions.
//!
//! Every condition object carries a `type` discriminator. Dispatch goes
//! through explicit tag tables, one per leaf family; the logical connectives
//! are shared by all families:
//!
//! | Tag | Fields |
//! |-----|--------|
//! | `AllTrue`, `AnyTrue` | `conditions` |
//! | `Not` (`Negation`) | `condition` |
//! | `Either` | `first`, `second` |
//! | `Implication` | `premise`, `consequence` |
//!
//! Absent or `null` fields parse to `None` and are reported when evaluated.
//! Fields that are present but malformed (bad regex, bad timestamp, unknown
//! kind) are rejected here.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use super::{
    AttrSpec, BundlePredicate, Comparison, Condition, ConditionError, Countable, EdgePredicate, Findable,
    NodePredicate, Pattern, StepPredicate,
};
use crate::types::{NodeKind, RelationKind};

type Object = Map<String, Value>;

/// Discriminators handled by [`parse_findable`].
pub const FINDABLE_TAGS: &[&str] = &[
    "FittingNodes",
    "FittingLinearSubgraphs",
    "FilteredSubgraphs",
    "DerivationPathFromStartNode",
    "StartNode",
    "WholeGraph",
];

/// Parser for one leaf family: `Ok(None)` means the tag is not in the family.
type LeafParser<P> = fn(&str, &Object) -> Result<Option<P>, ConditionError>;

/// Parse a node condition.
pub fn parse_node_condition(value: &Value) -> Result<Condition<NodePredicate>, ConditionError> {
    parse_condition(value, node_leaf)
}

/// Parse an edge condition.
pub fn parse_edge_condition(value: &Value) -> Result<Condition<EdgePredicate>, ConditionError> {
    parse_condition(value, edge_leaf)
}

/// Parse a step condition.
pub fn parse_step_condition(value: &Value) -> Result<Condition<StepPredicate>, ConditionError> {
    parse_condition(value, step_leaf)
}

/// Parse a bundle condition.
pub fn parse_bundle_condition(value: &Value) -> Result<Condition<BundlePredicate>, ConditionError> {
    parse_condition(value, bundle_leaf)
}

/// Parse a countable: `CountConstant` or any findable.
pub fn parse_countable(value: &Value) -> Result<Countable, ConditionError> {
    let obj = object(value)?;
    match tag(obj)? {
        "CountConstant" => {
            let count = match field(obj, "count") {
                None => None,
                Some(v) => Some(
                    v.as_u64()
                        .map(|n| n as usize)
                        .ok_or_else(|| invalid("CountConstant", "count", v))?,
                ),
            };
            Ok(Countable::CountConstant(count))
        }
        _ => parse_findable(value).map(Countable::Find),
    }
}

/// Parse a findable.
pub fn parse_findable(value: &Value) -> Result<Findable, ConditionError> {
    let obj = object(value)?;
    let findable = match tag(obj)? {
        "FittingNodes" => Findable::FittingNodes {
            node_condition: boxed(obj, "nodeCondition", parse_node_condition)?,
            starts_in: boxed(obj, "startsIn", parse_findable)?,
        },
        "FittingLinearSubgraphs" => Findable::FittingLinearSubgraphs {
            graph_parts: list(obj, "FittingLinearSubgraphs", "graphParts", parse_step_condition)?,
            starts_in: boxed(obj, "startsIn", parse_findable)?,
        },
        "FilteredSubgraphs" => Findable::FilteredSubgraphs {
            filter: boxed(obj, "filter", parse_step_condition)?,
            starts_in: boxed(obj, "startsIn", parse_findable)?,
        },
        "DerivationPathFromStartNode" => Findable::DerivationPathFromStartNode {
            backward: boolean(obj, "DerivationPathFromStartNode", "backward")?,
        },
        "StartNode" => Findable::StartNode,
        "WholeGraph" => Findable::WholeGraph,
        other => return Err(ConditionError::UnsupportedConditionType(other.to_string())),
    };
    Ok(findable)
}

fn parse_condition<P>(value: &Value, leaf: LeafParser<P>) -> Result<Condition<P>, ConditionError> {
    let obj = object(value)?;
    let tag = tag(obj)?;
    let recurse = |v: &Value| parse_condition(v, leaf);

    let condition = match tag {
        "AllTrue" => Condition::AllTrue(list(obj, tag, "conditions", recurse)?),
        "AnyTrue" => Condition::AnyTrue(list(obj, tag, "conditions", recurse)?),
        "Not" | "Negation" => Condition::Not(boxed(obj, "condition", recurse)?),
        "Either" => Condition::Either(boxed(obj, "first", recurse)?, boxed(obj, "second", recurse)?),
        "Implication" => Condition::Implication(boxed(obj, "premise", recurse)?, boxed(obj, "consequence", recurse)?),
        _ => match leaf(tag, obj)? {
            Some(predicate) => Condition::Leaf(predicate),
            None => return Err(ConditionError::UnsupportedConditionType(tag.to_string())),
        },
    };
    Ok(condition)
}

fn node_leaf(tag: &str, obj: &Object) -> Result<Option<NodePredicate>, ConditionError> {
    let predicate = match tag {
        "HasId" => NodePredicate::HasId {
            id_uri_regex: pattern(obj, tag, "idUriRegex")?,
        },
        "HasAttr" => NodePredicate::HasAttr {
            attribute_name_uri: string(obj, tag, "attributeNameUri")?,
        },
        "HasAttrValue" => {
            let spec = match string(obj, tag, "kind")?.as_deref() {
                None => None,
                Some("QualifiedName") => Some(qualified_name_spec(obj, tag)?),
                Some("LangString") => Some(lang_string_spec(obj, tag)?),
                Some("Timestamp") => Some(timestamp_spec(obj, tag)?),
                Some(other) => {
                    return Err(ConditionError::Configuration(format!(
                        "Unknown attribute value kind '{}' in {}",
                        other, tag
                    )))
                }
            };
            NodePredicate::HasAttrValue {
                attribute_name_uri: string(obj, tag, "attributeNameUri")?,
                spec,
            }
        }
        "HasAttrQualifiedNameValue" => NodePredicate::HasAttrValue {
            attribute_name_uri: string(obj, tag, "attributeNameUri")?,
            spec: Some(qualified_name_spec(obj, tag)?),
        },
        "HasAttrLangStringValue" => NodePredicate::HasAttrValue {
            attribute_name_uri: string(obj, tag, "attributeNameUri")?,
            spec: Some(lang_string_spec(obj, tag)?),
        },
        "HasAttrTimestampValue" => NodePredicate::HasAttrValue {
            attribute_name_uri: string(obj, tag, "attributeNameUri")?,
            spec: Some(timestamp_spec(obj, tag)?),
        },
        "IsKind" => NodePredicate::IsKind(node_kind(obj, tag)?),
        "IsNotKind" => NodePredicate::IsNotKind(node_kind(obj, tag)?),
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

fn qualified_name_spec(obj: &Object, tag: &str) -> Result<AttrSpec, ConditionError> {
    Ok(AttrSpec::QualifiedName {
        uri_regex: pattern(obj, tag, "uriRegex")?,
    })
}

fn lang_string_spec(obj: &Object, tag: &str) -> Result<AttrSpec, ConditionError> {
    Ok(AttrSpec::LangString {
        lang_regex: pattern(obj, tag, "langRegex")?,
        value_regex: pattern(obj, tag, "valueRegex")?,
    })
}

fn timestamp_spec(obj: &Object, tag: &str) -> Result<AttrSpec, ConditionError> {
    Ok(AttrSpec::Timestamp {
        is_equal: timestamp(obj, tag, "isEqual")?,
        is_before: timestamp(obj, tag, "isBefore")?,
        is_after: timestamp(obj, tag, "isAfter")?,
    })
}

fn edge_leaf(tag: &str, obj: &Object) -> Result<Option<EdgePredicate>, ConditionError> {
    let predicate = match tag {
        "IsRelation" => EdgePredicate::IsRelation(relation(obj, tag)?),
        "IsNotRelation" => EdgePredicate::IsNotRelation(relation(obj, tag)?),
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

fn step_leaf(tag: &str, obj: &Object) -> Result<Option<StepPredicate>, ConditionError> {
    let predicate = match tag {
        "EdgeToNodeCondition" => StepPredicate::EdgeToNode {
            edge_condition: boxed(obj, "edgeCondition", parse_edge_condition)?,
            node_condition: boxed(obj, "nodeCondition", parse_node_condition)?,
            node_is_effect: boolean(obj, tag, "nodeIsEffect")?,
        },
        "DerivationPathCondition" => StepPredicate::DerivationPath {
            backward: boolean(obj, tag, "backward")?,
        },
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

fn bundle_leaf(tag: &str, obj: &Object) -> Result<Option<BundlePredicate>, ConditionError> {
    let predicate = match tag {
        "AllNodes" => BundlePredicate::AllNodes {
            condition: boxed(obj, "condition", parse_node_condition)?,
        },
        "CountComparisonCondition" => {
            let comparison = match string(obj, tag, "comparisonResult")? {
                None => None,
                Some(s) => Some(Comparison::from_str(&s).ok_or_else(|| {
                    ConditionError::Configuration(format!("Unknown comparison '{}' in {}", s, tag))
                })?),
            };
            BundlePredicate::CountComparison {
                first: boxed(obj, "first", parse_countable)?,
                comparison,
                second: boxed(obj, "second", parse_countable)?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

// ─────────────────────────────────────────────────────────────────────────────
// FIELD ACCESS
// ─────────────────────────────────────────────────────────────────────────────

fn object(value: &Value) -> Result<&Object, ConditionError> {
    value
        .as_object()
        .ok_or_else(|| ConditionError::Configuration(format!("Condition must be a JSON object, got {}", value)))
}

fn tag(obj: &Object) -> Result<&str, ConditionError> {
    match obj.get("type") {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(ConditionError::UnsupportedConditionType(other.to_string())),
        None => Err(ConditionError::UnsupportedConditionType("<missing type>".to_string())),
    }
}

/// A present, non-null field.
fn field<'v>(obj: &'v Object, name: &str) -> Option<&'v Value> {
    obj.get(name).filter(|v| !v.is_null())
}

fn invalid(variant: &str, name: &str, value: &Value) -> ConditionError {
    ConditionError::Configuration(format!("Invalid value of {} in {}: {}", name, variant, value))
}

fn string(obj: &Object, variant: &str, name: &str) -> Result<Option<String>, ConditionError> {
    field(obj, name)
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid(variant, name, v)))
        .transpose()
}

fn boolean(obj: &Object, variant: &str, name: &str) -> Result<Option<bool>, ConditionError> {
    field(obj, name)
        .map(|v| v.as_bool().ok_or_else(|| invalid(variant, name, v)))
        .transpose()
}

fn pattern(obj: &Object, variant: &str, name: &str) -> Result<Option<Pattern>, ConditionError> {
    string(obj, variant, name)?.map(|s| Pattern::new(&s)).transpose()
}

fn timestamp(obj: &Object, variant: &str, name: &str) -> Result<Option<DateTime<FixedOffset>>, ConditionError> {
    string(obj, variant, name)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s).map_err(|e| {
                ConditionError::Configuration(format!("Invalid timestamp '{}' for {} in {}: {}", s, name, variant, e))
            })
        })
        .transpose()
}

fn node_kind(obj: &Object, variant: &str) -> Result<Option<NodeKind>, ConditionError> {
    string(obj, variant, "kind")?
        .map(|s| {
            NodeKind::from_str(&s)
                .ok_or_else(|| ConditionError::Configuration(format!("Unknown node kind '{}' in {}", s, variant)))
        })
        .transpose()
}

fn relation(obj: &Object, variant: &str) -> Result<Option<RelationKind>, ConditionError> {
    string(obj, variant, "relation")?
        .map(|s| {
            RelationKind::from_str(&s)
                .ok_or_else(|| ConditionError::Configuration(format!("Unknown relation '{}' in {}", s, variant)))
        })
        .transpose()
}

fn boxed<T, F>(obj: &Object, name: &str, parse: F) -> Result<Option<Box<T>>, ConditionError>
where
    F: Fn(&Value) -> Result<T, ConditionError>,
{
    field(obj, name).map(|v| parse(v).map(Box::new)).transpose()
}

fn list<T, F>(obj: &Object, variant: &str, name: &str, parse: F) -> Result<Option<Vec<T>>, ConditionError>
where
    F: Fn(&Value) -> Result<T, ConditionError>,
{
    match field(obj, name) {
        None => Ok(None),
        Some(Value::Array(items)) => items.iter().map(parse).collect::<Result<Vec<_>, _>>().map(Some),
        Some(other) => Err(invalid(variant, name, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_and_missing_type_are_unsupported() {
        let unknown = parse_node_condition(&json!({"type": "HasColour"}));
        assert_eq!(unknown.unwrap_err(), ConditionError::UnsupportedConditionType("HasColour".to_string()));

        let missing = parse_node_condition(&json!({"kind": "Entity"}));
        assert!(matches!(missing, Err(ConditionError::UnsupportedConditionType(_))));

        // an edge tag is not a node condition
        let wrong_family = parse_node_condition(&json!({"type": "IsRelation", "relation": "Derivation"}));
        assert!(matches!(wrong_family, Err(ConditionError::UnsupportedConditionType(_))));
    }

    #[test]
    fn test_missing_fields_parse_and_fail_later() {
        let parsed = parse_node_condition(&json!({"type": "IsKind"})).unwrap();
        assert!(matches!(parsed, Condition::Leaf(NodePredicate::IsKind(None))));

        let parsed = parse_node_condition(&json!({"type": "Either", "first": null})).unwrap();
        assert!(matches!(parsed, Condition::Either(None, None)));
    }

    #[test]
    fn test_malformed_values_rejected_at_parse() {
        let bad_regex = parse_node_condition(&json!({"type": "HasId", "idUriRegex": "(unclosed"}));
        assert!(matches!(bad_regex, Err(ConditionError::Configuration(_))));

        let bad_time = parse_node_condition(&json!({
            "type": "HasAttrTimestampValue",
            "attributeNameUri": "http://www.w3.org/ns/prov#startTime",
            "isBefore": "yesterday"
        }));
        assert!(matches!(bad_time, Err(ConditionError::Configuration(_))));

        let bad_kind = parse_node_condition(&json!({"type": "IsKind", "kind": "Plan"}));
        assert!(matches!(bad_kind, Err(ConditionError::Configuration(_))));
    }

    #[test]
    fn test_aliases_and_spellings() {
        let parsed = parse_node_condition(&json!({
            "type": "Negation",
            "condition": {"type": "IsKind", "kind": "PROV_ACTIVITY"}
        }))
        .unwrap();
        match parsed {
            Condition::Not(Some(inner)) => {
                assert!(matches!(*inner, Condition::Leaf(NodePredicate::IsKind(Some(NodeKind::Activity)))))
            }
            other => panic!("unexpected {:?}", other),
        }

        let parsed = parse_bundle_condition(&json!({
            "type": "CountComparisonCondition",
            "first": {"type": "WholeGraph"},
            "comparisonResult": "GREATER_THAN_OR_EQUALS",
            "second": {"type": "CountConstant", "count": 2}
        }))
        .unwrap();
        assert!(matches!(
            parsed,
            Condition::Leaf(BundlePredicate::CountComparison { comparison: Some(Comparison::Ge), .. })
        ));
    }

    #[test]
    fn test_nested_findables() {
        let parsed = parse_findable(&json!({
            "type": "FittingNodes",
            "nodeCondition": {"type": "HasAttr", "attributeNameUri": "http://www.w3.org/ns/prov#type"},
            "startsIn": {"type": "DerivationPathFromStartNode", "backward": true}
        }))
        .unwrap();
        match parsed {
            Findable::FittingNodes { node_condition: Some(_), starts_in: Some(inner) } => {
                assert!(matches!(*inner, Findable::DerivationPathFromStartNode { backward: Some(true) }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
