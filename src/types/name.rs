//! Qualified names used as node and bundle identifiers.

use serde::{Deserialize, Serialize};

/// A URI-qualified name: namespace URI plus local part.
///
/// Ordering is by `(namespace, local part)` so names can key `BTreeMap`s
/// with deterministic iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedName {
    /// Namespace URI, including its trailing separator.
    pub name_space_uri: String,
    /// Local part within the namespace.
    pub local_part: String,
}

impl QualifiedName {
    /// Create a qualified name from its parts.
    pub fn new(name_space_uri: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            name_space_uri: name_space_uri.into(),
            local_part: local_part.into(),
        }
    }

    /// Split a full URI after its last `/` or `#`.
    ///
    /// A URI with no separator becomes a name with an empty namespace.
    pub fn from_uri(uri: &str) -> Self {
        match uri.rfind(|c| c == '/' || c == '#') {
            Some(pos) => Self::new(&uri[..=pos], &uri[pos + 1..]),
            None => Self::new("", uri),
        }
    }

    /// Full URI: namespace followed by local part.
    pub fn uri(&self) -> String {
        format!("{}{}", self.name_space_uri, self.local_part)
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name_space_uri, self.local_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uri_splits_on_last_separator() {
        let qn = QualifiedName::from_uri("http://storage:8000/api/v1/organizations/ORG1/documents/SamplingBundle_V0");
        assert_eq!(qn.name_space_uri, "http://storage:8000/api/v1/organizations/ORG1/documents/");
        assert_eq!(qn.local_part, "SamplingBundle_V0");

        let hash = QualifiedName::from_uri("http://www.w3.org/ns/prov#bundle");
        assert_eq!(hash.local_part, "bundle");
        assert_eq!(hash.uri(), "http://www.w3.org/ns/prov#bundle");
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let qn = QualifiedName::new("https://openprovenance.org/blank/", "StoredSampleCon_r1");
        let json = serde_json::to_value(&qn).unwrap();
        assert_eq!(json["nameSpaceUri"], "https://openprovenance.org/blank/");
        assert_eq!(json["localPart"], "StoredSampleCon_r1");
    }
}
