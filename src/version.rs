//! Version resolution for bundle references.
//!
//! A connector names a bundle; the search may be asked to follow the
//! referenced bundle exactly ([`VersionPreference::Specified`]) or the newest
//! version listed in its meta-bundle ([`VersionPreference::Latest`]).

use tracing::debug;

use crate::cpm::{self, attr, kind};
use crate::federation::FederationTable;
use crate::store::{FetchedBundle, ProvenanceService, RemoteCallError};
use crate::traversal::GraphTraverser;
use crate::types::{Bundle, QualifiedName, VersionPreference};

/// Error resolving a version.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    /// The bundle declares no meta-bundle.
    #[error("Bundle {bundle_id} declares no meta-bundle")]
    MissingMetaBundle {
        /// Bundle whose versions were requested.
        bundle_id: QualifiedName,
    },
    /// A version node carries a value that is not a decimal number.
    #[error("Non-numeric version '{version}' on {node_id} in meta-bundle {meta_bundle_id}")]
    NonNumericVersion {
        /// Meta-bundle.
        meta_bundle_id: QualifiedName,
        /// Version node.
        node_id: QualifiedName,
        /// Offending value.
        version: String,
    },
    /// The bundle or its meta-bundle could not be fetched.
    #[error("Version lookup failed: {0}")]
    Remote(#[from] RemoteCallError),
}

/// Newest version listed in a meta-bundle.
///
/// Walks the meta-bundle from its default start node and considers every
/// `prov:bundle` node with a `pav:version`. The maximum decimal version wins;
/// on equal versions the first one reached wins. `Ok(None)` when there are no
/// version nodes.
pub fn latest_version(meta: &Bundle) -> Result<Option<QualifiedName>, ResolutionError> {
    let Some(root) = cpm::default_start_node(meta) else {
        return Ok(None);
    };

    let mut best: Option<(f64, &QualifiedName)> = None;
    for idx in GraphTraverser::new(meta).reachable_from(root) {
        let node = meta.node(idx);
        if !node.has_qualified_name_value(attr::PROV_TYPE, kind::PROV_BUNDLE) {
            continue;
        }
        let Some(raw) = node.text_value(attr::PAV_VERSION) else {
            continue;
        };
        let version = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ResolutionError::NonNumericVersion {
                meta_bundle_id: meta.id().clone(),
                node_id: node.id.clone(),
                version: raw.to_string(),
            })?;
        if best.map_or(true, |(current, _)| version > current) {
            best = Some((version, &node.id));
        }
    }

    Ok(best.map(|(_, id)| id.clone()))
}

/// A reference resolved to the bundle to visit.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Bundle to visit.
    pub bundle_id: QualifiedName,
    /// The referenced bundle, when resolution already fetched it.
    pub referenced: Option<FetchedBundle>,
}

impl Resolved {
    fn exact(bundle_id: QualifiedName) -> Self {
        Self {
            bundle_id,
            referenced: None,
        }
    }

    /// The fetched bundle, if it is the one to visit.
    pub fn prefetched(self, referenced_id: &QualifiedName) -> (QualifiedName, Option<FetchedBundle>) {
        let reusable = self.referenced.filter(|_| &self.bundle_id == referenced_id);
        (self.bundle_id, reusable)
    }
}

/// Resolves bundle references to concrete bundles.
pub struct VersionResolver<'a, S> {
    service: &'a S,
    federation: &'a FederationTable,
    delegate: bool,
}

impl<'a, S: ProvenanceService> VersionResolver<'a, S> {
    /// Resolve locally by reading meta-bundles.
    pub fn new(service: &'a S, federation: &'a FederationTable) -> Self {
        Self {
            service,
            federation,
            delegate: false,
        }
    }

    /// Ask the owning service to pick versions instead.
    pub fn delegated(mut self, delegate: bool) -> Self {
        self.delegate = delegate;
        self
    }

    /// Resolve `bundle_id`, hosted at `service_uri`, under a preference.
    ///
    /// `meta_hint` is the meta-bundle declared by the discovering connector;
    /// it is used only when the bundle itself declares none. The meta-bundle
    /// is routed through the federation table and falls back to the bundle's
    /// own service. A bundle fetched along the way is handed back so the
    /// caller need not fetch it again.
    pub async fn resolve(
        &self,
        service_uri: &str,
        bundle_id: &QualifiedName,
        preference: VersionPreference,
        meta_hint: Option<&QualifiedName>,
    ) -> Result<Resolved, ResolutionError> {
        if preference == VersionPreference::Specified {
            return Ok(Resolved::exact(bundle_id.clone()));
        }

        if self.delegate {
            return self
                .service
                .pick_version(service_uri, bundle_id, preference)
                .await
                .map(Resolved::exact)
                .map_err(|e| RemoteCallError::from_source(service_uri, e).into());
        }

        let fetched = self
            .service
            .fetch_bundle(service_uri, bundle_id)
            .await
            .map_err(|e| RemoteCallError::from_source(service_uri, e))?;
        let meta_id = cpm::meta_bundle_id(&fetched.bundle)
            .or(meta_hint)
            .cloned()
            .ok_or_else(|| ResolutionError::MissingMetaBundle {
                bundle_id: bundle_id.clone(),
            })?;

        let meta_service = self.federation.route(&meta_id).unwrap_or(service_uri);
        let meta = self
            .service
            .fetch_bundle(meta_service, &meta_id)
            .await
            .map_err(|e| RemoteCallError::from_source(meta_service, e))?;

        let resolved = latest_version(&meta.bundle)?.unwrap_or_else(|| bundle_id.clone());
        debug!(bundle = %bundle_id, resolved = %resolved, meta_bundle = %meta_id, "Resolved latest version");
        Ok(Resolved {
            bundle_id: resolved,
            referenced: Some(fetched),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::BLANK_URI;
    use crate::types::{AttributeValue, Node, NodeKind, RelationKind};

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new(BLANK_URI, local)
    }

    fn version_node(local: &str, version: &str) -> Node {
        Node::new(qn(local), NodeKind::Entity)
            .with_attribute(attr::PROV_TYPE, AttributeValue::qualified_name(QualifiedName::from_uri(kind::PROV_BUNDLE)))
            .with_attribute(attr::PAV_VERSION, AttributeValue::string(version))
    }

    fn meta(versions: &[(&str, &str)]) -> Bundle {
        let mut builder = Bundle::builder(qn("meta")).node(Node::new(qn("root"), NodeKind::Entity));
        for (local, version) in versions {
            builder = builder
                .node(version_node(local, version))
                .edge(qn(local), qn("root"), RelationKind::Specialization);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_maximum_decimal_version_wins() {
        let m = meta(&[("v1", "1.0"), ("v25", "2.5"), ("v2", "2.0")]);
        assert_eq!(latest_version(&m).unwrap(), Some(qn("v25")));
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let m = meta(&[("a", "3"), ("b", "3.0")]);
        assert_eq!(latest_version(&m).unwrap(), Some(qn("a")));
    }

    #[test]
    fn test_no_version_nodes() {
        let m = meta(&[]);
        assert_eq!(latest_version(&m).unwrap(), None);
    }

    #[test]
    fn test_non_numeric_version_is_an_error() {
        let m = meta(&[("v1", "1.0"), ("beta", "2.0-beta")]);
        assert!(matches!(latest_version(&m), Err(ResolutionError::NonNumericVersion { .. })));
    }

    #[test]
    fn test_prefetched_bundle_reused_only_for_the_visited_version() {
        let fetched = FetchedBundle {
            bundle: meta(&[]),
            token: None,
        };
        let unchanged = Resolved {
            bundle_id: qn("b1"),
            referenced: Some(fetched.clone()),
        };
        assert!(unchanged.prefetched(&qn("b1")).1.is_some());

        let newer = Resolved {
            bundle_id: qn("b2"),
            referenced: Some(fetched),
        };
        let (id, reused) = newer.prefetched(&qn("b1"));
        assert_eq!(id, qn("b2"));
        assert!(reused.is_none());
    }
}
