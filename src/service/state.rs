//! Service state management.
//!
//! Holds the shared search engine and the bundles this service hosts itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::condition::ConditionError;
use crate::config::SearchConfig;
use crate::federation::{FederationTable, FederationTableError};
use crate::integrity::{IntegrityVerifier, VerificationMode};
use crate::search::DistributedSearch;
use crate::store::{
    FetchedBundle, HttpError, HttpProvenanceService, HttpTokenRegistry, InMemoryProvenanceService,
    ProvenanceService, TokenRegistry,
};
use crate::validity::ValidityRegistry;

/// Service key under which locally hosted bundles are stored.
pub const LOCAL_SERVICE: &str = "local";

/// Error loading a bundle directory.
#[derive(Debug, thiserror::Error)]
pub enum BundleDirError {
    /// A file or the directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A file is not a bundle document.
    #[error("Failed to parse {path}: {source}")]
    Json {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Error building the service state from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ServiceInitError {
    /// The federation table is unreadable.
    #[error(transparent)]
    Federation(#[from] FederationTableError),
    /// The HTTP client could not be built.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// A built-in validity check failed to parse.
    #[error("Invalid validity check: {0}")]
    Validity(#[from] ConditionError),
    /// The bundle directory is unreadable.
    #[error(transparent)]
    BundleDir(#[from] BundleDirError),
}

/// Load every `*.json` file of a directory as a [`FetchedBundle`].
///
/// Files are read in path order.
pub fn load_bundle_dir(dir: impl AsRef<Path>) -> Result<Vec<FetchedBundle>, BundleDirError> {
    let dir = dir.as_ref();
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BundleDirError::Io { path, source }
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let raw = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            serde_json::from_str(&raw).map_err(|source| BundleDirError::Json { path, source })
        })
        .collect()
}

/// Shared service state.
pub struct ServiceState<S: ProvenanceService + 'static, R: TokenRegistry + 'static> {
    /// The search engine shared by every request.
    pub search: Arc<DistributedSearch<S, R>>,
    /// Bundles hosted by this service, under [`LOCAL_SERVICE`].
    pub bundles: Arc<InMemoryProvenanceService>,
}

impl<S: ProvenanceService + 'static, R: TokenRegistry + 'static> ServiceState<S, R> {
    /// Create service state from a search engine and locally hosted bundles.
    pub fn new(search: DistributedSearch<S, R>, bundles: Vec<FetchedBundle>) -> Self {
        let mut hosted = InMemoryProvenanceService::new();
        for stored in bundles {
            hosted.add_bundle(LOCAL_SERVICE, stored.bundle, stored.token);
        }
        Self {
            search: Arc::new(search),
            bundles: Arc::new(hosted),
        }
    }
}

impl ServiceState<HttpProvenanceService, HttpTokenRegistry> {
    /// Create service state from environment variables.
    ///
    /// - `FEDERATION_TABLE_PATH`: federation table JSON (empty table when unset)
    /// - `BUNDLE_DIR`: directory of hosted bundles (none when unset)
    /// - `SEARCH_*`: see [`SearchConfig::from_env`]
    pub fn from_env() -> Result<Self, ServiceInitError> {
        let federation = FederationTable::from_env()?;
        if federation.is_empty() {
            tracing::warn!("Federation table is empty; only connector service hints can be routed");
        }

        let bundles = match std::env::var("BUNDLE_DIR") {
            Ok(dir) => load_bundle_dir(dir)?,
            Err(_) => Vec::new(),
        };

        let search = DistributedSearch::new(
            HttpProvenanceService::new()?,
            federation,
            IntegrityVerifier::new(HttpTokenRegistry::new()?, VerificationMode::cached()),
            ValidityRegistry::with_demo_checks()?,
            SearchConfig::from_env(),
        );
        Ok(Self::new(search, bundles))
    }
}

impl<S: ProvenanceService + 'static, R: TokenRegistry + 'static> Clone for ServiceState<S, R> {
    fn clone(&self) -> Self {
        Self {
            search: Arc::clone(&self.search),
            bundles: Arc::clone(&self.bundles),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::BLANK_URI;
    use crate::types::{Bundle, QualifiedName};

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("provenance-search-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_bundle_dir_reads_json_files_in_order() {
        let dir = scratch_dir();
        for name in ["b", "a"] {
            let stored = FetchedBundle {
                bundle: Bundle::builder(QualifiedName::new(BLANK_URI, name)).build().unwrap(),
                token: None,
            };
            std::fs::write(dir.join(format!("{}.json", name)), serde_json::to_string(&stored).unwrap()).unwrap();
        }
        std::fs::write(dir.join("README.txt"), "ignored").unwrap();

        let loaded = load_bundle_dir(&dir).unwrap();
        let names: Vec<&str> = loaded.iter().map(|b| b.bundle.id().local_part.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_bundle_dir_reports_bad_files() {
        let dir = scratch_dir();
        std::fs::write(dir.join("broken.json"), "{").unwrap();
        assert!(matches!(load_bundle_dir(&dir), Err(BundleDirError::Json { .. })));
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(load_bundle_dir(&dir), Err(BundleDirError::Io { .. })));
    }
}
