//! Search configuration.

use std::time::Duration;

/// Tuning of a search session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Number of bundles processed concurrently.
    pub concurrency: usize,
    /// Session deadline; in-flight work drains after it fires.
    pub deadline: Option<Duration>,
    /// Stop claiming new bundles once this many results were collected.
    pub max_results: Option<usize>,
    /// Maximum number of bundles a session may claim.
    pub max_visited: Option<usize>,
    /// Drop results whose query output is empty.
    pub omit_empty_results: bool,
    /// Route by the connector's declared service before the federation table.
    pub prefer_service_from_connectors: bool,
    /// Do not expand children of bundles that failed integrity.
    pub require_integrity: bool,
    /// Resolve versions through the owning service's version-pick endpoint.
    pub delegate_version_pick: bool,
}

impl SearchConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse("SEARCH_CONCURRENCY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.concurrency),
            deadline: env_parse("SEARCH_DEADLINE_SECS").map(Duration::from_secs),
            max_results: env_parse("SEARCH_MAX_RESULTS"),
            max_visited: env_parse("SEARCH_MAX_VISITED"),
            omit_empty_results: env_parse("SEARCH_OMIT_EMPTY_RESULTS").unwrap_or(defaults.omit_empty_results),
            prefer_service_from_connectors: env_parse("SEARCH_PREFER_CONNECTOR_SERVICE")
                .unwrap_or(defaults.prefer_service_from_connectors),
            require_integrity: env_parse("SEARCH_REQUIRE_INTEGRITY").unwrap_or(defaults.require_integrity),
            delegate_version_pick: env_parse("SEARCH_DELEGATE_VERSION_PICK")
                .unwrap_or(defaults.delegate_version_pick),
        }
    }

    /// Set the concurrency (at least one worker).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the session deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stop after collecting this many results.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Claim at most this many bundles.
    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = Some(max_visited);
        self
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            deadline: None,
            max_results: None,
            max_visited: None,
            omit_empty_results: false,
            prefer_service_from_connectors: false,
            require_integrity: false,
            delegate_version_pick: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
