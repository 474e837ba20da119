//! HTTP clients for remote provenance services and trusted-party registries.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    FetchBundleRequest, FetchedBundle, PickVersionRequest, PickVersionResponse, ProvenanceService, TokenRegistry,
};
use crate::query::{BundleQueryRequest, BundleQueryResponse};
use crate::types::{QualifiedName, Token, VersionPreference};

/// Error of an HTTP collaborator call.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Transport or body decoding failure.
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Non-2xx response.
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    /// A collaborator address that does not form a URL.
    #[error("Invalid URL {0}")]
    InvalidUrl(String),
}

fn json_client() -> Result<Client, HttpError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
    Ok(Client::builder().default_headers(default_headers).build()?)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HttpError> {
    if response.status().is_success() {
        Ok(response.json::<T>().await?)
    } else {
        Err(HttpError::HttpStatus(response.status(), response.text().await?))
    }
}

/// Base URL with `http://` added when no scheme is given.
pub fn with_scheme(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    }
}

/// Token list of an originator at a trusted party.
///
/// The originator id is appended as a single percent-encoded path segment.
pub fn tokens_url(trusted_party_uri: &str, originator_id: &str) -> Result<Url, HttpError> {
    let base = with_scheme(trusted_party_uri);
    let mut url = Url::parse(&base).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|()| HttpError::InvalidUrl(base.clone()))?
        .pop_if_empty()
        .extend(["api", "v1", "organizations", originator_id, "tokens"]);
    Ok(url)
}

/// Client for provenance services exposing the `/api/*` endpoints.
#[derive(Debug, Clone)]
pub struct HttpProvenanceService {
    client: Client,
}

impl HttpProvenanceService {
    /// Create a client.
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self { client: json_client()? })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        service_uri: &str,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let url = format!("{}{}", with_scheme(service_uri), path);
        let response = self.client.post(url).json(body).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl ProvenanceService for HttpProvenanceService {
    type Error = HttpError;

    async fn fetch_bundle(&self, service_uri: &str, bundle_id: &QualifiedName) -> Result<FetchedBundle, Self::Error> {
        let body = FetchBundleRequest {
            bundle_id: bundle_id.clone(),
        };
        self.post(service_uri, "/api/bundle", &body).await
    }

    async fn bundle_query(
        &self,
        service_uri: &str,
        request: &BundleQueryRequest,
    ) -> Result<BundleQueryResponse, Self::Error> {
        self.post(service_uri, "/api/bundleQuery", request).await
    }

    async fn pick_version(
        &self,
        service_uri: &str,
        bundle_id: &QualifiedName,
        preference: VersionPreference,
    ) -> Result<QualifiedName, Self::Error> {
        let body = PickVersionRequest {
            bundle_id: bundle_id.clone(),
            version_preference: preference,
        };
        let picked: PickVersionResponse = self.post(service_uri, "/api/pickVersion", &body).await?;
        Ok(picked.bundle_id)
    }
}

/// Client for trusted-party token registries.
#[derive(Debug, Clone)]
pub struct HttpTokenRegistry {
    client: Client,
}

impl HttpTokenRegistry {
    /// Create a client.
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self { client: json_client()? })
    }
}

#[async_trait]
impl TokenRegistry for HttpTokenRegistry {
    type Error = HttpError;

    async fn issued_tokens(&self, trusted_party_uri: &str, originator_id: &str) -> Result<Vec<Token>, Self::Error> {
        let url = tokens_url(trusted_party_uri, originator_id)?;
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_added_when_missing() {
        assert_eq!(with_scheme("trusted-party:8020"), "http://trusted-party:8020");
        assert_eq!(with_scheme("https://tp.example/"), "https://tp.example");
        assert_eq!(with_scheme("http://prov-a:8001"), "http://prov-a:8001");
    }

    #[test]
    fn test_originator_is_one_encoded_segment() {
        let url = tokens_url("trusted-party:8020", "ORG1").unwrap();
        assert_eq!(url.as_str(), "http://trusted-party:8020/api/v1/organizations/ORG1/tokens");

        let url = tokens_url("https://tp.example/registry/", "acme/labs ?x").unwrap();
        assert_eq!(url.as_str(), "https://tp.example/registry/api/v1/organizations/acme%2Flabs%20%3Fx/tokens");
        assert_eq!(url.query(), None);
    }
}
