//! Integrity verification of fetched bundles.
//!
//! A bundle is trusted when its token passes two independent checks:
//!
//! 1. **Signature**: `token.signature` is a valid ECDSA P-256/SHA-256
//!    signature over the canonical JSON of `token.data`, under the public key
//!    of the PEM certificate embedded in the token.
//! 2. **Registry**: the trusted party named by the token lists this exact
//!    token among those it issued for the originator. A storage host cannot
//!    keep serving a token the trusted party no longer vouches for.
//!
//! The token must name the bundle it accompanies in `additionalData.bundle`.
//! When the discovering connector pins a digest, the token's
//! `documentDigest` must match it as well.
//!
//! Cryptographic material that cannot be decoded and registries that cannot
//! be reached are errors, never a silent pass.
//!
//! ## Verdict cache
//!
//! The signature half is a pure function of the token, so
//! [`VerificationMode::Cached`] keeps verdicts in an LRU keyed by the SHA-256
//! of the token's canonical bytes. The registry half is always asked.

use std::num::NonZeroUsize;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lru::LruCache;
use p256::ecdsa::signature::{DigestVerifier, Signer};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use x509_cert::der::Decode;

use crate::canonical::to_canonical_bytes;
use crate::store::{RemoteCallError, TokenRegistry};
use crate::types::{QualifiedName, Token, TokenData};

/// Integrity could not be decided.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityVerificationError {
    /// The token payload could not be serialized.
    #[error("Token payload cannot be canonicalized: {0}")]
    Canonicalization(String),
    /// The signature is not base64 or not an ECDSA signature.
    #[error("Malformed token signature: {0}")]
    MalformedSignature(String),
    /// The embedded certificate or its key cannot be decoded.
    #[error("Invalid trusted-party certificate: {0}")]
    InvalidCertificate(String),
    /// The trusted party's registry could not be queried.
    #[error("Token registry unavailable: {0}")]
    Registry(#[from] RemoteCallError),
}

/// Why a bundle was not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// No token accompanied the bundle.
    MissingToken,
    /// The token was issued for another bundle.
    BundleMismatch,
    /// The token digest differs from the connector's pinned digest.
    DigestMismatch,
    /// The signature does not verify.
    BadSignature,
    /// The trusted party does not list the token.
    NotRegistered,
}

/// Configuration for the signature verdict cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            enabled: true,
        }
    }
}

/// How signatures are verified.
#[derive(Debug, Clone, Default)]
pub enum VerificationMode {
    /// Verify every signature.
    #[default]
    Direct,
    /// Keep signature verdicts in an LRU cache.
    Cached {
        /// Cache configuration.
        config: CacheConfig,
    },
}

impl VerificationMode {
    /// Cached verification with default configuration.
    pub fn cached() -> Self {
        Self::Cached {
            config: CacheConfig::default(),
        }
    }
}

/// Outcome of an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityResult {
    /// Why the bundle is untrusted; `None` when it is trusted.
    pub failure: Option<IntegrityFailure>,
    /// Whether the signature verdict came from cache.
    pub cache_hit: bool,
}

impl IntegrityResult {
    fn failed(failure: IntegrityFailure, cache_hit: bool) -> Self {
        Self {
            failure: Some(failure),
            cache_hit,
        }
    }

    /// Whether the bundle is trusted.
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
}

/// Verifies bundle tokens against their signature and the issuing registry.
///
/// Thread-safe; one verifier is shared by every worker of a search.
pub struct IntegrityVerifier<R> {
    registry: R,
    cache: Option<Arc<RwLock<LruCache<[u8; 32], bool>>>>,
}

impl<R: TokenRegistry> IntegrityVerifier<R> {
    /// Create a verifier.
    pub fn new(registry: R, mode: VerificationMode) -> Self {
        let cache = match &mode {
            VerificationMode::Cached { config } if config.enabled => {
                let size = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
                Some(Arc::new(RwLock::new(LruCache::new(size))))
            }
            _ => None,
        };
        Self { registry, cache }
    }

    /// The token registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Check the token served with `bundle_id`, and its digest when a
    /// connector pinned one.
    pub async fn verify(
        &self,
        bundle_id: &QualifiedName,
        token: Option<&Token>,
        expected_digest: Option<&str>,
    ) -> Result<IntegrityResult, IntegrityVerificationError> {
        let Some(token) = token else {
            return Ok(IntegrityResult::failed(IntegrityFailure::MissingToken, false));
        };

        if token.data.additional_data.bundle != bundle_id.uri() {
            return Ok(IntegrityResult::failed(IntegrityFailure::BundleMismatch, false));
        }

        if let Some(expected) = expected_digest {
            if !digests_match(expected, &token.data.document_digest) {
                return Ok(IntegrityResult::failed(IntegrityFailure::DigestMismatch, false));
            }
        }

        let (signature_valid, cache_hit) = self.signature_verdict(token)?;
        if !signature_valid {
            return Ok(IntegrityResult::failed(IntegrityFailure::BadSignature, cache_hit));
        }

        let trusted_party = &token.data.additional_data.trusted_party_uri;
        let issued = self
            .registry
            .issued_tokens(trusted_party, &token.data.originator_id)
            .await
            .map_err(|e| RemoteCallError::from_source(trusted_party, e))?;
        if !issued.iter().any(|t| t == token) {
            return Ok(IntegrityResult::failed(IntegrityFailure::NotRegistered, cache_hit));
        }

        Ok(IntegrityResult {
            failure: None,
            cache_hit,
        })
    }

    fn signature_verdict(&self, token: &Token) -> Result<(bool, bool), IntegrityVerificationError> {
        let Some(cache) = &self.cache else {
            return Ok((verify_signature(token)?, false));
        };

        let key = verdict_key(token)?;
        if let Some(&valid) = cache.read().peek(&key) {
            return Ok((valid, true));
        }

        let valid = verify_signature(token)?;
        cache.write().put(key, valid);
        Ok((valid, false))
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
            }
        })
    }

    /// Clear the verdict cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

/// SHA-256 of the token's canonical bytes.
fn verdict_key(token: &Token) -> Result<[u8; 32], IntegrityVerificationError> {
    let bytes = to_canonical_bytes(token).map_err(|e| IntegrityVerificationError::Canonicalization(e.to_string()))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&Sha256::digest(&bytes));
    Ok(key)
}

/// Verify a token's signature against its embedded certificate.
pub fn verify_signature(token: &Token) -> Result<bool, IntegrityVerificationError> {
    let payload =
        to_canonical_bytes(&token.data).map_err(|e| IntegrityVerificationError::Canonicalization(e.to_string()))?;

    let raw = BASE64
        .decode(token.signature.trim())
        .map_err(|e| IntegrityVerificationError::MalformedSignature(e.to_string()))?;
    let signature = if raw.len() == 64 {
        Signature::from_slice(&raw)
    } else {
        Signature::from_der(&raw)
    }
    .map_err(|e| IntegrityVerificationError::MalformedSignature(e.to_string()))?;

    let key = certificate_key(&token.data.additional_data.trusted_party_certificate)?;
    Ok(key.verify_digest(Sha256::new_with_prefix(&payload), &signature).is_ok())
}

/// Public key of a PEM-encoded X.509 certificate.
fn certificate_key(certificate_pem: &str) -> Result<VerifyingKey, IntegrityVerificationError> {
    let invalid = |e: String| IntegrityVerificationError::InvalidCertificate(e);

    let pem = pem::parse(certificate_pem).map_err(|e| invalid(e.to_string()))?;
    if pem.tag() != "CERTIFICATE" {
        return Err(invalid(format!("expected CERTIFICATE, found {}", pem.tag())));
    }
    let certificate = x509_cert::Certificate::from_der(pem.contents()).map_err(|e| invalid(e.to_string()))?;
    let key_bits = certificate
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();
    VerifyingKey::from_sec1_bytes(key_bits).map_err(|e| invalid(e.to_string()))
}

/// Hex digests compared by value; other encodings compared case-insensitively.
fn digests_match(expected: &str, actual: &str) -> bool {
    match (hex::decode(expected.trim()), hex::decode(actual.trim())) {
        (Ok(a), Ok(b)) => a == b,
        _ => expected.trim().eq_ignore_ascii_case(actual.trim()),
    }
}

/// Error issuing a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenSigningError {
    /// The PKCS#8 key cannot be decoded.
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
    /// The payload could not be serialized.
    #[error("Token payload cannot be canonicalized: {0}")]
    Canonicalization(String),
}

/// Issue a token as a trusted party: sign the canonical payload with a
/// PKCS#8 PEM P-256 key and attach the DER signature in base64.
pub fn sign_token(data: TokenData, signing_key_pem: &str) -> Result<Token, TokenSigningError> {
    let key = SigningKey::from_pkcs8_pem(signing_key_pem).map_err(|e| TokenSigningError::InvalidKey(e.to_string()))?;
    let payload = to_canonical_bytes(&data).map_err(|e| TokenSigningError::Canonicalization(e.to_string()))?;
    let signature: Signature = key.sign(&payload);
    Ok(Token {
        data,
        signature: BASE64.encode(signature.to_der().as_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenRegistry;
    use crate::types::AdditionalTokenData;

    const KEY: &str = include_str!("../tests/fixtures/trusted_party_key.pem");
    const ROGUE_KEY: &str = include_str!("../tests/fixtures/rogue_key.pem");
    const CERT: &str = include_str!("../tests/fixtures/trusted_party_cert.pem");

    fn bundle_id() -> QualifiedName {
        QualifiedName::new("http://storage-a/api/v1/organizations/ORG1/documents/", "A")
    }

    fn data(digest: &str) -> TokenData {
        TokenData {
            originator_id: "ORG1".to_string(),
            authority_id: "TrustedParty".to_string(),
            token_timestamp: 1_760_000_000,
            document_creation_timestamp: 1_759_999_000,
            document_digest: digest.to_string(),
            additional_data: AdditionalTokenData {
                bundle: "http://storage-a/api/v1/organizations/ORG1/documents/A".to_string(),
                hash_function: "SHA256".to_string(),
                trusted_party_uri: "trusted-party:8020".to_string(),
                trusted_party_certificate: CERT.to_string(),
            },
        }
    }

    #[test]
    fn test_signature_roundtrip_with_fixture_key() {
        let token = sign_token(data("ab12"), KEY).unwrap();
        assert!(verify_signature(&token).unwrap());

        let mut tampered = token.clone();
        tampered.data.document_digest = "cd34".to_string();
        assert!(!verify_signature(&tampered).unwrap());
    }

    #[test]
    fn test_foreign_key_fails_signature() {
        let token = sign_token(data("ab12"), ROGUE_KEY).unwrap();
        assert!(!verify_signature(&token).unwrap());
    }

    #[test]
    fn test_garbage_is_an_error_not_a_pass() {
        let mut token = sign_token(data("ab12"), KEY).unwrap();
        token.signature = "not base64!".to_string();
        assert!(matches!(verify_signature(&token), Err(IntegrityVerificationError::MalformedSignature(_))));

        let mut token = sign_token(data("ab12"), KEY).unwrap();
        token.data.additional_data.trusted_party_certificate = "-----BEGIN CERTIFICATE-----".to_string();
        assert!(matches!(verify_signature(&token), Err(IntegrityVerificationError::InvalidCertificate(_))));
    }

    #[tokio::test]
    async fn test_valid_signature_but_unregistered_token() {
        let token = sign_token(data("ab12"), KEY).unwrap();
        let verifier = IntegrityVerifier::new(InMemoryTokenRegistry::new(), VerificationMode::Direct);
        let result = verifier.verify(&bundle_id(), Some(&token), None).await.unwrap();
        assert_eq!(result.failure, Some(IntegrityFailure::NotRegistered));

        let verifier = IntegrityVerifier::new(
            InMemoryTokenRegistry::new().with_token(token.clone()),
            VerificationMode::Direct,
        );
        assert!(verifier.verify(&bundle_id(), Some(&token), None).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_an_error() {
        let token = sign_token(data("ab12"), KEY).unwrap();
        let verifier = IntegrityVerifier::new(InMemoryTokenRegistry::new().with_unreachable(), VerificationMode::Direct);
        assert!(matches!(
            verifier.verify(&bundle_id(), Some(&token), None).await,
            Err(IntegrityVerificationError::Registry(_))
        ));
    }

    #[tokio::test]
    async fn test_digest_pin_is_case_insensitive() {
        let token = sign_token(data("AB12"), KEY).unwrap();
        let verifier = IntegrityVerifier::new(InMemoryTokenRegistry::new().with_token(token.clone()), VerificationMode::Direct);
        assert!(verifier.verify(&bundle_id(), Some(&token), Some("ab12")).await.unwrap().is_valid());
        let mismatch = verifier.verify(&bundle_id(), Some(&token), Some("ffff")).await.unwrap();
        assert_eq!(mismatch.failure, Some(IntegrityFailure::DigestMismatch));
        let missing = verifier.verify(&bundle_id(), None, None).await.unwrap();
        assert_eq!(missing.failure, Some(IntegrityFailure::MissingToken));
    }

    #[tokio::test]
    async fn test_cached_mode_hits_on_second_verification() {
        let token = sign_token(data("ab12"), KEY).unwrap();
        let verifier = IntegrityVerifier::new(InMemoryTokenRegistry::new().with_token(token.clone()), VerificationMode::cached());

        let first = verifier.verify(&bundle_id(), Some(&token), None).await.unwrap();
        let second = verifier.verify(&bundle_id(), Some(&token), None).await.unwrap();
        assert!(first.is_valid() && second.is_valid());
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(verifier.cache_stats().unwrap().len, 1);

        verifier.clear_cache();
        assert_eq!(verifier.cache_stats().unwrap().len, 0);
    }

    #[tokio::test]
    async fn test_token_for_another_bundle_is_rejected() {
        let token = sign_token(data("ab12"), KEY).unwrap();
        let verifier = IntegrityVerifier::new(InMemoryTokenRegistry::new().with_token(token.clone()), VerificationMode::Direct);

        let other = QualifiedName::new("http://storage-a/api/v1/organizations/ORG1/documents/", "B");
        let result = verifier.verify(&other, Some(&token), None).await.unwrap();
        assert_eq!(result.failure, Some(IntegrityFailure::BundleMismatch));
        assert!(verifier.verify(&bundle_id(), Some(&token), None).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_cache_keeps_tokens_with_equal_payloads_apart() {
        let genuine = sign_token(data("ab12"), KEY).unwrap();
        let forged = sign_token(data("ab12"), ROGUE_KEY).unwrap();
        let verifier = IntegrityVerifier::new(
            InMemoryTokenRegistry::new().with_token(genuine.clone()),
            VerificationMode::cached(),
        );

        assert!(verifier.verify(&bundle_id(), Some(&genuine), None).await.unwrap().is_valid());
        let rejected = verifier.verify(&bundle_id(), Some(&forged), None).await.unwrap();
        assert_eq!(rejected.failure, Some(IntegrityFailure::BadSignature));
        assert!(!rejected.cache_hit);
        assert_eq!(verifier.cache_stats().unwrap().len, 2);

        assert_ne!(verdict_key(&genuine).unwrap(), verdict_key(&forged).unwrap());
        let again = verifier.verify(&bundle_id(), Some(&genuine), None).await.unwrap();
        assert!(again.is_valid() && again.cache_hit);
    }
}
