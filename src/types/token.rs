//! Integrity tokens issued by a trusted party for stored bundles.

use serde::{Deserialize, Serialize};

/// Signed credential accompanying a fetched bundle.
///
/// `signature` is a base64 ECDSA/SHA-256 signature over the canonical JSON
/// form of `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Signed payload.
    pub data: TokenData,
    /// Base64 signature.
    pub signature: String,
}

/// Signed payload of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    /// Organization that stored the document.
    pub originator_id: String,
    /// Trusted party that issued the token.
    pub authority_id: String,
    /// Issue time (epoch seconds).
    pub token_timestamp: i64,
    /// Document creation time (epoch seconds).
    pub document_creation_timestamp: i64,
    /// Digest of the stored document.
    pub document_digest: String,
    /// Bundle and trusted-party details.
    pub additional_data: AdditionalTokenData,
}

/// Bundle and trusted-party details of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalTokenData {
    /// Bundle URI the token covers.
    pub bundle: String,
    /// Hash function used for `document_digest`.
    pub hash_function: String,
    /// Base URI of the trusted party's registry.
    pub trusted_party_uri: String,
    /// PEM certificate of the trusted party.
    pub trusted_party_certificate: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_wire_names() {
        let json = serde_json::json!({
            "data": {
                "originatorId": "ORG1",
                "authorityId": "TrustedParty",
                "tokenTimestamp": 1700000000,
                "documentCreationTimestamp": 1699999000,
                "documentDigest": "abc123",
                "additionalData": {
                    "bundle": "http://storage/api/v1/organizations/ORG1/documents/B",
                    "hashFunction": "SHA256",
                    "trustedPartyUri": "trusted-party:8020",
                    "trustedPartyCertificate": "-----BEGIN CERTIFICATE-----"
                }
            },
            "signature": "c2ln"
        });
        let token: Token = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(token.data.originator_id, "ORG1");
        assert_eq!(token.data.additional_data.hash_function, "SHA256");
        assert_eq!(serde_json::to_value(&token).unwrap(), json);
    }
}
