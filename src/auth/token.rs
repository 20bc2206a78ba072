//! Bearer token verification.
//!
//! The verification profile is intentionally narrow: signature, algorithm
//! allow-list, and `exp`/`nbf` when the token carries them. Audience, issuer,
//! `jti` and the presence of registered claims are not checked; the only claim
//! the gateway relies on is `sub`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

use crate::config::Alg;
use crate::registry::Identity;
use crate::utils::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Ec,
}

fn algorithm(alg: Alg) -> Algorithm {
    match alg {
        Alg::RS256 => Algorithm::RS256,
        Alg::RS384 => Algorithm::RS384,
        Alg::RS512 => Algorithm::RS512,
        Alg::PS256 => Algorithm::PS256,
        Alg::PS384 => Algorithm::PS384,
        Alg::PS512 => Algorithm::PS512,
        Alg::ES256 => Algorithm::ES256,
        Alg::ES384 => Algorithm::ES384,
    }
}

fn family(alg: Alg) -> KeyFamily {
    match alg {
        Alg::ES256 | Alg::ES384 => KeyFamily::Ec,
        _ => KeyFamily::Rsa,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct VerifiedClaims {
    sub: Option<String>,
}

/// Verifies compact tokens against one public key and an algorithm allow-list.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_file(path: &Path, algorithms: &[Alg]) -> Result<Self, GatewayError> {
        let pem = fs::read(path).map_err(|e| {
            GatewayError::KeyMaterial(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_pem(&pem, algorithms)
    }

    /// Accepts an RSA or EC public key in PEM form. Allowed algorithms that do
    /// not fit the key are dropped; none left is an error.
    pub fn from_pem(pem: &[u8], algorithms: &[Alg]) -> Result<Self, GatewayError> {
        let (key, key_family) = match DecodingKey::from_rsa_pem(pem) {
            Ok(key) => (key, KeyFamily::Rsa),
            Err(_) => DecodingKey::from_ec_pem(pem)
                .map(|key| (key, KeyFamily::Ec))
                .map_err(|e| GatewayError::KeyMaterial(e.to_string()))?,
        };

        let mut allowed = Vec::new();
        for alg in algorithms {
            if family(*alg) == key_family {
                allowed.push(algorithm(*alg));
            } else {
                warn!("Ignoring {alg:?}: it does not match the {key_family:?} public key");
            }
        }
        if allowed.is_empty() {
            return Err(GatewayError::KeyMaterial(format!(
                "no allowed algorithm fits the {key_family:?} public key"
            )));
        }

        let mut validation = Validation::new(allowed[0]);
        validation.algorithms = allowed;
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.leeway = 0;

        Ok(Self { key, validation })
    }

    /// Returns the token's subject if the token is structurally sound and its
    /// signature verifies. A valid token without `sub` yields `Ok(None)`.
    pub fn identity(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
        let mut segments = token.split('.');
        let (Some(_header), Some(claims), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(GatewayError::MalformedToken(
                "expected three dot separated segments".into(),
            ));
        };
        if !decode_segment(claims)?.is_object() {
            return Err(GatewayError::MalformedToken(
                "claims are not a JSON object".into(),
            ));
        }

        let data = jsonwebtoken::decode::<VerifiedClaims>(token, &self.key, &self.validation)
            .map_err(|e| GatewayError::MalformedToken(e.to_string()))?;

        Ok(data.claims.sub.and_then(Identity::new))
    }
}

/// Decodes one base64url token segment into JSON, restoring missing padding.
///
/// `eyJ1c2VyX2lkIjogImExIn0` decodes to `{"user_id": "a1"}`.
pub fn decode_segment(segment: &str) -> Result<serde_json::Value, GatewayError> {
    if segment.is_empty() {
        return Err(GatewayError::MalformedToken("empty segment".into()));
    }

    let mut padded = segment.to_string();
    let rem = padded.len() % 4;
    if rem > 0 {
        padded.push_str(&"=".repeat(4 - rem));
    }

    let bytes = URL_SAFE
        .decode(&padded)
        .or_else(|_| STANDARD.decode(&padded))
        .map_err(|e| GatewayError::MalformedToken(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| GatewayError::MalformedToken(e.to_string()))
}
