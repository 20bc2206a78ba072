//! The `auth` module turns a WebSocket handshake request into an optional,
//! verified [`Identity`].
//!
//! Two strategies exist and exactly one is active, chosen by configuration:
//!
//! - [`TrustedParameter`]: the identity is read verbatim from a query parameter
//!   (or header). A reverse proxy in front of the gateway is trusted to inject
//!   and validate it.
//! - [`BearerToken`]: the query parameter carries a compact signed token; its
//!   `sub` claim becomes the identity once the signature checks out.
//!
//! Every failure maps to `None`. Callers get no reason, so unauthenticated
//! probes learn nothing either.

pub mod token;

use std::sync::Arc;

use tracing::debug;
use tungstenite::handshake::server::Request;

use crate::config::{AuthSettings, UserIdParamName};
use crate::registry::Identity;
use crate::utils::GatewayError;

pub use token::{TokenVerifier, decode_segment};

/// Extracts the identity a handshake request is entitled to.
///
/// Implementations must not panic on malformed input.
pub trait IdentityExtractor: Send + Sync {
    fn extract(&self, request: &Request) -> Option<Identity>;
}

/// Builds the extractor selected by `auth.user_id_param_name`.
pub fn from_settings(auth: &AuthSettings) -> Result<Arc<dyn IdentityExtractor>, GatewayError> {
    let param = auth.user_id_param_name.as_str();
    match auth.user_id_param_name {
        UserIdParamName::RemoteUserId => {
            let extractor = match &auth.trusted_header {
                Some(header) => TrustedParameter::header(header),
                None => TrustedParameter::query(param),
            };
            Ok(Arc::new(extractor))
        }
        UserIdParamName::Token => {
            let path = auth.public_key.as_deref().ok_or_else(|| {
                GatewayError::KeyMaterial("auth.public_key is required for token auth".into())
            })?;
            let verifier = TokenVerifier::from_file(path, &auth.algorithms)?;
            Ok(Arc::new(BearerToken::new(param, verifier)))
        }
    }
}

/// Returns the value of `key` in the request's query string, but only when it
/// occurs exactly once with a non-empty value.
pub fn get_query_param(request: &Request, key: &str) -> Option<String> {
    let query = request.uri().query()?;
    let mut values = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, value)| name == key && !value.is_empty())
        .map(|(_, value)| value.into_owned());

    let value = values.next()?;
    if values.next().is_some() {
        return None;
    }
    Some(value)
}

fn get_header(request: &Request, name: &str) -> Option<String> {
    let mut values = request.headers().get_all(name).iter();
    let value = values.next()?.to_str().ok()?.to_string();
    if values.next().is_some() {
        return None;
    }
    Some(value)
}

#[derive(Debug, Clone)]
enum TrustedSource {
    Query(String),
    Header(String),
}

/// Trusts an upstream-injected identity without any cryptographic check.
#[derive(Debug, Clone)]
pub struct TrustedParameter {
    source: TrustedSource,
}

impl TrustedParameter {
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            source: TrustedSource::Query(name.into()),
        }
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self {
            source: TrustedSource::Header(name.into()),
        }
    }
}

impl IdentityExtractor for TrustedParameter {
    fn extract(&self, request: &Request) -> Option<Identity> {
        let value = match &self.source {
            TrustedSource::Query(name) => get_query_param(request, name),
            TrustedSource::Header(name) => get_header(request, name),
        };
        value.and_then(Identity::new)
    }
}

/// Verifies a compact token carried in a query parameter.
pub struct BearerToken {
    param: String,
    verifier: TokenVerifier,
}

impl BearerToken {
    pub fn new(param: impl Into<String>, verifier: TokenVerifier) -> Self {
        Self {
            param: param.into(),
            verifier,
        }
    }
}

impl IdentityExtractor for BearerToken {
    fn extract(&self, request: &Request) -> Option<Identity> {
        let token = get_query_param(request, &self.param)?;
        match self.verifier.identity(&token) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Token rejected: {e}");
                None
            }
        }
    }
}
