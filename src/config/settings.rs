use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration settings for the gateway.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusSettings,
    pub auth: AuthSettings,
    pub relay: RelaySettings,
    pub logging: LoggingSettings,
}

/// Where the handshake endpoint listens, and which path answers health probes.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub health_check_path: String,
}

/// The pub/sub backing store and the channel the relay subscribes to.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BusSettings {
    pub url: Option<String>,
    pub channel: String,
}

/// Query parameter carrying the identity. Its name also selects the strategy.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum UserIdParamName {
    /// Bearer-token strategy: the parameter carries a signed compact token.
    #[serde(rename = "token")]
    Token,
    /// Trusted-parameter strategy: the value is taken verbatim.
    #[serde(rename = "remote-user-id")]
    RemoteUserId,
}

impl UserIdParamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserIdParamName::Token => "token",
            UserIdParamName::RemoteUserId => "remote-user-id",
        }
    }
}

/// Signature algorithms accepted for bearer tokens. Symmetric algorithms are
/// not representable here on purpose: the verification key is a public key.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Alg {
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuthSettings {
    pub user_id_param_name: UserIdParamName,
    /// Read the trusted identity from this header instead of the query string.
    pub trusted_header: Option<String>,
    /// Path of the PEM encoded public key used to verify tokens.
    pub public_key: Option<PathBuf>,
    pub algorithms: Vec<Alg>,
}

/// Where the target identity lives inside a bus event.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeShape {
    /// `{"user_id": "...", ...}`
    Flat,
    /// `{"payload": {"user_id": "...", ...}, ...}`
    Nested,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelaySettings {
    pub envelope: EnvelopeShape,
    pub identity_field: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub bus: Option<PartialBusSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub health_check_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBusSettings {
    pub url: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialAuthSettings {
    pub user_id_param_name: Option<UserIdParamName>,
    pub trusted_header: Option<String>,
    pub public_key: Option<PathBuf>,
    pub algorithms: Option<Vec<Alg>>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub envelope: Option<EnvelopeShape>,
    pub identity_field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8001,
                health_check_path: "/probe".to_string(),
            },
            bus: BusSettings {
                url: None,
                channel: "notifications".to_string(),
            },
            auth: AuthSettings {
                user_id_param_name: UserIdParamName::Token,
                trusted_header: None,
                public_key: None,
                algorithms: vec![Alg::RS256],
            },
            relay: RelaySettings {
                envelope: EnvelopeShape::Nested,
                identity_field: "user_id".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}
