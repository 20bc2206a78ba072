mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    Alg, AuthSettings, BusSettings, EnvelopeShape, LoggingSettings, RelaySettings,
    ServerSettings, Settings, UserIdParamName,
};

/// Loads the configuration from `config/default` and `WEST_*` environment
/// variables, then merges what was found over the default values.
///
/// Nested keys use `__` in the environment (`WEST_BUS__URL`), and
/// `WEST_AUTH__ALGORITHMS` accepts a comma separated list.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("WEST")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("auth.algorithms")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    let server = partial.server;
    let bus = partial.bus;
    let auth = partial.auth;
    let relay = partial.relay;
    let logging = partial.logging;

    Ok(Settings {
        server: ServerSettings {
            host: server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
            health_check_path: server
                .as_ref()
                .and_then(|s| s.health_check_path.clone())
                .unwrap_or(default.server.health_check_path),
        },
        bus: BusSettings {
            url: bus.as_ref().and_then(|b| b.url.clone()).or(default.bus.url),
            channel: bus
                .as_ref()
                .and_then(|b| b.channel.clone())
                .unwrap_or(default.bus.channel),
        },
        auth: AuthSettings {
            user_id_param_name: auth
                .as_ref()
                .and_then(|a| a.user_id_param_name)
                .unwrap_or(default.auth.user_id_param_name),
            trusted_header: auth
                .as_ref()
                .and_then(|a| a.trusted_header.clone())
                .or(default.auth.trusted_header),
            public_key: auth
                .as_ref()
                .and_then(|a| a.public_key.clone())
                .or(default.auth.public_key),
            algorithms: auth
                .as_ref()
                .and_then(|a| a.algorithms.clone())
                .unwrap_or(default.auth.algorithms),
        },
        relay: RelaySettings {
            envelope: relay
                .as_ref()
                .and_then(|r| r.envelope)
                .unwrap_or(default.relay.envelope),
            identity_field: relay
                .as_ref()
                .and_then(|r| r.identity_field.clone())
                .unwrap_or(default.relay.identity_field),
        },
        logging: LoggingSettings {
            level: logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
            format: logging
                .as_ref()
                .and_then(|l| l.format.clone())
                .unwrap_or(default.logging.format),
        },
    })
}
