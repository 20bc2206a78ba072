//! CLI for west
//!
//! Subcommands:
//! - `serve`: run the gateway (default)
//! - `settings`: print the effective settings

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::ConfigError;
use tracing::{error, info};

use west::auth;
use west::config::{Settings, load_config};
use west::registry::Registry;
use west::relay::{self, Envelope, EventRelay};
use west::transport::{Gateway, start_websocket_server};
use west::utils::{GatewayError, logging};

#[derive(Parser)]
#[command(name = "west", about = "Real-time notification gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the WebSocket gateway
    Serve,
    /// Print the effective settings as JSON
    Settings,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info", "text");
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level, &settings.logging.format);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Settings => match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to render settings: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Serve => match run_server(settings).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Gateway stopped: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_server(settings: Settings) -> Result<(), GatewayError> {
    let extractor = auth::from_settings(&settings.auth)?;
    let url = settings
        .bus
        .url
        .as_deref()
        .ok_or_else(|| ConfigError::NotFound("bus.url".to_string()))?;

    let bus = relay::subscribe(url, &settings.bus.channel).await?;

    let registry = Arc::new(Registry::new());
    let relay = EventRelay::new(registry.clone(), Envelope::from_settings(&settings.relay));
    let gateway = Gateway::new(registry, extractor, &settings.server.health_check_path);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    tokio::select! {
        result = start_websocket_server(addr, gateway) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
            Ok(())
        }
        result = relay.run(bus) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    }
}
