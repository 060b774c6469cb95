//! mb-gateway: Messenger bot main binary
//!
//! Usage:
//!   mb-gateway                 - Start the webhook server
//!   mb-gateway --setup <mode>  - Run page profile setup and exit
//!   mb-gateway --help          - Show help

use std::sync::Arc;

use mb_core::{Catalog, Config};
use mb_messenger::{
    start_webhook_server, GraphApi, MessengerHandler, PersonaRegistry, Profile, SetupMode,
    WebhookState,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Webhook server
    Server,
    /// One-shot profile setup
    Setup(SetupMode),
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1))?;

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("mb-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    config.check()?;
    let config = Arc::new(config);

    let catalog = Arc::new(Catalog::bundled(&config.default_locale)?);
    tracing::info!(
        "Locales: {:?} (default {})",
        catalog.locales().collect::<Vec<_>>(),
        catalog.default_locale()
    );

    let api = GraphApi::new(&config)?;
    let personas = PersonaRegistry::new();
    let profile = Arc::new(Profile::new(
        api.clone(),
        catalog.clone(),
        config.clone(),
        personas.clone(),
    ));

    match mode {
        RunMode::Setup(setup) => {
            profile.apply(setup).await?;
            tracing::info!("Profile setup complete");
            Ok(())
        }
        _ => {
            let handler = Arc::new(MessengerHandler::new(api.clone(), catalog, personas, &config));
            run_server(config, api, handler, profile).await
        }
    }
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<RunMode> {
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--setup" | "-s" => {
                let mode = args.next().unwrap_or_else(|| "all".to_string());
                return Ok(RunMode::Setup(mode.parse()?));
            }
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(RunMode::Server)
}

/// Print help message
fn print_help() {
    println!("mb-gateway - Messenger customer service bot");
    println!();
    println!("Usage:");
    println!("  mb-gateway                 Start the webhook server");
    println!("  mb-gateway --setup [mode]  Run page setup and exit (default: all)");
    println!("  mb-gateway --help          Show this help message");
    println!("  mb-gateway --version       Show version");
    println!();
    println!("Setup modes:");
    println!("  all, webhook, feed, profile, personas, nlp, domains,");
    println!("  get-started, greeting, menu");
    println!();
    println!("Environment Variables:");
    println!("  PAGE_ID              Facebook page ID (required)");
    println!("  APP_ID               Facebook app ID (required)");
    println!("  PAGE_ACCESS_TOKEN    Page access token (required)");
    println!("  APP_SECRET           App secret (required)");
    println!("  VERIFY_TOKEN         Webhook verify token (required)");
    println!("  APP_URL              Public URL of this server (required)");
    println!("  SHOP_URL             Website whitelisted for webviews");
    println!("  PORT                 Webhook server port (default: 3000)");
    println!("  SEND_STAGGER_MS      Gap between replies (default: 2000)");
    println!("  SETUP_ON_START       Run full setup at startup (default: false)");
    println!("  DEFAULT_LOCALE       Fallback locale (default: es_ES)");
}

/// Run the webhook server until Ctrl+C
async fn run_server(
    config: Arc<Config>,
    api: GraphApi,
    handler: Arc<MessengerHandler>,
    profile: Arc<Profile>,
) -> anyhow::Result<()> {
    if config.server.setup_on_start {
        let profile = profile.clone();
        tokio::spawn(async move {
            if let Err(e) = profile.apply(SetupMode::All).await {
                tracing::error!("Startup profile setup failed: {}", e);
            }
        });
    } else {
        let profile = profile.clone();
        tokio::spawn(async move {
            if let Err(e) = profile.load_personas().await {
                tracing::warn!("Could not load personas: {}", e);
            }
        });
    }

    let state = WebhookState {
        app_secret: config.facebook.app_secret.clone(),
        api,
        handler,
        profile,
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let port = config.server.port;
    let server = tokio::spawn(start_webhook_server(state, port, shutdown_rx));

    tracing::info!("Webhook URL: {}", config.webhook_url());
    tracing::info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    let _ = shutdown_tx.send(());
    server.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(args(&[])).unwrap(), RunMode::Server);
        assert_eq!(parse_args(args(&["--help"])).unwrap(), RunMode::Help);
        assert_eq!(parse_args(args(&["-v"])).unwrap(), RunMode::Version);
        assert_eq!(
            parse_args(args(&["--setup", "menu"])).unwrap(),
            RunMode::Setup(SetupMode::Menu)
        );
        assert_eq!(
            parse_args(args(&["--setup"])).unwrap(),
            RunMode::Setup(SetupMode::All)
        );
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&["--setup", "bogus"])).is_err());
        assert!(parse_args(args(&["--port"])).is_err());
    }
}
