use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use permitdesk_auth::JwtService;
use permitdesk_server::config::{DEFAULT_CONFIG_PATH, loader::load_config};
use permitdesk_server::{AppState, PermitdeskServer, metrics, observability};

#[derive(Debug, Parser)]
#[command(name = "permitdesk-server", version, about = "permitdesk HTTP server")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "PERMITDESK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print the effective configuration (secrets masked) and exit
    #[arg(long)]
    print_config: bool,

    /// Print a signed bearer token for SUBJECT and exit
    #[arg(long, value_name = "SUBJECT")]
    issue_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let cli = Cli::parse();
    let logs = observability::init_tracing();

    let cfg = load_config(&cli.config).with_context(|| {
        format!("loading configuration from {}", cli.config.display())
    })?;
    tracing::info!(path = %cli.config.display(), "Configuration loaded");
    logs.apply(&cfg.logging);

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&cfg.redacted())?);
        return Ok(());
    }

    if let Some(subject) = cli.issue_token {
        let jwt = JwtService::new(cfg.auth.jwt_secret.as_bytes())?;
        println!(
            "{}",
            jwt.issue(&subject, Duration::from_secs(cfg.auth.token_ttl_secs))?
        );
        return Ok(());
    }

    metrics::init_metrics();
    let state = AppState::from_config(cfg)?;
    PermitdeskServer::new(state).run().await
}
