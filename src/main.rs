//! Tenant AuthN - bearer credential resolution for multi-tenant APIs

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use tenant_authn::{
    cli::{Cli, Command},
    config::Config,
    gateway::{Gateway, ResolvedAuthConfig},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match cli.command {
        Some(Command::Check) => run_check(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config, ExitCode> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            Err(ExitCode::FAILURE)
        }
    }
}

/// Build every validator and report, without serving
fn run_check(config: &Config) -> ExitCode {
    match ResolvedAuthConfig::from_config(&config.auth) {
        Ok(_) => {
            let auth = &config.auth;
            let keys: usize = auth.issuers.iter().map(|i| i.keys.len()).sum();
            println!("✅ Configuration valid");
            println!("   Issuers: {} ({keys} key(s))", auth.issuers.len());
            println!("   Allowed issuers: {}", auth.allowed_issuers.join(", "));
            println!("   Allowed audiences: {}", auth.allowed_audiences.join(", "));
            println!("   Service tokens: {}", auth.service_tokens.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        issuers = config.auth.issuers.len(),
        "Starting Tenant AuthN"
    );

    // Unparseable key material is fatal at startup
    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to build trust state: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
