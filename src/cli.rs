//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bearer credential resolution for multi-tenant APIs
#[derive(Parser, Debug)]
#[command(name = "tenant-authn")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TENANT_AUTHN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TENANT_AUTHN_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "TENANT_AUTHN_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "TENANT_AUTHN_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TENANT_AUTHN_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    Serve,

    /// Load the configuration and key material, report, and exit
    Check,
}
