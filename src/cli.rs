//! CLI arguments and subcommands for generic-json-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "generic-json-exporter",
    about = "Prometheus exporter for arbitrary JSON HTTP endpoints",
    long_about = "Prometheus exporter for arbitrary JSON HTTP endpoints.\n\n\
                  Polls one or more JSON endpoints of a service (for example the \
                  Elasticsearch cluster health or node stats APIs) on every scrape and \
                  republishes every number and boolean in the document as a gauge named \
                  after its key-path.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level [default: info, or `log_level` from the config file]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Base URI of the service to poll (scheme, host, port)
    #[arg(short = 'u', long)]
    pub uri: Option<String>,

    /// Request path to poll; repeat for several endpoints
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// Metric namespace (first name segment of every metric)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Timeout in seconds for requests to the polled service
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip TLS certificate verification of the polled service
    #[arg(long)]
    pub insecure: bool,

    /// PEM CA certificate used to verify the polled service
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Basic auth user for the polled service
    #[arg(long)]
    pub username: Option<String>,

    /// Basic auth password for the polled service
    #[arg(long, env = "JSON_EXPORTER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Maximum nesting depth of a document before the scrape is rejected
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Drop metrics that a successful scrape no longer reports
    #[arg(long)]
    pub evict_stale_metrics: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal json_exporter_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Scrape every configured endpoint once and print the flattened metrics
    Probe {
        /// Number of scrape iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print every metric with its value
        #[arg(long)]
        verbose: bool,
    },
}
