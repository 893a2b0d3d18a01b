//! Configuration management for generic-json-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use generic_json_exporter::normalize::{derive_subsystem, is_valid_prefix};
use generic_json_exporter::{ClientOptions, ExporterOptions, DEFAULT_MAX_DEPTH, DEFAULT_NAMESPACE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9114;
pub const DEFAULT_URI: &str = "http://localhost:9200";
pub const DEFAULT_PATH: &str = "/_cluster/health";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

/// Exporter configuration; every field is optional and falls back to a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Polled service
    pub uri: Option<String>,
    #[serde(alias = "uri-paths")]
    pub paths: Option<Vec<String>>,
    pub namespace: Option<String>,
    #[serde(alias = "timeout-seconds")]
    pub timeout_seconds: Option<u64>,
    pub insecure: Option<bool>,
    #[serde(alias = "ca-cert-path")]
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,

    // Flattening
    #[serde(alias = "max-depth")]
    pub max_depth: Option<usize>,
    #[serde(alias = "evict-stale-metrics")]
    pub evict_stale_metrics: Option<bool>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            uri: Some(DEFAULT_URI.to_string()),
            paths: Some(vec![DEFAULT_PATH.to_string()]),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECONDS),
            insecure: Some(false),
            ca_cert_path: None,
            username: None,
            password: None,
            max_depth: Some(DEFAULT_MAX_DEPTH),
            evict_stale_metrics: Some(false),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn uri(&self) -> &str {
        self.uri.as_deref().unwrap_or(DEFAULT_URI)
    }

    pub fn paths(&self) -> Vec<String> {
        match &self.paths {
            Some(paths) => paths.clone(),
            None => vec![DEFAULT_PATH.to_string()],
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        let basic_auth = match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        ClientOptions {
            timeout: Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
            insecure: self.insecure.unwrap_or(false),
            ca_cert_path: self.ca_cert_path.as_ref().map(PathBuf::from),
            basic_auth,
        }
    }

    pub fn exporter_options(&self) -> ExporterOptions {
        ExporterOptions {
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            evict_stale: self.evict_stale_metrics.unwrap_or(false),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Polled service
    let url = Url::parse(cfg.uri()).map_err(|e| format!("Invalid uri '{}': {}", cfg.uri(), e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!(
            "Invalid uri '{}': scheme must be http or https",
            cfg.uri()
        )
        .into());
    }
    if url.host_str().is_none() {
        return Err(format!("Invalid uri '{}': missing host", cfg.uri()).into());
    }

    let paths = cfg.paths();
    if paths.is_empty() {
        return Err("At least one path must be configured".into());
    }
    let mut subsystems: HashMap<String, &str> = HashMap::with_capacity(paths.len());
    for path in &paths {
        if !path.starts_with('/') {
            return Err(format!("Invalid path '{}': must start with '/'", path).into());
        }
        if let Some(previous) = subsystems.insert(derive_subsystem(path), path) {
            return Err(format!(
                "Paths '{}' and '{}' map to the same subsystem '{}'",
                previous,
                path,
                derive_subsystem(path)
            )
            .into());
        }
    }

    if let Some(namespace) = cfg.namespace.as_deref() {
        if !is_valid_prefix(namespace) {
            return Err(format!(
                "Invalid namespace '{}': must match [a-zA-Z_][a-zA-Z0-9_]*",
                namespace
            )
            .into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            return Err(format!(
                "Invalid log_level '{}': expected off, error, warn, info, debug or trace",
                level
            )
            .into());
        }
    }

    if cfg.timeout_seconds == Some(0) {
        return Err("timeout_seconds must be greater than 0".into());
    }
    if cfg.max_depth == Some(0) {
        return Err("max_depth must be greater than 0".into());
    }

    match (&cfg.username, &cfg.password) {
        (Some(_), None) => return Err("username is set but password is not".into()),
        (None, Some(_)) => return Err("password is set but username is not".into()),
        _ => {}
    }

    if let Some(ca) = cfg.ca_cert_path.as_deref() {
        if !Path::new(ca).exists() {
            return Err(format!("CA certificate file not found: {}", ca).into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

/// Checks that a TLS file exists, is readable and not empty.
fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    let p = Path::new(path);
    if !p.exists() {
        return Err(format!("TLS {} file not found: {}", what, path).into());
    }

    match fs::metadata(p) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
        Ok(_) => Ok(()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    // Polled service
    if let Some(uri) = &args.uri {
        config.uri = Some(uri.clone());
    }
    if !args.paths.is_empty() {
        config.paths = Some(args.paths.clone());
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = Some(namespace.clone());
    }
    if let Some(timeout) = args.timeout {
        config.timeout_seconds = Some(timeout);
    }
    if args.insecure {
        config.insecure = Some(true);
    }
    if let Some(ca) = &args.ca_cert {
        config.ca_cert_path = Some(ca.to_string_lossy().to_string());
    }
    if let Some(user) = &args.username {
        config.username = Some(user.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }

    // Flattening
    if let Some(depth) = args.max_depth {
        config.max_depth = Some(depth);
    }
    if args.evict_stale_metrics {
        config.evict_stale_metrics = Some(true);
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/generic-json-exporter/config.yaml",
                "/etc/generic-json-exporter/config.yml",
                "/etc/generic-json-exporter/config.json",
                "./generic-json-exporter.yaml",
                "./generic-json-exporter.yml",
                "./generic-json-exporter.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
