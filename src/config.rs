use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::time::Duration;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Hard ceiling on any single upload, in bytes.
    pub max_upload_bytes: i64,
    /// Reservation TTL; an unconfirmed asset is stale after this.
    pub reservation_ttl: Duration,
    /// Interval between reconciliation sweeps.
    pub sweep_interval: Duration,
    /// How long failed assets are retained before the sweeper purges them.
    pub failed_retention: Duration,
    /// Maximum object keys examined per orphan-scan pass.
    pub orphan_scan_batch: usize,
    /// Secret used to sign upload capability tokens.
    pub capability_secret: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Transactional asset upload service")]
pub struct Args {
    /// Host to bind to (overrides ASSET_VAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_VAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides ASSET_VAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ASSET_VAULT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Hard upload size ceiling in bytes (overrides ASSET_VAULT_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<i64>,

    /// Reservation TTL in seconds (overrides ASSET_VAULT_RESERVATION_TTL_SECS)
    #[arg(long)]
    pub reservation_ttl_secs: Option<u64>,

    /// Sweep interval in seconds (overrides ASSET_VAULT_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

const DEFAULT_MAX_UPLOAD_BYTES: i64 = 25 * 1024 * 1024;
const DEFAULT_RESERVATION_TTL_SECS: u64 = 15 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_FAILED_RETENTION_SECS: u64 = 60 * 60;
const DEFAULT_ORPHAN_SCAN_BATCH: usize = 500;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("ASSET_VAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("ASSET_VAULT_PORT", 3000u16)?;
        let env_storage =
            env::var("ASSET_VAULT_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("ASSET_VAULT_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/asset_vault.db".into());
        let env_max_bytes = parse_env("ASSET_VAULT_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let env_ttl = parse_env(
            "ASSET_VAULT_RESERVATION_TTL_SECS",
            DEFAULT_RESERVATION_TTL_SECS,
        )?;
        let env_sweep = parse_env("ASSET_VAULT_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        let env_retention = parse_env(
            "ASSET_VAULT_FAILED_RETENTION_SECS",
            DEFAULT_FAILED_RETENTION_SECS,
        )?;
        let env_batch = parse_env("ASSET_VAULT_ORPHAN_SCAN_BATCH", DEFAULT_ORPHAN_SCAN_BATCH)?;
        let env_secret = env::var("ASSET_VAULT_CAPABILITY_SECRET")
            .unwrap_or_else(|_| "dev-only-capability-secret".into());

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_bytes),
            reservation_ttl: Duration::from_secs(args.reservation_ttl_secs.unwrap_or(env_ttl)),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs.unwrap_or(env_sweep)),
            failed_retention: Duration::from_secs(env_retention),
            orphan_scan_batch: env_batch,
            capability_secret: env_secret,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read an environment variable, parse it, or fall back to `default`.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
