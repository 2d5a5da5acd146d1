use anyhow::{Context, Result};
use config_rs::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object storage holding the tenant block directories
    #[serde(default)]
    pub s3: S3Config,

    /// Blocklist polling and replay settings
    #[serde(default)]
    pub blocklist: BlocklistConfig,

    /// HTTP surface of the long-running poller
    #[serde(default)]
    pub server: ServerConfig,
}

/// Configuration for S3-compatible object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 endpoint URL (e.g., "http://localhost:9000")
    /// Optional when use_env_credentials is set
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Path within the bucket under which tenant directories live
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// AWS region (required but ignored by Minio)
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    #[serde(default)]
    pub session_token: Option<String>,

    /// Allow HTTP connections (true for Minio, false for AWS S3)
    #[serde(default)]
    pub allow_http: bool,

    /// Use the AWS credential chain instead of explicit keys
    #[serde(default)]
    pub use_env_credentials: bool,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

/// Configuration for the blocklist poller and the pending-update replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistConfig {
    /// Seconds between two polls of the object store
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of poll results an incremental update is replayed onto.
    /// Should cover the listing consistency window of the backing store.
    /// Zero disables replay.
    #[serde(default = "default_replay_depth")]
    pub replay_depth: usize,

    /// Maximum number of meta documents fetched concurrently per tenant
    #[serde(default = "default_poll_concurrency")]
    pub poll_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_listen_address")]
    pub http_listen_address: String,
}

fn default_bucket() -> String {
    "tempo".to_string()
}

fn default_prefix() -> String {
    "traces".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_pool_max_idle_per_host() -> usize {
    30
}

fn default_pool_idle_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    300
}

fn default_replay_depth() -> usize {
    1
}

fn default_poll_concurrency() -> usize {
    20
}

fn default_http_listen_address() -> String {
    "0.0.0.0:3200".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket: default_bucket(),
            prefix: default_prefix(),
            region: default_region(),
            access_key_id: "tempo".to_string(),
            secret_access_key: "supersecret".to_string(),
            session_token: None,
            allow_http: true,
            use_env_credentials: false,
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            replay_depth: default_replay_depth(),
            poll_concurrency: default_poll_concurrency(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_listen_address: default_http_listen_address(),
        }
    }
}

impl Config {
    /// Load Config with layered configuration priority:
    /// 1. Default values
    /// 2. TOML file (if provided)
    /// 3. Environment variables prefixed with TEMPO_, nested with `__`
    ///    (e.g. TEMPO_BLOCKLIST__REPLAY_DEPTH=2, TEMPO_S3__BUCKET=traces)
    /// 4. AWS_* credentials from the environment when none were configured
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("s3.endpoint", "http://localhost:9000")?
            .set_default("s3.bucket", default_bucket())?
            .set_default("s3.prefix", default_prefix())?
            .set_default("s3.region", default_region())?
            .set_default("s3.access_key_id", "tempo")?
            .set_default("s3.secret_access_key", "supersecret")?
            .set_default("s3.allow_http", true)?
            .set_default("s3.use_env_credentials", false)?
            .set_default("s3.pool_max_idle_per_host", 30)?
            .set_default("s3.pool_idle_timeout_secs", 120)?
            .set_default("blocklist.poll_interval_secs", 300)?
            .set_default("blocklist.replay_depth", 1)?
            .set_default("blocklist.poll_concurrency", 20)?
            .set_default("server.http_listen_address", default_http_listen_address())?;

        if let Some(file_path) = config_file {
            let path = Path::new(file_path);
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("TEMPO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut app_config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if app_config.s3.access_key_id.is_empty() {
            if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
                app_config.s3.access_key_id = key;
            }
        }

        if app_config.s3.secret_access_key.is_empty() {
            if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                app_config.s3.secret_access_key = secret;
            }
        }

        if app_config.s3.session_token.is_none() {
            if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
                app_config.s3.session_token = Some(token);
            }
        }

        Ok(app_config)
    }

    /// Create a new Config from environment variables with defaults
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        self.s3.validate()?;
        self.blocklist.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

impl S3Config {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.bucket.is_empty(), "S3 bucket cannot be empty");
        anyhow::ensure!(!self.prefix.is_empty(), "S3 prefix cannot be empty");

        if !self.use_env_credentials {
            anyhow::ensure!(
                !self.endpoint.is_empty(),
                "S3 endpoint cannot be empty (unless use_env_credentials=true)"
            );
            anyhow::ensure!(
                !self.access_key_id.is_empty(),
                "S3 access key ID cannot be empty (unless use_env_credentials=true)"
            );
            anyhow::ensure!(
                !self.secret_access_key.is_empty(),
                "S3 secret access key cannot be empty (unless use_env_credentials=true)"
            );
        }

        Ok(())
    }
}

impl BlocklistConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.poll_interval_secs > 0,
            "blocklist poll_interval_secs must be greater than 0"
        );
        anyhow::ensure!(
            self.poll_concurrency > 0,
            "blocklist poll_concurrency must be greater than 0"
        );
        Ok(())
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.http_listen_address
            .parse()
            .with_context(|| format!("Invalid http_listen_address: {}", self.http_listen_address))
    }

    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }
}
