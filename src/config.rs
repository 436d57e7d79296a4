use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

const TEN_YEARS_IN_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main configuration, loadable from CLI flags, a TOML file, or both
/// (CLI takes precedence).
///
/// Example configuration file content
/// # vod-edge configuration
///
/// # Server
/// listen_on_port = 8080
///
/// # Storage origin
/// storage_backend = "s3"   # Options: "local" or "s3"
/// workspace = "./media"    # root for the "local" backend
/// s3_bucket = "my-vod-bucket"
/// s3_endpoint = "http://localhost:9000"  # Optional: MinIO or custom S3
/// s3_region = "us-east-1"                # Optional
/// s3_access_key_id = "minioadmin"
/// s3_secret_access_key = "minioadmin"
///
/// # Delivery
/// cdn_domain = "d111111abcdef8.cloudfront.net"
/// key_pair_id = "K2JCJMDEHXQW5F"
/// secret_path = "/run/secrets/signing.json"
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Root directory for the local storage backend
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Configuration file path (merged under CLI arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Storage backend: local or s3
    #[arg(short, long, default_value = "local")]
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// S3 bucket name (required when storage-backend is s3)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,

    /// S3 endpoint (for MinIO/custom S3)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,

    /// S3 region
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,

    /// S3 access key ID
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_secret_access_key: Option<String>,

    /// Delivery domain rewritten playlists point at
    #[arg(long, default_value = "")]
    #[serde(default)]
    pub cdn_domain: String,

    /// Identifier of the public key registered with the delivery network
    #[arg(long, default_value = "")]
    #[serde(default)]
    pub key_pair_id: String,

    /// Path to the JSON secret document (clientId, clientSecret, privateKey)
    #[arg(long, default_value = "")]
    #[serde(default)]
    pub secret_path: String,

    /// Reserved query-parameter prefix marking signing parameters to
    /// forward onto rewritten manifest references
    #[arg(long, default_value = "sign-")]
    #[serde(default = "default_sign_param_prefix")]
    pub sign_param_prefix: String,

    /// TTL in seconds for URLs issued by the signing endpoint
    #[arg(long, default_value_t = TEN_YEARS_IN_SECONDS)]
    #[serde(default = "default_sign_ttl_secs")]
    pub sign_ttl_secs: u64,

    /// TTL in seconds for segment URLs signed during playlist rewriting
    #[arg(long, default_value_t = 3600)]
    #[serde(default = "default_segment_ttl_secs")]
    pub segment_ttl_secs: u64,

    /// Resource pattern the signing endpoint scopes policies to; when
    /// unset, each policy is narrowed to the exact URL being signed
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_pattern: Option<String>,

    /// Sign nested playlist references too, instead of leaving them for
    /// the trusted-key mechanism at the edge
    #[arg(long, default_value_t = false)]
    #[serde(default)]
    pub sign_manifests: bool,

    /// Require client credentials on the playlist proxy endpoint
    #[arg(long, default_value_t = false)]
    #[serde(default)]
    pub proxy_auth: bool,

    /// Origins allowed by CORS; empty means permissive
    #[arg(long, value_delimiter = ',')]
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            workspace: default_workspace(),
            config: None,
            storage_backend: default_storage_backend(),
            s3_bucket: None,
            s3_endpoint: None,
            s3_region: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            cdn_domain: String::new(),
            key_pair_id: String::new(),
            secret_path: String::new(),
            sign_param_prefix: default_sign_param_prefix(),
            sign_ttl_secs: default_sign_ttl_secs(),
            segment_ttl_secs: default_segment_ttl_secs(),
            resource_pattern: None,
            sign_manifests: false,
            proxy_auth: false,
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.storage_backend == default_storage_backend() {
            self.storage_backend = file_config.storage_backend;
        }
        if self.cdn_domain.is_empty() {
            self.cdn_domain = file_config.cdn_domain;
        }
        if self.key_pair_id.is_empty() {
            self.key_pair_id = file_config.key_pair_id;
        }
        if self.secret_path.is_empty() {
            self.secret_path = file_config.secret_path;
        }
        if self.sign_param_prefix == default_sign_param_prefix() {
            self.sign_param_prefix = file_config.sign_param_prefix;
        }
        if self.sign_ttl_secs == default_sign_ttl_secs() {
            self.sign_ttl_secs = file_config.sign_ttl_secs;
        }
        if self.segment_ttl_secs == default_segment_ttl_secs() {
            self.segment_ttl_secs = file_config.segment_ttl_secs;
        }
        if !self.sign_manifests {
            self.sign_manifests = file_config.sign_manifests;
        }
        if !self.proxy_auth {
            self.proxy_auth = file_config.proxy_auth;
        }
        if self.allowed_origins.is_empty() {
            self.allowed_origins = file_config.allowed_origins;
        }

        if self.s3_bucket.is_none() {
            self.s3_bucket = file_config.s3_bucket;
        }
        if self.s3_endpoint.is_none() {
            self.s3_endpoint = file_config.s3_endpoint;
        }
        if self.s3_region.is_none() {
            self.s3_region = file_config.s3_region;
        }
        if self.s3_access_key_id.is_none() {
            self.s3_access_key_id = file_config.s3_access_key_id;
        }
        if self.s3_secret_access_key.is_none() {
            self.s3_secret_access_key = file_config.s3_secret_access_key;
        }
        if self.resource_pattern.is_none() {
            self.resource_pattern = file_config.resource_pattern;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cdn_domain.is_empty() {
            return Err(anyhow::anyhow!("cdn_domain is required"));
        }
        if self.key_pair_id.is_empty() {
            return Err(anyhow::anyhow!("key_pair_id is required"));
        }
        if self.secret_path.is_empty() {
            return Err(anyhow::anyhow!("secret_path is required"));
        }
        if self.sign_param_prefix.is_empty() {
            return Err(anyhow::anyhow!("sign_param_prefix cannot be empty"));
        }
        if self.sign_ttl_secs == 0 || self.segment_ttl_secs == 0 {
            return Err(anyhow::anyhow!("signing TTLs must be positive"));
        }

        match self.storage_backend.as_str() {
            "local" => {}
            "s3" => {
                if self
                    .s3_bucket
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 bucket name is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_access_key_id
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 access key ID is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_secret_access_key
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 secret access key is required when backend is 's3'"
                    ));
                }
            }
            backend => {
                return Err(anyhow::anyhow!(
                    "Unsupported storage backend: {}. Use 'local' or 's3'",
                    backend
                ));
            }
        }

        for origin in &self.allowed_origins {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "Allowed origin must start with http:// or https://: {}",
                    origin
                ));
            }
        }

        Ok(())
    }

    /// Convert to S3 storage backend configuration
    pub fn to_s3_config(&self) -> Option<S3Config> {
        if self.storage_backend != "s3" {
            return None;
        }

        Some(S3Config {
            bucket: self.s3_bucket.clone()?,
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key_id: self.s3_access_key_id.clone()?,
            secret_access_key: self.s3_secret_access_key.clone()?,
        })
    }
}

// S3 configuration subset
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_sign_param_prefix() -> String {
    "sign-".to_string()
}

fn default_sign_ttl_secs() -> u64 {
    TEN_YEARS_IN_SECONDS
}

fn default_segment_ttl_secs() -> u64 {
    3600
}
