use crate::config::Config;
use crate::secrets::{SecretCache, SecretStore};
use crate::storage::{MediaStore, StorageBackend};
use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared per-process dependencies, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<MediaStore>,
    pub secrets: Arc<SecretCache>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let backend = match config.storage_backend.as_str() {
            "local" => {
                info!("Using local filesystem storage");
                StorageBackend::Local {
                    root: PathBuf::from(&config.workspace),
                }
            }
            "s3" => {
                info!("Using S3 storage backend");
                let s3 = config
                    .to_s3_config()
                    .ok_or_else(|| anyhow!("S3 configuration is required when using S3 backend"))?;
                StorageBackend::S3 {
                    bucket: s3.bucket,
                    endpoint: s3.endpoint,
                    region: s3.region,
                    access_key_id: s3.access_key_id,
                    secret_access_key: s3.secret_access_key,
                }
            }
            backend => {
                return Err(anyhow!(
                    "Unsupported storage backend: {}. Use 'local' or 's3'",
                    backend
                ));
            }
        };

        let storage = MediaStore::new(&backend)?;
        let secrets = SecretCache::new(
            SecretStore::File(PathBuf::from(&config.secret_path)),
            config.key_pair_id.clone(),
        );

        Ok(AppState {
            storage: Arc::new(storage),
            secrets: Arc::new(secrets),
            config: Arc::new(config),
        })
    }
}
