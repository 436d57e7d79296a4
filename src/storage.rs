use crate::error::ApiError;
use anyhow::{Result, anyhow};
use opendal::layers::TimeoutLayer;
use opendal::services::{Fs, S3};
use opendal::{ErrorKind, Operator};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Every origin fetch must finish inside the caller's overall request
/// timeout; there is no retry, a failed read fails the request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Which origin the playlists are read from.
#[derive(Clone, Debug)]
pub enum StorageBackend {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: String,
        secret_access_key: String,
    },
}

/// Read-only view of the media origin.
#[derive(Clone)]
pub struct MediaStore {
    operator: Operator,
}

impl MediaStore {
    pub fn new(backend: &StorageBackend) -> Result<Self> {
        let operator = match backend {
            StorageBackend::Local { root } => build_fs_operator(root)?,
            StorageBackend::S3 {
                bucket,
                endpoint,
                region,
                access_key_id,
                secret_access_key,
            } => build_s3_operator(
                bucket,
                endpoint.as_deref(),
                region.as_deref(),
                access_key_id,
                secret_access_key,
            )?,
        };

        Ok(MediaStore { operator })
    }

    /// Fetch one object fully into memory. Playlist documents are small;
    /// range reads are not needed here.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>, ApiError> {
        self.operator
            .read(key)
            .await
            .map(|buffer| buffer.to_vec())
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    ApiError::NotFound
                } else {
                    ApiError::Storage(err)
                }
            })
    }
}

fn build_fs_operator(root: &Path) -> Result<Operator> {
    info!(root = ?root, "Using filesystem origin");

    let builder = Fs::default().root(
        root.to_str()
            .ok_or_else(|| anyhow!("Invalid root path: {:?}", root))?,
    );

    Ok(Operator::new(builder)?
        .layer(TimeoutLayer::new().with_timeout(FETCH_TIMEOUT))
        .finish())
}

fn build_s3_operator(
    bucket: &str,
    endpoint: Option<&str>,
    region: Option<&str>,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    info!(
        bucket = %bucket,
        endpoint = ?endpoint,
        region = ?region,
        "Using S3 origin"
    );

    let mut builder = S3::default();
    builder = builder.bucket(bucket);
    builder = builder.access_key_id(access_key_id);
    builder = builder.secret_access_key(secret_access_key);

    if let Some(region) = region {
        builder = builder.region(region);
    }

    if let Some(endpoint) = endpoint {
        builder = builder.endpoint(endpoint);
    }

    Ok(Operator::new(builder)?
        .layer(TimeoutLayer::new().with_timeout(FETCH_TIMEOUT))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vod-edge-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[tokio::test]
    async fn reads_an_existing_key() {
        let root = scratch_dir();
        std::fs::create_dir_all(root.join("show")).unwrap();
        std::fs::write(root.join("show/master.m3u8"), b"#EXTM3U\n").unwrap();

        let store = MediaStore::new(&StorageBackend::Local { root: root.clone() }).unwrap();
        let body = store.read("show/master.m3u8").await.unwrap();
        assert_eq!(body, b"#EXTM3U\n");

        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn missing_key_maps_to_not_found() {
        let root = scratch_dir();
        let store = MediaStore::new(&StorageBackend::Local { root: root.clone() }).unwrap();

        assert!(matches!(
            store.read("show/missing.m3u8").await,
            Err(ApiError::NotFound)
        ));

        std::fs::remove_dir_all(root).unwrap();
    }
}
