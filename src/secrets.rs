use crate::error::ApiError;
use crate::signer::RsaUrlSigner;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Secret document shared with signing clients. The shape matches the vault
/// record provisioned next to the CDN key pair: the credential pair the
/// clients present, plus the private half of the key pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSecret {
    pub client_id: String,
    pub client_secret: String,
    pub private_key: String,
}

/// Where the secret document comes from.
#[derive(Debug, Clone)]
pub enum SecretStore {
    /// JSON document on local disk (a mounted secret).
    File(PathBuf),
    /// Pre-built document, used by tests.
    Static(SigningSecret),
}

impl SecretStore {
    async fn fetch(&self) -> Result<SigningSecret, ApiError> {
        match self {
            SecretStore::File(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
                    ApiError::Upstream(format!(
                        "failed to read secret {}: {err}",
                        path.display()
                    ))
                })?;
                serde_json::from_str(&raw)
                    .map_err(|err| ApiError::Upstream(format!("malformed secret document: {err}")))
            }
            SecretStore::Static(secret) => Ok(secret.clone()),
        }
    }
}

/// Credentials and signer derived from one secret fetch.
pub struct SigningIdentity {
    pub client_id: String,
    pub client_secret: String,
    pub signer: Arc<RsaUrlSigner>,
}

/// Process-wide secret cache.
///
/// Populated at most once behind a lock (concurrent first requests collapse
/// into a single fetch), read lock-free afterwards. `invalidate` drops the
/// cached document so a rotated secret is picked up on the next request.
pub struct SecretCache {
    store: SecretStore,
    key_pair_id: String,
    cached: RwLock<Option<Arc<SigningIdentity>>>,
    populate: Mutex<()>,
}

impl SecretCache {
    pub fn new(store: SecretStore, key_pair_id: impl Into<String>) -> Self {
        SecretCache {
            store,
            key_pair_id: key_pair_id.into(),
            cached: RwLock::new(None),
            populate: Mutex::new(()),
        }
    }

    pub async fn get(&self) -> Result<Arc<SigningIdentity>, ApiError> {
        if let Some(identity) = self.cached.read().clone() {
            return Ok(identity);
        }

        let _populating = self.populate.lock().await;
        // Another request may have finished the fetch while we waited.
        if let Some(identity) = self.cached.read().clone() {
            return Ok(identity);
        }

        let secret = self.store.fetch().await?;
        let signer = RsaUrlSigner::from_pem(&secret.private_key, self.key_pair_id.clone())?;
        let identity = Arc::new(SigningIdentity {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            signer: Arc::new(signer),
        });

        *self.cached.write() = Some(Arc::clone(&identity));
        info!("Signing secret loaded");
        Ok(identity)
    }

    /// Forget the cached document; the next `get` re-fetches it.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }
}
