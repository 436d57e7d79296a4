mod policy;

pub use policy::SigningPolicy;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey as _;
use rsa::signature::{SignatureEncoding as _, Signer as _};
use sha1::Sha1;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Missing {0}")]
    InvalidInput(&'static str),

    #[error("System clock is before the unix epoch")]
    Clock,
}

/// Seam for URL signing so callers can be exercised without key material.
pub trait UrlSigner: Send + Sync {
    /// Append an access policy, signature and key id to `url`, scoped to
    /// `resource` (or to the literal `url` when no pattern is given) and
    /// valid for `ttl` from now.
    fn sign(&self, url: &str, ttl: Duration, resource: Option<&str>) -> Result<String, SignError>;
}

/// Signs URLs for a CDN that verifies RSA-SHA1 policy signatures against a
/// registered public key.
pub struct RsaUrlSigner {
    signing_key: SigningKey<Sha1>,
    key_pair_id: String,
}

impl RsaUrlSigner {
    /// Build a signer from a PEM private key. PKCS#8 and PKCS#1 encodings
    /// are both accepted since provisioned key pairs show up in either.
    pub fn from_pem(pem: &str, key_pair_id: impl Into<String>) -> Result<Self, SignError> {
        let key_pair_id = key_pair_id.into();
        if key_pair_id.is_empty() {
            return Err(SignError::InvalidInput("key pair id"));
        }

        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|err| SignError::InvalidKey(err.to_string()))?;

        Ok(RsaUrlSigner {
            signing_key: SigningKey::new(private_key),
            key_pair_id,
        })
    }

    /// Deterministic form of [`UrlSigner::sign`]: the clock is an argument
    /// so the output is reproducible.
    pub fn sign_at(
        &self,
        url: &str,
        now_epoch: u64,
        ttl: Duration,
        resource: Option<&str>,
    ) -> Result<String, SignError> {
        if url.is_empty() {
            return Err(SignError::InvalidInput("url"));
        }

        let expires = now_epoch + ttl.as_secs();
        let policy_json = SigningPolicy::new(resource.unwrap_or(url), expires).to_json();

        // The signature covers the serialized policy string itself, not the
        // encoded token derived from it.
        let signature = self
            .signing_key
            .try_sign(policy_json.as_bytes())
            .map_err(|err| SignError::InvalidKey(err.to_string()))?;

        let policy_token = encode_token(policy_json.as_bytes());
        let signature_token = encode_token(&signature.to_bytes());

        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{url}{separator}Policy={policy_token}&Signature={signature_token}&Key-Pair-Id={}",
            self.key_pair_id
        ))
    }
}

impl UrlSigner for RsaUrlSigner {
    fn sign(&self, url: &str, ttl: Duration, resource: Option<&str>) -> Result<String, SignError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| SignError::Clock)?
            .as_secs();
        self.sign_at(url, now, ttl, resource)
    }
}

/// CDN-compatible base64 variant: `+` -> `-`, `/` -> `~`, padding stripped,
/// so the token survives inside a query string untouched.
fn encode_token(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('~'),
            '=' => None,
            c => Some(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use rsa::RsaPublicKey;
    use rsa::pkcs1::EncodeRsaPrivateKey as _;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::pkcs8::LineEnding;
    use rsa::signature::Verifier as _;
    use std::sync::LazyLock;
    use url::Url;

    static TEST_KEY: LazyLock<RsaPrivateKey> = LazyLock::new(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate test key")
    });

    const NOW: u64 = 1_700_000_000;

    fn test_signer() -> RsaUrlSigner {
        RsaUrlSigner {
            signing_key: SigningKey::new(TEST_KEY.clone()),
            key_pair_id: "KTESTKEYPAIR".to_string(),
        }
    }

    /// Reverse of `encode_token`.
    fn decode_token(token: &str) -> Vec<u8> {
        let mut b64: String = token
            .chars()
            .map(|c| match c {
                '-' => '+',
                '~' => '/',
                c => c,
            })
            .collect();
        while b64.len() % 4 != 0 {
            b64.push('=');
        }
        STANDARD.decode(b64).expect("token decodes")
    }

    fn query_values<'a>(url: &'a Url, name: &str) -> Vec<String> {
        url.query_pairs()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    #[test]
    fn produces_one_of_each_parameter() {
        let signer = test_signer();
        let signed = signer
            .sign_at(
                "https://cdn.example/show/seg1.ts",
                NOW,
                Duration::from_secs(3600),
                None,
            )
            .unwrap();

        let url = Url::parse(&signed).expect("signed output parses as a URL");
        assert_eq!(query_values(&url, "Policy").len(), 1);
        assert_eq!(query_values(&url, "Signature").len(), 1);
        assert_eq!(query_values(&url, "Key-Pair-Id"), vec!["KTESTKEYPAIR"]);
    }

    #[test]
    fn deterministic_at_a_fixed_instant() {
        let signer = test_signer();
        let url = "https://cdn.example/a.ts";
        let ttl = Duration::from_secs(3600);

        let first = signer.sign_at(url, NOW, ttl, None).unwrap();
        let second = signer.sign_at(url, NOW, ttl, None).unwrap();
        assert_eq!(first, second);

        let later = signer.sign_at(url, NOW + 1, ttl, None).unwrap();
        assert_ne!(first, later);
    }

    #[test]
    fn policy_round_trip() {
        let signer = test_signer();
        let url = "https://cdn.example/show/seg1.ts";
        let ttl = Duration::from_secs(3600);
        let signed = signer
            .sign_at(url, NOW, ttl, Some("https://cdn.example/*"))
            .unwrap();

        let parsed = Url::parse(&signed).unwrap();
        let token = query_values(&parsed, "Policy").remove(0);
        let policy: serde_json::Value =
            serde_json::from_slice(&decode_token(&token)).expect("policy token decodes to JSON");

        let statement = &policy["Statement"][0];
        assert_eq!(statement["Resource"], "https://cdn.example/*");
        assert_eq!(
            statement["Condition"]["DateLessThan"]["AWS:EpochTime"],
            serde_json::json!(NOW + 3600)
        );
    }

    #[test]
    fn resource_defaults_to_the_url() {
        let signer = test_signer();
        let url = "https://cdn.example/only/this.ts";
        let signed = signer
            .sign_at(url, NOW, Duration::from_secs(60), None)
            .unwrap();

        let parsed = Url::parse(&signed).unwrap();
        let token = query_values(&parsed, "Policy").remove(0);
        let policy: serde_json::Value = serde_json::from_slice(&decode_token(&token)).unwrap();
        assert_eq!(policy["Statement"][0]["Resource"], url);
    }

    #[test]
    fn signature_verifies_against_the_public_key() {
        let signer = test_signer();
        let signed = signer
            .sign_at(
                "https://cdn.example/a.ts",
                NOW,
                Duration::from_secs(3600),
                Some("https://cdn.example/*"),
            )
            .unwrap();

        let parsed = Url::parse(&signed).unwrap();
        let policy_bytes = decode_token(&query_values(&parsed, "Policy").remove(0));
        let signature_bytes = decode_token(&query_values(&parsed, "Signature").remove(0));

        let verifying_key = VerifyingKey::<Sha1>::new(RsaPublicKey::from(&*TEST_KEY));
        let signature = Signature::try_from(signature_bytes.as_slice()).unwrap();
        verifying_key
            .verify(&policy_bytes, &signature)
            .expect("signature covers the serialized policy bytes");
    }

    #[test]
    fn appends_with_ampersand_when_url_has_a_query() {
        let signer = test_signer();
        let signed = signer
            .sign_at(
                "https://cdn.example/a.ts?x=1",
                NOW,
                Duration::from_secs(60),
                None,
            )
            .unwrap();

        assert!(signed.starts_with("https://cdn.example/a.ts?x=1&Policy="));
        assert_eq!(signed.matches('?').count(), 1);
    }

    #[test]
    fn rejects_empty_inputs() {
        let signer = test_signer();
        assert!(matches!(
            signer.sign_at("", NOW, Duration::from_secs(60), None),
            Err(SignError::InvalidInput("url"))
        ));

        let pem = TEST_KEY.to_pkcs1_pem(LineEnding::LF).unwrap();
        assert!(matches!(
            RsaUrlSigner::from_pem(&pem, ""),
            Err(SignError::InvalidInput("key pair id"))
        ));
    }

    #[test]
    fn parses_pkcs1_pem() {
        let pem = TEST_KEY.to_pkcs1_pem(LineEnding::LF).unwrap();
        let signer = RsaUrlSigner::from_pem(&pem, "KTESTKEYPAIR").unwrap();
        let signed = signer
            .sign_at(
                "https://cdn.example/a.ts",
                NOW,
                Duration::from_secs(60),
                None,
            )
            .unwrap();
        assert!(signed.contains("Policy="));
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(matches!(
            RsaUrlSigner::from_pem("not a key", "KTESTKEYPAIR"),
            Err(SignError::InvalidKey(_))
        ));
    }

    #[test]
    fn token_encoding_uses_the_substituted_alphabet() {
        // 0xfb 0xef 0xbe encodes to "++++" in standard base64; 0xff 0xff
        // encodes with both '/' and padding.
        assert_eq!(encode_token(&[0xfb, 0xef, 0xbe]), "----");
        assert_eq!(encode_token(&[0xff, 0xff]), "~~8");
        assert!(!encode_token(b"any input at all").contains('='));
    }
}
