//! Expiring links signed with a shared secret.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{StoreError, StoreResult};
use crate::traits::storage::LinkSigner;
use crate::types::config::ApiKey;

type HmacSha256 = Hmac<Sha256>;

/// Signs `{base}/{bucket}/{key}?expires=..&signature=..` links.
///
/// The signature is the hex HMAC-SHA256, keyed by the secret, of the
/// url-encoded `bucket "/" key ":" expires`. Whatever serves the links checks
/// them with [`HmacLinkSigner::verify`] and the same secret.
#[derive(Debug, Clone)]
pub struct HmacLinkSigner {
    base_url: String,
    secret: ApiKey,
}

impl HmacLinkSigner {
    pub fn new(base_url: impl Into<String>, secret: ApiKey) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        }
    }

    /// Link valid until `expires_at`.
    pub fn link(&self, bucket: &str, key: &str, expires_at: DateTime<Utc>) -> StoreResult<String> {
        let expires = expires_at.timestamp();
        Ok(format!(
            "{}/{}/{}?expires={}&signature={}",
            self.base_url,
            urlencoding::encode(bucket),
            urlencoding::encode(key),
            expires,
            self.signature(bucket, key, expires)?
        ))
    }

    pub fn signature(&self, bucket: &str, key: &str, expires: i64) -> StoreResult<String> {
        Ok(hex::encode(self.mac(bucket, key, expires)?.finalize().into_bytes()))
    }

    /// Check a signature and that it has not expired at `now`.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        self.mac(bucket, key, expires)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> StoreResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes())
            .map_err(|e| StoreError::Signing(e.to_string()))?;
        // Encoded parts keep the separators unambiguous
        mac.update(
            format!(
                "{}/{}:{}",
                urlencoding::encode(bucket),
                urlencoding::encode(key),
                expires
            )
            .as_bytes(),
        );
        Ok(mac)
    }
}

#[async_trait]
impl LinkSigner for HmacLinkSigner {
    async fn sign(&self, bucket: &str, key: &str, expires_in: Duration) -> StoreResult<String> {
        self.link(bucket, key, Utc::now() + expires_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> HmacLinkSigner {
        HmacLinkSigner::new("https://files.example/", ApiKey::new("s3cret"))
    }

    #[test]
    fn test_link_format() {
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let link = signer()
            .link("thumbs", "scans/d1-thumbnail.png", expires_at)
            .unwrap();

        let prefix = format!(
            "https://files.example/thumbs/scans%2Fd1-thumbnail.png?expires={}&signature=",
            expires_at.timestamp()
        );
        assert!(link.starts_with(&prefix), "unexpected link {link}");
        assert_eq!(link.len(), prefix.len() + 64);
    }

    #[test]
    fn test_verify() {
        let signer = signer();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let expires = (now + Duration::days(7)).timestamp();
        let signature = signer.signature("b", "k.png", expires).unwrap();

        assert!(signer.verify("b", "k.png", expires, &signature, now));
        assert!(!signer.verify("b", "other.png", expires, &signature, now));
        assert!(!signer.verify("b", "k.png", expires, &signature, now + Duration::days(8)));
        assert!(!signer.verify("b", "k.png", expires, "not-hex", now));

        let other = HmacLinkSigner::new("https://files.example", ApiKey::new("different"));
        assert!(!other.verify("b", "k.png", expires, &signature, now));
    }

    #[test]
    fn test_tampered_expiry_is_rejected() {
        let signer = signer();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let expires = (now + Duration::days(7)).timestamp();
        let signature = signer.signature("b", "k.png", expires).unwrap();

        let extended = (now + Duration::days(365)).timestamp();
        assert!(!signer.verify("b", "k.png", extended, &signature, now));

        // Moving the expiry into the key does not produce a valid pair either
        let smuggled = format!("k.png:{}", expires);
        assert!(!signer.verify("b", &smuggled, extended, &signature, now));
    }
}
