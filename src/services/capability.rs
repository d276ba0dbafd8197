//! Time-boxed upload capabilities.
//!
//! A capability is an opaque token authorizing exactly one direct PUT to a
//! reserved storage key. It encodes its own expiry and a signature binding
//! it to the asset id, so the upload endpoint can verify it without a
//! database read.

use crate::errors::{AssetError, AssetResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Mint an upload capability for `asset_id`, valid until `expires_at`.
pub fn mint(secret: &str, asset_id: Uuid, expires_at: DateTime<Utc>) -> String {
    let expires = expires_at.timestamp();
    let sig = signature(secret, asset_id, expires);
    URL_SAFE_NO_PAD.encode(format!("{}:{}", expires, sig))
}

/// Verify a capability token against `asset_id` at time `now`.
pub fn verify(secret: &str, asset_id: Uuid, token: &str, now: DateTime<Utc>) -> AssetResult<()> {
    let decoded = URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(AssetError::InvalidCapability)?;

    let (expires_str, presented_sig) = decoded
        .split_once(':')
        .ok_or(AssetError::InvalidCapability)?;
    let expires: i64 = expires_str
        .parse()
        .map_err(|_| AssetError::InvalidCapability)?;

    if signature(secret, asset_id, expires) != presented_sig {
        return Err(AssetError::InvalidCapability);
    }
    if now.timestamp() > expires {
        return Err(AssetError::InvalidCapability);
    }
    Ok(())
}

fn signature(secret: &str, asset_id: Uuid, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(asset_id.as_bytes());
    hasher.update(b":");
    hasher.update(expires.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "test-secret";

    #[test]
    fn minted_token_verifies_before_expiry() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = mint(SECRET, id, now + Duration::minutes(15));
        assert!(verify(SECRET, id, &token, now).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = mint(SECRET, id, now - Duration::seconds(1));
        assert!(matches!(
            verify(SECRET, id, &token, now),
            Err(AssetError::InvalidCapability)
        ));
    }

    #[test]
    fn token_is_bound_to_its_asset() {
        let now = Utc::now();
        let token = mint(SECRET, Uuid::new_v4(), now + Duration::minutes(15));
        assert!(verify(SECRET, Uuid::new_v4(), &token, now).is_err());
    }

    #[test]
    fn wrong_secret_and_garbage_are_rejected() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = mint(SECRET, id, now + Duration::minutes(15));
        assert!(verify("other-secret", id, &token, now).is_err());
        assert!(verify(SECRET, id, "not-a-token", now).is_err());
        assert!(verify(SECRET, id, "", now).is_err());
    }
}
