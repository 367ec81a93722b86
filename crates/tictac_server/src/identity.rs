//! Device identity tokens.
//!
//! A device fingerprint becomes an HS256 token whose subject is the device
//! id. The verifier is the matching half used at authentication time.

use crate::config::SigningSecret;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Shortest accepted device id.
pub const MIN_DEVICE_ID_LEN: usize = 10;

/// Prefix of generated usernames.
const USERNAME_PREFIX: &str = "Player";

/// Characters of the device id used in generated usernames.
const USERNAME_ID_CHARS: usize = 8;

/// Hardware and app details reported by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceFingerprint {
    /// Stable device identifier.
    pub device_id: String,
    /// Device model.
    pub device_model: String,
    /// Operating system version.
    pub os_version: String,
    /// Client app version.
    pub app_version: String,
    /// Device brand.
    pub brand: String,
    /// Device manufacturer.
    pub manufacturer: String,
}

impl DeviceFingerprint {
    /// Fingerprint with only a device id.
    pub fn from_device_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }
}

/// Claims carried by a device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaims {
    /// Device id.
    pub sub: String,
    /// Full fingerprint.
    pub device: DeviceFingerprint,
    /// Client app version.
    pub app_version: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Identity failures.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum IdentityError {
    /// No device id was supplied.
    #[display("Device ID is required")]
    MissingDeviceId,
    /// The device id is too short.
    #[display("Device ID must be at least {} characters", MIN_DEVICE_ID_LEN)]
    InvalidDeviceId,
    /// Signature, expiry, or structure check failed.
    #[display("Invalid token: {}", _0)]
    InvalidToken(String),
    /// The token could not be signed.
    #[display("Failed to sign token: {}", _0)]
    Signing(String),
}

impl std::error::Error for IdentityError {}

fn check_device_id(device_id: &str) -> Result<(), IdentityError> {
    if device_id.is_empty() {
        return Err(IdentityError::MissingDeviceId);
    }
    if device_id.chars().count() < MIN_DEVICE_ID_LEN {
        return Err(IdentityError::InvalidDeviceId);
    }
    Ok(())
}

/// Username for a device that did not pick one.
pub fn default_username(device_id: &str) -> String {
    let short: String = device_id.chars().take(USERNAME_ID_CHARS).collect();
    format!("{USERNAME_PREFIX}{short}")
}

/// Signs device tokens.
pub struct IdentityIssuer {
    key: EncodingKey,
    ttl_days: i64,
}

impl std::fmt::Debug for IdentityIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityIssuer")
            .field("ttl_days", &self.ttl_days)
            .finish_non_exhaustive()
    }
}

impl IdentityIssuer {
    /// Creates an issuer whose tokens live `ttl_days`.
    pub fn new(secret: &SigningSecret, ttl_days: i64) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.expose()),
            ttl_days,
        }
    }

    /// Signs a token issued now.
    pub fn issue(&self, fingerprint: &DeviceFingerprint) -> Result<String, IdentityError> {
        self.issue_at(fingerprint, Utc::now())
    }

    /// Signs a token as if issued at `issued_at`.
    #[instrument(skip(self, fingerprint), fields(device_id = %fingerprint.device_id))]
    pub fn issue_at(
        &self,
        fingerprint: &DeviceFingerprint,
        issued_at: DateTime<Utc>,
    ) -> Result<String, IdentityError> {
        check_device_id(&fingerprint.device_id)?;
        let expires_at = Duration::try_days(self.ttl_days)
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                IdentityError::Signing(format!("token lifetime of {} days overflows", self.ttl_days))
            })?;
        let claims = DeviceClaims {
            sub: fingerprint.device_id.clone(),
            device: fingerprint.clone(),
            app_version: fingerprint.app_version.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| IdentityError::Signing(e.to_string()))?;
        info!(exp = claims.exp, "Issued device token");
        Ok(token)
    }
}

/// A device that passed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedDevice {
    /// Canonical account id (the token subject).
    pub account_id: String,
    /// Display name.
    pub username: String,
}

/// Checks device tokens.
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl IdentityVerifier {
    /// Creates a verifier accepting the HMAC family only.
    pub fn new(secret: &SigningSecret) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.expose()),
            validation,
        }
    }

    /// Checks signature, expiry, and the device id.
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<DeviceClaims, IdentityError> {
        let data = jsonwebtoken::decode::<DeviceClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                warn!(error = %e, "Token rejected");
                IdentityError::InvalidToken(e.to_string())
            })?;
        let claims = data.claims;
        check_device_id(&claims.device.device_id)?;
        if claims.device.device_id != claims.sub {
            return Err(IdentityError::InvalidToken(
                "subject does not match device".to_string(),
            ));
        }
        debug!(sub = %claims.sub, "Token verified");
        Ok(claims)
    }

    /// Verifies a token and resolves the account.
    pub fn authenticate(
        &self,
        token: &str,
        username: Option<&str>,
    ) -> Result<AuthenticatedDevice, IdentityError> {
        let claims = self.verify(token)?;
        let username = match username.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => default_username(&claims.sub),
        };
        info!(account_id = %claims.sub, %username, "Device authenticated");
        Ok(AuthenticatedDevice {
            account_id: claims.sub,
            username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_username_uses_prefix() {
        assert_eq!(default_username("abcdefghijkl"), "Playerabcdefgh");
    }

    #[test]
    fn test_device_id_checks() {
        assert_eq!(check_device_id(""), Err(IdentityError::MissingDeviceId));
        assert_eq!(check_device_id("123456789"), Err(IdentityError::InvalidDeviceId));
        assert_eq!(check_device_id("1234567890"), Ok(()));
    }
}
