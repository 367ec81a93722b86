//! Device identity issuance and verification tests.

use chrono::{Duration, Utc};
use tictac_server::{
    DeviceFingerprint, IdentityError, IdentityIssuer, IdentityVerifier, SigningSecret,
};

fn secret() -> SigningSecret {
    SigningSecret::new("test-signing-secret").unwrap()
}

fn fingerprint(device_id: &str) -> DeviceFingerprint {
    DeviceFingerprint {
        device_id: device_id.to_string(),
        device_model: "Pixel 8".to_string(),
        os_version: "14".to_string(),
        app_version: "1.2.0".to_string(),
        brand: "google".to_string(),
        manufacturer: "Google".to_string(),
    }
}

#[test]
fn test_nine_char_device_id_rejected() {
    let issuer = IdentityIssuer::new(&secret(), 30);
    assert_eq!(
        issuer.issue(&fingerprint("123456789")),
        Err(IdentityError::InvalidDeviceId)
    );
    assert_eq!(
        issuer.issue(&fingerprint("")),
        Err(IdentityError::MissingDeviceId)
    );
}

#[test]
fn test_ten_char_device_id_accepted() {
    let issuer = IdentityIssuer::new(&secret(), 30);
    let verifier = IdentityVerifier::new(&secret());

    let token = issuer.issue(&fingerprint("1234567890")).unwrap();
    let claims = verifier.verify(&token).unwrap();
    assert_eq!(claims.sub, "1234567890");
    assert_eq!(claims.app_version, "1.2.0");
    assert_eq!(claims.device.device_model, "Pixel 8");
    assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
}

#[test]
fn test_authenticate_defaults_username() {
    let issuer = IdentityIssuer::new(&secret(), 30);
    let verifier = IdentityVerifier::new(&secret());
    let token = issuer.issue(&fingerprint("abcdefghijklmnop")).unwrap();

    let device = verifier.authenticate(&token, None).unwrap();
    assert_eq!(device.account_id, "abcdefghijklmnop");
    assert_eq!(device.username, "Playerabcdefgh");

    let device = verifier.authenticate(&token, Some("neo")).unwrap();
    assert_eq!(device.username, "neo");
}

#[test]
fn test_wrong_secret_rejected() {
    let issuer = IdentityIssuer::new(&secret(), 30);
    let other = IdentityVerifier::new(&SigningSecret::new("another-secret").unwrap());
    let token = issuer.issue(&fingerprint("1234567890")).unwrap();
    assert!(matches!(
        other.verify(&token),
        Err(IdentityError::InvalidToken(_))
    ));
}

#[test]
fn test_tampered_token_rejected() {
    let issuer = IdentityIssuer::new(&secret(), 30);
    let verifier = IdentityVerifier::new(&secret());
    let token = issuer.issue(&fingerprint("1234567890")).unwrap();

    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    parts[2] = parts[2].chars().rev().collect();
    let tampered = parts.join(".");
    assert!(verifier.verify(&tampered).is_err());
    assert!(verifier.verify("not-a-token").is_err());
}

#[test]
fn test_expired_token_rejected() {
    let issuer = IdentityIssuer::new(&secret(), 30);
    let verifier = IdentityVerifier::new(&secret());
    let issued = Utc::now() - Duration::days(31);
    let token = issuer.issue_at(&fingerprint("1234567890"), issued).unwrap();
    assert!(matches!(
        verifier.verify(&token),
        Err(IdentityError::InvalidToken(_))
    ));
}

#[test]
fn test_oversized_lifetime_fails_without_panicking() {
    for ttl_days in [100_000_000, i64::MAX] {
        let issuer = IdentityIssuer::new(&secret(), ttl_days);
        assert!(matches!(
            issuer.issue(&fingerprint("device-123456")),
            Err(IdentityError::Signing(_))
        ));
    }
}
