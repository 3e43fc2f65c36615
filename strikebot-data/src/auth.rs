//! Kalshi REST request authentication.
//!
//! Every signed request carries an RSA-PSS (SHA-256) signature computed over
//! `{timestamp}{method}{path}`, where `path` is the full API path including `/trade-api/v2`
//! and excluding the query string.
//!
//! Headers required:
//! - `KALSHI-ACCESS-KEY`: API key ID
//! - `KALSHI-ACCESS-SIGNATURE`: Base64-encoded RSA-PSS signature
//! - `KALSHI-ACCESS-TIMESTAMP`: Unix timestamp in milliseconds

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rsa::{
    RsaPrivateKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::DecodePrivateKey,
    pss::SigningKey,
    signature::{RandomizedSigner, SignatureEncoding},
};
use sha2::Sha256;
use strikebot_instrument::FailureKind;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading Kalshi credentials.
#[derive(Debug, Error)]
pub enum KalshiAuthError {
    #[error("failed to read private key file: {0}")]
    KeyFileRead(#[from] std::io::Error),

    #[error("failed to parse RSA private key: {0}")]
    KeyParse(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),
}

impl KalshiAuthError {
    pub fn kind(&self) -> FailureKind {
        match self {
            KalshiAuthError::KeyFileRead(_) => FailureKind::Io,
            KalshiAuthError::KeyParse(_) => FailureKind::Auth,
            KalshiAuthError::MissingEnv(_) => FailureKind::Config,
        }
    }
}

/// Kalshi API credentials.
#[derive(Clone)]
pub struct KalshiCredentials {
    /// API key ID
    pub api_key: String,
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for KalshiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiCredentials")
            .field("api_key", &self.api_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl KalshiCredentials {
    /// Create credentials from an API key and a PEM-encoded (PKCS#8 or PKCS#1) private key.
    pub fn from_pem(api_key: impl Into<String>, pem: &str) -> Result<Self, KalshiAuthError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| KalshiAuthError::KeyParse(e.to_string()))?;

        Ok(Self::from_key(api_key, private_key))
    }

    pub fn from_key(api_key: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            api_key: api_key.into(),
            private_key,
        }
    }

    /// Create credentials from an API key and a private key file path.
    pub fn from_file(
        api_key: impl Into<String>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, KalshiAuthError> {
        let pem = std::fs::read_to_string(key_path.as_ref())?;
        Self::from_pem(api_key, &pem)
    }

    /// Create credentials from environment variables.
    ///
    /// Reads:
    /// - `KALSHI_API_KEY`: API key ID
    /// - `KALSHI_PRIVATE_KEY_PATH`: Path to PEM file (preferred)
    /// - `KALSHI_PRIVATE_KEY_PEM`: PEM string (fallback)
    pub fn from_env() -> Result<Self, KalshiAuthError> {
        let api_key = std::env::var("KALSHI_API_KEY")
            .map_err(|_| KalshiAuthError::MissingEnv("KALSHI_API_KEY"))?;

        if let Ok(path) = std::env::var("KALSHI_PRIVATE_KEY_PATH") {
            Self::from_file(api_key, path)
        } else if let Ok(pem) = std::env::var("KALSHI_PRIVATE_KEY_PEM") {
            Self::from_pem(api_key, &pem)
        } else {
            Err(KalshiAuthError::MissingEnv(
                "KALSHI_PRIVATE_KEY_PATH or KALSHI_PRIVATE_KEY_PEM",
            ))
        }
    }

    /// Sign a request at the current time.
    pub fn sign(&self, method: &str, path: &str) -> KalshiAuthHeaders {
        self.sign_at(chrono::Utc::now().timestamp_millis(), method, path)
    }

    /// Sign a request at `timestamp_ms`. `path` must not contain the query string.
    pub fn sign_at(&self, timestamp_ms: i64, method: &str, path: &str) -> KalshiAuthHeaders {
        let message = signing_message(timestamp_ms, method, path);
        debug!(%method, %path, "signing Kalshi request");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let mut rng = rsa::rand_core::OsRng;
        let signature = signing_key.sign_with_rng(&mut rng, message.as_bytes());

        KalshiAuthHeaders {
            api_key: self.api_key.clone(),
            signature: BASE64.encode(signature.to_bytes()),
            timestamp: timestamp_ms.to_string(),
        }
    }
}

/// Message covered by the request signature.
pub fn signing_message(timestamp_ms: i64, method: &str, path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    format!("{timestamp_ms}{method}{path}")
}

/// Authentication headers for one Kalshi request.
#[derive(Debug, Clone)]
pub struct KalshiAuthHeaders {
    pub api_key: String,
    /// Base64-encoded signature
    pub signature: String,
    /// Timestamp in milliseconds as string
    pub timestamp: String,
}

impl KalshiAuthHeaders {
    pub const KEY_HEADER: &'static str = "KALSHI-ACCESS-KEY";
    pub const SIGNATURE_HEADER: &'static str = "KALSHI-ACCESS-SIGNATURE";
    pub const TIMESTAMP_HEADER: &'static str = "KALSHI-ACCESS-TIMESTAMP";
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{pss::{Signature, VerifyingKey}, signature::Verifier};

    #[test]
    fn test_signing_message_strips_query() {
        assert_eq!(
            signing_message(1_700_000_000_000, "GET", "/trade-api/v2/markets?limit=50"),
            "1700000000000GET/trade-api/v2/markets"
        );
    }

    #[test]
    fn test_signature_verifies_against_public_key() {
        let mut rng = rsa::rand_core::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = key.to_public_key();
        let credentials = KalshiCredentials::from_key("key-id", key);

        let headers = credentials.sign_at(42, "POST", "/trade-api/v2/portfolio/orders");
        assert_eq!(headers.api_key, "key-id");
        assert_eq!(headers.timestamp, "42");

        let bytes = BASE64.decode(&headers.signature).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let verifying = VerifyingKey::<Sha256>::new(public);
        assert!(
            verifying
                .verify(b"42POST/trade-api/v2/portfolio/orders", &signature)
                .is_ok()
        );
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let mut rng = rsa::rand_core::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let credentials = KalshiCredentials::from_key("key-id", key);
        assert!(format!("{credentials:?}").contains("[REDACTED]"));
    }

    #[test]
    fn test_invalid_pem_rejected() {
        let error = KalshiCredentials::from_pem("key", "not a pem").unwrap_err();
        assert_eq!(error.kind(), FailureKind::Auth);
    }
}
