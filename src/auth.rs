use base64::engine::{general_purpose, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::Sha256;
use tracing::debug;

use crate::error::BookingError;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

const CANCEL_TOKEN_BYTES: usize = 32;

/// Signs outbound requests to the calendar provider and the notification webhook.
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    secret: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }

    /// Generate a random nonce for API requests
    pub fn generate_nonce() -> String {
        rand::thread_rng().gen_range(10000000..99999999).to_string()
    }

    /// Get current timestamp for API requests
    pub fn timestamp() -> i64 {
        Utc::now().timestamp()
    }

    /// Signature over method, key/nonce/timestamp header string, URI and body.
    pub fn sign(&self, method: &str, uri: &str, timestamp: i64, nonce: &str, body: &str) -> String {
        let header_string = format!(
            "X-Key={}&X-Nonce={}&X-Timestamp={}",
            self.key_id, nonce, timestamp
        );

        let content = format!("{}\n{}\n{}\n{}", method, header_string, uri, body);

        debug!("String to sign: {}", content);

        general_purpose::STANDARD.encode(hmac_hex(&self.secret, content.as_bytes()).as_bytes())
    }

    /// Full header set for a signed request.
    pub fn signed_headers(&self, method: &str, uri: &str, body: &str) -> Vec<(&'static str, String)> {
        let timestamp = Self::timestamp();
        let nonce = Self::generate_nonce();
        let signature = self.sign(method, uri, timestamp, &nonce, body);

        vec![
            ("X-Key", self.key_id.clone()),
            ("X-Timestamp", timestamp.to_string()),
            ("X-Nonce", nonce),
            ("X-Signature", signature),
        ]
    }

    /// Hex HMAC of a payload, for webhook bodies.
    pub fn payload_signature(&self, payload: &[u8]) -> String {
        hmac_hex(&self.secret, payload)
    }
}

fn hmac_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Fresh unguessable cancellation token: 256 random bits, URL-safe base64.
pub fn generate_cancel_token() -> String {
    let mut bytes = [0u8; CANCEL_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time comparison for secrets.
pub fn tokens_match(expected: &str, supplied: &str) -> bool {
    let (a, b) = (expected.as_bytes(), supplied.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Proof that the caller presented the admin bearer token.
///
/// Only obtainable through [`AdminClaims::verify`]; admin operations take it
/// as an argument instead of reading any ambient session state.
#[derive(Debug, Clone)]
pub struct AdminClaims {
    _verified: (),
}

impl AdminClaims {
    pub fn verify(authorization: Option<&str>, admin_token: Option<&str>) -> Result<Self, BookingError> {
        let expected = admin_token.ok_or(BookingError::Unauthorized)?;
        let supplied = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(BookingError::Unauthorized)?;

        if tokens_match(expected, supplied) {
            Ok(Self { _verified: () })
        } else {
            Err(BookingError::Unauthorized)
        }
    }
}
