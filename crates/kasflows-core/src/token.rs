//! HMAC session tokens bound to client names.
//!
//! A token is issued on every announce and may be presented on later calls.
//! Format (hex encoded): `[8-byte expiry][32-byte HMAC-SHA256]`

use crate::error::{RelayError, RelayResult};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use std::time::{SystemTime, UNIX_EPOCH};

const EXPIRY_LEN: usize = 8;
const TOKEN_LEN: usize = EXPIRY_LEN + 32;

/// Issues and checks name-bound tokens with a per-process secret.
pub struct TokenAuthority {
    key: hmac::Key,
    ttl_secs: u64,
    required: bool,
}

impl TokenAuthority {
    /// Create an authority with a fresh random secret.
    pub fn new(ttl_secs: u64, required: bool) -> RelayResult<Self> {
        Ok(Self::with_secret(&generate_secret()?, ttl_secs, required))
    }

    /// Create an authority from a known secret.
    pub fn with_secret(secret: &[u8], ttl_secs: u64, required: bool) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl_secs,
            required,
        }
    }

    /// Whether callers must present a valid token.
    pub fn required(&self) -> bool {
        self.required
    }

    /// Issue a token for `name`.
    pub fn issue(&self, name: &str) -> String {
        self.issue_with_expiry(name, unix_now().saturating_add(self.ttl_secs))
    }

    fn issue_with_expiry(&self, name: &str, expiry: u64) -> String {
        let tag = hmac::sign(&self.key, &signed_data(expiry, name));

        let mut token = Vec::with_capacity(TOKEN_LEN);
        token.extend_from_slice(&expiry.to_be_bytes());
        token.extend_from_slice(tag.as_ref());
        hex::encode(token)
    }

    /// Verify a token for `name`: encoding, expiry and signature.
    pub fn verify(&self, name: &str, token: &str) -> RelayResult<()> {
        let bytes = hex::decode(token)
            .map_err(|_| RelayError::InvalidToken("token is not valid hex".into()))?;
        if bytes.len() != TOKEN_LEN {
            return Err(RelayError::InvalidToken(format!(
                "invalid token length: expected {TOKEN_LEN}, got {}",
                bytes.len()
            )));
        }

        let (expiry_bytes, tag) = bytes.split_at(EXPIRY_LEN);
        let mut expiry_buf = [0u8; EXPIRY_LEN];
        expiry_buf.copy_from_slice(expiry_bytes);
        let expiry = u64::from_be_bytes(expiry_buf);

        if unix_now() > expiry {
            return Err(RelayError::InvalidToken("token expired".into()));
        }

        hmac::verify(&self.key, &signed_data(expiry, name), tag)
            .map_err(|_| RelayError::InvalidToken("invalid token signature".into()))
    }

    /// Enforce the token policy. A no-op unless tokens are required.
    pub fn check(&self, name: &str, token: Option<&str>) -> RelayResult<()> {
        if !self.required {
            return Ok(());
        }
        match token {
            Some(t) => self.verify(name, t),
            None => Err(RelayError::InvalidToken("token missing".into())),
        }
    }
}

fn signed_data(expiry: u64, name: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(EXPIRY_LEN + name.len());
    data.extend_from_slice(&expiry.to_be_bytes());
    data.extend_from_slice(name.as_bytes());
    data
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generate a random 32-byte secret.
pub fn generate_secret() -> RelayResult<Vec<u8>> {
    let mut secret = vec![0u8; 32];
    SystemRandom::new()
        .fill(&mut secret)
        .map_err(|_| RelayError::Config("system RNG unavailable".into()))?;
    Ok(secret)
}
