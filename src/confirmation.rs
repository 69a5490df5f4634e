//! Confirmation codes: short-lived proofs that the holder received the mail
//! sent to a user's address.
//!
//! A code is `<issued-at, base36>-<HMAC-SHA256 prefix, hex>`. The MAC covers
//! the issue timestamp and the user's `id`, `username` and `email`, so a code
//! only validates for the identity it was minted for and stops validating as
//! soon as the username or email changes. Codes are not revoked after a
//! successful token exchange; they stay valid until the window runs out.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::{config::AppConfig, models::User};

type HmacSha256 = Hmac<Sha256>;

const KEY_SALT: &[u8] = b"yamdb.confirmation-code";
/// Bytes of the MAC kept in the code (20 hex characters).
const MAC_BYTES: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeError {
    #[error("confirmation code is malformed")]
    Malformed,
    #[error("confirmation code does not match this user")]
    Mismatch,
    #[error("confirmation code has expired")]
    Expired,
    #[error("confirmation key rejected: {0}")]
    Key(String),
}

/// ConfirmationCodes
///
/// Issues and checks codes with one secret and one validity window.
#[derive(Clone)]
pub struct ConfirmationCodes {
    secret: String,
    ttl_secs: i64,
}

impl ConfirmationCodes {
    pub fn new(secret: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.confirmation_secret.clone(),
            config.confirmation_code_ttl_secs,
        )
    }

    pub fn make_code(&self, user: &User) -> Result<String, CodeError> {
        self.make_code_at(user, Utc::now())
    }

    pub fn make_code_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, CodeError> {
        let issued_at = now.timestamp().max(0) as u64;
        let tag = self.mac(user, issued_at)?.finalize().into_bytes();
        Ok(format!(
            "{}-{}",
            to_base36(issued_at),
            hex::encode(&tag[..MAC_BYTES])
        ))
    }

    pub fn check_code(&self, user: &User, code: &str) -> Result<(), CodeError> {
        self.check_code_at(user, code, Utc::now())
    }

    /// check_code_at
    ///
    /// The MAC is verified in constant time before the age is looked at, so an
    /// expired-but-forged code reports `Mismatch`, never `Expired`.
    pub fn check_code_at(
        &self,
        user: &User,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CodeError> {
        let (ts_part, tag_part) = code.split_once('-').ok_or(CodeError::Malformed)?;
        let issued_at = u64::from_str_radix(ts_part, 36).map_err(|_| CodeError::Malformed)?;
        let tag = hex::decode(tag_part).map_err(|_| CodeError::Malformed)?;
        if tag.len() != MAC_BYTES {
            return Err(CodeError::Malformed);
        }

        self.mac(user, issued_at)?
            .verify_truncated_left(&tag)
            .map_err(|_| CodeError::Mismatch)?;

        let age = now.timestamp() - issued_at as i64;
        if age > self.ttl_secs {
            return Err(CodeError::Expired);
        }
        Ok(())
    }

    fn mac(&self, user: &User, issued_at: u64) -> Result<HmacSha256, CodeError> {
        let mut key = KEY_SALT.to_vec();
        key.extend_from_slice(self.secret.as_bytes());
        let mut mac =
            HmacSha256::new_from_slice(&key).map_err(|e| CodeError::Key(e.to_string()))?;
        // Unit separators keep ("ab", "c") and ("a", "bc") distinct.
        mac.update(user.id.as_bytes());
        mac.update(b"\x1f");
        mac.update(user.username.as_bytes());
        mac.update(b"\x1f");
        mac.update(user.email.as_bytes());
        mac.update(b"\x1f");
        mac.update(issued_at.to_string().as_bytes());
        Ok(mac)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
