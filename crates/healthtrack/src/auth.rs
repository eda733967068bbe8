//! Password hashing, password policy, login lockout and session tokens.

use std::net::SocketAddr;

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::warn;

use crate::config::SecurityConfig;
use crate::error::{Error, Result};

/// Length of generated session and reset tokens.
const TOKEN_LENGTH: usize = 43;

/// How long a password reset link stays valid.
pub const PASSWORD_RESET_TTL_HOURS: i64 = 1;

/// Hash a password into an Argon2id PHC string.
///
/// # Errors
///
/// Returns `Error::Internal` if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string.
///
/// A malformed stored hash never matches.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

/// Password strength rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Maximum length in characters.
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
        }
    }
}

impl From<&SecurityConfig> for PasswordPolicy {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            min_length: config.password_min_length,
            max_length: config.password_max_length,
        }
    }
}

impl PasswordPolicy {
    /// The first rule the password breaks, if any.
    #[must_use]
    pub fn violation(&self, password: &str) -> Option<String> {
        let length = password.chars().count();
        if length < self.min_length {
            return Some(format!(
                "Password must be at least {} characters long.",
                self.min_length
            ));
        }
        if length > self.max_length {
            return Some(format!(
                "Password must not exceed {} characters.",
                self.max_length
            ));
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Some("Password must contain at least one uppercase letter.".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Some("Password must contain at least one lowercase letter.".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Some("Password must contain at least one number.".to_string());
        }
        if password.contains(' ') {
            return Some("Password must not contain spaces.".to_string());
        }
        None
    }

    /// Help text shown next to password fields.
    #[must_use]
    pub fn help_text(&self) -> String {
        format!(
            "Your password must contain at least {} characters, including uppercase and lowercase letters, and numbers. It must not contain spaces.",
            self.min_length
        )
    }
}

/// Account lockout after repeated failed logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that trigger a lock.
    pub max_failed_logins: u32,
    /// How long the lock lasts.
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_logins: 5,
            lockout: Duration::minutes(15),
        }
    }
}

impl From<&SecurityConfig> for LockoutPolicy {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            max_failed_logins: config.max_failed_logins,
            lockout: Duration::minutes(i64::from(config.lockout_minutes)),
        }
    }
}

impl LockoutPolicy {
    /// Lock expiry for an account that has just failed `attempts` times in a row.
    #[must_use]
    pub fn locked_until(&self, attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (attempts >= self.max_failed_logins).then(|| now + self.lockout)
    }
}

/// Generate a random URL-safe token.
#[must_use]
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a token for storage. Only hashes are ever written to the database.
#[must_use]
pub fn hash_token(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// A server-side login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// BLAKE3 hash of the cookie token.
    pub token_hash: String,
    /// Logged-in user.
    pub user_id: i64,
    /// Login time.
    pub created_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
    /// One-shot message for the next page.
    pub flash: Option<String>,
}

impl Session {
    /// Start a session for a user, returning it with the raw cookie token.
    #[must_use]
    pub fn start(user_id: i64, now: DateTime<Utc>, ttl: Duration) -> (Self, String) {
        let token = generate_token();
        let session = Self {
            token_hash: hash_token(&token),
            user_id,
            created_at: now,
            expires_at: now + ttl,
            flash: None,
        };
        (session, token)
    }

    /// Whether the session has run out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Client address recorded as `last_login_ip`: first `X-Forwarded-For`
/// entry, else the peer address. Never use it as a rate-limit key.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
