//! Bearer tokens and the single-slot token cache.
//!
//! - [`Token`]: the capability set of a bearer credential (secret, expiry,
//!   validity, `Authorization` header rendering).
//! - [`BearerToken`]: the immutable token produced by the acquirer.
//! - [`CachedToken`]: what a cache holds, either a token or nothing.
//! - [`TokenCache`] / [`MemoryTokenCache`]: the replaceable storage slot.
//!
//! Staleness is never swept proactively. A token that expired or was revoked
//! server-side is detected by the next 401 and replaced then.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};

/// A bearer credential with a known expiry instant.
pub trait Token: fmt::Debug + Send + Sync {
    /// The opaque access token string.
    fn secret(&self) -> &str;

    fn expires_at(&self) -> Instant;

    /// A token is valid strictly before its expiry instant.
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at()
    }

    /// Render the `Authorization: Bearer <secret>` header value.
    ///
    /// The value is flagged sensitive so it is never printed by `http`'s
    /// `Debug` impls.
    fn authorization(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.secret()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token secret is empty")]
    EmptySecret,

    #[error("token expiry is not in the future")]
    AlreadyExpired,

    #[error("token lifetime is out of range")]
    ExpiryOutOfRange,
}

/// The token returned by a successful client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    secret: String,
    expires_at: Instant,
}

impl BearerToken {
    /// Fails unless `secret` is non-empty and `expires_at` is in the future.
    pub fn new(secret: impl Into<String>, expires_at: Instant) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        if expires_at <= Instant::now() {
            return Err(TokenError::AlreadyExpired);
        }
        Ok(BearerToken { secret, expires_at })
    }

    /// Create a token that expires `lifetime` from now.
    ///
    /// Fails with [`TokenError::ExpiryOutOfRange`] when `now + lifetime` is
    /// not representable as an [`Instant`].
    pub fn expiring_in(secret: impl Into<String>, lifetime: Duration) -> Result<Self, TokenError> {
        let expires_at = Instant::now()
            .checked_add(lifetime)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        Self::new(secret, expires_at)
    }
}

impl Token for BearerToken {
    fn secret(&self) -> &str {
        &self.secret
    }

    fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The content of a token cache slot.
#[derive(Debug, Clone, Default)]
pub enum CachedToken {
    Present(Arc<dyn Token>),
    #[default]
    Absent,
}

impl CachedToken {
    /// Returns the token only if one is present and still valid.
    pub fn valid(&self) -> Option<&Arc<dyn Token>> {
        match self {
            CachedToken::Present(token) if token.is_valid() => Some(token),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid().is_some()
    }

    /// Insert the `Authorization` header if the cached token is valid.
    ///
    /// Returns whether the headers were modified. An absent or expired token
    /// leaves `headers` untouched.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<bool, InvalidHeaderValue> {
        match self.valid() {
            Some(token) => {
                headers.insert(AUTHORIZATION, token.authorization()?);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl From<BearerToken> for CachedToken {
    fn from(token: BearerToken) -> Self {
        CachedToken::Present(Arc::new(token))
    }
}

/// Storage for the most recently acquired token.
///
/// Implementations are a single slot: `store` replaces whatever was there and
/// `get` on an empty slot returns [`CachedToken::Absent`]. Swap in a custom
/// implementation to share tokens across clients or processes.
#[cfg_attr(test, mockall::automock)]
pub trait TokenCache: Send + Sync {
    fn get(&self) -> CachedToken;
    fn store(&self, token: Arc<dyn Token>);
}

/// In-process [`TokenCache`], the default used by
/// [`AuthenticationLayer::new`](super::AuthenticationLayer::new).
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    slot: RwLock<CachedToken>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self) -> CachedToken {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, token: Arc<dyn Token>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = CachedToken::Present(token);
    }
}
