//! Error types for the authentication middleware.
//!
//! [`AuthError`] is generic over `E`, the inner service's error type, so
//! callers can tell transport failures apart from authentication failures
//! without boxing.

use std::fmt;

use super::challenge::ChallengeError;
use super::oauth::AcquireError;

/// Errors surfaced by [`Authentication`](super::Authentication).
///
/// Non-401 responses and a 401 on the retried attempt are not errors: they
/// are returned to the caller as `Ok(response)`.
///
/// ```rust,ignore
/// match error {
///     AuthError::Inner(e) => {
///         // Connection refused, DNS, TLS, timeouts from the inner client.
///     }
///     AuthError::Challenge(e) => {
///         // 401 without a usable Bearer challenge.
///     }
///     AuthError::TokenAcquisitionFailed(e) => {
///         // Token endpoint unreachable, non-200, or bad payload.
///     }
///     _ => { /* ... */ }
/// }
/// ```
#[derive(Debug)]
pub enum AuthError<E> {
    /// An error from the inner HTTP service. Never retried.
    Inner(E),

    /// The 401 response carried no usable `WWW-Authenticate` challenge.
    Challenge(ChallengeError),

    /// The client-credentials exchange failed.
    TokenAcquisitionFailed(AcquireError),

    /// A retry was required but the request body cannot be replayed.
    NonReplayableBody,

    /// The token cannot be sent as an `Authorization` header value.
    InvalidToken(String),
}

// Display is implemented by hand so that `E: Display` is only required where
// it is used, not on the type definition.
impl<E: fmt::Display> fmt::Display for AuthError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Inner(e) => write!(f, "inner service error: {e}"),
            AuthError::Challenge(e) => write!(f, "invalid authentication challenge: {e}"),
            AuthError::TokenAcquisitionFailed(e) => write!(f, "token acquisition failed: {e}"),
            AuthError::NonReplayableBody => {
                write!(f, "request body cannot be replayed for the authenticated retry")
            }
            AuthError::InvalidToken(msg) => write!(f, "invalid token: {msg}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AuthError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Challenge(e) => Some(e),
            AuthError::TokenAcquisitionFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<ChallengeError> for AuthError<E> {
    fn from(e: ChallengeError) -> Self {
        AuthError::Challenge(e)
    }
}

impl<E> From<AcquireError> for AuthError<E> {
    fn from(e: AcquireError) -> Self {
        AuthError::TokenAcquisitionFailed(e)
    }
}

/// Errors when building a layer or vault from a
/// [`KeyVaultConfig`](crate::config::KeyVaultConfig).
///
/// These are setup-time errors, not per-request errors.
#[derive(Debug, thiserror::Error)]
pub enum FromConfigError {
    #[error("client_id is not set in the config")]
    MissingClientId,

    #[error("client_secret is not set in the config")]
    MissingClientSecret,

    #[error("vault_url is not set in the config")]
    MissingVaultUrl,
}
