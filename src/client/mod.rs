//! HTTP client plumbing for talking to a vault.
//!
//! - [`AuthenticationLayer`] / [`Authentication`]: Tower middleware that
//!   answers the vault's bearer challenge with an OAuth2 client-credentials
//!   exchange and retries the rejected request once.
//! - [`challenge`]: parsing of the `WWW-Authenticate: Bearer ...` header.
//! - [`token`]: the [`Token`] abstraction and the shared [`TokenCache`].
//! - [`json`]: [`JsonClient`], JSON request/response helpers with the vault's
//!   error payload decoded into [`KeyVaultError`].
//!
//! Token acquisition goes through the inner Tower service, so no second HTTP
//! client is needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use keyvault::client::{AuthenticationLayer, ClientCredentials};
//!
//! let auth_layer = AuthenticationLayer::new(ClientCredentials::new(
//!     "my-client-id",
//!     "my-client-secret",
//! ));
//!
//! let client = ServiceBuilder::new()
//!     .layer(auth_layer)
//!     .service(http_client);
//! ```

pub mod auth;
pub mod challenge;
pub mod error;
pub mod json;
pub mod oauth;
pub mod token;

pub use auth::{Authentication, AuthenticationLayer, ReplayBody};
pub use challenge::{AuthChallenge, ChallengeError};
pub use error::{AuthError, FromConfigError};
pub use json::{ClientError, JsonClient, KeyVaultError};
pub use oauth::{AcquireError, ClientCredentials};
pub use token::{BearerToken, CachedToken, MemoryTokenCache, Token, TokenCache, TokenError};
