//! Tower middleware that authenticates vault requests with bearer tokens.
//!
//! The vault never tells us up front where tokens come from. Instead, the
//! first unauthenticated (or stale-token) request is rejected with a 401 and
//! a challenge naming the authorization server and resource. The middleware
//! reacts to that challenge:
//!
//! ```text
//!   call(req) ─► attach cached token (if valid) ─► inner.call ─► 401?
//!                                                                 │ first attempt
//!                              ┌──────────────────────────────────┘
//!                              ▼
//!   parse challenge ─► client-credentials exchange ─► cache.store
//!                              │
//!                              ▼
//!   rebuild original request + new token ─► inner.call ─► return (whatever status)
//! ```
//!
//! At most one re-authentication happens per call. A second 401, as well as
//! any non-401 status, is returned to the caller untouched.
//!
//! # Tower Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   AuthenticationLayer    │  ← Implements Layer<S>: creates Authentication<S>
//! │ ┌──────────────────────┐ │
//! │ │  Authentication<S>   │ │  ← Implements Service: attaches tokens, retries once
//! │ │ ┌──────────────────┐ │ │
//! │ │ │  Inner Service S │ │ │  ← The actual HTTP client
//! │ │ └──────────────────┘ │ │
//! │ └──────────────────────┘ │
//! └──────────────────────────┘
//! ```
//!
//! # Shared State
//!
//! All services built from one layer share the token cache and a
//! single-flight guard. Concurrent requests that hit a 401 together perform
//! one token exchange: the first to take the guard acquires the token, the
//! others find it in the cache and reuse it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http::header::AUTHORIZATION;
use http::{Extensions, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use http_body::Body;
use http_body_util::{Empty, Full};
use tokio::sync::Mutex;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use crate::config::KeyVaultConfig;

use super::challenge::{self, AuthChallenge};
use super::error::{AuthError, FromConfigError};
use super::oauth::{self, ClientCredentials};
use super::token::{MemoryTokenCache, Token, TokenCache};

// ---------------------------------------------------------------------------
// Request replay
// ---------------------------------------------------------------------------

/// A request body that may be able to produce a fresh copy of itself.
///
/// The authenticated retry resends the original body. Buffered bodies replay
/// trivially; streaming bodies return `None`, in which case a retry fails
/// with [`AuthError::NonReplayableBody`] instead of sending a truncated body.
pub trait ReplayBody: Sized {
    fn replay(&self) -> Option<Self>;
}

impl<D: Buf + Clone> ReplayBody for Full<D> {
    fn replay(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl<D: Buf> ReplayBody for Empty<D> {
    fn replay(&self) -> Option<Self> {
        Some(Empty::new())
    }
}

impl ReplayBody for Bytes {
    fn replay(&self) -> Option<Self> {
        Some(self.clone())
    }
}

impl ReplayBody for String {
    fn replay(&self) -> Option<Self> {
        Some(self.clone())
    }
}

/// Everything but the body of the caller's request, captured before the
/// middleware touches its headers.
///
/// `http::Request` is not `Clone`, so the retry is rebuilt from these parts.
/// The retry therefore never inherits the `Authorization` header of the
/// rejected attempt.
#[derive(Debug, Clone)]
struct RequestTemplate {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
}

impl RequestTemplate {
    fn capture<B>(req: &Request<B>) -> Self {
        RequestTemplate {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
            extensions: req.extensions().clone(),
        }
    }

    fn build<B>(&self, body: B) -> Request<B> {
        let mut req = Request::new(body);
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers.clone();
        *req.extensions_mut() = self.extensions.clone();
        req
    }
}

/// Where a call stands in the one-retry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

impl Attempt {
    /// The state to move to after a 401, or `None` when no retry is left.
    fn next(self) -> Option<Attempt> {
        match self {
            Attempt::First => Some(Attempt::Retried),
            Attempt::Retried => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

struct Shared {
    credentials: ClientCredentials,
    cache: Arc<dyn TokenCache>,
    /// Held while checking the cache, acquiring, and storing a token.
    refresh: Mutex<()>,
}

/// A Tower [`Layer`] that authenticates requests against the vault.
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use keyvault::client::{AuthenticationLayer, ClientCredentials};
///
/// let auth_layer = AuthenticationLayer::new(ClientCredentials::new("id", "secret"));
///
/// let client = ServiceBuilder::new()
///     .layer(auth_layer)
///     .service(http_client);
/// ```
///
/// All services created by this layer share the same token cache.
#[derive(Clone)]
pub struct AuthenticationLayer {
    shared: Arc<Shared>,
}

impl AuthenticationLayer {
    /// Create a layer backed by a fresh [`MemoryTokenCache`].
    pub fn new(credentials: ClientCredentials) -> Self {
        Self::with_cache(credentials, Arc::new(MemoryTokenCache::new()))
    }

    /// Create a layer that stores tokens in `cache`.
    ///
    /// Use this to share a cache between layers or to plug in external
    /// storage.
    pub fn with_cache(credentials: ClientCredentials, cache: Arc<dyn TokenCache>) -> Self {
        AuthenticationLayer {
            shared: Arc::new(Shared {
                credentials,
                cache,
                refresh: Mutex::new(()),
            }),
        }
    }

    /// Create a layer from the client credentials in a loaded config.
    ///
    /// ```rust,ignore
    /// let config = keyvault::config::load_config(Some("default"))?;
    /// let auth_layer = AuthenticationLayer::from_config(&config)?;
    /// ```
    pub fn from_config(config: &KeyVaultConfig) -> Result<Self, FromConfigError> {
        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(FromConfigError::MissingClientId)?;
        let client_secret = config
            .client_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or(FromConfigError::MissingClientSecret)?;

        debug!(client_id = %client_id, "loaded client credentials from config");
        Ok(Self::new(ClientCredentials::new(client_id, client_secret)))
    }

    /// The cache this layer reads and writes tokens through.
    pub fn cache(&self) -> &Arc<dyn TokenCache> {
        &self.shared.cache
    }
}

impl fmt::Debug for AuthenticationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationLayer")
            .field("credentials", &self.shared.credentials)
            .field("cache", &self.shared.cache.get())
            .finish()
    }
}

impl<S> Layer<S> for AuthenticationLayer {
    type Service = Authentication<S>;

    fn layer(&self, service: S) -> Self::Service {
        Authentication {
            inner: service,
            shared: self.shared.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Tower [`Service`] produced by [`AuthenticationLayer`].
///
/// `Authentication<S>` is `Clone` when `S` is `Clone`; all clones share the
/// token cache.
#[derive(Clone)]
pub struct Authentication<S> {
    inner: S,
    shared: Arc<Shared>,
}

/// `ReqBody: From<Bytes>` lets the middleware build the token request in the
/// inner service's own body type. `ReqBody: ReplayBody` provides the body for
/// the authenticated retry.
impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Authentication<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + fmt::Debug,
    ReqBody: ReplayBody + From<Bytes> + Send + 'static,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Send + fmt::Debug,
{
    type Response = Response<ResBody>;
    type Error = AuthError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AuthError::Inner)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let shared = self.shared.clone();

        // Move the readied service into the future and leave a fresh clone
        // behind for the next poll_ready.
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(authenticate(shared, inner, req))
    }
}

/// Run one call through the first-attempt / retried state machine.
async fn authenticate<S, ReqBody, ResBody>(
    shared: Arc<Shared>,
    mut inner: S,
    req: Request<ReqBody>,
) -> Result<Response<ResBody>, AuthError<S::Error>>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + fmt::Debug,
    ReqBody: ReplayBody + From<Bytes> + Send + 'static,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Send + fmt::Debug,
{
    let template = RequestTemplate::capture(&req);
    let mut replay = req.body().replay();

    let mut request = req;
    let cached = shared.cache.get();
    let sent_token = cached.valid().cloned();
    match &sent_token {
        Some(token) => {
            debug!(
                token_prefix = token_prefix(token.secret()),
                "attaching cached Bearer token"
            );
            request
                .headers_mut()
                .insert(AUTHORIZATION, bearer_header(token.as_ref())?);
        }
        None => debug!("no valid cached token, sending request unauthenticated"),
    }

    let mut attempt = Attempt::First;
    loop {
        let response = inner.call(request).await.map_err(AuthError::Inner)?;
        debug!(status = %response.status(), attempt = ?attempt, "response received");

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(next) = attempt.next() else {
            warn!("retried request was rejected again, returning 401");
            return Ok(response);
        };

        info!("received 401, acquiring token and retrying");
        let challenge = challenge::extract_challenge(&response).inspect_err(|e| {
            warn!(error = %e, "401 response carried no usable challenge");
        })?;
        drop(response);

        let token = reauthenticate(&shared, inner.clone(), &challenge, sent_token.as_deref()).await?;

        let body = replay.take().ok_or(AuthError::NonReplayableBody)?;
        request = template.build(body);
        request
            .headers_mut()
            .insert(AUTHORIZATION, bearer_header(token.as_ref())?);

        std::future::poll_fn(|cx| inner.poll_ready(cx))
            .await
            .map_err(AuthError::Inner)?;
        attempt = next;
    }
}

/// Obtain a token to retry with, performing at most one exchange across all
/// concurrent callers.
///
/// `rejected` is the token the failed request carried, if any. A valid
/// cached token other than that one was stored by a concurrent caller while
/// we waited for the guard and is reused as is.
async fn reauthenticate<S, ReqBody, ResBody>(
    shared: &Shared,
    mut inner: S,
    challenge: &AuthChallenge,
    rejected: Option<&dyn Token>,
) -> Result<Arc<dyn Token>, AuthError<S::Error>>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Debug,
    ReqBody: From<Bytes>,
    ResBody: Body,
    ResBody::Error: fmt::Debug,
{
    let _guard = shared.refresh.lock().await;

    let cached = shared.cache.get();
    if let Some(token) = cached.valid()
        && rejected.is_none_or(|rejected| rejected.secret() != token.secret())
    {
        debug!("another request already refreshed the token");
        return Ok(token.clone());
    }

    info!(endpoint = %challenge.endpoint, "exchanging client credentials for a token");
    std::future::poll_fn(|cx| inner.poll_ready(cx))
        .await
        .map_err(AuthError::Inner)?;

    let token = oauth::acquire_token(&mut inner, challenge, &shared.credentials)
        .await
        .inspect_err(|e| warn!(error = %e, "token acquisition failed"))?;

    let token: Arc<dyn Token> = Arc::new(token);
    shared.cache.store(token.clone());
    info!("token acquired and cached");

    Ok(token)
}

fn bearer_header<E>(token: &dyn Token) -> Result<HeaderValue, AuthError<E>> {
    token.authorization().map_err(|e| {
        AuthError::InvalidToken(format!("token contains invalid header characters: {e}"))
    })
}

/// The first few characters of a token, for logs.
fn token_prefix(secret: &str) -> &str {
    secret
        .char_indices()
        .nth(8)
        .map_or(secret, |(end, _)| &secret[..end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
