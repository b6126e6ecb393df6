//! OAuth2 client-credentials exchange via the inner Tower service.
//!
//! The challenge tells us which authorization server to talk to; this module
//! performs the exchange against it:
//!
//! ```text
//! POST {endpoint}/oauth2/token?api-version=1.0
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=client_credentials&client_id=...&resource=...&client_secret=...
//! ```
//!
//! The request goes through the same inner service the middleware wraps, so
//! it shares TLS config and connection pool with regular vault requests while
//! bypassing the authentication layer itself.

use std::fmt;
use std::time::Duration;

use bytes::{Buf, Bytes};
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use serde::Deserialize;
use tower::Service;
use tracing::{debug, warn};

use super::challenge::AuthChallenge;
use super::token::{BearerToken, Token as _, TokenError};

const TOKEN_PATH: &str = "/oauth2/token";
const OAUTH_API_VERSION: &str = "1.0";

/// Client id and secret used for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while exchanging credentials for a token.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("HTTP request to token endpoint failed: {0}")]
    Http(String),

    #[error("token endpoint returned {status}")]
    Status { status: StatusCode },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl From<TokenError> for AcquireError {
    fn from(e: TokenError) -> Self {
        AcquireError::InvalidResponse(e.to_string())
    }
}

/// The token endpoint's JSON reply.
///
/// `expires_in` is sent as a number by some servers and as a numeric string
/// by others.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    expires_in: ExpiresIn,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            ExpiresIn::Seconds(secs) => Some(*secs),
            ExpiresIn::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Build the token endpoint URL for a challenge.
fn token_url(challenge: &AuthChallenge) -> String {
    format!(
        "{}{TOKEN_PATH}?api-version={OAUTH_API_VERSION}",
        challenge.endpoint.trim_end_matches('/')
    )
}

fn token_request_body(challenge: &AuthChallenge, credentials: &ClientCredentials) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "client_credentials")
        .append_pair("client_id", &credentials.client_id)
        .append_pair("resource", &challenge.resource)
        .append_pair("client_secret", &credentials.client_secret)
        .finish()
}

/// Exchange client credentials for a bearer token at the endpoint named by
/// `challenge`.
///
/// The caller is responsible for readying `inner` before calling this.
pub(crate) async fn acquire_token<S, ReqBody, ResBody>(
    inner: &mut S,
    challenge: &AuthChallenge,
    credentials: &ClientCredentials,
) -> Result<BearerToken, AcquireError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Debug,
    ReqBody: From<Bytes>,
    ResBody: Body,
    ResBody::Data: Buf,
    ResBody::Error: fmt::Debug,
{
    let endpoint = token_url(challenge);
    debug!(endpoint = %endpoint, resource = %challenge.resource, "POSTing to token endpoint");

    let body = ReqBody::from(Bytes::from(token_request_body(challenge, credentials)));
    let request = Request::post(&endpoint)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .map_err(|e| AcquireError::Http(format!("failed to build token request: {e}")))?;

    let response = inner
        .call(request)
        .await
        .map_err(|e| AcquireError::Http(format!("{e:?}")))?;

    let status = response.status();
    debug!(status = %status, "token endpoint responded");

    let bytes = BodyExt::collect(response.into_body())
        .await
        .map_err(|e| AcquireError::Http(format!("failed to read token response body: {e:?}")))?
        .to_bytes();

    if status != StatusCode::OK {
        warn!(
            status = status.as_u16(),
            body = %String::from_utf8_lossy(&bytes),
            "token endpoint returned error"
        );
        return Err(AcquireError::Status { status });
    }

    let token = parse_token_response(&bytes)?;
    debug!(expires_at = ?token.expires_at(), "token acquired successfully");
    Ok(token)
}

/// Decode a 200 token response into a [`BearerToken`].
///
/// Expiry is computed from the moment of decoding.
fn parse_token_response(body: &[u8]) -> Result<BearerToken, AcquireError> {
    let response: TokenResponse = serde_json::from_slice(body)
        .map_err(|e| AcquireError::InvalidResponse(format!("invalid JSON: {e}")))?;

    let expires_in = response
        .expires_in
        .seconds()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| AcquireError::InvalidResponse("missing or zero expires_in".into()))?;

    if response.access_token.is_empty() {
        return Err(AcquireError::InvalidResponse("empty access_token".into()));
    }

    Ok(BearerToken::expiring_in(
        response.access_token,
        Duration::from_secs(expires_in),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> AuthChallenge {
        AuthChallenge {
            endpoint: "https://login.example.com/tenant".into(),
            resource: "https://vault.example.net".into(),
        }
    }

    #[test]
    fn token_url_appends_path_and_version() {
        assert_eq!(
            token_url(&challenge()),
            "https://login.example.com/tenant/oauth2/token?api-version=1.0"
        );

        let trailing = AuthChallenge {
            endpoint: "https://login.example.com/".into(),
            resource: "r".into(),
        };
        assert_eq!(
            token_url(&trailing),
            "https://login.example.com/oauth2/token?api-version=1.0"
        );
    }

    #[test]
    fn request_body_is_form_encoded_in_order() {
        let body = token_request_body(
            &challenge(),
            &ClientCredentials::new("my-client", "s3cr&t"),
        );
        assert_eq!(
            body,
            "grant_type=client_credentials&client_id=my-client\
             &resource=https%3A%2F%2Fvault.example.net&client_secret=s3cr%26t"
        );
    }

    #[test]
    fn parses_numeric_expires_in() {
        let token = parse_token_response(br#"{"access_token":"abc","expires_in":3600}"#).unwrap();
        assert_eq!(token.secret(), "abc");
        assert!(token.is_valid());
    }

    #[test]
    fn parses_string_expires_in() {
        let token =
            parse_token_response(br#"{"access_token":"abc","expires_in":"3599","token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(token.secret(), "abc");
    }

    #[test]
    fn rejects_zero_expires_in() {
        let result = parse_token_response(br#"{"access_token":"abc","expires_in":0}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));

        let result = parse_token_response(br#"{"access_token":"abc","expires_in":"0"}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_out_of_range_expires_in() {
        let result =
            parse_token_response(br#"{"access_token":"abc","expires_in":18446744073709551615}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));

        let result =
            parse_token_response(br#"{"access_token":"abc","expires_in":"18446744073709551615"}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_unparsable_expires_in() {
        let result = parse_token_response(br#"{"access_token":"abc","expires_in":"soon"}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_empty_access_token() {
        let result = parse_token_response(br#"{"access_token":"","expires_in":3600}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));

        let result = parse_token_response(br#"{"expires_in":3600}"#);
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        let result = parse_token_response(b"<html>oops</html>");
        assert!(matches!(result, Err(AcquireError::InvalidResponse(_))));
    }

    #[test]
    fn status_error_carries_status_line() {
        let err = AcquireError::Status {
            status: StatusCode::BAD_REQUEST,
        };
        assert_eq!(err.to_string(), "token endpoint returned 400 Bad Request");
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let credentials = ClientCredentials::new("id", "hunter2");
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
