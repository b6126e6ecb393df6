//! JSON request helpers on top of an (authenticated) Tower service.
//!
//! [`JsonClient`] sends a request, decodes a `200 OK` body into the caller's
//! type, and turns anything else into a [`ClientError`]. Non-200 bodies are
//! decoded as the vault's error payload when possible:
//!
//! ```json
//! { "error": { "code": "SecretNotFound", "message": "...", "innererror": { ... } } }
//! ```

use std::fmt;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower::{Service, ServiceExt};
use tracing::debug;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// The error object returned by the vault for failed requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyVaultError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "innererror")]
    pub inner_error: Option<Box<KeyVaultError>>,
}

impl fmt::Display for KeyVaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyVault: {}: {}", self.code, self.message)
    }
}

impl std::error::Error for KeyVaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner_error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Bodies without an `error` object, `{}` included, are not error payloads.
#[derive(Deserialize)]
struct ErrorResponse {
    error: KeyVaultError,
}

/// Errors from [`JsonClient`], generic over the service error `E`.
#[derive(Debug)]
pub enum ClientError<E> {
    /// The service failed to produce a response.
    Transport(E),

    /// The vault answered with an error payload.
    Api {
        status: StatusCode,
        error: KeyVaultError,
    },

    /// Non-200 response whose body is not an error payload.
    Status(StatusCode),

    /// The request could not be built.
    Request(http::Error),

    /// The request body could not be serialized.
    Encode(serde_json::Error),

    /// The response body could not be read.
    Body(String),

    /// The `200 OK` body did not match the expected type.
    Decode(serde_json::Error),
}

impl<E: fmt::Display> fmt::Display for ClientError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "{e}"),
            ClientError::Api { error, .. } => write!(f, "{error}"),
            ClientError::Status(status) => write!(f, "unexpected response status: {status}"),
            ClientError::Request(e) => write!(f, "failed to build request: {e}"),
            ClientError::Encode(e) => write!(f, "failed to encode request body: {e}"),
            ClientError::Body(msg) => write!(f, "failed to read response body: {msg}"),
            ClientError::Decode(e) => write!(f, "failed to decode response body: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ClientError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Api { error, .. } => Some(error),
            ClientError::Request(e) => Some(e),
            ClientError::Encode(e) | ClientError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ClientError<E> {
    /// The HTTP status of a failed response, if the request got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } | ClientError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

/// Sends JSON requests through a cloneable Tower service.
///
/// The service is cloned per request, so `JsonClient` methods take `&self`
/// and may run concurrently. With [`Authentication`](super::Authentication)
/// all clones share one token cache.
#[derive(Debug, Clone)]
pub struct JsonClient<S> {
    service: S,
}

impl<S> JsonClient<S> {
    pub fn new(service: S) -> Self {
        JsonClient { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Send `request` and decode a `200 OK` response body as `T`.
    pub async fn send_json<T, ResBody>(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<T, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        T: DeserializeOwned,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        debug!(method = %request.method(), uri = %request.uri(), "sending JSON request");
        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Body(format!("{e:?}")))?
            .to_bytes();

        if status != StatusCode::OK {
            debug!(status = %status, "request failed");
            return Err(match serde_json::from_slice::<ErrorResponse>(&bytes) {
                Ok(payload) => ClientError::Api {
                    status,
                    error: payload.error,
                },
                Err(_) => ClientError::Status(status),
            });
        }

        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }

    /// GET `url` with `Accept: application/json`.
    pub async fn get_json<T, ResBody>(&self, url: &str) -> Result<T, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        T: DeserializeOwned,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        let request = Request::get(url)
            .header(ACCEPT, "application/json")
            .body(Full::default())
            .map_err(ClientError::Request)?;
        self.send_json(request).await
    }

    /// PUT `body` as JSON to `url`.
    pub async fn put_json<T, B, ResBody>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        self.upload_json(Method::PUT, url, body).await
    }

    /// PATCH `body` as JSON to `url`.
    pub async fn patch_json<T, B, ResBody>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        self.upload_json(Method::PATCH, url, body).await
    }

    async fn upload_json<T, B, ResBody>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        let body = serde_json::to_vec(body).map_err(ClientError::Encode)?;
        let request = Request::builder()
            .method(method)
            .uri(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(Full::new(Bytes::from(body)))
            .map_err(ClientError::Request)?;
        self.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHttpService, json_response, response};
    use std::error::Error as _;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Thing {
        name: String,
    }

    #[tokio::test]
    async fn get_json_decodes_ok_body() {
        let mock_svc = MockHttpService::new(vec![json_response(
            StatusCode::OK,
            serde_json::json!({ "name": "db-password" }),
        )]);
        let client = JsonClient::new(mock_svc.clone());

        let thing: Thing = client
            .get_json("https://vault.example.net/things/1")
            .await
            .unwrap();

        assert_eq!(thing.name, "db-password");
        let captured = mock_svc.take_captured_requests();
        assert_eq!(captured[0].method, Method::GET);
        assert_eq!(captured[0].headers.get(ACCEPT).unwrap(), "application/json");
        assert!(captured[0].body.is_empty());
    }

    #[tokio::test]
    async fn put_and_patch_send_json_bodies() {
        let mock_svc = MockHttpService::new(vec![
            json_response(StatusCode::OK, serde_json::json!({ "name": "a" })),
            json_response(StatusCode::OK, serde_json::json!({ "name": "b" })),
        ]);
        let client = JsonClient::new(mock_svc.clone());

        let _: Thing = client
            .put_json("https://vault.example.net/things/a", &serde_json::json!({ "value": 1 }))
            .await
            .unwrap();
        let _: Thing = client
            .patch_json("https://vault.example.net/things/b", &serde_json::json!({ "value": 2 }))
            .await
            .unwrap();

        let captured = mock_svc.take_captured_requests();
        assert_eq!(captured[0].method, Method::PUT);
        assert_eq!(captured[1].method, Method::PATCH);
        assert_eq!(
            captured[0].headers.get(CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
        assert_eq!(captured[1].body, r#"{"value":2}"#);
    }

    #[tokio::test]
    async fn error_payload_becomes_api_error() {
        let mock_svc = MockHttpService::new(vec![json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "error": {
                    "code": "SecretNotFound",
                    "message": "Secret not found: db-password",
                    "innererror": { "code": "Inner", "message": "deeper" }
                }
            }),
        )]);
        let client = JsonClient::new(mock_svc);

        let err = client
            .get_json::<Thing, _>("https://vault.example.net/secrets/db-password")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            err.to_string(),
            "KeyVault: SecretNotFound: Secret not found: db-password"
        );
        let ClientError::Api { error, .. } = &err else {
            panic!("expected an API error, got: {err:?}");
        };
        assert_eq!(error.inner_error.as_ref().unwrap().code, "Inner");
        assert_eq!(
            err.source().and_then(|e| e.source()).map(ToString::to_string),
            Some("KeyVault: Inner: deeper".to_string())
        );
    }

    #[tokio::test]
    async fn undecodable_error_body_keeps_status() {
        let mock_svc = MockHttpService::new(vec![response(
            StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>",
        )]);
        let client = JsonClient::new(mock_svc);

        let err = client
            .get_json::<Thing, _>("https://vault.example.net/secrets")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Status(StatusCode::BAD_GATEWAY)));
    }

    #[tokio::test]
    async fn empty_error_object_keeps_status() {
        let mock_svc = MockHttpService::new(vec![json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({}),
        )]);
        let client = JsonClient::new(mock_svc);

        let err = client
            .get_json::<Thing, _>("https://vault.example.net/secrets")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Status(StatusCode::INTERNAL_SERVER_ERROR)
        ));
        assert_eq!(
            err.to_string(),
            "unexpected response status: 500 Internal Server Error"
        );
    }

    #[tokio::test]
    async fn malformed_ok_body_is_a_decode_error() {
        let mock_svc = MockHttpService::new(vec![response(StatusCode::OK, "not json")]);
        let client = JsonClient::new(mock_svc);

        let err = client
            .get_json::<Thing, _>("https://vault.example.net/secrets")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn transport_errors_are_wrapped() {
        let mock_svc = MockHttpService::with_results(vec![Err("dns failure".into())]);
        let client = JsonClient::new(mock_svc);

        let err = client
            .get_json::<Thing, _>("https://vault.example.net/secrets")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Transport(msg) if msg == "dns failure"));
    }
}
