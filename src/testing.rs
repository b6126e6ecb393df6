//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tower::Service;

#[derive(Debug)]
pub(crate) struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A Tower service that returns queued responses in order and records every
/// request it sees, body included.
#[derive(Clone)]
pub(crate) struct MockHttpService {
    responses: Arc<Mutex<VecDeque<Result<Response<Full<Bytes>>, String>>>>,
    captured_requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockHttpService {
    pub fn new(responses: Vec<Response<Full<Bytes>>>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Like [`new`](Self::new), but `Err` entries simulate transport failures.
    pub fn with_results(responses: Vec<Result<Response<Full<Bytes>>, String>>) -> Self {
        MockHttpService {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            captured_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drain and return all captured requests.
    pub fn take_captured_requests(&self) -> Vec<CapturedRequest> {
        self.captured_requests.lock().unwrap().drain(..).collect()
    }
}

impl<B> Service<Request<B>> for MockHttpService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: fmt::Debug,
{
    type Response = Response<Full<Bytes>>;
    type Error = String;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, String>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockHttpService: ran out of configured responses");
        let captured = self.captured_requests.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await.unwrap().to_bytes();
            captured.lock().unwrap().push(CapturedRequest {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            });
            response
        })
    }
}

pub(crate) fn response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

pub(crate) fn json_response(status: StatusCode, json: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&json).unwrap())))
        .unwrap()
}
