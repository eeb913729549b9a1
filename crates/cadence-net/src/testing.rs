//! Deterministic test doubles for code built on [`HttpTransport`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use crate::clock::ManualClock;
use crate::http::{Body, HttpRequest, HttpResponse, HttpTransport, Method, ResponseCallback};

/// Snapshot of a request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub blocking: bool,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Raw body bytes; empty for non-byte bodies.
    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Bytes(bytes) => bytes,
            _ => &[],
        }
    }
}

#[derive(Default)]
struct MockState {
    requests: Vec<RecordedRequest>,
    pending: VecDeque<(HttpRequest, ResponseCallback)>,
    blocking_responses: VecDeque<HttpResponse>,
}

/// Transport that records requests and completes them only on demand.
///
/// Async requests stay pending until [`complete_next`](Self::complete_next)
/// runs their callback on the calling thread. Blocking requests answer from a
/// scripted queue, defaulting to a network failure.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, request: &HttpRequest, blocking: bool) {
        self.state().requests.push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            blocking,
        });
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Async requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Url of the oldest pending request.
    pub fn next_url(&self) -> Option<String> {
        self.state().pending.front().map(|(req, _)| req.url.clone())
    }

    /// Complete the oldest pending request with `response`.
    ///
    /// The callback runs after the internal lock is released so it may issue
    /// new requests. Returns `false` when nothing was pending.
    pub fn complete_next(&self, response: HttpResponse) -> bool {
        let next = self.state().pending.pop_front();
        match next {
            Some((request, callback)) => {
                if let Some(progress) = &request.progress {
                    progress(1.0);
                }
                callback(response);
                true
            }
            None => false,
        }
    }

    /// Queue the response of the next blocking request.
    pub fn push_blocking(&self, response: HttpResponse) {
        self.state().blocking_responses.push_back(response);
    }
}

impl HttpTransport for MockTransport {
    fn request_async(&self, request: HttpRequest, on_done: ResponseCallback) {
        self.record(&request, false);
        self.state().pending.push_back((request, on_done));
    }

    fn request_blocking(&self, request: HttpRequest) -> HttpResponse {
        self.record(&request, true);
        self.state()
            .blocking_responses
            .pop_front()
            .unwrap_or_else(|| {
                HttpResponse::failed(crate::http::TransportError::Connect(
                    "mock transport has no scripted response".to_string(),
                ))
            })
    }
}
