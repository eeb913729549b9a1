//! HTTP transport abstraction and its reqwest-backed implementation.
//!
//! Every protocol call goes through [`HttpTransport`]. Completions run on the
//! transport's worker threads, so callbacks must only hand results over to
//! shared, lock-guarded state. [`HttpTransport::request_blocking`] exists for
//! the single synchronous logout and must not be called from a callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

/// Connect timeout applied to every request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default overall timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Redirect hops followed when a request opts into redirects.
const MAX_REDIRECTS: usize = 10;

/// Errors raised by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure before a status line was received.
    #[error("request failed: {0}")]
    Request(String),

    /// The async runtime or HTTP client could not be built.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub name: String,
    pub filename: String,
    pub data: Vec<u8>,
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Multipart(Vec<MimePart>),
}

/// Download progress callback, called with values in `0.0..=1.0`.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Completion callback of an asynchronous request.
pub type ResponseCallback = Box<dyn FnOnce(HttpResponse) + Send + 'static>;

/// An outgoing HTTP request.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub progress: Option<ProgressFn>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("follow_redirects", &self.follow_redirects)
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>, body: Body) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body,
            timeout: DEFAULT_TIMEOUT,
            follow_redirects: false,
            progress: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url, Body::Empty)
    }

    pub fn post(url: impl Into<String>, body: Body) -> Self {
        Self::new(Method::Post, url, body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn on_progress(mut self, progress: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A completed request.
///
/// Transport failures are reported as status `0` with [`error`](Self::error)
/// set, so callers handle every outcome from one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub error: Option<TransportError>,
}

impl HttpResponse {
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    pub fn failed(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Something that can execute HTTP requests.
pub trait HttpTransport: Send + Sync {
    /// Start `request`; `on_done` runs on a worker thread when it completes.
    fn request_async(&self, request: HttpRequest, on_done: ResponseCallback);

    /// Execute `request` and wait for the result.
    fn request_blocking(&self, request: HttpRequest) -> HttpResponse;
}

/// [`HttpTransport`] on reqwest, driven by an owned multi-thread runtime.
pub struct ReqwestTransport {
    runtime: Option<tokio::runtime::Runtime>,
    client: reqwest::Client,
    redirecting_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the runtime and HTTP clients. `user_agent` is sent on every request.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("cadence-http")
            .enable_all()
            .build()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .user_agent(user_agent)
                .connect_timeout(CONNECT_TIMEOUT)
                .redirect(policy)
                .build()
                .map_err(|e| TransportError::Unavailable(e.to_string()))
        };

        Ok(Self {
            runtime: Some(runtime),
            client: build(reqwest::redirect::Policy::none())?,
            redirecting_client: build(reqwest::redirect::Policy::limited(MAX_REDIRECTS))?,
        })
    }

    fn client_for(&self, request: &HttpRequest) -> reqwest::Client {
        if request.follow_redirects {
            self.redirecting_client.clone()
        } else {
            self.client.clone()
        }
    }

    async fn execute(client: reqwest::Client, request: HttpRequest) -> HttpResponse {
        match Self::try_execute(client, &request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %request.url, error = %err, "http request failed");
                HttpResponse::failed(err)
            }
        }
    }

    async fn try_execute(
        client: reqwest::Client,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        builder = builder.timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes.clone()),
            Body::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = form.part(
                        part.name.clone(),
                        reqwest::multipart::Part::bytes(part.data.clone())
                            .file_name(part.filename.clone()),
                    );
                }
                builder.multipart(form)
            }
        };

        let mut response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if let (Some(progress), Some(total)) = (&request.progress, total)
                && total > 0
            {
                progress((body.len() as f64 / total as f64).min(1.0) as f32);
            }
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
            error: None,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn request_async(&self, request: HttpRequest, on_done: ResponseCallback) {
        let Some(runtime) = &self.runtime else {
            on_done(HttpResponse::failed(TransportError::Unavailable(
                "runtime shut down".to_string(),
            )));
            return;
        };
        let client = self.client_for(&request);
        runtime.spawn(async move {
            let response = Self::execute(client, request).await;
            on_done(response);
        });
    }

    fn request_blocking(&self, request: HttpRequest) -> HttpResponse {
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!(url = %request.url, "blocking request issued from async context, refusing");
            return HttpResponse::failed(TransportError::Unavailable(
                "blocking call inside runtime".to_string(),
            ));
        }
        let Some(runtime) = &self.runtime else {
            return HttpResponse::failed(TransportError::Unavailable(
                "runtime shut down".to_string(),
            ));
        };
        let client = self.client_for(&request);
        runtime.block_on(Self::execute(client, request))
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        // The last reference may be released from a worker thread.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
