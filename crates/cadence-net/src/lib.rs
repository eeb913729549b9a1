//! HTTP plumbing for the online client: a transport abstraction with a
//! reqwest-backed engine, an injectable clock, and the rate-limited download
//! manager.

pub mod clock;
pub mod download;
pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use download::{DownloadManager, DownloadProgress, DownloadRequest, DownloadState};
pub use http::{
    Body, HttpRequest, HttpResponse, HttpTransport, Method, MimePart, ReqwestTransport,
    ResponseCallback, TransportError,
};
