//! Rate-limited asynchronous download manager.
//!
//! Downloads run one at a time with at least [`MIN_START_GAP`] between
//! starts. Each url maps to a single shared [`DownloadRequest`] for the life of
//! the manager, so any number of callers can poll the same download.
//!
//! ```text
//! Queued ──start──▶ InFlight ──200──▶ Done
//!    ▲                 │ 429
//!    │                 ▼
//!    └─────5s──── RetryScheduled
//!                      │ other status / transport failure
//!                      ▼
//!                    Failed
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

/// Minimum time between two download starts.
pub const MIN_START_GAP: Duration = Duration::from_millis(100);

/// Delay before retrying a rate-limited (429) download.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Overall timeout of one download attempt.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Highest progress reported before the body is available.
const MAX_PENDING_PROGRESS: f32 = 0.99;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle of a [`DownloadRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Queued,
    InFlight,
    Done,
    RetryScheduled,
    Failed,
}

#[derive(Debug)]
struct RequestState {
    state: DownloadState,
    body: Vec<u8>,
    retry_after: Option<Instant>,
}

/// One download, shared by every caller that asked for its url.
#[derive(Debug)]
pub struct DownloadRequest {
    url: String,
    progress: AtomicU32,
    response_code: AtomicI32,
    completed: AtomicBool,
    inner: Mutex<RequestState>,
}

impl DownloadRequest {
    fn new(url: String) -> Self {
        Self {
            url,
            progress: AtomicU32::new(0f32.to_bits()),
            response_code: AtomicI32::new(0),
            completed: AtomicBool::new(false),
            inner: Mutex::new(RequestState {
                state: DownloadState::Queued,
                body: Vec::new(),
                retry_after: None,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `1.0` when done, `-1.0` when failed, otherwise at most `0.99`.
    pub fn progress(&self) -> f32 {
        let raw = f32::from_bits(self.progress.load(Ordering::Acquire));
        if self.is_completed() {
            raw
        } else {
            raw.clamp(0.0, MAX_PENDING_PROGRESS)
        }
    }

    /// Last HTTP status seen, `0` before completion or on transport failure.
    pub fn response_code(&self) -> i32 {
        self.response_code.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> DownloadState {
        lock(&self.inner).state
    }

    /// Copy of the downloaded body; empty until done.
    pub fn body(&self) -> Vec<u8> {
        lock(&self.inner).body.clone()
    }

    fn set_progress(&self, progress: f32) {
        self.progress.store(progress.to_bits(), Ordering::Release);
    }

    fn retry_pending(&self, now: Instant) -> bool {
        lock(&self.inner).retry_after.is_some_and(|at| at > now)
    }
}

/// Result of polling [`DownloadManager::download`].
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadProgress {
    /// Still queued or in flight, with progress in `0.0..=0.99`.
    Pending(f32),
    /// Finished with HTTP 200.
    Finished { status: i32, body: Vec<u8> },
    /// Finished with any other outcome; never retried.
    Failed { status: i32 },
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
    requests: Mutex<HashMap<String, Arc<DownloadRequest>>>,
    queue: Mutex<VecDeque<Arc<DownloadRequest>>>,
    currently_downloading: AtomicBool,
    last_start: Mutex<Option<Instant>>,
}

/// Queue of downloads sharing one transport.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                clock,
                generation: AtomicU64::new(0),
                requests: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                currently_downloading: AtomicBool::new(false),
                last_start: Mutex::new(None),
            }),
        }
    }

    /// Shared request for `url`, queuing it on first sight.
    pub fn request(&self, url: &str) -> Arc<DownloadRequest> {
        let request = {
            let mut requests = lock(&self.inner.requests);
            match requests.get(url) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let request = Arc::new(DownloadRequest::new(url.to_string()));
                    requests.insert(url.to_string(), Arc::clone(&request));
                    lock(&self.inner.queue).push_back(Arc::clone(&request));
                    debug!(url, "download queued");
                    request
                }
            }
        };
        self.pump();
        request
    }

    /// Poll the download of `url`, starting it if needed.
    pub fn download(&self, url: &str) -> DownloadProgress {
        let request = self.request(url);
        if !request.is_completed() {
            return DownloadProgress::Pending(request.progress());
        }
        let status = request.response_code();
        match request.state() {
            DownloadState::Done => DownloadProgress::Finished {
                status,
                body: request.body(),
            },
            _ => DownloadProgress::Failed { status },
        }
    }

    /// Start the next queued download if allowed. Call once per frame.
    pub fn update(&self) {
        self.pump();
    }

    /// Number of requests waiting to start.
    pub fn queued(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Drop every queued and known request; in-flight completions are ignored.
    pub fn shutdown(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        lock(&self.inner.queue).clear();
        lock(&self.inner.requests).clear();
        self.inner
            .currently_downloading
            .store(false, Ordering::Release);
        debug!("download manager shut down");
    }

    fn pump(&self) {
        if self
            .inner
            .currently_downloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let now = self.inner.clock.now();
        let next = {
            let mut last_start = lock(&self.inner.last_start);
            let gap_elapsed = last_start.is_none_or(|at| now.duration_since(at) >= MIN_START_GAP);
            let mut queue = lock(&self.inner.queue);
            let head_ready = queue.front().is_some_and(|req| !req.retry_pending(now));
            if gap_elapsed && head_ready {
                *last_start = Some(now);
                queue.pop_front()
            } else {
                None
            }
        };

        match next {
            Some(request) => self.start(request),
            None => self
                .inner
                .currently_downloading
                .store(false, Ordering::Release),
        }
    }

    fn start(&self, request: Arc<DownloadRequest>) {
        {
            let mut state = lock(&request.inner);
            state.state = DownloadState::InFlight;
            state.retry_after = None;
        }
        debug!(url = %request.url, "download started");

        let generation = self.inner.generation.load(Ordering::Acquire);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let progress_target = Arc::clone(&request);
        let http = HttpRequest::get(request.url.clone())
            .timeout(DOWNLOAD_TIMEOUT)
            .follow_redirects(true)
            .on_progress(move |p| {
                if !progress_target.is_completed() {
                    progress_target.set_progress(p);
                }
            });

        let transport = Arc::clone(&self.inner.transport);
        transport.request_async(
            http,
            Box::new(move |response| {
                if let Some(inner) = weak.upgrade() {
                    DownloadManager { inner }.complete(generation, &request, response);
                }
            }),
        );
    }

    fn complete(&self, generation: u64, request: &DownloadRequest, response: HttpResponse) {
        if generation != self.inner.generation.load(Ordering::Acquire) {
            debug!(url = %request.url, "discarding stale download completion");
            return;
        }

        let status = i32::from(response.status);
        request.response_code.store(status, Ordering::Release);
        match response.status {
            200 => {
                {
                    let mut state = lock(&request.inner);
                    state.body = response.body;
                    state.state = DownloadState::Done;
                }
                request.set_progress(1.0);
                request.completed.store(true, Ordering::Release);
                debug!(url = %request.url, "download finished");
            }
            429 => {
                request.set_progress(0.0);
                {
                    let mut state = lock(&request.inner);
                    state.state = DownloadState::RetryScheduled;
                    state.retry_after = Some(self.inner.clock.now() + RETRY_DELAY);
                }
                let requeue = lock(&self.inner.requests)
                    .get(&request.url)
                    .cloned();
                if let Some(requeue) = requeue {
                    lock(&self.inner.queue).push_back(requeue);
                }
                debug!(url = %request.url, "download rate limited, retrying later");
            }
            _ => {
                lock(&request.inner).state = DownloadState::Failed;
                request.set_progress(-1.0);
                request.completed.store(true, Ordering::Release);
                match &response.error {
                    Some(err) => warn!(url = %request.url, error = %err, "download failed"),
                    None => warn!(url = %request.url, status, "download failed"),
                }
            }
        }

        self.inner
            .currently_downloading
            .store(false, Ordering::Release);
        self.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::MockTransport;

    fn setup() -> (DownloadManager, Arc<MockTransport>, Arc<ManualClock>) {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new());
        let manager = DownloadManager::new(transport.clone(), clock.clone());
        (manager, transport, clock)
    }

    #[test]
    fn test_same_url_shares_one_request() {
        let (manager, transport, _clock) = setup();
        let a = manager.request("https://osu.example.net/d/1");
        let b = manager.request("https://osu.example.net/d/1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(transport.pending_count(), 1);
        assert_eq!(a.state(), DownloadState::InFlight);
    }

    #[test]
    fn test_success_reports_body_and_full_progress() {
        let (manager, transport, _clock) = setup();
        let url = "https://osu.example.net/d/2";
        assert_eq!(manager.download(url), DownloadProgress::Pending(0.0));

        transport.complete_next(HttpResponse::ok(b"archive".to_vec()));
        assert_eq!(
            manager.download(url),
            DownloadProgress::Finished {
                status: 200,
                body: b"archive".to_vec()
            }
        );
        assert_eq!(manager.request(url).progress(), 1.0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_progress_clamped_until_done() {
        let (manager, _transport, _clock) = setup();
        let request = manager.request("https://osu.example.net/d/3");
        request.set_progress(1.0);
        assert_eq!(request.progress(), MAX_PENDING_PROGRESS);
    }

    #[test]
    fn test_rate_limited_download_retried_once_after_delay() {
        let (manager, transport, clock) = setup();
        let url = "https://osu.example.net/d/4";
        let request = manager.request(url);

        transport.complete_next(HttpResponse::with_status(429, Vec::new()));
        assert_eq!(request.state(), DownloadState::RetryScheduled);
        assert_eq!(request.progress(), 0.0);
        assert!(!request.is_completed());

        clock.advance(Duration::from_secs(4));
        manager.update();
        assert_eq!(transport.pending_count(), 0);

        clock.advance(Duration::from_secs(1));
        manager.update();
        assert_eq!(transport.pending_count(), 1);

        transport.complete_next(HttpResponse::ok(b"ok".to_vec()));
        assert_eq!(request.state(), DownloadState::Done);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_failure_is_final() {
        let (manager, transport, clock) = setup();
        let url = "https://osu.example.net/d/5";
        manager.request(url);
        transport.complete_next(HttpResponse::with_status(404, Vec::new()));

        assert_eq!(manager.download(url), DownloadProgress::Failed { status: 404 });
        assert_eq!(manager.request(url).progress(), -1.0);

        clock.advance(Duration::from_secs(60));
        manager.update();
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_transport_failure_reports_status_zero() {
        let (manager, transport, _clock) = setup();
        let url = "https://osu.example.net/d/6";
        manager.request(url);
        transport.complete_next(HttpResponse::failed(crate::http::TransportError::Timeout));
        assert_eq!(manager.download(url), DownloadProgress::Failed { status: 0 });
    }

    #[test]
    fn test_starts_are_spaced_by_minimum_gap() {
        let (manager, transport, clock) = setup();
        manager.request("https://osu.example.net/d/7");
        manager.request("https://osu.example.net/d/8");
        assert_eq!(transport.pending_count(), 1);

        transport.complete_next(HttpResponse::ok(Vec::new()));
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(manager.queued(), 1);

        clock.advance(MIN_START_GAP);
        manager.update();
        assert_eq!(transport.pending_count(), 1);
        assert_eq!(
            transport.next_url().as_deref(),
            Some("https://osu.example.net/d/8")
        );
    }

    #[test]
    fn test_shutdown_discards_stale_completion() {
        let (manager, transport, _clock) = setup();
        let request = manager.request("https://osu.example.net/d/9");
        manager.request("https://osu.example.net/d/10");
        manager.shutdown();
        assert_eq!(manager.queued(), 0);

        transport.complete_next(HttpResponse::ok(b"late".to_vec()));
        assert!(!request.is_completed());
        assert_eq!(request.state(), DownloadState::InFlight);

        let fresh = manager.request("https://osu.example.net/d/9");
        assert!(!Arc::ptr_eq(&request, &fresh));
    }
}
