//! HTTP-tunneled packet transport.
//!
//! The client never holds a connection open. Queued packets are POSTed as one
//! batch to `c.<endpoint>` and the response body carries whatever the server
//! has for us. When idle, empty keepalive frames poll the server on a backoff
//! schedule.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_net::{Body, HttpRequest, HttpResponse, HttpTransport};
use cadence_proto::{decode_batch, encode_packet, outgoing};
use tracing::{debug, warn};

use crate::session::{Shared, SubmitPolicy};

/// The loop acts at most once per this interval.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Timeout of the login request and of every batch.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout of the blocking logout.
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Presence/stats batches are sent at most this often.
pub const BATCH_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// User agent the server expects.
pub const USER_AGENT: &str = "osu!";

/// Server address and scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub use_https: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, use_https: bool) -> Self {
        Self {
            host: host.into(),
            use_https,
        }
    }

    fn scheme(&self) -> &'static str {
        if self.use_https { "https://" } else { "http://" }
    }

    /// Packet endpoint.
    pub fn bancho_url(&self) -> String {
        format!("{}c.{}/", self.scheme(), self.host)
    }

    /// Web API url for `path` (which starts with `/`).
    pub fn web_url(&self, path: &str) -> String {
        format!("{}osu.{}{}", self.scheme(), self.host, path)
    }
}

/// What the player is doing, as far as polling frequency goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepaliveContext {
    pub lobby_visible: bool,
    pub spectating: bool,
    pub in_room: bool,
}

/// Interval between keepalives.
///
/// Starts at 1 s and grows by 1 s per keepalive sent without any reply
/// content, up to 30 s. Any received packet resets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveSchedule {
    interval: Duration,
}

impl Default for KeepaliveSchedule {
    fn default() -> Self {
        Self {
            interval: Self::INITIAL,
        }
    }
}

impl KeepaliveSchedule {
    pub const INITIAL: Duration = Duration::from_secs(1);
    pub const STEP: Duration = Duration::from_secs(1);
    pub const MAX: Duration = Duration::from_secs(30);
    /// Ceiling while in a multiplayer room.
    pub const ROOM_MAX: Duration = Duration::from_secs(3);

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self) {
        self.interval = Self::INITIAL;
    }

    pub fn on_keepalive_sent(&mut self) {
        if self.interval < Self::MAX {
            self.interval = (self.interval + Self::STEP).min(Self::MAX);
        }
    }

    /// Clamp the interval for latency-sensitive screens.
    pub fn apply(&mut self, ctx: KeepaliveContext) {
        if ctx.lobby_visible || ctx.spectating {
            self.interval = Self::INITIAL;
        }
        if ctx.in_room && self.interval > Self::ROOM_MAX {
            self.interval = Self::ROOM_MAX;
        }
    }

    pub fn is_due(&self, last_send: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_send) > self.interval
    }
}

/// Sending side of the packet transport.
pub struct Transport {
    http: Arc<dyn HttpTransport>,
    shared: Arc<Shared>,
    version: String,
    keepalive: KeepaliveSchedule,
    last_send: Instant,
    last_tick: Option<Instant>,
    last_batch_request: Instant,
}

impl Transport {
    pub fn new(http: Arc<dyn HttpTransport>, shared: Arc<Shared>, version: String, now: Instant) -> Self {
        Self {
            http,
            shared,
            version,
            keepalive: KeepaliveSchedule::default(),
            last_send: now,
            last_tick: None,
            last_batch_request: now,
        }
    }

    pub fn http(&self) -> &Arc<dyn HttpTransport> {
        &self.http
    }

    pub fn keepalive(&self) -> &KeepaliveSchedule {
        &self.keepalive
    }

    /// Rate limit: `true` at most once per [`MIN_TICK_INTERVAL`].
    pub fn should_tick(&mut self, now: Instant) -> bool {
        if self
            .last_tick
            .is_some_and(|last| now.saturating_duration_since(last) < MIN_TICK_INTERVAL)
        {
            return false;
        }
        self.last_tick = Some(now);
        true
    }

    /// Reset the keepalive backoff if anything arrived.
    pub fn note_received(&mut self) {
        if self.shared.take_received() {
            self.keepalive.reset();
        }
    }

    /// `true` once per [`BATCH_REQUEST_INTERVAL`].
    pub fn batch_requests_due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_batch_request) > BATCH_REQUEST_INTERVAL {
            self.last_batch_request = now;
            true
        } else {
            false
        }
    }

    fn base_request(&self, url: String, body: Vec<u8>, timeout: Duration) -> HttpRequest {
        HttpRequest::post(url, Body::Bytes(body))
            .header("user-agent", USER_AGENT)
            .header("x-mcosu-ver", self.version.clone())
            .timeout(timeout)
    }

    /// POST the login body on its own.
    pub fn send_login(&mut self, endpoint: &Endpoint, body: String, now: Instant) {
        self.last_send = now;
        let request = self.base_request(endpoint.bancho_url(), body.into_bytes(), REQUEST_TIMEOUT);
        let shared = Arc::clone(&self.shared);
        debug!(host = %endpoint.host, "sending login request");
        self.http
            .request_async(request, Box::new(move |response| handle_response(&shared, response)));
    }

    /// Send queued packets, adding a keepalive when one is due.
    ///
    /// Returns `true` if a request went out.
    pub fn flush(&mut self, endpoint: &Endpoint, ctx: KeepaliveContext, now: Instant) -> bool {
        self.keepalive.apply(ctx);

        let Some(token) = self.shared.token() else {
            if self.shared.has_outgoing() {
                debug!("no session token yet, holding queued packets");
            }
            return false;
        };

        if self.keepalive.is_due(self.last_send, now) && !self.shared.has_outgoing() {
            self.shared.queue_packet(&outgoing::ping());
            self.keepalive.on_keepalive_sent();
        }

        let mut batch = self.shared.take_outgoing();
        if batch.is_empty() {
            return false;
        }
        self.last_send = now;

        // Compatibility shim, not a protocol requirement: every batch ends
        // with one extra keepalive frame.
        encode_packet(&outgoing::ping(), &mut batch);

        let request = self
            .base_request(endpoint.bancho_url(), batch, REQUEST_TIMEOUT)
            .header("osu-token", token);
        let shared = Arc::clone(&self.shared);
        self.http
            .request_async(request, Box::new(move |response| handle_response(&shared, response)));
        true
    }

    /// Synchronous logout; the token is cleared before sending.
    pub fn send_logout(&self, endpoint: &Endpoint) -> HttpResponse {
        let token = self.shared.take_token().unwrap_or_default();
        let mut body = Vec::new();
        encode_packet(&outgoing::logout(), &mut body);
        let request = self
            .base_request(endpoint.bancho_url(), body, LOGOUT_TIMEOUT)
            .header("osu-token", token);
        self.http.request_blocking(request)
    }

    /// Forget timing state after a disconnect.
    pub fn reset(&mut self, now: Instant) {
        self.keepalive.reset();
        self.last_send = now;
        self.shared.clear_outgoing();
    }
}

/// Completion of a login or batch request. Runs on a transport worker.
pub(crate) fn handle_response(shared: &Shared, response: HttpResponse) {
    if !response.is_success() {
        if shared.has_token() {
            warn!(status = response.status, error = ?response.error, "failed to send packets");
        } else {
            shared.push_notice(format!("Failed to log in: HTTP {}", response.status));
        }
        return;
    }

    if let Some(token) = response.header("cho-token") {
        shared.set_token(Some(token.to_string()));
    }
    if let Some(policy) = response
        .header("x-mcosu-features")
        .and_then(SubmitPolicy::from_features)
    {
        debug!(?policy, "server score submission policy");
        shared.set_policy(policy);
    }

    let packets = decode_batch(&response.body);
    if !packets.is_empty() {
        shared.mark_received();
        shared.push_incoming(packets);
    }
}
