//! One-shot authenticated web API requests.
//!
//! A response is turned into a [`Packet`] whose id is the request kind mapped
//! into a reserved range, then goes through the same incoming queue and
//! dispatcher as protocol packets.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use cadence_net::{HttpRequest, HttpTransport};
use cadence_proto::Packet;
use tracing::debug;

use crate::session::Shared;
use crate::transport::{Endpoint, USER_AGENT};

/// Timeout of API requests.
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

/// First packet id used for API responses. Server packet ids stay far below.
pub const API_PACKET_BASE: u16 = 0xF000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    BeatmapsetInfo,
    MapLeaderboard,
    Replay,
    MarkAsRead,
}

impl ApiKind {
    pub const ALL: [ApiKind; 4] = [
        Self::BeatmapsetInfo,
        Self::MapLeaderboard,
        Self::Replay,
        Self::MarkAsRead,
    ];

    pub fn packet_id(self) -> u16 {
        API_PACKET_BASE
            + match self {
                Self::BeatmapsetInfo => 0,
                Self::MapLeaderboard => 1,
                Self::Replay => 2,
                Self::MarkAsRead => 3,
            }
    }

    pub fn from_packet_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.packet_id() == id)
    }
}

/// A pending API call and the context its response handler needs.
pub struct ApiRequest {
    /// Path and query, starting with `/`.
    pub path: String,
    pub kind: ApiKind,
    pub extra: Option<Box<dyn Any + Send>>,
    pub extra_int: i32,
}

impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("extra_int", &self.extra_int)
            .finish_non_exhaustive()
    }
}

impl ApiRequest {
    pub fn new(kind: ApiKind, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            extra: None,
            extra_int: 0,
        }
    }

    pub fn with_extra(mut self, extra: impl Any + Send) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }

    pub fn with_extra_int(mut self, extra_int: i32) -> Self {
        self.extra_int = extra_int;
        self
    }
}

/// Send `request` if online; otherwise drop it.
pub fn send_request(
    http: &Arc<dyn HttpTransport>,
    shared: &Arc<Shared>,
    endpoint: &Endpoint,
    request: ApiRequest,
) {
    if !shared.is_online() {
        debug!(kind = ?request.kind, "not logged in, dropping API request");
        return;
    }

    let url = endpoint.web_url(&request.path);
    debug!(kind = ?request.kind, %url, "sending API request");
    let http_request = HttpRequest::get(url)
        .header("user-agent", USER_AGENT)
        .timeout(API_TIMEOUT);

    let ApiRequest {
        kind,
        extra,
        extra_int,
        ..
    } = request;
    let shared = Arc::clone(shared);
    http.request_async(
        http_request,
        Box::new(move |response| {
            let body = if response.is_success() {
                response.body
            } else {
                debug!(?kind, status = response.status, "API request failed");
                Vec::new()
            };
            let mut packet = Packet::from_payload(kind.packet_id(), body);
            packet.extra = extra;
            packet.extra_int = extra_int;
            shared.push_incoming([packet]);
        }),
    );
}

/// Append `&<user_param>=<user>&<pw_param>=<pw>` to `url`.
pub fn append_auth_params(url: &mut String, user_param: &str, user: &str, pw_param: &str, pw: &str) {
    url.push_str(&format!(
        "&{user_param}={}&{pw_param}={}",
        percent_encode(user),
        percent_encode(pw)
    ));
}

/// Percent-encode everything but RFC 3986 unreserved characters.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte))
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_net::HttpResponse;
    use cadence_net::testing::MockTransport;

    fn setup(online: bool) -> (Arc<dyn HttpTransport>, Arc<MockTransport>, Arc<Shared>) {
        let mock = Arc::new(MockTransport::new());
        let shared = Arc::new(Shared::default());
        if online {
            shared.set_user_id(1);
        }
        (mock.clone(), mock, shared)
    }

    #[test]
    fn test_kind_ids_roundtrip_and_avoid_server_range() {
        for kind in ApiKind::ALL {
            assert_eq!(ApiKind::from_packet_id(kind.packet_id()), Some(kind));
            assert!(cadence_proto::ServerPacket::from_id(kind.packet_id()).is_none());
        }
        assert_eq!(ApiKind::from_packet_id(5), None);
    }

    #[test]
    fn test_dropped_while_offline() {
        let (http, mock, shared) = setup(false);
        send_request(
            &http,
            &shared,
            &Endpoint::new("example.net", true),
            ApiRequest::new(ApiKind::MarkAsRead, "/web/x.php"),
        );
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_response_becomes_incoming_packet() {
        let (http, mock, shared) = setup(true);
        let request = ApiRequest::new(ApiKind::BeatmapsetInfo, "/web/osu-search-set.php?b=9")
            .with_extra_int(9)
            .with_extra(String::from("ctx"));
        send_request(&http, &shared, &Endpoint::new("example.net", true), request);
        assert_eq!(
            mock.requests()[0].url,
            "https://osu.example.net/web/osu-search-set.php?b=9"
        );

        mock.complete_next(HttpResponse::ok(b"body".to_vec()));
        let mut packets = shared.drain_incoming();
        assert_eq!(packets.len(), 1);
        let packet = packets.remove(0);
        assert_eq!(ApiKind::from_packet_id(packet.id), Some(ApiKind::BeatmapsetInfo));
        assert_eq!(packet.payload(), b"body");
        assert_eq!(packet.extra_int, 9);
        let extra = packet.extra.unwrap().downcast::<String>().unwrap();
        assert_eq!(*extra, "ctx");
    }

    #[test]
    fn test_failure_yields_empty_payload() {
        let (http, mock, shared) = setup(true);
        send_request(
            &http,
            &shared,
            &Endpoint::new("example.net", true),
            ApiRequest::new(ApiKind::Replay, "/web/osu-getreplay.php?c=1"),
        );
        mock.complete_next(HttpResponse::with_status(404, b"not found".to_vec()));
        let packets = shared.drain_incoming();
        assert!(packets[0].is_empty());
    }

    #[test]
    fn test_auth_params() {
        let mut url = String::from("/web/x.php?b=1");
        append_auth_params(&mut url, "u", "some user", "h", "abc");
        assert_eq!(url, "/web/x.php?b=1&u=some%20user&h=abc");
        assert_eq!(percent_encode("a/b.osu"), "a%2Fb.osu");
    }
}
