//! Session state.
//!
//! [`Shared`] holds everything the transport's worker threads touch: the user
//! id, the session token, the submission policy and the packet queues.
//! [`Session`] holds the rest and is only used from the tick thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cadence_proto::{Md5Hash, Packet, ReplayFrame, Room, SLOT_COUNT, ScoreFrame, encode_packet};

/// Hosts that refuse this client outright.
pub const DENIED_SERVERS: &[&str] = &["ppy.sh", "gatari.pw"];

/// Hosts that do not want scores submitted.
pub const SUBMIT_DENIED_SERVERS: &[&str] = &["akatsuki.gg", "ripple.moe"];

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether the server wants scores submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmitPolicy {
    No,
    Yes,
    #[default]
    NoPreference,
}

impl SubmitPolicy {
    /// Parse an `x-mcosu-features` header value.
    pub fn from_features(features: &str) -> Option<Self> {
        if features.contains("submit=0") {
            Some(Self::No)
        } else if features.contains("submit=1") {
            Some(Self::Yes)
        } else {
            None
        }
    }

    /// Final decision given the user's own setting.
    pub fn allows(self, online: bool, user_setting: bool) -> bool {
        online
            && match self {
                Self::NoPreference => user_setting,
                Self::Yes => true,
                Self::No => false,
            }
    }
}

/// State shared with transport callbacks.
#[derive(Debug, Default)]
pub struct Shared {
    user_id: AtomicI32,
    token: Mutex<Option<String>>,
    policy: Mutex<SubmitPolicy>,
    incoming: Mutex<VecDeque<Packet>>,
    outgoing: Mutex<Vec<u8>>,
    packets_received: AtomicBool,
    notices: Mutex<Vec<String>>,
    oauth_result: Mutex<Option<Result<String, u16>>>,
}

impl Shared {
    pub fn user_id(&self) -> i32 {
        self.user_id.load(Ordering::Acquire)
    }

    pub fn set_user_id(&self, id: i32) {
        self.user_id.store(id, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.user_id() > 0
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn has_token(&self) -> bool {
        lock(&self.token).is_some()
    }

    pub fn set_token(&self, token: Option<String>) {
        *lock(&self.token) = token;
    }

    pub fn take_token(&self) -> Option<String> {
        lock(&self.token).take()
    }

    pub fn policy(&self) -> SubmitPolicy {
        *lock(&self.policy)
    }

    pub fn set_policy(&self, policy: SubmitPolicy) {
        *lock(&self.policy) = policy;
    }

    pub fn push_incoming(&self, packets: impl IntoIterator<Item = Packet>) {
        lock(&self.incoming).extend(packets);
    }

    pub fn drain_incoming(&self) -> Vec<Packet> {
        lock(&self.incoming).drain(..).collect()
    }

    /// Append `packet` to the pending batch; dropped while offline.
    pub fn queue_packet(&self, packet: &Packet) -> bool {
        if !self.is_online() {
            return false;
        }
        encode_packet(packet, &mut lock(&self.outgoing));
        true
    }

    pub fn has_outgoing(&self) -> bool {
        !lock(&self.outgoing).is_empty()
    }

    pub fn take_outgoing(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.outgoing))
    }

    pub fn clear_outgoing(&self) {
        lock(&self.outgoing).clear();
    }

    pub fn mark_received(&self) {
        self.packets_received.store(true, Ordering::Release);
    }

    /// Whether any packet arrived since the last call.
    pub fn take_received(&self) -> bool {
        self.packets_received.swap(false, Ordering::AcqRel)
    }

    /// Queue an error toast raised off the tick thread.
    pub fn push_notice(&self, text: String) {
        lock(&self.notices).push(text);
    }

    pub fn drain_notices(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.notices))
    }

    pub fn set_oauth_result(&self, result: Result<String, u16>) {
        *lock(&self.oauth_result) = Some(result);
    }

    pub fn take_oauth_result(&self) -> Option<Result<String, u16>> {
        lock(&self.oauth_result).take()
    }
}

/// A chat channel known to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub topic: String,
    pub members: i32,
}

/// Tick-thread session state.
#[derive(Debug)]
pub struct Session {
    pub endpoint: String,
    pub username: String,
    pub pw_md5: Md5Hash,
    pub is_oauth: bool,
    pub login_requested: bool,

    pub room: Room,
    pub match_started: bool,
    /// Latest score frame of every slot in the current match.
    pub last_scores: [ScoreFrame; SLOT_COUNT],

    pub channels: HashMap<String, Channel>,
    /// Set at login, cleared once the server finished listing channels.
    pub print_new_channels: bool,

    /// Users watching me.
    pub spectators: Vec<i32>,
    /// Users watching the same player as me.
    pub fellow_spectators: Vec<i32>,
    pub spectating: bool,
    pub spectated_id: i32,
    pub spectated_replay: Vec<ReplayFrame>,
    pub spectated_scores: Vec<ScoreFrame>,

    pub server_icon_url: String,
    pub oauth_verifier: Option<[u8; 32]>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            pw_md5: Md5Hash::default(),
            is_oauth: false,
            login_requested: false,
            room: Room::default(),
            match_started: false,
            last_scores: [ScoreFrame::default(); SLOT_COUNT],
            channels: HashMap::new(),
            print_new_channels: true,
            spectators: Vec::new(),
            fellow_spectators: Vec::new(),
            spectating: false,
            spectated_id: 0,
            spectated_replay: Vec::new(),
            spectated_scores: Vec::new(),
            server_icon_url: String::new(),
            oauth_verifier: None,
        }
    }
}

impl Session {
    /// Back to the logged-out defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn in_room(&self) -> bool {
        self.room.in_room()
    }

    /// Record or refresh a channel. Returns `true` on first sight.
    pub fn update_channel(&mut self, name: &str, topic: &str, members: i32) -> bool {
        let is_new = !self.channels.contains_key(name);
        let channel = self
            .channels
            .entry(name.to_string())
            .or_insert_with(|| Channel {
                name: name.to_string(),
                ..Default::default()
            });
        channel.topic = topic.to_string();
        channel.members = members;
        is_new
    }

    /// Channel new-channel announcements are printed to.
    pub fn announcement_channel(&self) -> &'static str {
        if self.is_oauth { "#cadence" } else { "#osu" }
    }

    pub fn stop_spectating_state(&mut self) {
        self.spectating = false;
        self.spectated_id = 0;
        self.spectated_replay.clear();
        self.spectated_scores.clear();
        self.fellow_spectators.clear();
    }
}

/// Add `id` unless present. Returns `true` if added.
pub(crate) fn insert_unique(ids: &mut Vec<i32>, id: i32) -> bool {
    if ids.contains(&id) {
        return false;
    }
    ids.push(id);
    true
}

/// Remove `id` if present. Returns `true` if removed.
pub(crate) fn remove_id(ids: &mut Vec<i32>, id: i32) -> bool {
    match ids.iter().position(|&x| x == id) {
        Some(idx) => {
            ids.remove(idx);
            true
        }
        None => false,
    }
}

pub fn is_denied_server(host: &str) -> bool {
    DENIED_SERVERS.contains(&host)
}

pub fn is_submit_denied_server(host: &str) -> bool {
    SUBMIT_DENIED_SERVERS.contains(&host)
}
