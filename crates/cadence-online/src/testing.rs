//! Test doubles shared by the client and dispatcher tests.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_config::{Config, ConfigHandle};
use cadence_net::HttpResponse;
use cadence_net::testing::{ManualClock, MockTransport};
use cadence_proto::{Md5Hash, Packet, ReplayFrame, Room, ScoreFrame, ServerPacket, SpectatorAction, encode_frame};

use crate::client::OnlineClient;
use crate::collab::*;
use crate::leaderboard::OnlineScore;
use crate::platform::HardwareId;
use crate::session::lock;
use crate::users::UserInfo;

pub(crate) struct FixedHardware;

impl HardwareId for FixedHardware {
    fn exe_path(&self) -> String {
        "/opt/cadence/cadence".to_string()
    }

    fn disk_uuid(&self) -> String {
        "0000-test".to_string()
    }
}

/// Collaborator that records every call as a short line of text.
#[derive(Default)]
pub(crate) struct RecordingHost {
    events: Mutex<Vec<String>>,
    toasts: Mutex<Vec<(String, ToastKind)>>,
    messages: Mutex<Vec<(String, ChatMessage)>>,
    maps: Mutex<HashMap<Md5Hash, LocalBeatmap>>,
    pub lobby_visible: AtomicBool,
    pub known_variables: Mutex<HashSet<String>>,
}

impl RecordingHost {
    fn record(&self, event: String) {
        lock(&self.events).push(event);
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    pub fn toasts(&self) -> Vec<(String, ToastKind)> {
        lock(&self.toasts).clone()
    }

    pub fn messages(&self) -> Vec<(String, ChatMessage)> {
        lock(&self.messages).clone()
    }

    pub fn add_map(&self, map: LocalBeatmap) {
        lock(&self.maps).insert(map.md5.clone(), map);
    }

    pub fn set_lobby_visible(&self, visible: bool) {
        self.lobby_visible.store(visible, Ordering::Release);
    }
}

impl Notifier for RecordingHost {
    fn toast(&self, text: &str, kind: ToastKind) {
        lock(&self.toasts).push((text.to_string(), kind));
    }
}

impl UrlOpener for RecordingHost {
    fn open_url(&self, url: &str) {
        self.record(format!("open {url}"));
    }
}

impl ChatView for RecordingHost {
    fn add_message(&self, channel: &str, message: &ChatMessage, _mark_unread: bool) {
        lock(&self.messages).push((channel.to_string(), message.clone()));
    }
    fn add_channel(&self, name: &str, _switch_to: bool) {
        self.record(format!("add channel {name}"));
    }
    fn remove_channel(&self, name: &str) {
        self.record(format!("remove channel {name}"));
    }
    fn join(&self, name: &str) {
        self.record(format!("join {name}"));
    }
    fn show_attention(&self) {
        self.record("attention".to_string());
    }
    fn on_disconnect(&self) {
        self.record("chat disconnect".to_string());
    }
}

impl LobbyView for RecordingHost {
    fn is_visible(&self) -> bool {
        self.lobby_visible.load(Ordering::Acquire)
    }
    fn update_room(&self, room: &Room) {
        self.record(format!("lobby update {}", room.id));
    }
    fn add_room(&self, room: &Room) {
        self.record(format!("lobby add {}", room.id));
    }
    fn remove_room(&self, room_id: i32) {
        self.record(format!("lobby remove {room_id}"));
    }
    fn on_room_join_failed(&self) {
        self.record("room join failed".to_string());
    }
}

impl RoomView for RecordingHost {
    fn on_room_joined(&self, room: &Room) {
        self.record(format!("room joined {}", room.id));
    }
    fn on_room_updated(&self, room: &Room) {
        self.record(format!("room updated {}", room.id));
    }
    fn on_match_started(&self, _room: &Room) {
        self.record("match started".to_string());
    }
    fn on_match_score_updated(&self, frame: &ScoreFrame) {
        self.record(format!("match score {}", frame.slot_id));
    }
    fn on_match_finished(&self) {
        self.record("match finished".to_string());
    }
    fn on_player_failed(&self, slot_id: i32) {
        self.record(format!("player failed {slot_id}"));
    }
}

impl UserCardView for RecordingHost {
    fn on_user_changed(&self, username: &str) {
        self.record(format!("user changed {username}"));
    }
    fn on_stats_updated(&self, user: &UserInfo) {
        self.record(format!("stats {}", user.user_id));
    }
}

impl SpectatorView for RecordingHost {
    fn on_frames(&self, frames: &[ReplayFrame], action: SpectatorAction) {
        let times: Vec<i32> = frames.iter().map(|f| f.time).collect();
        let deltas: Vec<i32> = frames.iter().map(|f| f.delta).collect();
        self.record(format!("frames {times:?} {deltas:?} {action:?}"));
    }
    fn on_stop_spectating(&self) {
        self.record("stop spectating".to_string());
    }
}

impl BeatmapLibrary for RecordingHost {
    fn find_by_md5(&self, md5: &Md5Hash) -> Option<LocalBeatmap> {
        lock(&self.maps).get(md5).cloned()
    }
    fn find_by_id(&self, map_id: i32) -> Option<LocalBeatmap> {
        lock(&self.maps).values().find(|map| map.map_id == map_id).cloned()
    }
    fn add_set(&self, _dir: &Path, set_id: i32) {
        self.record(format!("add set {set_id}"));
    }
    fn set_online_offset(&self, _md5: &Md5Hash, offset: i32) {
        self.record(format!("offset {offset}"));
    }
}

impl ScoreStore for RecordingHost {
    fn set_online_scores(&self, _md5: &Md5Hash, scores: Vec<OnlineScore>) {
        self.record(format!("online scores {}", scores.len()));
    }
    fn watch_replay(&self, replay_path: &Path, _score: &OnlineScore) {
        self.record(format!("watch {}", replay_path.display()));
    }
    fn set_filter(&self, filter: ScoreFilter) {
        self.record(format!("filter {filter:?}"));
    }
}

impl ServerVariables for RecordingHost {
    fn protect(&self, name: &str) -> bool {
        self.record(format!("protect {name}"));
        lock(&self.known_variables).contains(name)
    }
    fn force(&self, name: &str, value: &str) -> bool {
        self.record(format!("force {name}={value}"));
        lock(&self.known_variables).contains(name)
    }
    fn reset_all(&self) {
        self.record("reset variables".to_string());
    }
}

/// Client wired to a [`MockTransport`], a [`ManualClock`] and a [`RecordingHost`].
pub(crate) struct Harness {
    pub client: OnlineClient,
    pub mock: Arc<MockTransport>,
    pub clock: Arc<ManualClock>,
    pub host: Arc<RecordingHost>,
    dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();
        configure(&mut config);

        let mock = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new());
        let host = Arc::new(RecordingHost::default());
        let collab = Collaborators {
            notifier: host.clone(),
            browser: host.clone(),
            chat: host.clone(),
            lobby: host.clone(),
            room: host.clone(),
            user_card: host.clone(),
            spectator: host.clone(),
            library: host.clone(),
            scores: host.clone(),
            variables: host.clone(),
        };
        let client = OnlineClient::with_environment(
            ConfigHandle::in_memory(config),
            collab,
            mock.clone(),
            clock.clone(),
            Arc::new(FixedHardware),
        );
        Self {
            client,
            mock,
            clock,
            host,
            dir,
        }
    }

    /// Login request sent, reply not yet delivered.
    pub fn online_ready(server: &str) -> Self {
        let mut harness = Self::new(|c| {
            c.online.server = server.to_string();
            c.online.username = "player".to_string();
            c.online.password_md5 = Md5Hash::digest("password").to_string();
        });
        harness.client.reconnect();
        harness.tick();
        harness
    }

    /// Logged in as `user_id` with session token `tok`.
    pub fn logged_in(server: &str, user_id: i32) -> Self {
        let mut harness = Self::online_ready(server);
        harness
            .mock
            .complete_next(HttpResponse::ok(user_id_reply(user_id)).with_header("cho-token", "tok"));
        harness.tick();
        assert!(harness.client.is_online());
        harness
    }

    pub fn tick(&mut self) {
        self.clock.advance(Duration::from_millis(2));
        self.client.tick();
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Dispatch one server packet built by `build`.
    pub fn deliver(&mut self, kind: ServerPacket, build: impl FnOnce(&mut Packet)) {
        let mut packet = Packet::new(kind.id());
        build(&mut packet);
        self.client.handle_packet(packet);
    }
}

/// Response body of a login carrying `user_id`.
pub(crate) fn user_id_reply(user_id: i32) -> Vec<u8> {
    let mut body = Vec::new();
    encode_frame(ServerPacket::UserId.id(), &user_id.to_le_bytes(), &mut body);
    body
}

/// Zip archive holding `entries` as `(name, contents)`.
pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
