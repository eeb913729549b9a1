//! Interfaces to the parts of the game the online client drives but does not own.
//!
//! Every method has a no-op default so hosts implement only what they show.
//! All calls happen on the thread that runs [`OnlineClient::tick`](crate::OnlineClient::tick).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_proto::{Md5Hash, ReplayFrame, Room, ScoreFrame, SpectatorAction};

use crate::leaderboard::OnlineScore;
use crate::users::UserInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Status,
    Success,
    Error,
}

/// State of the login button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

/// Which leaderboard the song browser should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFilter {
    Local,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Unix seconds.
    pub timestamp: i64,
    pub author_id: i32,
    pub author_name: String,
    pub text: String,
}

/// A difficulty known to the local beatmap database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBeatmap {
    pub md5: Md5Hash,
    pub map_id: i32,
    pub set_id: i32,
    /// Path of the `.osu` file.
    pub path: PathBuf,
}

impl LocalBeatmap {
    /// File name of the `.osu` file.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub trait Notifier: Send + Sync {
    fn toast(&self, _text: &str, _kind: ToastKind) {}
}

pub trait UrlOpener: Send + Sync {
    fn open_url(&self, _url: &str) {}
}

pub trait ChatView: Send + Sync {
    fn add_message(&self, _channel: &str, _message: &ChatMessage, _mark_unread: bool) {}
    fn add_channel(&self, _name: &str, _switch_to: bool) {}
    fn remove_channel(&self, _name: &str) {}
    fn join(&self, _name: &str) {}
    fn update_user_list(&self) {}
    fn show_attention(&self) {}
    fn on_disconnect(&self) {}
}

pub trait LobbyView: Send + Sync {
    fn is_visible(&self) -> bool {
        false
    }
    fn update_room(&self, _room: &Room) {}
    fn add_room(&self, _room: &Room) {}
    fn remove_room(&self, _room_id: i32) {}
    fn on_room_join_failed(&self) {}
}

pub trait RoomView: Send + Sync {
    fn on_room_joined(&self, _room: &Room) {}
    fn on_room_updated(&self, _room: &Room) {}
    fn on_match_started(&self, _room: &Room) {}
    fn on_match_score_updated(&self, _frame: &ScoreFrame) {}
    fn on_host_changed(&self) {}
    fn on_all_players_loaded(&self) {}
    fn on_player_failed(&self, _slot_id: i32) {}
    fn on_match_finished(&self) {}
    fn on_all_players_skipped(&self) {}
    fn on_player_skipped(&self, _user_id: i32) {}
    fn on_match_aborted(&self) {}
}

pub trait UserCardView: Send + Sync {
    fn on_login_state(&self, _state: LoginState) {}
    fn on_user_changed(&self, _username: &str) {}
    fn on_stats_updated(&self, _user: &UserInfo) {}
}

pub trait SpectatorView: Send + Sync {
    /// The spectated replay buffer changed; frames are sorted with valid deltas.
    fn on_frames(&self, _frames: &[ReplayFrame], _action: SpectatorAction) {}
    fn on_score_frame(&self, _frame: &ScoreFrame) {}
    fn on_stop_spectating(&self) {}
}

pub trait BeatmapLibrary: Send + Sync {
    fn find_by_md5(&self, _md5: &Md5Hash) -> Option<LocalBeatmap> {
        None
    }
    fn find_by_id(&self, _map_id: i32) -> Option<LocalBeatmap> {
        None
    }
    fn read_map_file(&self, map: &LocalBeatmap) -> Option<Vec<u8>> {
        std::fs::read(&map.path).ok()
    }
    /// A set was extracted to `dir` and should be loaded.
    fn add_set(&self, _dir: &Path, _set_id: i32) {}
    fn set_online_offset(&self, _md5: &Md5Hash, _offset: i32) {}
}

pub trait ScoreStore: Send + Sync {
    fn set_online_scores(&self, _md5: &Md5Hash, _scores: Vec<OnlineScore>) {}
    fn watch_replay(&self, _replay_path: &Path, _score: &OnlineScore) {}
    fn set_filter(&self, _filter: ScoreFilter) {}
}

/// Server-controlled client settings.
///
/// Methods return `false` when the variable does not exist.
pub trait ServerVariables: Send + Sync {
    fn protect(&self, _name: &str) -> bool {
        false
    }
    fn unprotect(&self, _name: &str) -> bool {
        false
    }
    fn force(&self, _name: &str, _value: &str) -> bool {
        false
    }
    fn reset(&self, _name: &str) -> bool {
        false
    }
    /// Drop every server-provided value.
    fn reset_all(&self) {}
}

/// Collaborator that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Notifier for Noop {}
impl UrlOpener for Noop {}
impl ChatView for Noop {}
impl LobbyView for Noop {}
impl RoomView for Noop {}
impl UserCardView for Noop {}
impl SpectatorView for Noop {}
impl BeatmapLibrary for Noop {}
impl ScoreStore for Noop {}
impl ServerVariables for Noop {}

/// Every collaborator the client talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub browser: Arc<dyn UrlOpener>,
    pub chat: Arc<dyn ChatView>,
    pub lobby: Arc<dyn LobbyView>,
    pub room: Arc<dyn RoomView>,
    pub user_card: Arc<dyn UserCardView>,
    pub spectator: Arc<dyn SpectatorView>,
    pub library: Arc<dyn BeatmapLibrary>,
    pub scores: Arc<dyn ScoreStore>,
    pub variables: Arc<dyn ServerVariables>,
}

impl Default for Collaborators {
    fn default() -> Self {
        let noop = Arc::new(Noop);
        Self {
            notifier: noop.clone(),
            browser: noop.clone(),
            chat: noop.clone(),
            lobby: noop.clone(),
            room: noop.clone(),
            user_card: noop.clone(),
            spectator: noop.clone(),
            library: noop.clone(),
            scores: noop.clone(),
            variables: noop,
        }
    }
}
