//! Online session client: login, packet polling, chat, users, spectating,
//! multiplayer rooms, leaderboards, replays and beatmap downloads.
//!
//! [`OnlineClient`] owns the session and is driven by [`OnlineClient::tick`]
//! once per frame. Network I/O happens on the transport's workers; results
//! come back as packets and are applied on the tick thread.

pub mod api;
pub mod archive;
pub mod beatmaps;
pub mod client;
pub mod collab;
pub mod dispatcher;
pub mod leaderboard;
pub mod login;
pub mod oauth;
pub mod platform;
pub mod session;
pub mod transport;
pub mod users;

#[cfg(test)]
mod testing;

pub use api::{ApiKind, ApiRequest};
pub use archive::{ArchiveError, extract_beatmapset, extract_beatmapset_id};
pub use beatmaps::{BeatmapMetadata, BeatmapSetMetadata, FetchStatus, parse_beatmapset_metadata};
pub use client::{LoginStateWatch, OnlineClient};
pub use collab::{
    BeatmapLibrary, ChatMessage, ChatView, Collaborators, LobbyView, LocalBeatmap, LoginState,
    Noop, Notifier, RoomView, ScoreFilter, ScoreStore, ServerVariables, SpectatorView, ToastKind,
    UrlOpener, UserCardView,
};
pub use leaderboard::{OnlineMapInfo, OnlineScore};
pub use oauth::{OAuthError, UriAction};
pub use platform::{HardwareId, SystemHardwareId};
pub use session::{Session, Shared, SubmitPolicy};
pub use transport::Endpoint;
pub use users::{UserInfo, Users};
