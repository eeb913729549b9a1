//! The online client: session lifecycle and the per-frame tick.
//!
//! [`OnlineClient`] owns every piece of tick-thread state and the collaborator
//! handles. Call [`tick`](OnlineClient::tick) once per frame; it dispatches
//! whatever the transport workers received, sends the login request or the
//! next packet batch, and advances the download queue.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_config::{ConfigError, ConfigHandle};
use cadence_net::{Clock, DownloadManager, HttpTransport, SystemClock};
use cadence_proto::{Md5Hash, Packet, outgoing};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{self, ApiKind, ApiRequest};
use crate::collab::{Collaborators, LocalBeatmap, LoginState, ScoreFilter, ToastKind};
use crate::leaderboard::{OnlineScore, leaderboard_path};
use crate::login::{Credentials, build_login_body, client_hashes, local_utc_offset_hours};
use crate::platform::{HardwareId, SystemHardwareId};
use crate::session::{Session, Shared, SubmitPolicy, is_denied_server, is_submit_denied_server};
use crate::transport::{Endpoint, KeepaliveContext, Transport};
use crate::users::Users;

/// Observable login state.
///
/// Wraps a `tokio::sync::watch` channel so hosts can react to state changes
/// without polling the client.
pub struct LoginStateWatch {
    tx: watch::Sender<LoginState>,
    rx: watch::Receiver<LoginState>,
}

impl Default for LoginStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginStateWatch {
    /// Create a new watch initialized to [`LoginState::LoggedOut`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(LoginState::LoggedOut);
        Self { tx, rx }
    }

    /// Set the current state, notifying all subscribers.
    pub fn set(&self, state: LoginState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<LoginState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> LoginState {
        *self.rx.borrow()
    }
}

/// Client side of one protocol server session.
pub struct OnlineClient {
    pub(crate) config: ConfigHandle,
    pub(crate) collab: Collaborators,
    pub(crate) shared: Arc<Shared>,
    pub(crate) session: Session,
    pub(crate) users: Users,
    pub(crate) transport: Transport,
    pub(crate) downloads: DownloadManager,
    pub(crate) clock: Arc<dyn Clock>,
    hardware: Arc<dyn HardwareId>,
    login_state: LoginStateWatch,
    /// Map id to set id, 0 once a lookup or download failed.
    pub(crate) set_ids: HashMap<i32, i32>,
    /// Map id whose set lookup is in flight.
    pub(crate) queried_map_id: i32,
}

impl OnlineClient {
    /// Client using the system clock and this machine's identifiers.
    pub fn new(config: ConfigHandle, collab: Collaborators, http: Arc<dyn HttpTransport>) -> Self {
        Self::with_environment(
            config,
            collab,
            http,
            Arc::new(SystemClock),
            Arc::new(SystemHardwareId::new()),
        )
    }

    pub fn with_environment(
        config: ConfigHandle,
        collab: Collaborators,
        http: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        hardware: Arc<dyn HardwareId>,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let now = clock.now();
        let transport = Transport::new(
            Arc::clone(&http),
            Arc::clone(&shared),
            env!("CARGO_PKG_VERSION").to_string(),
            now,
        );
        let downloads = DownloadManager::new(http, Arc::clone(&clock));
        Self {
            config,
            collab,
            shared,
            session: Session::default(),
            users: Users::new(),
            transport,
            downloads,
            clock,
            hardware,
            login_state: LoginStateWatch::new(),
            set_ids: HashMap::new(),
            queried_map_id: 0,
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut Users {
        &mut self.users
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    pub fn login_state(&self) -> LoginState {
        self.login_state.current()
    }

    pub fn subscribe_login_state(&self) -> watch::Receiver<LoginState> {
        self.login_state.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.shared.is_online()
    }

    pub fn user_id(&self) -> i32 {
        self.shared.user_id()
    }

    /// Server of the current session with the configured scheme.
    pub fn endpoint(&self) -> Endpoint {
        let use_https = self.config.read(|c| c.online.use_https);
        Endpoint::new(self.session.endpoint.clone(), use_https)
    }

    /// Session username when online, the configured one otherwise.
    pub fn username(&self) -> String {
        if self.is_online() {
            self.session.username.clone()
        } else {
            self.config.read(|c| c.online.username.clone())
        }
    }

    pub fn can_submit_scores(&self) -> bool {
        let user_setting = self.config.read(|c| c.online.submit_scores);
        self.shared.policy().allows(self.is_online(), user_setting)
    }

    /// Queue a packet for the next batch. Dropped while offline.
    pub fn queue_packet(&self, packet: &Packet) -> bool {
        self.shared.queue_packet(packet)
    }

    pub(crate) fn set_login_state(&self, state: LoginState) {
        self.login_state.set(state);
        self.collab.user_card.on_login_state(state);
    }

    pub(crate) fn persist_config(&self) {
        match self.config.persist() {
            Ok(()) | Err(ConfigError::NotPersistent) => {}
            Err(err) => warn!(error = %err, "failed to save config"),
        }
    }

    /// Advance the session by one frame.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        if !self.transport.should_tick(now) {
            return;
        }

        for notice in self.shared.drain_notices() {
            self.collab.notifier.toast(&notice, ToastKind::Error);
            if !self.is_online() {
                self.set_login_state(LoginState::LoggedOut);
            }
        }
        self.process_oauth_result();

        for packet in self.shared.drain_incoming() {
            self.handle_packet(packet);
        }
        self.transport.note_received();
        self.downloads.update();

        if self.session.login_requested && !self.is_online() {
            self.session.login_requested = false;
            let body = self.login_body();
            let endpoint = self.endpoint();
            info!(host = %endpoint.host, "logging in");
            self.transport.send_login(&endpoint, body, now);
            return;
        }
        if !self.is_online() {
            return;
        }

        if self.transport.batch_requests_due(now) {
            if let Some(packet) = self.users.take_presence_batch() {
                self.shared.queue_packet(&packet);
            }
            if let Some(packet) = self.users.take_stats_batch(now) {
                self.shared.queue_packet(&packet);
            }
        }

        let ctx = KeepaliveContext {
            lobby_visible: self.collab.lobby.is_visible(),
            spectating: self.session.spectating,
            in_room: self.session.in_room(),
        };
        let endpoint = self.endpoint();
        self.transport.flush(&endpoint, ctx, now);
    }

    fn login_body(&self) -> String {
        let token = self.config.read(|c| c.online.oauth_token.clone());
        let credentials = if token.is_empty() {
            Credentials::Password {
                username: self.session.username.clone(),
                pw_md5: self.session.pw_md5.clone(),
            }
        } else {
            Credentials::OAuth { token }
        };
        build_login_body(
            &credentials,
            local_utc_offset_hours(),
            &client_hashes(self.hardware.as_ref()),
        )
    }

    /// Log out and return to the logged-out defaults. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.collab.variables.reset_all();

        if self.is_online() {
            let response = self.transport.send_logout(&self.endpoint());
            if !response.is_success() {
                debug!(status = response.status, "logout request failed");
            }
            info!("logged out");
        }

        self.shared.set_token(None);
        self.shared.set_user_id(0);
        self.shared.set_policy(SubmitPolicy::NoPreference);
        self.session.reset();

        self.set_login_state(LoginState::LoggedOut);
        self.users.logout_all();
        self.collab.chat.on_disconnect();
        self.collab.scores.set_filter(ScoreFilter::Local);

        self.downloads.shutdown();
        self.transport.reset(self.clock.now());
    }

    /// Disconnect, then log in again with the configured credentials.
    pub fn reconnect(&mut self) {
        self.disconnect();

        // Re-enabled once the login succeeds.
        self.config.update(|c| {
            c.online.autologin = false;
            if !c.online.password.is_empty() {
                c.online.password_md5 = Md5Hash::digest(&c.online.password).to_string();
                c.online.password.clear();
            }
        });
        self.persist_config();

        let online = self.config.read(|c| c.online.clone());
        self.session.endpoint = online.server;
        self.session.username = online.username;
        if online.password_md5.len() == Md5Hash::LEN {
            self.session.pw_md5 = Md5Hash::from_hex(&online.password_md5);
        }

        if is_denied_server(&self.session.endpoint) {
            self.collab
                .notifier
                .toast("This server does not allow cadence clients.", ToastKind::Error);
            return;
        }
        if is_submit_denied_server(&self.session.endpoint) {
            self.shared.set_policy(SubmitPolicy::No);
        }

        self.set_login_state(LoginState::LoggingIn);
        self.session.login_requested = true;
    }

    /// Append `&u=..&h=..` credentials to an API path.
    pub fn append_auth_params(&self, url: &mut String) {
        self.append_auth_params_named(url, "u", "h");
    }

    pub fn append_auth_params_named(&self, url: &mut String, user_param: &str, pw_param: &str) {
        if self.session.is_oauth {
            let token = self.shared.token().unwrap_or_default();
            api::append_auth_params(url, user_param, "$token", pw_param, &token);
        } else {
            api::append_auth_params(
                url,
                user_param,
                &self.session.username,
                pw_param,
                self.session.pw_md5.as_str(),
            );
        }
    }

    pub fn send_api_request(&self, request: ApiRequest) {
        api::send_request(self.transport.http(), &self.shared, &self.endpoint(), request);
    }

    /// Request the online leaderboard of `map`.
    pub fn fetch_online_scores(&self, map: &LocalBeatmap, mods: u32) {
        let mut path = leaderboard_path(&map.md5, &map.file_name(), map.set_id, mods);
        self.append_auth_params_named(&mut path, "us", "ha");
        self.send_api_request(
            ApiRequest::new(ApiKind::MapLeaderboard, path).with_extra(map.md5.clone()),
        );
    }

    /// Download the replay of an online score; it is saved and watched once it arrives.
    pub fn request_replay(&self, score: &OnlineScore) {
        let mut path = format!("/web/osu-getreplay.php?m=0&c={}", score.score_id);
        self.append_auth_params(&mut path);
        self.send_api_request(ApiRequest::new(ApiKind::Replay, path).with_extra(score.clone()));
        self.collab
            .notifier
            .toast("Downloading replay...", ToastKind::Info);
    }

    /// Tell the server the messages of `channel` were read.
    pub fn mark_as_read(&self, channel: &str) {
        let mut path = format!("/web/osu-markasread.php?channel={}", api::percent_encode(channel));
        self.append_auth_params(&mut path);
        self.send_api_request(ApiRequest::new(ApiKind::MarkAsRead, path));
    }

    pub fn send_message(&self, target: &str, text: &str) -> bool {
        self.queue_packet(&outgoing::chat_message(target, text))
    }

    pub fn join_channel(&self, name: &str) -> bool {
        self.queue_packet(&outgoing::channel_join(name))
    }

    pub fn leave_channel(&mut self, name: &str) -> bool {
        self.session.channels.remove(name);
        self.queue_packet(&outgoing::channel_part(name))
    }

    pub fn start_spectating(&mut self, user_id: i32) {
        self.stop_spectating();
        self.queue_packet(&outgoing::start_spectating(user_id));

        let name = self.users.get_user_info(user_id, true).name.clone();
        self.collab
            .notifier
            .toast(&format!("Started spectating {name}"), ToastKind::Success);
        self.session.spectating = true;
        self.session.spectated_id = user_id;
    }

    pub fn stop_spectating(&mut self) {
        if !self.session.spectating {
            return;
        }
        let name = self
            .users
            .get_user_info(self.session.spectated_id, true)
            .name
            .clone();
        self.collab
            .notifier
            .toast(&format!("Stopped spectating {name}"), ToastKind::Info);
        self.session.stop_spectating_state();
        self.queue_packet(&outgoing::stop_spectating());
        self.collab.spectator.on_stop_spectating();
    }
}
