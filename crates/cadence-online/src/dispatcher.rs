//! Incoming packet dispatch.
//!
//! Every packet drained by [`OnlineClient::tick`] lands in
//! [`OnlineClient::handle_packet`], whether it came from the protocol server
//! or from a finished API request.

use std::path::PathBuf;

use cadence_net::{Body, HttpRequest, MimePart};
use cadence_proto::{Md5Hash, Packet, ReplayFrame, Room, ScoreFrame, ServerPacket, SpectateBundle};
use tracing::{debug, info, warn};

use crate::api::{API_TIMEOUT, ApiKind};
use crate::client::OnlineClient;
use crate::collab::{ChatMessage, LoginState, ScoreFilter, ToastKind};
use crate::leaderboard::{OnlineScore, parse_leaderboard};
use crate::login::login_failure_message;
use crate::session::{insert_unique, remove_id};
use crate::transport::USER_AGENT;
use crate::users::{ACTION_SUBMITTING, STATUS_TOAST_THROTTLE, action_name};

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: i32 = 19;

/// Read a `u16` count followed by that many `i32`s.
fn read_id_list(packet: &mut Packet) -> Vec<i32> {
    let count: u16 = packet.read();
    let mut ids = Vec::with_capacity(usize::from(count).min(packet.remaining() / 4));
    for _ in 0..count {
        let id = packet.read();
        if packet.is_overrun() {
            break;
        }
        ids.push(id);
    }
    ids
}

/// Read a `u16` count followed by that many strings.
fn read_string_list(packet: &mut Packet) -> Vec<String> {
    let count: u16 = packet.read();
    let mut names = Vec::new();
    for _ in 0..count {
        let name = packet.read_string();
        if packet.is_overrun() {
            break;
        }
        names.push(name);
    }
    names
}

fn system_message(text: String) -> ChatMessage {
    ChatMessage {
        timestamp: chrono::Utc::now().timestamp(),
        author_id: 0,
        author_name: String::new(),
        text,
    }
}

impl OnlineClient {
    /// Apply one incoming packet.
    pub fn handle_packet(&mut self, mut packet: Packet) {
        if self.config.read(|c| c.debug.debug_network) {
            debug!(id = packet.id, len = packet.len(), "packet received");
        }

        let Some(kind) = ServerPacket::from_id(packet.id) else {
            match ApiKind::from_packet_id(packet.id) {
                Some(kind) => self.handle_api_response(kind, packet),
                None => debug!(id = packet.id, "Unknown packet ID"),
            }
            return;
        };

        let p = &mut packet;
        match kind {
            ServerPacket::UserId => {
                let user_id = p.read();
                self.on_login_reply(user_id);
            }
            ServerPacket::RecvMessage => {
                let sender = p.read_string();
                let text = p.read_string();
                let recipient = p.read_string();
                let sender_id = p.read();
                let message = ChatMessage {
                    timestamp: chrono::Utc::now().timestamp(),
                    author_id: sender_id,
                    author_name: sender,
                    text,
                };
                self.collab.chat.add_message(&recipient, &message, true);
            }
            ServerPacket::Pong | ServerPacket::VersionUpdate | ServerPacket::SwitchServer => {}
            ServerPacket::UserStats => self.on_user_stats(p),
            ServerPacket::UserLogout => {
                let user_id: i32 = p.read();
                let _: u8 = p.read();
                if user_id == self.shared.user_id() {
                    info!("logged out by the server");
                    self.disconnect();
                } else {
                    self.logout_user(user_id);
                }
            }
            ServerPacket::SpectatorJoined => {
                let user_id = p.read();
                if insert_unique(&mut self.session.spectators, user_id) {
                    debug!(user_id, "spectator joined");
                }
            }
            ServerPacket::SpectatorLeft => {
                let user_id = p.read();
                if remove_id(&mut self.session.spectators, user_id) {
                    debug!(user_id, "spectator left");
                }
            }
            ServerPacket::FellowSpectatorJoined => {
                let user_id = p.read();
                insert_unique(&mut self.session.fellow_spectators, user_id);
            }
            ServerPacket::FellowSpectatorLeft => {
                let user_id = p.read();
                remove_id(&mut self.session.fellow_spectators, user_id);
            }
            ServerPacket::SpectateFrames => self.on_spectate_frames(p),
            ServerPacket::SpectatorCantSpectate => {
                let user_id: i32 = p.read();
                debug!(user_id, "spectator can't spectate");
            }
            ServerPacket::GetAttention => self.collab.chat.show_attention(),
            ServerPacket::Notification => {
                let text = p.read_string();
                self.collab.notifier.toast(&text, ToastKind::Info);
            }
            ServerPacket::RoomUpdated => {
                let room = Room::decode(p);
                if self.collab.lobby.is_visible() {
                    self.collab.lobby.update_room(&room);
                } else if self.session.in_room() && room.id == self.session.room.id {
                    self.session.room = room;
                    self.collab.room.on_room_updated(&self.session.room);
                }
            }
            ServerPacket::RoomCreated => {
                let room = Room::decode(p);
                self.collab.lobby.add_room(&room);
            }
            ServerPacket::RoomClosed => {
                let room_id = p.read();
                self.collab.lobby.remove_room(room_id);
            }
            ServerPacket::RoomJoinSuccess => {
                self.stop_spectating();
                self.session.room = Room::decode(p);
                info!(room_id = self.session.room.id, "joined room");
                self.collab.room.on_room_joined(&self.session.room);
            }
            ServerPacket::RoomJoinFail => {
                self.collab.notifier.toast("Failed to join room.", ToastKind::Error);
                self.collab.lobby.on_room_join_failed();
            }
            ServerPacket::MatchStarted => {
                self.session.room = Room::decode(p);
                self.session.match_started = true;
                self.collab.room.on_match_started(&self.session.room);
            }
            ServerPacket::MatchScoreUpdated => {
                let frame = ScoreFrame::decode(p);
                let Some(slot) = self.session.last_scores.get_mut(usize::from(frame.slot_id)) else {
                    debug!(slot_id = frame.slot_id, "score update for an invalid slot");
                    return;
                };
                *slot = frame;
                self.collab.room.on_match_score_updated(&frame);
            }
            ServerPacket::HostChanged => self.collab.room.on_host_changed(),
            ServerPacket::MatchAllPlayersLoaded => self.collab.room.on_all_players_loaded(),
            ServerPacket::MatchPlayerFailed => {
                let slot_id = p.read();
                self.collab.room.on_player_failed(slot_id);
            }
            ServerPacket::MatchFinished => {
                self.session.match_started = false;
                self.collab.room.on_match_finished();
            }
            ServerPacket::MatchSkip => self.collab.room.on_all_players_skipped(),
            ServerPacket::MatchPlayerSkipped => {
                let user_id = p.read();
                self.collab.room.on_player_skipped(user_id);
            }
            ServerPacket::MatchAbort => self.collab.room.on_match_aborted(),
            ServerPacket::ChannelJoinSuccess => {
                let name = p.read_string();
                self.collab.chat.add_channel(&name, true);
                self.collab
                    .chat
                    .add_message(&name, &system_message("Joined channel.".to_string()), false);
            }
            ServerPacket::ChannelInfo | ServerPacket::ChannelAutoJoin => {
                let name = p.read_string();
                let topic = p.read_string();
                let members = p.read();
                self.update_channel(&name, &topic, members, kind == ServerPacket::ChannelAutoJoin);
            }
            ServerPacket::LeftChannel => {
                let name = p.read_string();
                self.collab.chat.remove_channel(&name);
                self.session.channels.remove(&name);
            }
            ServerPacket::ChannelInfoEnd => self.session.print_new_channels = false,
            ServerPacket::Privileges => {
                let _: u32 = p.read();
            }
            ServerPacket::FriendsList => {
                let friends = read_id_list(p);
                debug!(count = friends.len(), "friends list");
                self.users.set_friends(friends);
            }
            ServerPacket::ProtocolVersion => {
                let version: i32 = p.read();
                if version != PROTOCOL_VERSION {
                    warn!(version, "unexpected protocol version");
                    self.collab.notifier.toast(
                        "This server may use an unsupported protocol version.",
                        ToastKind::Error,
                    );
                }
            }
            ServerPacket::MainMenuIcon => {
                let icon = p.read_string();
                let parts: Vec<&str> = icon.split('|').collect();
                if parts.len() == 2 && (parts[0].starts_with("http://") || parts[0].starts_with("https://")) {
                    self.session.server_icon_url = parts[0].to_string();
                }
            }
            ServerPacket::UserPresence => self.on_user_presence(p),
            ServerPacket::UserPresenceSingle => {
                let user_id = p.read();
                self.users.login_user(user_id);
            }
            ServerPacket::UserPresenceBundle => {
                for user_id in read_id_list(p) {
                    self.users.login_user(user_id);
                }
            }
            ServerPacket::Restart => {
                let ms: i32 = p.read();
                // Some servers send this on a wrong password; only retry a live session.
                if self.is_online() {
                    info!(ms, "server restarting, reconnecting");
                    self.reconnect();
                }
            }
            ServerPacket::RoomInvite => {}
            ServerPacket::RoomPasswordChanged => {
                let password = p.read_string();
                debug!("room password changed");
                self.session.room.password = password;
            }
            ServerPacket::SilenceEnd => {
                let seconds: i32 = p.read();
                debug!(seconds, "silence end");
            }
            ServerPacket::UserSilenced => {
                let user_id: i32 = p.read();
                debug!(user_id, "user silenced");
            }
            ServerPacket::UserDmBlocked | ServerPacket::TargetIsSilenced => {
                p.skip_string();
                p.skip_string();
                let target = p.read_string();
                let _: u32 = p.read();
                debug!(?kind, %target, "message not delivered");
            }
            ServerPacket::VersionUpdateForced => {
                self.disconnect();
                self.collab
                    .notifier
                    .toast("This server requires a newer client version.", ToastKind::Error);
            }
            ServerPacket::AccountRestricted => {
                self.collab.notifier.toast("Account restricted.", ToastKind::Error);
                self.disconnect();
            }
            ServerPacket::ProtectVariables => {
                for name in read_string_list(p) {
                    if !self.collab.variables.protect(&name) {
                        debug!(%name, "server tried to protect an unknown variable");
                    }
                }
            }
            ServerPacket::UnprotectVariables => {
                for name in read_string_list(p) {
                    if !self.collab.variables.unprotect(&name) {
                        debug!(%name, "server tried to unprotect an unknown variable");
                    }
                }
            }
            ServerPacket::ResetValues => {
                for name in read_string_list(p) {
                    if !self.collab.variables.reset(&name) {
                        debug!(%name, "server tried to reset an unknown variable");
                    }
                }
            }
            ServerPacket::ForceValues => {
                let count: u16 = p.read();
                for _ in 0..count {
                    let name = p.read_string();
                    let value = p.read_string();
                    if p.is_overrun() {
                        break;
                    }
                    if !self.collab.variables.force(&name, &value) {
                        debug!(%name, "server tried to force an unknown variable");
                    }
                }
            }
            ServerPacket::RequestMap => {
                let md5 = p.read_hash();
                self.on_map_request(md5);
            }
        }
    }

    fn on_login_reply(&mut self, user_id: i32) {
        self.shared.set_user_id(user_id);
        self.session.is_oauth = self.config.read(|c| !c.online.oauth_token.is_empty());

        if user_id > 0 {
            info!(user_id, "logged in");
            self.config.update(|c| c.online.autologin = true);
            self.persist_config();
            self.session.print_new_channels = true;

            let server = self.session.endpoint.clone();
            let dirs = self
                .config
                .read(|c| [c.paths.avatars_dir(&server), c.paths.replays_dir(&server)]);
            for dir in dirs {
                if let Err(err) = std::fs::create_dir_all(&dir) {
                    warn!(dir = %dir.display(), error = %err, "failed to create directory");
                }
            }

            self.collab.user_card.on_user_changed(&self.session.username);
            self.collab.scores.set_filter(ScoreFilter::Global);
            self.set_login_state(LoginState::LoggedIn);
        } else {
            self.config.update(|c| {
                c.online.autologin = false;
                c.online.oauth_token.clear();
            });
            self.persist_config();

            let token = self.shared.take_token().unwrap_or_default();
            warn!(code = user_id, %token, "login refused");
            let message =
                login_failure_message(user_id, self.session.is_oauth, &token, &self.session.username);
            self.collab.notifier.toast(&message, ToastKind::Error);
            self.set_login_state(LoginState::LoggedOut);
        }
    }

    fn on_user_stats(&mut self, p: &mut Packet) {
        let raw_id: i32 = p.read();
        let user_id = raw_id.saturating_abs();
        let action: u8 = p.read();
        let now = self.clock.now();

        let is_friend = self.users.is_friend(user_id);
        let notify = self.config.read(|c| c.online.notify_friend_status);
        let user = self.users.get_user_info(user_id, false);

        if action != user.action
            && is_friend
            && notify
            && let Some(name) = action_name(action)
        {
            let throttled = user
                .stats_at
                .is_some_and(|at| now.saturating_duration_since(at) <= STATUS_TOAST_THROTTLE);
            if !throttled && action != ACTION_SUBMITTING {
                self.collab
                    .notifier
                    .toast(&format!("{} is now {name}", user.name), ToastKind::Status);
            }
        }

        user.irc_user = raw_id < 0;
        user.stats_at = Some(now);
        user.action = action;
        user.info_text = p.read_string();
        user.map_md5 = p.read_hash();
        user.mods = p.read();
        user.mode = p.read();
        user.map_id = p.read();
        user.ranked_score = p.read();
        user.accuracy = p.read();
        user.plays = p.read();
        user.total_score = p.read();
        user.global_rank = p.read();
        user.pp = p.read();

        if user_id == self.shared.user_id() || user_id == self.session.spectated_id {
            self.collab.user_card.on_stats_updated(user);
        }
        self.collab.chat.update_user_list();
    }

    fn on_user_presence(&mut self, p: &mut Packet) {
        let raw_id: i32 = p.read();
        let user_id = raw_id.saturating_abs();
        let name = p.read_string();

        let user = self.users.get_user_info(user_id, false);
        user.irc_user = raw_id < 0;
        user.has_presence = true;
        user.name = name.clone();
        user.utc_offset = p.read();
        user.country = p.read();
        user.privileges = p.read();
        user.longitude = p.read();
        user.latitude = p.read();
        user.global_rank = p.read();
        self.users.login_user(user_id);

        // The server decides which name we go by.
        if user_id == self.shared.user_id() {
            self.session.username = name;
            self.collab.user_card.on_user_changed(&self.session.username);
        }
        self.collab.chat.update_user_list();
    }

    fn logout_user(&mut self, user_id: i32) {
        let Some(user) = self.users.logout_user(user_id) else {
            return;
        };
        debug!(name = %user.name, "user disconnected");
        if self.session.spectating && user_id == self.session.spectated_id {
            self.stop_spectating();
        }
        if self.users.is_friend(user_id) && self.config.read(|c| c.online.notify_friend_status) {
            self.collab
                .notifier
                .toast(&format!("{} is now offline", user.name), ToastKind::Status);
        }
        self.collab.chat.update_user_list();
    }

    fn on_spectate_frames(&mut self, p: &mut Packet) {
        let bundle = SpectateBundle::decode(p);
        if !self.session.spectating {
            return;
        }

        for frame in bundle.frames.iter().filter(|f| !f.in_playfield()) {
            debug!(time = frame.time, x = frame.mouse_x, y = frame.mouse_y, "frame outside playfield");
        }
        self.session
            .spectated_replay
            .extend(bundle.frames.iter().copied().map(ReplayFrame::from));
        // Frames can arrive out of order.
        ReplayFrame::sort_and_delta(&mut self.session.spectated_replay);

        let spectated = self.session.spectated_id;
        self.users.get_user_info(spectated, true).spectator_action = bundle.action;
        self.session.spectated_scores.push(bundle.score);

        self.collab
            .spectator
            .on_frames(&self.session.spectated_replay, bundle.action);
        self.collab.spectator.on_score_frame(&bundle.score);
    }

    fn update_channel(&mut self, name: &str, topic: &str, members: i32, join: bool) {
        let is_new = self.session.update_channel(name, topic, members);
        if is_new && self.session.print_new_channels {
            let message = system_message(format!("{name}: {topic}"));
            self.collab
                .chat
                .add_message(self.session.announcement_channel(), &message, false);
        }
        if join {
            self.collab.chat.join(name);
        }
    }

    /// Upload a difficulty the server asked for, after checking the file still matches.
    fn on_map_request(&mut self, md5: Md5Hash) {
        let Some(map) = self.collab.library.find_by_md5(&md5) else {
            debug!(%md5, "server requested a difficulty we don't have");
            return;
        };

        let mut url = self
            .endpoint()
            .web_url(&format!("/web/cadence-submit-map.php?hash={md5}"));
        self.append_auth_params(&mut url);

        let Some(data) = self.collab.library.read_map_file(&map) else {
            debug!(%md5, path = %map.path.display(), "failed to read map file");
            return;
        };
        let actual = Md5Hash::digest(&data);
        if actual != md5 {
            debug!(%md5, %actual, "map file changed on disk");
            return;
        }

        let part = MimePart {
            name: "osu_file".to_string(),
            filename: format!("{md5}.osu"),
            data,
        };
        let request = HttpRequest::post(url, Body::Multipart(vec![part]))
            .header("user-agent", USER_AGENT)
            .timeout(API_TIMEOUT);
        self.transport.http().request_async(
            request,
            Box::new(move |response| {
                if !response.is_success() {
                    debug!(status = response.status, "map upload failed");
                }
            }),
        );
    }

    fn handle_api_response(&mut self, kind: ApiKind, mut packet: Packet) {
        match kind {
            ApiKind::BeatmapsetInfo => self.process_set_info(&packet),
            ApiKind::MapLeaderboard => {
                let Some(md5) = packet.extra.take().and_then(|extra| extra.downcast::<Md5Hash>().ok())
                else {
                    warn!("leaderboard response without a map hash");
                    return;
                };
                let body = String::from_utf8_lossy(packet.payload()).into_owned();
                let (info, scores) = parse_leaderboard(&body, &md5, &self.session.endpoint);
                debug!(map_id = info.map_id, scores = scores.len(), "received leaderboard");

                for score in &scores {
                    let user = self.users.get_user_info(score.player_id, false);
                    user.name = score.player_name.clone();
                    user.privileges |= 1;
                }
                self.collab.library.set_online_offset(&md5, info.online_offset);
                self.collab.scores.set_online_scores(&md5, scores);
            }
            ApiKind::Replay => {
                if packet.is_empty() {
                    self.collab
                        .notifier
                        .toast("Failed to download replay", ToastKind::Error);
                    return;
                }
                let Some(score) = packet
                    .extra
                    .take()
                    .and_then(|extra| extra.downcast::<OnlineScore>().ok())
                else {
                    warn!("replay response without a score");
                    return;
                };
                match self.save_replay(&score, packet.payload()) {
                    Ok(path) => {
                        info!(path = %path.display(), "saved replay");
                        self.collab.scores.watch_replay(&path, &score);
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to save replay");
                        self.collab
                            .notifier
                            .toast("Failed to save replay", ToastKind::Error);
                    }
                }
            }
            ApiKind::MarkAsRead => {}
        }
    }

    fn save_replay(&self, score: &OnlineScore, data: &[u8]) -> std::io::Result<PathBuf> {
        let dir = self.config.read(|c| c.paths.replays_dir(&score.server));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.replay.lzma", score.unix_timestamp));
        std::fs::write(&path, data)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmaps::FetchStatus;
    use crate::collab::LocalBeatmap;
    use crate::testing::{Harness, build_zip};
    use cadence_net::HttpResponse;
    use cadence_proto::{LiveReplayFrame, SpectatorAction};

    fn write_stats(p: &mut Packet, raw_id: i32, action: u8) {
        p.write(raw_id);
        p.write(action);
        p.write_string("some map");
        p.write_hash(&Md5Hash::digest("map"));
        p.write(64u32);
        p.write(0u8);
        p.write(77i32);
        p.write(1_000_000i64);
        p.write(0.98f32);
        p.write(300i32);
        p.write(5_000_000i64);
        p.write(1234i32);
        p.write(4500u16);
    }

    #[test]
    fn test_login_failure_codes() {
        let cases = [
            (-1, false, "Incorrect username/password."),
            (-8, true, "Session expired, please log in again."),
            (-8, false, "Open the verification link sent to your email, then log in again."),
        ];
        for (code, oauth, expected) in cases {
            let mut h = Harness::new(|c| {
                if oauth {
                    c.online.oauth_token = "secret".to_string();
                }
            });
            h.deliver(ServerPacket::UserId, |p| p.write(code));
            assert_eq!(h.host.toasts(), vec![(expected.to_string(), ToastKind::Error)]);
            assert!(h.client.config().read(|c| c.online.oauth_token.is_empty()));
        }
    }

    #[test]
    fn test_spectator_frames_are_sorted() {
        let mut h = Harness::logged_in("example.net", 1);
        h.client.start_spectating(9);

        h.deliver(ServerPacket::SpectateFrames, |p| {
            let mut bundle = SpectateBundle {
                action: SpectatorAction::NewSong,
                ..Default::default()
            };
            for time in [50, 10, 30] {
                bundle.frames.push(LiveReplayFrame {
                    time,
                    mouse_x: 100.0,
                    mouse_y: 100.0,
                    key_flags: 0,
                });
            }
            bundle.encode(p);
        });

        let times: Vec<i32> = h.client.session().spectated_replay.iter().map(|f| f.time).collect();
        let deltas: Vec<i32> = h.client.session().spectated_replay.iter().map(|f| f.delta).collect();
        assert_eq!(times, vec![10, 30, 50]);
        assert_eq!(deltas, vec![10, 20, 20]);
        assert_eq!(
            h.client.users().get(9).unwrap().spectator_action,
            SpectatorAction::NewSong
        );
        assert!(h.host.events().contains(&"frames [10, 30, 50] [10, 20, 20] NewSong".to_string()));
    }

    #[test]
    fn test_frames_ignored_when_not_spectating() {
        let mut h = Harness::logged_in("example.net", 1);
        h.deliver(ServerPacket::SpectateFrames, |p| SpectateBundle::default().encode(p));
        assert!(h.client.session().spectated_scores.is_empty());
    }

    #[test]
    fn test_new_channels_printed_until_list_end() {
        let mut h = Harness::logged_in("example.net", 1);
        h.deliver(ServerPacket::ChannelInfo, |p| {
            p.write_string("#osu");
            p.write_string("Main channel");
            p.write(120i32);
        });
        h.deliver(ServerPacket::ChannelInfo, |p| {
            p.write_string("#osu");
            p.write_string("Main channel");
            p.write(121i32);
        });
        h.deliver(ServerPacket::ChannelInfoEnd, |_| {});
        h.deliver(ServerPacket::ChannelAutoJoin, |p| {
            p.write_string("#lobby");
            p.write_string("Multiplayer");
            p.write(3i32);
        });

        let messages = h.host.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "#osu");
        assert_eq!(messages[0].1.text, "#osu: Main channel");
        assert_eq!(h.client.session().channels["#osu"].members, 121);
        assert!(h.client.session().channels.contains_key("#lobby"));
        assert!(h.host.events().contains(&"join #lobby".to_string()));
    }

    #[test]
    fn test_negated_ids_mark_bridged_users() {
        let mut h = Harness::logged_in("example.net", 1);
        h.deliver(ServerPacket::UserStats, |p| write_stats(p, -15, 2));
        let user = h.client.users().get(15).unwrap();
        assert!(user.irc_user);
        assert_eq!(user.action, 2);
        assert_eq!(user.map_id, 77);
        assert_eq!(user.pp, 4500);
        assert_eq!(user.global_rank, 1234);

        h.deliver(ServerPacket::UserPresence, |p| {
            p.write(-16i32);
            p.write_string("bridge");
            p.write(0u8);
            p.write(0u8);
            p.write(0u8);
            p.write(0.0f32);
            p.write(0.0f32);
            p.write(0i32);
        });
        let user = h.client.users().get(16).unwrap();
        assert!(user.irc_user && user.has_presence);
        assert_eq!(user.name, "bridge");
        assert!(h.client.users().is_online(16));
    }

    #[test]
    fn test_friend_status_toasts() {
        let mut h = Harness::logged_in("example.net", 1);
        h.deliver(ServerPacket::FriendsList, |p| {
            p.write(1u16);
            p.write(20i32);
        });
        h.deliver(ServerPacket::UserPresenceSingle, |p| p.write(20i32));
        h.deliver(ServerPacket::UserStats, |p| write_stats(p, 20, 2));
        // Throttled: the previous stats are newer than ten seconds.
        h.deliver(ServerPacket::UserStats, |p| write_stats(p, 20, 1));
        h.deliver(ServerPacket::UserLogout, |p| {
            p.write(20i32);
            p.write(0u8);
        });

        let toasts: Vec<String> = h.host.toasts().into_iter().map(|(text, _)| text).collect();
        assert_eq!(
            toasts,
            vec!["User #20 is now playing".to_string(), "User #20 is now offline".to_string()]
        );
        assert!(!h.client.users().is_online(20));
    }

    #[test]
    fn test_own_logout_disconnects() {
        let mut h = Harness::logged_in("example.net", 1);
        h.deliver(ServerPacket::UserLogout, |p| {
            p.write(1i32);
            p.write(0u8);
        });
        assert!(!h.client.is_online());
        assert_eq!(h.client.login_state(), LoginState::LoggedOut);
    }

    #[test]
    fn test_spectator_sets_have_no_duplicates() {
        let mut h = Harness::logged_in("example.net", 1);
        for _ in 0..2 {
            h.deliver(ServerPacket::SpectatorJoined, |p| p.write(5i32));
        }
        assert_eq!(h.client.session().spectators, vec![5]);
        h.deliver(ServerPacket::SpectatorLeft, |p| p.write(5i32));
        h.deliver(ServerPacket::SpectatorLeft, |p| p.write(5i32));
        assert!(h.client.session().spectators.is_empty());
    }

    #[test]
    fn test_room_lifecycle() {
        let mut h = Harness::logged_in("example.net", 1);
        let room = Room {
            id: 3,
            name: "room".to_string(),
            host_id: 1,
            ..Default::default()
        };
        h.deliver(ServerPacket::RoomJoinSuccess, |p| room.encode(p));
        h.deliver(ServerPacket::RoomPasswordChanged, |p| p.write_string("hunter2"));
        assert_eq!(h.client.session().room.password, "hunter2");

        h.deliver(ServerPacket::MatchStarted, |p| room.encode(p));
        assert!(h.client.session().match_started);
        for slot_id in [18, 2] {
            h.deliver(ServerPacket::MatchScoreUpdated, |p| {
                ScoreFrame {
                    slot_id,
                    total_score: 500 + i32::from(slot_id),
                    ..Default::default()
                }
                .encode(p)
            });
        }
        let scores = &h.client.session().last_scores;
        assert_eq!(scores[2].total_score, 502);
        assert_eq!(scores.iter().filter(|s| s.total_score != 0).count(), 1);
        h.deliver(ServerPacket::MatchFinished, |_| {});
        assert!(!h.client.session().match_started);

        let events = h.host.events();
        for expected in ["room joined 3", "match started", "match score 2", "match finished"] {
            assert!(events.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(!events.contains(&"match score 18".to_string()));
    }

    #[test]
    fn test_room_updates_go_to_visible_lobby() {
        let mut h = Harness::logged_in("example.net", 1);
        h.host.set_lobby_visible(true);
        let room = Room {
            id: 8,
            ..Default::default()
        };
        h.deliver(ServerPacket::RoomUpdated, |p| room.encode(p));
        h.deliver(ServerPacket::RoomClosed, |p| p.write(8i32));
        let events = h.host.events();
        assert!(events.contains(&"lobby update 8".to_string()));
        assert!(events.contains(&"lobby remove 8".to_string()));
    }

    #[test]
    fn test_server_notices() {
        let mut h = Harness::logged_in("example.net", 1);
        h.deliver(ServerPacket::ProtocolVersion, |p| p.write(18i32));
        h.deliver(ServerPacket::ProtocolVersion, |p| p.write(19i32));
        h.deliver(ServerPacket::Notification, |p| p.write_string("hello"));
        h.deliver(ServerPacket::MainMenuIcon, |p| {
            p.write_string("https://example.net/icon.png|https://example.net")
        });
        assert_eq!(
            h.host.toasts(),
            vec![
                (
                    "This server may use an unsupported protocol version.".to_string(),
                    ToastKind::Error
                ),
                ("hello".to_string(), ToastKind::Info),
            ]
        );
        assert_eq!(h.client.session().server_icon_url, "https://example.net/icon.png");
    }

    #[test]
    fn test_server_variables() {
        let mut h = Harness::logged_in("example.net", 1);
        h.host.known_variables.lock().unwrap().insert("cursor_size".to_string());
        h.deliver(ServerPacket::ProtectVariables, |p| {
            p.write(2u16);
            p.write_string("cursor_size");
            p.write_string("missing");
        });
        h.deliver(ServerPacket::ForceValues, |p| {
            p.write(1u16);
            p.write_string("cursor_size");
            p.write_string("1.5");
        });
        let events = h.host.events();
        assert!(events.contains(&"protect cursor_size".to_string()));
        assert!(events.contains(&"protect missing".to_string()));
        assert!(events.contains(&"force cursor_size=1.5".to_string()));
    }

    #[test]
    fn test_unknown_packet_is_ignored() {
        let mut h = Harness::logged_in("example.net", 1);
        h.client.handle_packet(Packet::from_payload(0x7777, vec![1, 2, 3]));
        assert!(h.client.is_online());
        assert!(h.host.toasts().is_empty());
    }

    #[test]
    fn test_map_request_uploads_verified_file() {
        let mut h = Harness::logged_in("example.net", 1);
        let contents = b"osu file format v14\n".to_vec();
        let path = h.data_dir().join("a.osu");
        std::fs::write(&path, &contents).unwrap();
        let md5 = Md5Hash::digest(&contents);
        h.host.add_map(LocalBeatmap {
            md5: md5.clone(),
            map_id: 1,
            set_id: 2,
            path,
        });

        h.deliver(ServerPacket::RequestMap, |p| p.write_hash(&md5));
        let requests = h.mock.requests();
        let upload = requests.last().unwrap();
        assert!(upload.url.starts_with(&format!(
            "https://osu.example.net/web/cadence-submit-map.php?hash={md5}&u=player&h="
        )));
        match &upload.body {
            Body::Multipart(parts) => {
                assert_eq!(parts[0].name, "osu_file");
                assert_eq!(parts[0].filename, format!("{md5}.osu"));
                assert_eq!(parts[0].data, contents);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_map_request_for_unknown_map_does_nothing() {
        let mut h = Harness::logged_in("example.net", 1);
        let before = h.mock.requests().len();
        h.deliver(ServerPacket::RequestMap, |p| p.write_hash(&Md5Hash::digest("nope")));
        assert_eq!(h.mock.requests().len(), before);
    }

    #[test]
    fn test_leaderboard_response() {
        let mut h = Harness::logged_in("example.net", 1);
        let map = LocalBeatmap {
            md5: Md5Hash::digest("map"),
            map_id: 75,
            set_id: 41,
            path: "/maps/41/a.osu".into(),
        };
        h.client.fetch_online_scores(&map, 0);
        h.mock.complete_next(HttpResponse::ok(
            "2|false|75|41|1|0|\n-3\nname\n9\n\n100|alice|1|1|0|0|1|0|0|0|1|0|11|1|1700000000|1\n",
        ));
        h.tick();
        let events = h.host.events();
        assert!(events.contains(&"offset -3".to_string()));
        assert!(events.contains(&"online scores 1".to_string()));
        assert_eq!(h.client.users().get(11).unwrap().name, "alice");
    }

    #[test]
    fn test_replay_is_saved_and_watched() {
        let mut h = Harness::logged_in("example.net", 1);
        let score = OnlineScore {
            score_id: 99,
            unix_timestamp: 1_700_000_000,
            server: "example.net".to_string(),
            ..Default::default()
        };
        h.client.request_replay(&score);
        assert!(h.mock.next_url().unwrap().contains("/web/osu-getreplay.php?m=0&c=99&u=player&h="));
        h.mock.complete_next(HttpResponse::ok(b"LZMA".to_vec()));
        h.tick();

        let path = h
            .data_dir()
            .join("replays")
            .join("example.net")
            .join("1700000000.replay.lzma");
        assert_eq!(std::fs::read(&path).unwrap(), b"LZMA");
        assert!(h.host.events().contains(&format!("watch {}", path.display())));
    }

    #[test]
    fn test_beatmap_download_through_set_lookup() {
        let mut h = Harness::logged_in("example.net", 1);
        let md5 = Md5Hash::digest("wanted");

        assert_eq!(h.client.download_beatmap(75, &md5), FetchStatus::InProgress(0.0));
        assert!(h
            .mock
            .next_url()
            .unwrap()
            .starts_with("https://osu.example.net/web/osu-search-set.php?b=75&u=player&h="));
        h.mock.complete_next(HttpResponse::ok("41.osz|a|t|c|1|10|0|41"));
        h.tick();

        assert!(matches!(h.client.download_beatmap(75, &md5), FetchStatus::InProgress(_)));
        assert_eq!(h.mock.next_url().unwrap(), "https://osu.example.net/d/41");
        h.mock
            .complete_next(HttpResponse::ok(build_zip(&[("a [Hard].osu", "osu file format v14\n")])));

        // The archive holds no difficulty with that hash.
        assert_eq!(h.client.download_beatmap(75, &md5), FetchStatus::Failed);
        assert!(h.data_dir().join("maps").join("41").join("a [Hard].osu").is_file());
        assert!(h.host.events().contains(&"add set 41".to_string()));

        let before = h.mock.requests().len();
        assert_eq!(h.client.download_beatmap(75, &md5), FetchStatus::Failed);
        assert_eq!(h.mock.requests().len(), before);
    }

    #[test]
    fn test_failed_replay_download_toasts() {
        let mut h = Harness::logged_in("example.net", 1);
        h.client.request_replay(&OnlineScore::default());
        h.mock.complete_next(HttpResponse::with_status(404, Vec::new()));
        h.tick();
        assert!(h
            .host
            .toasts()
            .contains(&("Failed to download replay".to_string(), ToastKind::Error)));
    }
}
