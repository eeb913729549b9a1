//! Registry of every user the client has heard about.
//!
//! Users are created on first reference with a placeholder name. Presence and
//! stats are fetched lazily: callers enqueue ids and the client sends one batch
//! request per kind at most once per second.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use cadence_proto::{Md5Hash, Packet, SpectatorAction, outgoing};

/// Stats newer than this are not requested again.
pub const STATS_FRESHNESS: Duration = Duration::from_secs(5);

/// Minimum time between two friend status toasts for the same user.
pub const STATUS_TOAST_THROTTLE: Duration = Duration::from_secs(10);

/// `action` value of a player submitting a score.
pub const ACTION_SUBMITTING: u8 = 9;

/// Human-readable name of every known action, indexed by action value.
pub const ACTION_NAMES: [&str; 14] = [
    "idle",
    "afk",
    "playing",
    "editing",
    "modding",
    "in a multiplayer lobby",
    "spectating",
    "vibing",
    "testing",
    "submitting",
    "pausing",
    "testing",
    "multiplaying",
    "browsing maps",
];

pub fn action_name(action: u8) -> Option<&'static str> {
    ACTION_NAMES.get(usize::from(action)).copied()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInfo {
    pub user_id: i32,
    pub name: String,
    /// Connected through the chat bridge; sent with a negated id.
    pub irc_user: bool,

    // presence
    pub has_presence: bool,
    pub utc_offset: u8,
    pub country: u8,
    pub privileges: u8,
    pub longitude: f32,
    pub latitude: f32,
    pub global_rank: i32,

    // stats
    pub stats_at: Option<Instant>,
    pub action: u8,
    pub info_text: String,
    pub map_md5: Md5Hash,
    pub mods: u32,
    pub mode: u8,
    pub map_id: i32,
    pub ranked_score: i64,
    pub accuracy: f32,
    pub plays: i32,
    pub total_score: i64,
    pub pp: u16,

    pub spectator_action: SpectatorAction,
}

impl UserInfo {
    fn placeholder(user_id: i32) -> Self {
        Self {
            user_id,
            name: format!("User #{user_id}"),
            ..Default::default()
        }
    }

    fn stats_fresh(&self, now: Instant) -> bool {
        self.stats_at
            .is_some_and(|at| now.saturating_duration_since(at) < STATS_FRESHNESS)
    }
}

#[derive(Debug, Default)]
pub struct Users {
    all: HashMap<i32, UserInfo>,
    online: HashSet<i32>,
    friends: Vec<i32>,
    presence_requests: Vec<i32>,
    stats_requests: Vec<i32>,
}

impl Users {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i32) -> Option<&UserInfo> {
        self.all.get(&user_id)
    }

    /// The user's entry, created on first reference.
    pub fn get_user_info(&mut self, user_id: i32, wants_presence: bool) -> &mut UserInfo {
        if wants_presence {
            self.request_presence(user_id);
        }
        self.all
            .entry(user_id)
            .or_insert_with(|| UserInfo::placeholder(user_id))
    }

    pub fn find_user(&self, name: &str) -> Option<&UserInfo> {
        self.all.values().find(|user| user.name == name)
    }

    /// Next online user whose name starts with `prefix` (case-insensitive),
    /// cycling past `last_match`. Used for tab completion.
    pub fn find_user_starting_with(&self, prefix: &str, last_match: &str) -> Option<&UserInfo> {
        if prefix.is_empty() {
            return None;
        }
        let prefix = prefix.to_lowercase();
        let mut candidates: Vec<&UserInfo> = self
            .online
            .iter()
            .filter_map(|id| self.all.get(id))
            .filter(|user| user.name.to_lowercase().starts_with(&prefix))
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let after_last = candidates
            .iter()
            .position(|user| user.name == last_match)
            .map_or(0, |idx| idx + 1);
        candidates
            .get(after_last)
            .or_else(|| candidates.first())
            .copied()
    }

    pub fn is_online(&self, user_id: i32) -> bool {
        self.online.contains(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn is_friend(&self, user_id: i32) -> bool {
        self.friends.contains(&user_id)
    }

    pub fn friends(&self) -> &[i32] {
        &self.friends
    }

    pub fn set_friends(&mut self, friends: Vec<i32>) {
        self.friends = friends;
    }

    /// Mark a user as online without requesting anything.
    pub fn login_user(&mut self, user_id: i32) {
        self.get_user_info(user_id, false);
        self.online.insert(user_id);
    }

    /// Mark a user as offline. Returns their info if they were online.
    pub fn logout_user(&mut self, user_id: i32) -> Option<UserInfo> {
        if !self.online.remove(&user_id) {
            return None;
        }
        self.presence_requests.retain(|&id| id != user_id);
        self.stats_requests.retain(|&id| id != user_id);
        self.all.get(&user_id).cloned()
    }

    pub fn logout_all(&mut self) {
        self.all.clear();
        self.online.clear();
        self.friends.clear();
        self.presence_requests.clear();
        self.stats_requests.clear();
    }

    pub fn request_presence(&mut self, user_id: i32) {
        if self.all.get(&user_id).is_some_and(|user| user.has_presence) {
            return;
        }
        if !self.presence_requests.contains(&user_id) {
            self.presence_requests.push(user_id);
        }
    }

    pub fn request_stats(&mut self, user_id: i32, now: Instant) {
        if let Some(user) = self.all.get(&user_id)
            && (user.irc_user || user.stats_fresh(now))
        {
            return;
        }
        if !self.stats_requests.contains(&user_id) {
            self.stats_requests.push(user_id);
        }
    }

    /// Presence request for every queued user still lacking presence.
    pub fn take_presence_batch(&mut self) -> Option<Packet> {
        let ids: Vec<i32> = std::mem::take(&mut self.presence_requests)
            .into_iter()
            .filter(|id| !self.all.get(id).is_some_and(|user| user.has_presence))
            .collect();
        (!ids.is_empty()).then(|| outgoing::presence_request(&ids))
    }

    /// Stats request for every queued user without fresh stats.
    pub fn take_stats_batch(&mut self, now: Instant) -> Option<Packet> {
        let ids: Vec<i32> = std::mem::take(&mut self.stats_requests)
            .into_iter()
            .filter(|id| {
                !self
                    .all
                    .get(id)
                    .is_some_and(|user| user.irc_user || user.stats_fresh(now))
            })
            .collect();
        (!ids.is_empty()).then(|| outgoing::stats_request(&ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_proto::ClientPacket;

    #[test]
    fn test_placeholder_name() {
        let mut users = Users::new();
        assert_eq!(users.get_user_info(42, false).name, "User #42");
        assert!(!users.is_online(42));
    }

    #[test]
    fn test_presence_batch_skips_known_presence() {
        let mut users = Users::new();
        users.get_user_info(1, true);
        users.get_user_info(2, true).has_presence = true;
        users.get_user_info(1, true);

        let mut packet = users.take_presence_batch().unwrap();
        assert_eq!(packet.id, ClientPacket::UserPresenceRequest.id());
        assert_eq!(packet.read::<u16>(), 1);
        assert_eq!(packet.read::<i32>(), 1);
        assert!(users.take_presence_batch().is_none());
    }

    #[test]
    fn test_stats_batch_skips_irc_and_fresh_users() {
        let now = Instant::now();
        let mut users = Users::new();
        users.get_user_info(1, false).irc_user = true;
        users.get_user_info(2, false).stats_at = Some(now);
        users.get_user_info(3, false).stats_at = Some(now);
        for id in [1, 2, 3, 4] {
            users.request_stats(id, now);
        }
        assert!(users.stats_requests == vec![4]);

        users.request_stats(3, now + STATS_FRESHNESS);
        let mut packet = users.take_stats_batch(now + STATS_FRESHNESS).unwrap();
        assert_eq!(packet.read::<u16>(), 2);
        assert_eq!(packet.read::<i32>(), 4);
        assert_eq!(packet.read::<i32>(), 3);
    }

    #[test]
    fn test_logout_user_only_reports_online_users() {
        let mut users = Users::new();
        users.get_user_info(5, true);
        assert!(users.logout_user(5).is_none());

        users.login_user(5);
        assert_eq!(users.online_count(), 1);
        let info = users.logout_user(5).unwrap();
        assert_eq!(info.user_id, 5);
        assert!(users.take_presence_batch().is_none());
    }

    #[test]
    fn test_logout_all_clears_everything() {
        let mut users = Users::new();
        users.login_user(1);
        users.set_friends(vec![1]);
        users.logout_all();
        assert!(users.get(1).is_none());
        assert!(!users.is_friend(1));
        assert_eq!(users.online_count(), 0);
    }

    #[test]
    fn test_tab_completion_cycles() {
        let mut users = Users::new();
        for (id, name) in [(1, "alice"), (2, "Alfred"), (3, "bob")] {
            users.login_user(id);
            users.get_user_info(id, false).name = name.to_string();
        }
        let first = users.find_user_starting_with("al", "").unwrap();
        assert_eq!(first.name, "Alfred");
        let second = users.find_user_starting_with("al", "Alfred").unwrap();
        assert_eq!(second.name, "alice");
        let wrapped = users.find_user_starting_with("al", "alice").unwrap();
        assert_eq!(wrapped.name, "Alfred");
        assert!(users.find_user_starting_with("", "").is_none());
    }

    #[test]
    fn test_action_names() {
        assert_eq!(action_name(2), Some("playing"));
        assert_eq!(action_name(13), Some("browsing maps"));
        assert_eq!(action_name(14), None);
    }
}
