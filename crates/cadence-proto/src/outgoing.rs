//! Builders for packets the client sends.

use crate::hash::Md5Hash;
use crate::ids::ClientPacket;
use crate::packet::Packet;

/// Keepalive: an empty ping.
pub fn ping() -> Packet {
    Packet::new(ClientPacket::Ping.id())
}

/// Logout carries a single zero `i32`.
pub fn logout() -> Packet {
    let mut p = Packet::new(ClientPacket::Logout.id());
    p.write(0i32);
    p
}

/// Chat message to a channel (`#name`) or a user.
pub fn chat_message(target: &str, text: &str) -> Packet {
    let id = if target.starts_with('#') {
        ClientPacket::SendPublicMessage
    } else {
        ClientPacket::SendPrivateMessage
    };
    let mut p = Packet::new(id.id());
    p.write_string("");
    p.write_string(text);
    p.write_string(target);
    p.write(0i32);
    p
}

pub fn channel_join(name: &str) -> Packet {
    let mut p = Packet::new(ClientPacket::ChannelJoin.id());
    p.write_string(name);
    p
}

pub fn channel_part(name: &str) -> Packet {
    let mut p = Packet::new(ClientPacket::ChannelPart.id());
    p.write_string(name);
    p
}

pub fn start_spectating(user_id: i32) -> Packet {
    let mut p = Packet::new(ClientPacket::StartSpectating.id());
    p.write(user_id);
    p
}

pub fn stop_spectating() -> Packet {
    Packet::new(ClientPacket::StopSpectating.id())
}

pub fn friend_add(user_id: i32) -> Packet {
    let mut p = Packet::new(ClientPacket::FriendAdd.id());
    p.write(user_id);
    p
}

pub fn friend_remove(user_id: i32) -> Packet {
    let mut p = Packet::new(ClientPacket::FriendRemove.id());
    p.write(user_id);
    p
}

pub fn exit_room() -> Packet {
    Packet::new(ClientPacket::ExitRoom.id())
}

/// Presence for every listed user.
pub fn presence_request(user_ids: &[i32]) -> Packet {
    id_list(ClientPacket::UserPresenceRequest, user_ids)
}

/// Stats for every listed user.
pub fn stats_request(user_ids: &[i32]) -> Packet {
    id_list(ClientPacket::UserStatsRequest, user_ids)
}

fn id_list(id: ClientPacket, user_ids: &[i32]) -> Packet {
    let count = user_ids.len().min(usize::from(u16::MAX));
    let mut p = Packet::new(id.id());
    p.write(count as u16);
    for &user_id in &user_ids[..count] {
        p.write(user_id);
    }
    p
}

/// What the local player is currently doing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionUpdate {
    pub action: u8,
    pub info_text: String,
    pub map_md5: Md5Hash,
    pub mods: u32,
    pub mode: u8,
    pub map_id: i32,
}

pub fn change_action(update: &ActionUpdate) -> Packet {
    let mut p = Packet::new(ClientPacket::ChangeAction.id());
    p.write(update.action);
    p.write_string(&update.info_text);
    if update.map_md5.is_empty() {
        p.write_string("");
    } else {
        p.write_hash(&update.map_md5);
    }
    p.write(update.mods);
    p.write(update.mode);
    p.write(update.map_id);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_and_private_messages() {
        assert_eq!(chat_message("#lobby", "hi").id, ClientPacket::SendPublicMessage.id());
        let mut p = chat_message("friend", "hello");
        assert_eq!(p.id, ClientPacket::SendPrivateMessage.id());
        assert_eq!(p.read_string(), "");
        assert_eq!(p.read_string(), "hello");
        assert_eq!(p.read_string(), "friend");
        assert_eq!(p.read::<i32>(), 0);
    }

    #[test]
    fn test_logout_payload() {
        let p = logout();
        assert_eq!(p.payload(), &[0, 0, 0, 0]);
        assert!(ping().is_empty());
    }

    #[test]
    fn test_id_list_layout() {
        let mut p = stats_request(&[3, -1]);
        assert_eq!(p.len(), 2 + 8);
        assert_eq!(p.read::<u16>(), 2);
        assert_eq!(p.read::<i32>(), 3);
        assert_eq!(p.read::<i32>(), -1);
    }

    #[test]
    fn test_change_action_with_hash() {
        let update = ActionUpdate {
            action: 2,
            info_text: "Artist - Title".to_string(),
            map_md5: Md5Hash::digest("map"),
            mods: 8,
            mode: 0,
            map_id: 55,
        };
        let mut p = change_action(&update);
        assert_eq!(p.read::<u8>(), 2);
        assert_eq!(p.read_string(), update.info_text);
        assert_eq!(p.read_hash(), update.map_md5);
        assert_eq!(p.read::<u32>(), 8);
        assert_eq!(p.read::<u8>(), 0);
        assert_eq!(p.read::<i32>(), 55);
    }
}
