//! Multiplayer room snapshots.
//!
//! A room is always decoded wholesale from the latest packet; the session
//! never patches individual fields.

use crate::hash::Md5Hash;
use crate::packet::Packet;

/// Number of player slots in a room.
pub const SLOT_COUNT: usize = 16;

/// Slot status bits.
pub mod status {
    pub const OPEN: u8 = 0b0000_0001;
    pub const LOCKED: u8 = 0b0000_0010;
    pub const NOT_READY: u8 = 0b0000_0100;
    pub const READY: u8 = 0b0000_1000;
    pub const NO_MAP: u8 = 0b0001_0000;
    pub const PLAYING: u8 = 0b0010_0000;
    pub const COMPLETE: u8 = 0b0100_0000;
    pub const QUIT: u8 = 0b1000_0000;
    /// Any of the statuses that imply a player occupies the slot.
    pub const HAS_PLAYER: u8 = NOT_READY | READY | NO_MAP | PLAYING | COMPLETE;
}

/// One of the 16 room slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    pub status: u8,
    pub team: u8,
    pub player_id: i32,
    pub mods: u32,
}

impl Slot {
    pub fn is_locked(&self) -> bool {
        self.status & status::LOCKED != 0
    }

    pub fn is_ready(&self) -> bool {
        self.status & status::READY != 0
    }

    pub fn is_missing_beatmap(&self) -> bool {
        self.status & status::NO_MAP != 0
    }

    pub fn is_playing(&self) -> bool {
        self.status & status::PLAYING != 0
    }

    pub fn has_finished_playing(&self) -> bool {
        self.status & status::COMPLETE != 0
    }

    pub fn has_quit(&self) -> bool {
        self.status & status::QUIT != 0
    }

    pub fn has_player(&self) -> bool {
        self.status & status::HAS_PLAYER != 0
    }
}

/// Snapshot of a multiplayer room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Room {
    pub id: u16,
    pub in_progress: bool,
    pub match_type: u8,
    pub mods: u32,
    pub name: String,
    pub has_password: bool,
    /// Only meaningful when the server chose to reveal it.
    pub password: String,
    pub map_name: String,
    pub map_id: i32,
    pub map_md5: Md5Hash,
    pub slots: [Slot; SLOT_COUNT],
    pub host_id: i32,
    pub mode: u8,
    pub win_condition: u8,
    pub team_type: u8,
    pub freemods: bool,
    pub seed: u32,
    /// Derived while decoding.
    pub nb_players: u8,
    /// Derived while decoding.
    pub nb_open_slots: u8,
}

impl Room {
    /// Decode a room from the packet cursor.
    pub fn decode(packet: &mut Packet) -> Self {
        let mut room = Room {
            id: packet.read(),
            in_progress: packet.read::<u8>() != 0,
            match_type: packet.read(),
            mods: packet.read(),
            name: packet.read_string(),
            ..Default::default()
        };

        room.has_password = packet.read::<u8>() > 0;
        if room.has_password {
            // The marker byte doubles as the string prefix.
            packet.rewind(1);
            room.password = packet.read_string();
        }

        room.map_name = packet.read_string();
        room.map_id = packet.read();
        room.map_md5 = Md5Hash::from_hex(&packet.read_string());

        for slot in &mut room.slots {
            slot.status = packet.read();
        }
        for slot in &mut room.slots {
            slot.team = packet.read();
        }
        for slot in &mut room.slots {
            if !slot.is_locked() {
                room.nb_open_slots += 1;
            }
            if slot.has_player() {
                slot.player_id = packet.read();
                room.nb_players += 1;
            }
        }

        room.host_id = packet.read();
        room.mode = packet.read();
        room.win_condition = packet.read();
        room.team_type = packet.read();
        room.freemods = packet.read::<u8>() != 0;
        if room.freemods {
            for slot in &mut room.slots {
                slot.mods = packet.read();
            }
        }

        room.seed = packet.read();
        room
    }

    /// Encode the room in the same layout [`decode`](Self::decode) reads.
    pub fn encode(&self, packet: &mut Packet) {
        packet.write(self.id);
        packet.write(u8::from(self.in_progress));
        packet.write(self.match_type);
        packet.write(self.mods);
        packet.write_string(&self.name);
        packet.write_string(&self.password);
        packet.write_string(&self.map_name);
        packet.write(self.map_id);
        packet.write_string(self.map_md5.as_str());
        for slot in &self.slots {
            packet.write(slot.status);
        }
        for slot in &self.slots {
            packet.write(slot.team);
        }
        for slot in &self.slots {
            if slot.has_player() {
                packet.write(slot.player_id);
            }
        }
        packet.write(self.host_id);
        packet.write(self.mode);
        packet.write(self.win_condition);
        packet.write(self.team_type);
        packet.write(u8::from(self.freemods));
        if self.freemods {
            for slot in &self.slots {
                packet.write(slot.mods);
            }
        }
        packet.write(self.seed);
    }

    /// Whether the local player is in this room.
    pub fn in_room(&self) -> bool {
        self.nb_players > 0
    }

    /// Whether `user_id` hosts this room.
    pub fn is_host(&self, user_id: i32) -> bool {
        self.host_id == user_id
    }

    /// Number of occupied slots that are ready.
    pub fn nb_ready(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.has_player() && s.is_ready())
            .count()
    }

    /// Whether every occupied slot is ready.
    pub fn all_players_ready(&self) -> bool {
        self.slots
            .iter()
            .filter(|s| s.has_player())
            .all(Slot::is_ready)
    }

    /// Slot index occupied by `user_id`.
    pub fn slot_of(&self, user_id: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.has_player() && s.player_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_room() -> Room {
        let mut room = Room {
            id: 42,
            in_progress: false,
            match_type: 0,
            mods: 64,
            name: "friendly lobby".to_string(),
            map_name: "Artist - Title [Hard]".to_string(),
            map_id: 1234,
            map_md5: Md5Hash::digest("map"),
            host_id: 7,
            mode: 0,
            win_condition: 1,
            team_type: 2,
            freemods: true,
            seed: 99,
            ..Default::default()
        };
        room.slots[0] = Slot { status: status::READY, team: 1, player_id: 7, mods: 8 };
        room.slots[1] = Slot { status: status::NOT_READY, team: 2, player_id: 9, mods: 16 };
        room.slots[2].status = status::OPEN;
        for slot in &mut room.slots[3..] {
            slot.status = status::LOCKED;
        }
        room
    }

    #[test]
    fn test_room_roundtrip() {
        let room = sample_room();
        let mut packet = Packet::new(0);
        room.encode(&mut packet);

        let mut reader = Packet::from_payload(0, packet.into_payload());
        let decoded = Room::decode(&mut reader);
        assert!(!reader.is_overrun());
        assert_eq!(reader.remaining(), 0);

        assert_eq!(decoded.name, room.name);
        assert_eq!(decoded.map_md5, room.map_md5);
        assert_eq!(decoded.slots, room.slots);
        assert_eq!(decoded.seed, 99);
        assert_eq!(decoded.nb_players, 2);
        assert_eq!(decoded.nb_open_slots, 3);
        assert!(decoded.in_room());
        assert!(decoded.is_host(7));
        assert_eq!(decoded.slot_of(9), Some(1));
        assert_eq!(decoded.nb_ready(), 1);
        assert!(!decoded.all_players_ready());
    }

    #[test]
    fn test_password_marker_is_reread_as_string() {
        let mut room = sample_room();
        room.password = "secret".to_string();
        let mut packet = Packet::new(0);
        room.encode(&mut packet);

        let mut reader = Packet::from_payload(0, packet.into_payload());
        let decoded = Room::decode(&mut reader);
        assert!(decoded.has_password);
        assert_eq!(decoded.password, "secret");
        assert_eq!(decoded.map_name, room.map_name);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_without_freemods_no_slot_mods() {
        let mut room = sample_room();
        room.freemods = false;
        let mut packet = Packet::new(0);
        room.encode(&mut packet);

        let decoded = Room::decode(&mut Packet::from_payload(0, packet.into_payload()));
        assert!(decoded.slots.iter().all(|s| s.mods == 0));
        assert_eq!(decoded.seed, 99);
    }

    #[test]
    fn test_default_room_is_not_joined() {
        assert!(!Room::default().in_room());
    }
}
