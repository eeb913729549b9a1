//! Spectator live-replay frames and score frames.

use crate::packet::Packet;

/// Action reported alongside a spectate bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpectatorAction {
    #[default]
    None,
    NewSong,
    Skip,
    Completion,
    Fail,
    Pause,
    Unpause,
    SongSelect,
    WatchingOther,
    /// Value outside the known range, kept for logging.
    Unknown(u8),
}

impl SpectatorAction {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::NewSong,
            2 => Self::Skip,
            3 => Self::Completion,
            4 => Self::Fail,
            5 => Self::Pause,
            6 => Self::Unpause,
            7 => Self::SongSelect,
            8 => Self::WatchingOther,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::NewSong => 1,
            Self::Skip => 2,
            Self::Completion => 3,
            Self::Fail => 4,
            Self::Pause => 5,
            Self::Unpause => 6,
            Self::SongSelect => 7,
            Self::WatchingOther => 8,
            Self::Unknown(other) => other,
        }
    }
}

/// One input sample of a spectated player (14 bytes on the wire).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveReplayFrame {
    pub key_flags: u8,
    pub mouse_x: f32,
    pub mouse_y: f32,
    pub time: i32,
}

impl LiveReplayFrame {
    pub const WIRE_SIZE: usize = 14;

    pub fn decode(packet: &mut Packet) -> Self {
        let key_flags = packet.read();
        let _padding: u8 = packet.read();
        Self {
            key_flags,
            mouse_x: packet.read(),
            mouse_y: packet.read(),
            time: packet.read(),
        }
    }

    pub fn encode(&self, packet: &mut Packet) {
        packet.write(self.key_flags);
        packet.write(0u8);
        packet.write(self.mouse_x);
        packet.write(self.mouse_y);
        packet.write(self.time);
    }

    /// Whether the cursor lies inside the 512x384 playfield.
    pub fn in_playfield(&self) -> bool {
        (0.0..=512.0).contains(&self.mouse_x) && (0.0..=384.0).contains(&self.mouse_y)
    }
}

/// Running score of a player (29 bytes, packed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreFrame {
    pub time: i32,
    pub slot_id: u8,
    pub num300: u16,
    pub num100: u16,
    pub num50: u16,
    pub num_geki: u16,
    pub num_katu: u16,
    pub num_miss: u16,
    pub total_score: i32,
    pub max_combo: u16,
    pub current_combo: u16,
    pub is_perfect: bool,
    pub current_hp: u8,
    pub tag: u8,
    pub is_scorev2: bool,
}

impl ScoreFrame {
    pub const WIRE_SIZE: usize = 29;

    pub fn decode(packet: &mut Packet) -> Self {
        Self {
            time: packet.read(),
            slot_id: packet.read(),
            num300: packet.read(),
            num100: packet.read(),
            num50: packet.read(),
            num_geki: packet.read(),
            num_katu: packet.read(),
            num_miss: packet.read(),
            total_score: packet.read(),
            max_combo: packet.read(),
            current_combo: packet.read(),
            is_perfect: packet.read(),
            current_hp: packet.read(),
            tag: packet.read(),
            is_scorev2: packet.read(),
        }
    }

    pub fn encode(&self, packet: &mut Packet) {
        packet.write(self.time);
        packet.write(self.slot_id);
        packet.write(self.num300);
        packet.write(self.num100);
        packet.write(self.num50);
        packet.write(self.num_geki);
        packet.write(self.num_katu);
        packet.write(self.num_miss);
        packet.write(self.total_score);
        packet.write(self.max_combo);
        packet.write(self.current_combo);
        packet.write(self.is_perfect);
        packet.write(self.current_hp);
        packet.write(self.tag);
        packet.write(self.is_scorev2);
    }
}

/// Frame of the replay being reconstructed from spectate packets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplayFrame {
    /// Music position in milliseconds.
    pub time: i32,
    /// Milliseconds since the previous frame.
    pub delta: i32,
    pub x: f32,
    pub y: f32,
    pub key_flags: u8,
}

impl From<LiveReplayFrame> for ReplayFrame {
    fn from(frame: LiveReplayFrame) -> Self {
        Self {
            time: frame.time,
            delta: 0,
            x: frame.mouse_x,
            y: frame.mouse_y,
            key_flags: frame.key_flags,
        }
    }
}

impl ReplayFrame {
    /// Sort by time, then recompute every delta starting from time 0.
    ///
    /// Frames can arrive out of order, so deltas are only meaningful after
    /// sorting the whole buffer.
    pub fn sort_and_delta(frames: &mut [ReplayFrame]) {
        frames.sort_by_key(|f| f.time);
        let mut last = 0;
        for frame in frames.iter_mut() {
            frame.delta = frame.time.wrapping_sub(last);
            last = frame.time;
        }
    }
}

/// Payload of a spectate-frames packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectateBundle {
    pub extra: i32,
    pub frames: Vec<LiveReplayFrame>,
    pub action: SpectatorAction,
    pub score: ScoreFrame,
    pub sequence: u16,
}

impl SpectateBundle {
    pub fn decode(packet: &mut Packet) -> Self {
        let extra = packet.read();
        let count: u16 = packet.read();
        let capacity = usize::from(count).min(packet.remaining() / LiveReplayFrame::WIRE_SIZE);
        let mut frames = Vec::with_capacity(capacity);
        for _ in 0..count {
            let frame = LiveReplayFrame::decode(packet);
            if packet.is_overrun() {
                break;
            }
            frames.push(frame);
        }
        Self {
            extra,
            frames,
            action: SpectatorAction::from_u8(packet.read()),
            score: ScoreFrame::decode(packet),
            sequence: packet.read(),
        }
    }

    pub fn encode(&self, packet: &mut Packet) {
        packet.write(self.extra);
        packet.write(self.frames.len() as u16);
        for frame in &self.frames {
            frame.encode(packet);
        }
        packet.write(self.action.as_u8());
        self.score.encode(packet);
        packet.write(self.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(time: i32) -> ReplayFrame {
        ReplayFrame {
            time,
            ..Default::default()
        }
    }

    #[test]
    fn test_out_of_order_frames_sorted_before_deltas() {
        let mut frames = vec![frame_at(50), frame_at(10), frame_at(30)];
        ReplayFrame::sort_and_delta(&mut frames);

        let times: Vec<i32> = frames.iter().map(|f| f.time).collect();
        let deltas: Vec<i32> = frames.iter().map(|f| f.delta).collect();
        assert_eq!(times, vec![10, 30, 50]);
        assert_eq!(deltas, vec![10, 20, 20]);
    }

    #[test]
    fn test_extreme_frame_times_do_not_overflow() {
        let mut frames = vec![frame_at(10), frame_at(i32::MIN)];
        ReplayFrame::sort_and_delta(&mut frames);

        assert_eq!(frames[0].time, i32::MIN);
        assert_eq!(frames[0].delta, i32::MIN);
        assert_eq!(frames[1].delta, 10i32.wrapping_sub(i32::MIN));
    }

    #[test]
    fn test_wire_sizes() {
        let mut p = Packet::new(0);
        LiveReplayFrame::default().encode(&mut p);
        assert_eq!(p.len(), LiveReplayFrame::WIRE_SIZE);

        let mut p = Packet::new(0);
        ScoreFrame::default().encode(&mut p);
        assert_eq!(p.len(), ScoreFrame::WIRE_SIZE);
    }

    #[test]
    fn test_bundle_decode() {
        let bundle = SpectateBundle {
            extra: 3,
            frames: vec![
                LiveReplayFrame { key_flags: 1, mouse_x: 100.0, mouse_y: 200.0, time: 40 },
                LiveReplayFrame { key_flags: 0, mouse_x: 12.5, mouse_y: 0.0, time: 20 },
            ],
            action: SpectatorAction::Pause,
            score: ScoreFrame { total_score: 1000, max_combo: 12, ..Default::default() },
            sequence: 5,
        };
        let mut p = Packet::new(0);
        bundle.encode(&mut p);

        let mut reader = Packet::from_payload(0, p.into_payload());
        assert_eq!(SpectateBundle::decode(&mut reader), bundle);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_unknown_action_preserved() {
        assert_eq!(SpectatorAction::from_u8(42), SpectatorAction::Unknown(42));
        assert_eq!(SpectatorAction::from_u8(7), SpectatorAction::SongSelect);
        assert_eq!(SpectatorAction::Unknown(42).as_u8(), 42);
    }

    #[test]
    fn test_playfield_bounds() {
        let mut f = LiveReplayFrame { mouse_x: 512.0, mouse_y: 384.0, ..Default::default() };
        assert!(f.in_playfield());
        f.mouse_x = -1.0;
        assert!(!f.in_playfield());
    }
}
