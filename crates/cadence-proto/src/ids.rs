//! Packet ids for both directions.

macro_rules! packet_ids {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),*
        }

        impl $name {
            /// Every known id, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// Map a raw id to a known packet, `None` for unknown ids.
            pub fn from_id(id: u16) -> Option<Self> {
                match id {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Raw wire id.
            pub fn id(self) -> u16 {
                self as u16
            }
        }
    };
}

packet_ids! {
    /// Packets sent by the server.
    pub enum ServerPacket {
        UserId = 5,
        RecvMessage = 7,
        Pong = 8,
        UserStats = 11,
        UserLogout = 12,
        SpectatorJoined = 13,
        SpectatorLeft = 14,
        SpectateFrames = 15,
        VersionUpdate = 19,
        SpectatorCantSpectate = 22,
        GetAttention = 23,
        Notification = 24,
        RoomUpdated = 26,
        RoomCreated = 27,
        RoomClosed = 28,
        RoomJoinSuccess = 36,
        RoomJoinFail = 37,
        FellowSpectatorJoined = 42,
        FellowSpectatorLeft = 43,
        MatchStarted = 46,
        MatchScoreUpdated = 48,
        HostChanged = 50,
        MatchAllPlayersLoaded = 53,
        MatchPlayerFailed = 57,
        MatchFinished = 58,
        MatchSkip = 61,
        ChannelJoinSuccess = 64,
        ChannelInfo = 65,
        LeftChannel = 66,
        ChannelAutoJoin = 67,
        Privileges = 71,
        FriendsList = 72,
        ProtocolVersion = 75,
        MainMenuIcon = 76,
        MatchPlayerSkipped = 81,
        UserPresence = 83,
        Restart = 86,
        RoomInvite = 88,
        ChannelInfoEnd = 89,
        RoomPasswordChanged = 91,
        SilenceEnd = 92,
        UserSilenced = 94,
        UserPresenceSingle = 95,
        UserPresenceBundle = 96,
        UserDmBlocked = 100,
        TargetIsSilenced = 101,
        VersionUpdateForced = 102,
        SwitchServer = 103,
        AccountRestricted = 104,
        MatchAbort = 106,
        // Client-specific extensions start at 128.
        ProtectVariables = 128,
        UnprotectVariables = 129,
        ForceValues = 130,
        ResetValues = 131,
        RequestMap = 132,
    }
}

packet_ids! {
    /// Packets sent by the client.
    pub enum ClientPacket {
        ChangeAction = 0,
        SendPublicMessage = 1,
        Logout = 2,
        Ping = 4,
        StartSpectating = 16,
        StopSpectating = 17,
        OutSpectateFrames = 18,
        ErrorReport = 20,
        CantSpectate = 21,
        SendPrivateMessage = 25,
        ExitRoomList = 29,
        JoinRoomList = 30,
        CreateRoom = 31,
        JoinRoom = 32,
        ExitRoom = 33,
        ChangeSlot = 38,
        MatchReady = 39,
        MatchLock = 40,
        MatchChangeSettings = 41,
        StartMatch = 44,
        UpdateMatchScore = 47,
        FinishMatch = 49,
        MatchChangeMods = 51,
        MatchLoadComplete = 52,
        MatchNoBeatmap = 54,
        MatchNotReady = 55,
        MatchFailed = 56,
        MatchHasBeatmap = 59,
        MatchSkipRequest = 60,
        ChannelJoin = 63,
        BeatmapInfoRequest = 68,
        TransferHost = 70,
        FriendAdd = 73,
        FriendRemove = 74,
        MatchChangeTeam = 77,
        ChannelPart = 78,
        ReceiveUpdates = 79,
        SetAwayMessage = 82,
        IrcOnly = 84,
        UserStatsRequest = 85,
        MatchInvite = 88,
        ChangeRoomPassword = 90,
        TournamentMatchInfoRequest = 93,
        UserPresenceRequest = 97,
        UserPresenceRequestAll = 98,
        ToggleBlockNonFriendDms = 99,
        TournamentJoinMatchChannel = 108,
        TournamentExitMatchChannel = 109,
    }
}
