//! Packet opcodes for both directions of the protocol

macro_rules! opcodes {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum $name {
            $($variant = $value),*
        }

        impl $name {
            /// Every opcode in this direction
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)*
                }
            }
        }

        impl From<$name> for u16 {
            fn from(id: $name) -> u16 {
                id as u16
            }
        }
    };
}

opcodes! {
    /// Packets sent by the game client
    ClientPacketId {
        ChangeAction = 0,
        SendPublicMessage = 1,
        Logout = 2,
        RequestStatusUpdate = 3,
        Ping = 4,
        StartSpectating = 16,
        StopSpectating = 17,
        SpectateFrames = 18,
        CantSpectate = 21,
        SendPrivateMessage = 25,
        PartLobby = 29,
        JoinLobby = 30,
        CreateMatch = 31,
        JoinMatch = 32,
        PartMatch = 33,
        MatchChangeSlot = 38,
        MatchReady = 39,
        MatchLock = 40,
        MatchChangeSettings = 41,
        MatchStart = 44,
        MatchScoreUpdate = 47,
        MatchComplete = 49,
        MatchChangeMods = 51,
        MatchLoadComplete = 52,
        MatchNoBeatmap = 54,
        MatchNotReady = 55,
        MatchFailed = 56,
        MatchHasBeatmap = 59,
        MatchSkipRequest = 60,
        ChannelJoin = 63,
        BeatmapInfoRequest = 68,
        MatchTransferHost = 70,
        FriendAdd = 73,
        FriendRemove = 74,
        MatchChangeTeam = 77,
        ChannelPart = 78,
        ReceiveUpdates = 79,
        UserStatsRequest = 85,
        MatchInvite = 87,
        MatchChangePassword = 90,
        UserPresenceRequest = 97,
        UserPresenceRequestAll = 98,
    }
}

opcodes! {
    /// Packets sent by the server
    ServerPacketId {
        UserId = 5,
        SendMessage = 7,
        Pong = 8,
        UserStats = 11,
        UserLogout = 12,
        SpectatorJoined = 13,
        SpectatorLeft = 14,
        SpectateFrames = 15,
        CantSpectate = 22,
        Notification = 24,
        UpdateMatch = 26,
        NewMatch = 27,
        DisposeMatch = 28,
        MatchJoinSuccess = 36,
        MatchJoinFail = 37,
        FellowSpectatorJoined = 42,
        FellowSpectatorLeft = 43,
        MatchStart = 46,
        MatchScoreUpdate = 48,
        MatchTransferHost = 50,
        MatchAllPlayersLoaded = 53,
        MatchPlayerFailed = 57,
        MatchComplete = 58,
        MatchSkip = 61,
        ChannelJoinSuccess = 64,
        ChannelInfo = 65,
        ChannelKick = 66,
        ChannelAutoJoin = 67,
        Privileges = 71,
        FriendsList = 72,
        ProtocolVersion = 75,
        MatchPlayerSkipped = 81,
        UserPresence = 83,
        Restart = 86,
        MatchInvite = 88,
        ChannelInfoEnd = 89,
        MatchChangePassword = 91,
        MatchAbort = 106,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_resolve() {
        assert_eq!(ClientPacketId::from_u16(0), Some(ClientPacketId::ChangeAction));
        assert_eq!(ClientPacketId::from_u16(98), Some(ClientPacketId::UserPresenceRequestAll));
        assert_eq!(ClientPacketId::from_u16(5), None);
    }

    #[test]
    fn test_every_id_maps_back_to_itself() {
        for id in ClientPacketId::ALL {
            assert_eq!(ClientPacketId::from_u16(u16::from(*id)), Some(*id));
        }
        for id in ServerPacketId::ALL {
            assert_eq!(ServerPacketId::from_u16(u16::from(*id)), Some(*id));
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(ClientPacketId::MatchReady.name(), "MatchReady");
        assert_eq!(ServerPacketId::Restart.name(), "Restart");
    }
}
