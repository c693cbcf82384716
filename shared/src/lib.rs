pub mod ids;
pub mod packets;
pub mod reader;
pub mod records;
pub mod types;
pub mod writer;

pub use ids::{ClientPacketId, ServerPacketId};
pub use reader::{DecodeError, PacketReader, PacketStream, RawPacket};
pub use records::{
    ChannelInfo, ChatMessage, MatchRecord, ScoreFrame, ScoreV2Portions, SlotRecord, StatusChange,
    UserPresence, UserStats, MATCH_SLOTS,
};
pub use types::{
    ActionStatus, ClientRank, Mode, Mods, Privileges, ScoringType, SlotStatus, SlotTeam, TeamType,
};
pub use writer::PacketWriter;

pub const PROTOCOL_VERSION: i32 = 19;

/// Login reply codes carried in the user-id packet
pub const LOGIN_INCORRECT: i32 = -1;
pub const LOGIN_OUTDATED_CLIENT: i32 = -2;
pub const LOGIN_BANNED: i32 = -4;
pub const LOGIN_SERVER_ERROR: i32 = -5;

/// Password shown to players who are not allowed to see the real one
pub const MASKED_PASSWORD: &str = "********";

/// Decodes every packet in a body into `(opcode, payload)` pairs
///
/// Stops at the first framing error. Mostly useful for tests and tools that
/// inspect server output.
pub fn split_packets(body: &[u8]) -> Vec<(u16, Vec<u8>)> {
    PacketStream::new(body)
        .map_while(Result::ok)
        .map(|packet| (packet.id, packet.payload.to_vec()))
        .collect()
}
