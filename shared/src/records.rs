//! Composite payload records
//!
//! Each record decodes from a [`PacketReader`] and encodes into a
//! [`PacketWriter`] in the exact field order the client uses. Records are
//! plain data; the server converts its own state into them when building
//! packets.

use crate::reader::{DecodeError, PacketReader};
use crate::types::{ActionStatus, Mode, Mods, ScoringType, SlotStatus, SlotTeam, TeamType};
use crate::writer::PacketWriter;

/// Number of seats in every match
pub const MATCH_SLOTS: usize = 16;

/// One seat of a [`MatchRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotRecord {
    pub status: SlotStatus,
    pub team: SlotTeam,
    /// Present exactly when `status` is occupied
    pub user_id: Option<i32>,
    pub mods: Mods,
}

/// Full description of a multiplayer match as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchRecord {
    pub id: i16,
    pub in_progress: bool,
    pub mods: Mods,
    pub name: String,
    pub password: String,
    pub map_title: String,
    pub map_id: i32,
    /// Empty when no map is selected
    pub map_hash: String,
    pub slots: [SlotRecord; MATCH_SLOTS],
    pub host_id: i32,
    pub mode: Mode,
    pub scoring_type: ScoringType,
    pub team_type: TeamType,
    pub freemod: bool,
    pub seed: i32,
}

impl MatchRecord {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let id = reader.read_i16()?;
        let in_progress = reader.read_bool()?;
        reader.read_u8()?; // match type, unused
        let mods = Mods::from_wire(reader.read_u32()?);
        let name = reader.read_string()?;
        let password = reader.read_string()?;
        let map_title = reader.read_string()?;
        let map_id = reader.read_i32()?;
        let map_hash = reader.read_string()?;

        let mut slots = [SlotRecord::default(); MATCH_SLOTS];
        for slot in slots.iter_mut() {
            let raw = reader.read_u8()?;
            slot.status = SlotStatus::from_u8(raw).ok_or(DecodeError::InvalidValue {
                field: "slot status",
                value: i64::from(raw),
            })?;
        }
        for slot in slots.iter_mut() {
            let raw = reader.read_u8()?;
            slot.team = SlotTeam::from_u8(raw).ok_or(DecodeError::InvalidValue {
                field: "slot team",
                value: i64::from(raw),
            })?;
        }
        for slot in slots.iter_mut().filter(|s| s.status.is_occupied()) {
            slot.user_id = Some(reader.read_i32()?);
        }

        let host_id = reader.read_i32()?;

        let raw = reader.read_u8()?;
        let mode = Mode::from_u8(raw).ok_or(DecodeError::InvalidValue {
            field: "mode",
            value: i64::from(raw),
        })?;
        let raw = reader.read_u8()?;
        let scoring_type = ScoringType::from_u8(raw).ok_or(DecodeError::InvalidValue {
            field: "scoring type",
            value: i64::from(raw),
        })?;
        let raw = reader.read_u8()?;
        let team_type = TeamType::from_u8(raw).ok_or(DecodeError::InvalidValue {
            field: "team type",
            value: i64::from(raw),
        })?;

        let freemod = reader.read_bool()?;
        if freemod {
            for slot in slots.iter_mut() {
                slot.mods = Mods::from_wire(reader.read_i32()? as u32);
            }
        }

        let seed = reader.read_i32()?;

        Ok(Self {
            id,
            in_progress,
            mods,
            name,
            password,
            map_title,
            map_id,
            map_hash,
            slots,
            host_id,
            mode,
            scoring_type,
            team_type,
            freemod,
            seed,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_i16(self.id);
        writer.write_bool(self.in_progress);
        writer.write_u8(0);
        writer.write_u32(self.mods.bits());
        writer.write_string(&self.name);
        writer.write_string(&self.password);
        writer.write_string(&self.map_title);
        writer.write_i32(self.map_id);
        writer.write_string(&self.map_hash);

        for slot in &self.slots {
            writer.write_u8(slot.status as u8);
        }
        for slot in &self.slots {
            writer.write_u8(slot.team as u8);
        }
        for slot in self.slots.iter().filter(|s| s.status.is_occupied()) {
            writer.write_i32(slot.user_id.unwrap_or(0));
        }

        writer.write_i32(self.host_id);
        writer.write_u8(self.mode as u8);
        writer.write_u8(self.scoring_type as u8);
        writer.write_u8(self.team_type as u8);
        writer.write_bool(self.freemod);

        if self.freemod {
            for slot in &self.slots {
                writer.write_i32(slot.mods.bits() as i32);
            }
        }

        writer.write_i32(self.seed);
    }

    /// True when the record names a beatmap
    pub fn has_map(&self) -> bool {
        !self.map_hash.is_empty()
    }
}

/// Score-v2 portions appended to a [`ScoreFrame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreV2Portions {
    pub combo_portion: f64,
    pub bonus_portion: f64,
}

/// In-progress score snapshot sent during multiplayer play
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreFrame {
    pub time: i32,
    /// Slot index of the player, filled in by the server before relaying
    pub slot_id: u8,
    pub count_300: u16,
    pub count_100: u16,
    pub count_50: u16,
    pub count_geki: u16,
    pub count_katu: u16,
    pub count_miss: u16,
    pub total_score: i32,
    pub max_combo: u16,
    pub current_combo: u16,
    pub perfect: bool,
    pub current_hp: u8,
    pub tag_byte: u8,
    pub score_v2: Option<ScoreV2Portions>,
}

impl ScoreFrame {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let time = reader.read_i32()?;
        let slot_id = reader.read_u8()?;
        let count_300 = reader.read_u16()?;
        let count_100 = reader.read_u16()?;
        let count_50 = reader.read_u16()?;
        let count_geki = reader.read_u16()?;
        let count_katu = reader.read_u16()?;
        let count_miss = reader.read_u16()?;
        let total_score = reader.read_i32()?;
        let max_combo = reader.read_u16()?;
        let current_combo = reader.read_u16()?;
        let perfect = reader.read_bool()?;
        let current_hp = reader.read_u8()?;
        let tag_byte = reader.read_u8()?;

        let score_v2 = if reader.read_bool()? {
            Some(ScoreV2Portions {
                combo_portion: reader.read_f64()?,
                bonus_portion: reader.read_f64()?,
            })
        } else {
            None
        };

        Ok(Self {
            time,
            slot_id,
            count_300,
            count_100,
            count_50,
            count_geki,
            count_katu,
            count_miss,
            total_score,
            max_combo,
            current_combo,
            perfect,
            current_hp,
            tag_byte,
            score_v2,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.time);
        writer.write_u8(self.slot_id);
        writer.write_u16(self.count_300);
        writer.write_u16(self.count_100);
        writer.write_u16(self.count_50);
        writer.write_u16(self.count_geki);
        writer.write_u16(self.count_katu);
        writer.write_u16(self.count_miss);
        writer.write_i32(self.total_score);
        writer.write_u16(self.max_combo);
        writer.write_u16(self.current_combo);
        writer.write_bool(self.perfect);
        writer.write_u8(self.current_hp);
        writer.write_u8(self.tag_byte);
        writer.write_bool(self.score_v2.is_some());

        if let Some(v2) = self.score_v2 {
            writer.write_f64(v2.combo_portion);
            writer.write_f64(v2.bonus_portion);
        }
    }
}

/// Public identity of a player
#[derive(Debug, Clone, PartialEq)]
pub struct UserPresence {
    pub user_id: i32,
    pub username: String,
    pub utc_offset: i8,
    pub country_code: u8,
    pub rank_bits: u8,
    pub longitude: f32,
    pub latitude: f32,
    pub global_rank: i32,
}

impl UserPresence {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            user_id: reader.read_i32()?,
            username: reader.read_string()?,
            utc_offset: (i16::from(reader.read_u8()?) - 24) as i8,
            country_code: reader.read_u8()?,
            rank_bits: reader.read_u8()?,
            longitude: reader.read_f32()?,
            latitude: reader.read_f32()?,
            global_rank: reader.read_i32()?,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.user_id);
        writer.write_string(&self.username);
        // Offset travels shifted by 24 so it fits an unsigned byte
        writer.write_u8((i16::from(self.utc_offset) + 24).clamp(0, 255) as u8);
        writer.write_u8(self.country_code);
        writer.write_u8(self.rank_bits);
        writer.write_f32(self.longitude);
        writer.write_f32(self.latitude);
        writer.write_i32(self.global_rank);
    }
}

/// Status and ranking statistics of a player
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user_id: i32,
    pub action: ActionStatus,
    pub status_text: String,
    pub map_hash: String,
    pub mods: Mods,
    pub mode: Mode,
    pub map_id: i32,
    pub ranked_score: i64,
    /// Accuracy as a fraction in `0.0..=1.0`
    pub accuracy: f32,
    pub play_count: i32,
    pub total_score: i64,
    pub global_rank: i32,
    pub pp: i16,
}

impl UserStats {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let user_id = reader.read_i32()?;
        let action = ActionStatus::from_u8(reader.read_u8()?);
        let status_text = reader.read_string()?;
        let map_hash = reader.read_string()?;
        let mods = Mods::from_wire(reader.read_i32()? as u32);
        let raw = reader.read_u8()?;
        let mode = Mode::from_u8(raw).ok_or(DecodeError::InvalidValue {
            field: "mode",
            value: i64::from(raw),
        })?;

        Ok(Self {
            user_id,
            action,
            status_text,
            map_hash,
            mods,
            mode,
            map_id: reader.read_i32()?,
            ranked_score: reader.read_i64()?,
            accuracy: reader.read_f32()?,
            play_count: reader.read_i32()?,
            total_score: reader.read_i64()?,
            global_rank: reader.read_i32()?,
            pp: reader.read_i16()?,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.user_id);
        writer.write_u8(self.action as u8);
        writer.write_string(&self.status_text);
        writer.write_string(&self.map_hash);
        writer.write_i32(self.mods.bits() as i32);
        writer.write_u8(self.mode as u8);
        writer.write_i32(self.map_id);
        writer.write_i64(self.ranked_score);
        writer.write_f32(self.accuracy);
        writer.write_i32(self.play_count);
        writer.write_i64(self.total_score);
        writer.write_i32(self.global_rank);
        writer.write_i16(self.pp);
    }
}

/// Chat message, used for both public and private delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    /// Channel display name or recipient username
    pub target: String,
    pub sender_id: i32,
}

impl ChatMessage {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            sender: reader.read_string()?,
            text: reader.read_string()?,
            target: reader.read_string()?,
            sender_id: reader.read_i32()?,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_string(&self.sender);
        writer.write_string(&self.text);
        writer.write_string(&self.target);
        writer.write_i32(self.sender_id);
    }
}

/// Channel listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: String,
    pub user_count: i32,
}

impl ChannelInfo {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            topic: reader.read_string()?,
            user_count: reader.read_i32()?,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_string(&self.name);
        writer.write_string(&self.topic);
        writer.write_i32(self.user_count);
    }
}

/// Payload of the client's change-action packet
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusChange {
    pub action: ActionStatus,
    pub text: String,
    pub map_hash: String,
    pub mods: Mods,
    pub mode: Mode,
    pub map_id: i32,
}

impl StatusChange {
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let action = ActionStatus::from_u8(reader.read_u8()?);
        let text = reader.read_string()?;
        let map_hash = reader.read_string()?;
        let mods = Mods::from_wire(reader.read_u32()?);
        let raw = reader.read_u8()?;
        let mode = Mode::from_u8(raw).ok_or(DecodeError::InvalidValue {
            field: "mode",
            value: i64::from(raw),
        })?;
        let map_id = reader.read_i32()?;

        Ok(Self {
            action,
            text,
            map_hash,
            mods,
            mode,
            map_id,
        })
    }

    pub fn encode(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.action as u8);
        writer.write_string(&self.text);
        writer.write_string(&self.map_hash);
        writer.write_u32(self.mods.bits());
        writer.write_u8(self.mode as u8);
        writer.write_i32(self.map_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::HEADER_LEN;
    use assert_approx_eq::assert_approx_eq;

    fn encoded<F: FnOnce(&mut PacketWriter)>(f: F) -> Vec<u8> {
        let mut writer = PacketWriter::new(0u16);
        f(&mut writer);
        writer.finish()[HEADER_LEN..].to_vec()
    }

    fn sample_match() -> MatchRecord {
        let mut record = MatchRecord {
            id: 1000,
            name: "weekend lobby".to_string(),
            password: "hunter2".to_string(),
            map_title: "Artist - Title [Insane]".to_string(),
            map_id: 315,
            map_hash: "abc123".to_string(),
            host_id: 3,
            mode: Mode::Taiko,
            scoring_type: ScoringType::Accuracy,
            team_type: TeamType::TeamVs,
            seed: 77,
            ..MatchRecord::default()
        };
        record.slots[0] = SlotRecord {
            status: SlotStatus::Ready,
            team: SlotTeam::Red,
            user_id: Some(3),
            mods: Mods::empty(),
        };
        record.slots[4] = SlotRecord {
            status: SlotStatus::NoMap,
            team: SlotTeam::Blue,
            user_id: Some(9),
            mods: Mods::empty(),
        };
        record.slots[15].status = SlotStatus::Locked;
        record
    }

    #[test]
    fn test_match_record_layout() {
        let bytes = encoded(|w| sample_match().encode(w));

        assert_eq!(&bytes[0..2], &1000i16.to_le_bytes());
        assert_eq!(bytes[2], 0); // in progress
        assert_eq!(bytes[3], 0); // type byte
        assert_eq!(&bytes[bytes.len() - 4..], &77i32.to_le_bytes());
    }

    #[test]
    fn test_match_record_roundtrip_with_occupants() {
        let record = sample_match();
        let bytes = encoded(|w| record.encode(w));

        let decoded = MatchRecord::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.slots[4].user_id, Some(9));
        assert_eq!(decoded.slots[1].user_id, None);
    }

    #[test]
    fn test_match_record_freemod_carries_slot_mods() {
        let mut record = sample_match();
        record.freemod = true;
        record.slots[0].mods = Mods::HIDDEN | Mods::HARD_ROCK;

        let plain_len = encoded(|w| sample_match().encode(w)).len();
        let bytes = encoded(|w| record.encode(w));
        assert_eq!(bytes.len(), plain_len + MATCH_SLOTS * 4);

        let decoded = MatchRecord::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(decoded.slots[0].mods, Mods::HIDDEN | Mods::HARD_ROCK);
    }

    #[test]
    fn test_match_record_truncated() {
        let bytes = encoded(|w| sample_match().encode(w));
        for cut in [1, 10, bytes.len() / 2, bytes.len() - 1] {
            assert!(MatchRecord::decode(&mut PacketReader::new(&bytes[..cut])).is_err());
        }
    }

    #[test]
    fn test_match_record_rejects_unknown_mode() {
        let mut bytes = encoded(|w| sample_match().encode(w));
        // mode byte sits before scoring, team type, freemod and the seed
        let mode_at = bytes.len() - 4 - 4;
        bytes[mode_at] = 9;

        assert_eq!(
            MatchRecord::decode(&mut PacketReader::new(&bytes)),
            Err(DecodeError::InvalidValue {
                field: "mode",
                value: 9
            })
        );
    }

    #[test]
    fn test_score_frame_with_v2_portions() {
        let frame = ScoreFrame {
            time: 52_000,
            count_300: 412,
            count_100: 12,
            count_miss: 1,
            total_score: 1_250_000,
            max_combo: 390,
            current_combo: 101,
            current_hp: 200,
            score_v2: Some(ScoreV2Portions {
                combo_portion: 0.75,
                bonus_portion: 12.5,
            }),
            ..ScoreFrame::default()
        };

        let bytes = encoded(|w| frame.encode(w));
        assert_eq!(bytes.len(), 29 + 16);

        let decoded = ScoreFrame::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_score_frame_without_v2_is_29_bytes() {
        let bytes = encoded(|w| ScoreFrame::default().encode(w));
        assert_eq!(bytes.len(), 29);
    }

    #[test]
    fn test_presence_offset_and_coordinates() {
        let presence = UserPresence {
            user_id: 3,
            username: "peppy".to_string(),
            utc_offset: -5,
            country_code: 38,
            rank_bits: 1,
            longitude: 151.2093,
            latitude: -33.8688,
            global_rank: 12,
        };

        let bytes = encoded(|w| presence.encode(w));
        let decoded = UserPresence::decode(&mut PacketReader::new(&bytes)).unwrap();

        assert_eq!(decoded.utc_offset, -5);
        assert_approx_eq!(decoded.longitude, 151.2093, 1e-4);
        assert_approx_eq!(decoded.latitude, -33.8688, 1e-4);
    }

    #[test]
    fn test_stats_accuracy_fraction() {
        let stats = UserStats {
            user_id: 3,
            action: ActionStatus::Playing,
            status_text: "Freedom Dive".to_string(),
            map_hash: "f00d".to_string(),
            mods: Mods::HIDDEN,
            mode: Mode::Osu,
            map_id: 129_891,
            ranked_score: 1_000_000,
            accuracy: 0.9875,
            play_count: 40,
            total_score: 2_000_000,
            global_rank: 7,
            pp: 4200,
        };

        let bytes = encoded(|w| stats.encode(w));
        let decoded = UserStats::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_approx_eq!(decoded.accuracy, 0.9875, 1e-6);
        assert_eq!(decoded.pp, 4200);
        assert_eq!(decoded.action, ActionStatus::Playing);
    }

    #[test]
    fn test_status_change_fields() {
        let change = StatusChange {
            action: ActionStatus::Playing,
            text: "Some Song".to_string(),
            map_hash: "abc".to_string(),
            mods: Mods::DOUBLE_TIME,
            mode: Mode::Mania,
            map_id: 11,
        };

        let bytes = encoded(|w| change.encode(w));
        assert_eq!(StatusChange::decode(&mut PacketReader::new(&bytes)).unwrap(), change);
    }
}
