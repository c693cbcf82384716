//! Protocol enums and bit sets shared by the codec and the server

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Per-slot state inside a multiplayer match
///
/// The wire values are single bits, but a slot is in exactly one state at a
/// time; use [`SlotStatus::is_occupied`] instead of masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SlotStatus {
    #[default]
    Open = 1,
    Locked = 2,
    NotReady = 4,
    Ready = 8,
    NoMap = 16,
    Playing = 32,
    Complete = 64,
    Quit = 128,
}

impl SlotStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Open,
            2 => Self::Locked,
            4 => Self::NotReady,
            8 => Self::Ready,
            16 => Self::NoMap,
            32 => Self::Playing,
            64 => Self::Complete,
            128 => Self::Quit,
            _ => return None,
        })
    }

    /// True when a session sits in the slot
    pub fn is_occupied(self) -> bool {
        matches!(
            self,
            Self::NotReady | Self::Ready | Self::NoMap | Self::Playing | Self::Complete
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SlotTeam {
    #[default]
    Neutral = 0,
    Blue = 1,
    Red = 2,
}

impl SlotTeam {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Neutral,
            1 => Self::Blue,
            2 => Self::Red,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TeamType {
    #[default]
    HeadToHead = 0,
    TagCoop = 1,
    TeamVs = 2,
    TagTeamVs = 3,
}

impl TeamType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::HeadToHead,
            1 => Self::TagCoop,
            2 => Self::TeamVs,
            3 => Self::TagTeamVs,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScoringType {
    #[default]
    Score = 0,
    Accuracy = 1,
    Combo = 2,
    ScoreV2 = 3,
}

impl ScoringType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Score,
            1 => Self::Accuracy,
            2 => Self::Combo,
            3 => Self::ScoreV2,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Accuracy => "acc",
            Self::Combo => "combo",
            Self::ScoreV2 => "sv2",
        }
    }

    /// Parses the short names used by chat commands
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "score" => Self::Score,
            "acc" => Self::Accuracy,
            "combo" => Self::Combo,
            "sv2" => Self::ScoreV2,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Osu = 0,
    Taiko = 1,
    Catch = 2,
    Mania = 3,
}

impl Mode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Osu,
            1 => Self::Taiko,
            2 => Self::Catch,
            3 => Self::Mania,
            _ => return None,
        })
    }
}

/// What a player is currently doing, shown next to their name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionStatus {
    #[default]
    Idle = 0,
    Afk = 1,
    Playing = 2,
    Editing = 3,
    Modding = 4,
    Multiplayer = 5,
    Watching = 6,
    Unknown = 7,
    Testing = 8,
    Submitting = 9,
    Paused = 10,
    Lobby = 11,
    Multiplaying = 12,
    OsuDirect = 13,
}

impl ActionStatus {
    /// Unrecognised values collapse to [`ActionStatus::Unknown`]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Afk,
            2 => Self::Playing,
            3 => Self::Editing,
            4 => Self::Modding,
            5 => Self::Multiplayer,
            6 => Self::Watching,
            8 => Self::Testing,
            9 => Self::Submitting,
            10 => Self::Paused,
            11 => Self::Lobby,
            12 => Self::Multiplaying,
            13 => Self::OsuDirect,
            _ => Self::Unknown,
        }
    }
}

bitflags! {
    /// Gameplay modifiers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mods: u32 {
        const NO_FAIL = 1 << 0;
        const EASY = 1 << 1;
        const TOUCH_DEVICE = 1 << 2;
        const HIDDEN = 1 << 3;
        const HARD_ROCK = 1 << 4;
        const SUDDEN_DEATH = 1 << 5;
        const DOUBLE_TIME = 1 << 6;
        const RELAX = 1 << 7;
        const HALF_TIME = 1 << 8;
        const NIGHTCORE = 1 << 9;
        const FLASHLIGHT = 1 << 10;
        const AUTOPLAY = 1 << 11;
        const SPUN_OUT = 1 << 12;
        const AUTOPILOT = 1 << 13;
        const PERFECT = 1 << 14;
        const KEY4 = 1 << 15;
        const KEY5 = 1 << 16;
        const KEY6 = 1 << 17;
        const KEY7 = 1 << 18;
        const KEY8 = 1 << 19;
        const FADE_IN = 1 << 20;
        const RANDOM = 1 << 21;
        const CINEMA = 1 << 22;
        const TARGET = 1 << 23;
        const KEY9 = 1 << 24;
        const KEY_COOP = 1 << 25;
        const KEY1 = 1 << 26;
        const KEY3 = 1 << 27;
        const KEY2 = 1 << 28;
        const SCORE_V2 = 1 << 29;
        const MIRROR = 1 << 30;

        /// Speed mods that stay match-wide under free-mod
        const MULTIPLAYER = Self::DOUBLE_TIME.bits() | Self::NIGHTCORE.bits() | Self::HALF_TIME.bits();
    }
}

impl Mods {
    /// Keeps unknown bits so relayed values survive untouched
    pub fn from_wire(value: u32) -> Self {
        Self::from_bits_retain(value)
    }
}

bitflags! {
    /// Server-side account privileges
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Privileges: u32 {
        const BANNED = 1 << 0;
        const USER = 1 << 1;
        const VERIFIED = 1 << 2;
        const SUPPORTER = 1 << 3;
        const BAT = 1 << 4;
        const MODERATOR = 1 << 5;
        const ADMIN = 1 << 6;
        const DEVELOPER = 1 << 7;
        const PENDING = 1 << 8;

        const STAFF = Self::MODERATOR.bits() | Self::ADMIN.bits() | Self::DEVELOPER.bits();
    }
}

bitflags! {
    /// Rank bits the client uses to colour names
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClientRank: u8 {
        const NORMAL = 1 << 0;
        const BAT = 1 << 1;
        const SUPPORTER = 1 << 2;
        const FRIEND = 1 << 3;
        const PEPPY = 1 << 4;
        const TOURNAMENT = 1 << 5;
    }
}

impl ClientRank {
    /// Derives the displayed rank from account privileges
    pub fn from_privileges(privileges: Privileges) -> Self {
        let mut rank = ClientRank::empty();

        if privileges.contains(Privileges::VERIFIED) {
            rank |= ClientRank::NORMAL;
        }
        if privileges.contains(Privileges::BAT) {
            rank |= ClientRank::BAT;
        }
        if privileges.contains(Privileges::SUPPORTER) {
            rank |= ClientRank::SUPPORTER;
        }
        if privileges.intersects(Privileges::MODERATOR | Privileges::ADMIN) {
            rank |= ClientRank::FRIEND;
        }
        if privileges.contains(Privileges::DEVELOPER) {
            rank |= ClientRank::PEPPY;
        }

        rank
    }
}
