use std::fmt;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(RoomId);
id_newtype!(BlockId);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A physical theatre whose projector exposes its own control plane.
///
/// `name` is the prefix used in canonical block names (e.g. `Brunet`).
/// `content_marker` is the playlist cue the feature follows inside this room's
/// blocks (e.g. `DCI_XYZ_FLAT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub base_url: String,
    pub credentials: Credentials,
    pub content_marker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Scope,
    Flat,
}

impl Format {
    /// Single-letter tag used in canonical block names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Scope => "S",
            Self::Flat => "F",
        }
    }

    /// Lower-case markers a block title carries when it is set up for this format.
    pub fn block_markers(self) -> &'static [&'static str] {
        match self {
            Self::Scope => &["-s-", "- s -"],
            Self::Flat => &["-f-", "- f -"],
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope => f.write_str("scope"),
            Self::Flat => f.write_str("flat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateClass {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCandidate {
    pub label: String,
    pub class: CandidateClass,
    /// Preference inside the class, lower is better.
    pub rank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
}

impl Block {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: BlockId(id),
            name: name.into(),
        }
    }

    pub fn title(&self) -> &str {
        self.name.lines().next().unwrap_or_default()
    }

    pub fn is_tagged(&self, format: Format) -> bool {
        let title = self.title().to_lowercase();
        format
            .block_markers()
            .iter()
            .any(|marker| title.contains(marker))
    }

    /// The format this block is set up for, when its title carries exactly one tag.
    pub fn suffix_tag(&self) -> Option<Format> {
        match (self.is_tagged(Format::Scope), self.is_tagged(Format::Flat)) {
            (true, false) => Some(Format::Scope),
            (false, true) => Some(Format::Flat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MinuteOffsetSelection {
    OnTheHour,
    QuarterPast,
    HalfPast,
}

impl MinuteOffsetSelection {
    pub const ALL: [Self; 3] = [Self::OnTheHour, Self::QuarterPast, Self::HalfPast];

    pub fn index(self) -> usize {
        match self {
            Self::OnTheHour => 0,
            Self::QuarterPast => 1,
            Self::HalfPast => 2,
        }
    }

    /// Minute of the hour the feature itself starts at.
    pub fn feature_minute(self) -> u32 {
        match self {
            Self::OnTheHour => 0,
            Self::QuarterPast => 15,
            Self::HalfPast => 30,
        }
    }
}

impl TryFrom<u8> for MinuteOffsetSelection {
    type Error = WorkflowError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::OnTheHour),
            1 => Ok(Self::QuarterPast),
            2 => Ok(Self::HalfPast),
            value => Err(WorkflowError::InvalidOffsetSelection { value }),
        }
    }
}

impl From<MinuteOffsetSelection> for u8 {
    fn from(value: MinuteOffsetSelection) -> Self {
        value.index() as u8
    }
}

impl fmt::Display for MinuteOffsetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{:02}", self.feature_minute())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub close_lamp: bool,
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weekday, self.start.format("%H:%M"))
    }
}

/// Swaps the feature of a block: whatever follows `marker` in the block's
/// playlist is removed and the package `label` is put in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSwap {
    pub block_id: BlockId,
    pub marker: String,
    pub label: String,
}

/// Everything the control plane needs to book one showtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCommit {
    pub block_id: BlockId,
    pub block_title: String,
    pub date: NaiveDate,
    pub slot: ScheduleSlot,
}
