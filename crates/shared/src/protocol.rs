use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{BlockId, CandidateClass, Format, MinuteOffsetSelection, RoomId, ScheduleSlot},
    error::WorkflowError,
};

/// Linear progression of a run; each step is one committed remote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Unauthenticated,
    Authenticated,
    ImportSelected,
    BlockRenamed,
    SlotsScheduled { attempted: usize },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub label: String,
    pub class: CandidateClass,
    pub format: Format,
    pub film_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub block_id: BlockId,
    pub previous_name: String,
    pub new_name: String,
    /// Playlist cue the new feature was placed under.
    pub content_marker: String,
    /// Other blocks that carried the same format tag; non-empty means the device
    /// was in an unexpected state and the lowest identifier was used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_matches: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SlotOutcome {
    Pending,
    Committed { attempts: u32 },
    Failed { error: WorkflowError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReport {
    pub weekday: Weekday,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub close_lamp: bool,
    #[serde(flatten)]
    pub outcome: SlotOutcome,
}

impl SlotReport {
    pub fn pending(slot: ScheduleSlot, date: NaiveDate) -> Self {
        Self {
            weekday: slot.weekday,
            date,
            start: slot.start,
            close_lamp: slot.close_lamp,
            outcome: SlotOutcome::Pending,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, SlotOutcome::Committed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub room_id: RoomId,
    pub room_name: String,
    pub offset: MinuteOffsetSelection,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockReport>,
    pub slots: Vec<SlotReport>,
    pub state: WorkflowState,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn committed_weekdays(&self) -> Vec<Weekday> {
        self.slots
            .iter()
            .filter(|slot| slot.is_committed())
            .map(|slot| slot.weekday)
            .collect()
    }

    pub fn failed_weekdays(&self) -> Vec<Weekday> {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.outcome, SlotOutcome::Failed { .. }))
            .map(|slot| slot.weekday)
            .collect()
    }
}
