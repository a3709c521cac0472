use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use shared::{
    domain::{MinuteOffsetSelection, ScheduleSlot},
    error::WorkflowError,
};

/// Show days in commit order. Monday and Tuesday are dark.
pub const SHOW_DAYS: [Weekday; 5] = [
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
    Weekday::Wed,
    Weekday::Thu,
];

const EVENING_BASE_HOUR: u32 = 18;
const AFTERNOON_BASE_HOUR: u32 = 12;

/// `(hour carry, minute)` per offset selection. Slots open ten minutes before
/// the feature so the pre-show runs first.
const START_TABLE: [(u32, u32); 3] = [(0, 50), (1, 5), (1, 20)];

fn base_hour(weekday: Weekday) -> u32 {
    match weekday {
        Weekday::Sat | Weekday::Sun => AFTERNOON_BASE_HOUR,
        _ => EVENING_BASE_HOUR,
    }
}

fn start_time(weekday: Weekday, offset: MinuteOffsetSelection) -> NaiveTime {
    let (carry, minute) = START_TABLE[offset.index()];
    let hour = base_hour(weekday) + carry;
    NaiveTime::default() + Duration::minutes(i64::from(hour * 60 + minute))
}

pub fn weekly_slots(offset: MinuteOffsetSelection) -> Vec<ScheduleSlot> {
    SHOW_DAYS
        .iter()
        .map(|&weekday| ScheduleSlot {
            weekday,
            start: start_time(weekday, offset),
            close_lamp: true,
        })
        .collect()
}

/// Same as [`weekly_slots`] for a raw menu value.
pub fn weekly_slots_for(selection: u8) -> Result<Vec<ScheduleSlot>, WorkflowError> {
    MinuteOffsetSelection::try_from(selection).map(weekly_slots)
}

/// The Friday-to-Thursday week the slots are booked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    start: NaiveDate,
}

impl WeekWindow {
    pub fn starting(start: NaiveDate) -> Result<Self, WorkflowError> {
        if start.weekday() != Weekday::Fri {
            return Err(WorkflowError::InvalidWeekStart {
                date: start,
                weekday: start.weekday(),
            });
        }
        Ok(Self { start })
    }

    /// The coming Friday; on a Friday afternoon that week is considered
    /// started and the next one is returned.
    pub fn following(now: NaiveDateTime) -> Self {
        let today = now.date();
        let mut days_ahead =
            (Weekday::Fri.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
        if days_ahead == 0 && now.hour() >= 12 {
            days_ahead = 7;
        }
        Self {
            start: today + Duration::days(i64::from(days_ahead)),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(6)
    }

    pub fn date_of(&self, weekday: Weekday) -> NaiveDate {
        let days = (weekday.num_days_from_monday() + 7 - Weekday::Fri.num_days_from_monday()) % 7;
        self.start + Duration::days(i64::from(days))
    }
}
