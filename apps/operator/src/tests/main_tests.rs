use super::*;

use chrono::{NaiveTime, Utc, Weekday};
use shared::{
    domain::{BlockId, CandidateClass, Credentials, Format, ScheduleSlot},
    error::WorkflowError,
    protocol::{BlockReport, ImportReport, SlotReport, WorkflowState},
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn report(status: RunStatus) -> RunReport {
    let slot = ScheduleSlot {
        weekday: Weekday::Fri,
        start: NaiveTime::from_hms_opt(18, 50, 0).expect("time"),
        close_lamp: true,
    };
    let mut committed = SlotReport::pending(slot, date(2026, 2, 6));
    committed.outcome = SlotOutcome::Committed { attempts: 1 };
    let mut failed = SlotReport::pending(
        ScheduleSlot {
            weekday: Weekday::Sun,
            start: NaiveTime::from_hms_opt(12, 50, 0).expect("time"),
            close_lamp: true,
        },
        date(2026, 2, 8),
    );
    failed.outcome = SlotOutcome::Failed {
        error: WorkflowError::SlotCommitFailed {
            weekday: Weekday::Sun,
            attempts: 3,
            message: "control plane not ready: busy".into(),
        },
    };

    RunReport {
        room_id: RoomId(3),
        room_name: "Brunet".into(),
        offset: MinuteOffsetSelection::OnTheHour,
        week_start: date(2026, 2, 6),
        week_end: date(2026, 2, 12),
        import: Some(ImportReport {
            label: "Mercy_S_QFC".into(),
            class: CandidateClass::Primary,
            format: Format::Scope,
            film_name: "Mercy".into(),
        }),
        block: Some(BlockReport {
            block_id: BlockId(31),
            previous_name: "Brunet - S - Wicked".into(),
            new_name: "Brunet - S - Mercy".into(),
            content_marker: "DCI_XYZ_FLAT".into(),
            other_matches: vec![BlockId(40)],
        }),
        slots: vec![committed, failed],
        state: WorkflowState::Complete,
        status,
        error: None,
        started_at: Utc::now(),
        finished_at: Utc::now(),
    }
}

fn settings() -> Settings {
    config::resolve_settings(None, |key| {
        (key == "BARCO_PASSWORD").then(|| "secret".to_string())
    })
    .expect("settings")
}

#[test]
fn exit_code_reflects_worst_outcome() {
    assert_eq!(exit_code(&[report(RunStatus::Success)]), 0);
    assert_eq!(
        exit_code(&[report(RunStatus::Success), report(RunStatus::PartialSuccess)]),
        2
    );
    assert_eq!(
        exit_code(&[report(RunStatus::PartialSuccess), report(RunStatus::Failed)]),
        1
    );
    assert_eq!(exit_code(&[report(RunStatus::Aborted)]), 1);
    assert_eq!(exit_code(&[]), 1);
}

#[test]
fn summary_lists_block_and_each_slot() {
    let summary = render_summary(&report(RunStatus::PartialSuccess));
    let lines: Vec<&str> = summary.lines().collect();

    assert_eq!(
        lines[0],
        "Room 3 (Brunet) week 06/02/2026 to 12/02/2026: partial success"
    );
    assert!(summary.contains("block 31: 'Brunet - S - Wicked' -> 'Brunet - S - Mercy'"));
    assert!(summary.contains("other matching blocks: 40"));
    assert!(summary.contains("Fri 06/02 18:50: booked (1 attempt(s))"));
    assert!(summary.contains("Sun 08/02 12:50: FAILED: Sun slot commit failed after 3 attempt(s)"));
}

#[test]
fn json_output_is_an_array_of_reports() {
    let mut aborted = report(RunStatus::Aborted);
    aborted.error = Some(WorkflowError::Aborted {
        state: WorkflowState::BlockRenamed,
    });

    let rendered = render_json(&[report(RunStatus::PartialSuccess), aborted]).expect("json");
    let value: serde_json::Value = serde_json::from_str(&rendered).expect("valid json");

    assert_eq!(value[0]["status"], "partial_success");
    assert_eq!(value[0]["block"]["content_marker"], "DCI_XYZ_FLAT");
    assert_eq!(value[1]["status"], "aborted");
    assert_eq!(value[1]["error"]["code"], "aborted");
}

#[test]
fn summary_names_the_error_kind() {
    let mut failed = report(RunStatus::Failed);
    failed.error = Some(WorkflowError::NoImportAvailable);
    assert!(render_summary(&failed).contains("  precondition error: "));
}

#[test]
fn dates_parse_in_both_notations() {
    assert_eq!(parse_date("06/02/2026"), Ok(date(2026, 2, 6)));
    assert_eq!(parse_date("2026-02-06"), Ok(date(2026, 2, 6)));
    assert!(parse_date("6 feb").is_err());
}

#[test]
fn rooms_default_to_all_configured() {
    let settings = settings();
    let rooms = select_rooms(&settings, &[]).expect("rooms");
    assert_eq!(
        rooms.iter().map(|room| room.id).collect::<Vec<_>>(),
        vec![RoomId(2), RoomId(3)]
    );

    let rooms = select_rooms(&settings, &[3]).expect("rooms");
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name, "Brunet");
    assert_eq!(
        rooms[0].credentials,
        Credentials {
            username: "admin".into(),
            password: "secret".into()
        }
    );
}

#[test]
fn unknown_room_is_rejected() {
    let err = select_rooms(&settings(), &[7]).expect_err("unknown room");
    assert!(err.to_string().contains("unknown room 7"), "got {err}");
}

#[test]
fn cli_requires_offset_and_accepts_repeated_rooms() {
    let args = Args::try_parse_from([
        "operator",
        "--offset",
        "1",
        "--room",
        "2",
        "--room",
        "3",
        "--week-start",
        "06/02/2026",
        "--json",
    ])
    .expect("args");
    assert_eq!(args.offset, 1);
    assert_eq!(args.rooms, vec![2, 3]);
    assert_eq!(args.week_start, Some(date(2026, 2, 6)));
    assert!(args.json);

    assert!(Args::try_parse_from(["operator", "--room", "2"]).is_err());
}
