use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use client_core::{AbortFlag, HttpConnector, Orchestrator, WorkflowSettings};
use planner::WeekWindow;
use shared::{
    domain::{MinuteOffsetSelection, Room, RoomId},
    protocol::{RunReport, RunStatus, SlotOutcome},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_PARTIAL: u8 = 2;

/// Imports this week's feature on a room's projector, renames its block and
/// books the week's showtimes.
#[derive(Parser, Debug)]
#[command(name = "operator", version)]
struct Args {
    /// Room to run (repeatable). Defaults to every configured room.
    #[arg(long = "room", value_name = "ID")]
    rooms: Vec<i64>,
    /// Feature start: 0 = on the hour, 1 = quarter past, 2 = half past.
    #[arg(long)]
    offset: u8,
    /// First day of the booked week, a Friday (DD/MM/YYYY or YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    week_start: Option<NaiveDate>,
    /// Config file; defaults to ./operator.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the run reports as JSON instead of a summary.
    #[arg(long)]
    json: bool,
    /// Playback volume, overriding configuration.
    #[arg(long)]
    volume: Option<u8>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| format!("'{raw}' is not a date (expected DD/MM/YYYY)"))
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries only the reports
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %format!("{err:#}"), "operator: nothing was run");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run(args: Args) -> Result<u8> {
    let settings = load_settings(args.config.as_deref())?;
    let offset = MinuteOffsetSelection::try_from(args.offset)?;
    let week = match args.week_start {
        Some(date) => WeekWindow::starting(date)?,
        None => WeekWindow::following(Local::now().naive_local()),
    };
    let rooms = select_rooms(&settings, &args.rooms)?;

    let mut workflow = WorkflowSettings::new(week);
    workflow.volume = args.volume.unwrap_or(settings.volume);
    workflow.scan_limit = settings.scan_limit;
    if workflow.volume > 100 {
        return Err(anyhow!("volume {} is outside 0..=100", workflow.volume));
    }

    let abort = AbortFlag::new();
    spawn_abort_on_ctrl_c(abort.clone());

    let orchestrator = Orchestrator::new(
        Arc::new(HttpConnector::new(settings.connector_options())),
        workflow,
    )
    .with_abort_flag(abort.clone());

    info!(
        rooms = rooms.len(),
        %offset,
        week_start = %week.start(),
        week_end = %week.end(),
        volume = orchestrator.settings().volume,
        "operator: starting"
    );

    let mut reports = Vec::with_capacity(rooms.len());
    for room in rooms {
        if abort.is_aborted() {
            warn!(room_id = room.id.0, "operator: abort requested, room skipped");
            break;
        }
        reports.push(orchestrator.run(room, offset).await);
    }

    if args.json {
        println!("{}", render_json(&reports)?);
    } else {
        for report in &reports {
            println!("{}", render_summary(report));
        }
    }

    Ok(exit_code(&reports))
}

fn select_rooms<'a>(settings: &'a Settings, requested: &[i64]) -> Result<Vec<&'a Room>> {
    if requested.is_empty() {
        return Ok(settings.rooms.iter().collect());
    }
    requested
        .iter()
        .map(|&id| {
            settings.room(RoomId(id)).ok_or_else(|| {
                let known: Vec<String> = settings.rooms.iter().map(|r| r.id.to_string()).collect();
                anyhow!("unknown room {id} (configured: {})", known.join(", "))
            })
        })
        .collect()
}

fn spawn_abort_on_ctrl_c(abort: AbortFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("operator: interrupt received, stopping after the current action");
            abort.abort();
        }
    });
}

fn render_json(reports: &[RunReport]) -> Result<String> {
    serde_json::to_string_pretty(reports).context("failed to encode run reports")
}

/// 0 when every room fully succeeded, 2 when the worst outcome is a partial
/// schedule, 1 otherwise.
fn exit_code(reports: &[RunReport]) -> u8 {
    if reports.is_empty() {
        return EXIT_FAILED;
    }
    if reports
        .iter()
        .any(|report| matches!(report.status, RunStatus::Failed | RunStatus::Aborted))
    {
        EXIT_FAILED
    } else if reports
        .iter()
        .any(|report| report.status == RunStatus::PartialSuccess)
    {
        EXIT_PARTIAL
    } else {
        EXIT_SUCCESS
    }
}

fn render_summary(report: &RunReport) -> String {
    let mut lines = vec![format!(
        "Room {} ({}) week {} to {}: {}",
        report.room_id,
        report.room_name,
        report.week_start.format("%d/%m/%Y"),
        report.week_end.format("%d/%m/%Y"),
        status_label(report.status)
    )];

    if let Some(import) = &report.import {
        lines.push(format!(
            "  import: {} ({}, {:?})",
            import.label, import.format, import.class
        ));
    }
    if let Some(block) = &report.block {
        lines.push(format!(
            "  block {}: '{}' -> '{}'",
            block.block_id, block.previous_name, block.new_name
        ));
        if !block.other_matches.is_empty() {
            let others: Vec<String> = block.other_matches.iter().map(ToString::to_string).collect();
            lines.push(format!("  other matching blocks: {}", others.join(", ")));
        }
    }
    for slot in &report.slots {
        let outcome = match &slot.outcome {
            SlotOutcome::Pending => "not attempted".to_string(),
            SlotOutcome::Committed { attempts } => format!("booked ({attempts} attempt(s))"),
            SlotOutcome::Failed { error } => format!("FAILED: {error}"),
        };
        lines.push(format!(
            "  {} {} {}: {}",
            slot.weekday,
            slot.date.format("%d/%m"),
            slot.start.format("%H:%M"),
            outcome
        ));
    }
    if let Some(error) = &report.error {
        lines.push(format!("  {} error: {error}", error.kind()));
    }
    lines.join("\n")
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::PartialSuccess => "partial success",
        RunStatus::Failed => "failed",
        RunStatus::Aborted => "aborted",
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
