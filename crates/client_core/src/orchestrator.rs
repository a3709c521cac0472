//! Drives one room's control plane from login to a booked week.
//!
//! Everything that can be decided locally (which film, which block, its new
//! name, the slots) is decided before the first commit, so a precondition
//! failure never leaves a half-configured device behind. Remote actions are
//! then committed one at a time with bounded retries.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use planner::{
    compose_block_name, detect_import, discover_candidates, select_block, weekly_slots,
    WeekWindow, DEFAULT_SCAN_LIMIT,
};
use shared::{
    domain::{FeatureSwap, MinuteOffsetSelection, Room, SlotCommit},
    error::{ErrorKind, WorkflowError},
    protocol::{
        BlockReport, ImportReport, RunReport, RunStatus, SlotOutcome, SlotReport, WorkflowState,
    },
};
use tracing::{error, info, warn};

use crate::{ControlPlane, ControlPlaneConnector, SessionError};

pub const DEFAULT_VOLUME: u8 = 51;
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Credentials do not become valid by retrying; only transport hiccups get a second go.
    pub const fn authentication() -> Self {
        Self::new(2, Duration::from_secs(1))
    }

    pub const fn commit() -> Self {
        Self::new(3, Duration::from_millis(500))
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub volume: u8,
    pub week: WeekWindow,
    pub auth_retry: RetryPolicy,
    pub commit_retry: RetryPolicy,
    pub action_timeout: Duration,
    pub scan_limit: usize,
}

impl WorkflowSettings {
    pub fn new(week: WeekWindow) -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            week,
            auth_retry: RetryPolicy::authentication(),
            commit_retry: RetryPolicy::commit(),
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

/// Lets a caller stop a run between two remote actions.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Attempted<T> {
    value: T,
    attempts: u32,
}

struct Exhausted {
    error: SessionError,
    attempts: u32,
}

/// State of a single execution; discarded once its report is produced.
pub struct WorkflowRun {
    room: Room,
    offset: MinuteOffsetSelection,
    week: WeekWindow,
    state: WorkflowState,
    import: Option<ImportReport>,
    block: Option<BlockReport>,
    slots: Vec<SlotReport>,
    started_at: DateTime<Utc>,
}

impl WorkflowRun {
    fn new(room: &Room, offset: MinuteOffsetSelection, week: WeekWindow) -> Self {
        Self {
            room: room.clone(),
            offset,
            week,
            state: WorkflowState::Unauthenticated,
            import: None,
            block: None,
            slots: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    fn advance(&mut self, next: WorkflowState) {
        debug_assert!(next > self.state, "workflow state must move forward");
        info!(
            room_id = self.room.id.0,
            from = ?self.state,
            to = ?next,
            "workflow: state transition"
        );
        self.state = next;
    }

    fn finish(self, error: Option<WorkflowError>) -> RunReport {
        let status = match &error {
            Some(error) if error.kind() == ErrorKind::Aborted => RunStatus::Aborted,
            Some(_) => RunStatus::Failed,
            None if self.slots.iter().all(SlotReport::is_committed) => RunStatus::Success,
            None => RunStatus::PartialSuccess,
        };

        let committed = self.slots.iter().filter(|slot| slot.is_committed()).count();
        match &error {
            Some(error) => error!(
                room_id = self.room.id.0,
                state = ?self.state,
                kind = %error.kind(),
                nothing_committed = error.is_precondition(),
                %error,
                "workflow: run failed"
            ),
            None => info!(
                room_id = self.room.id.0,
                ?status,
                committed,
                total = self.slots.len(),
                "workflow: run finished"
            ),
        }

        RunReport {
            room_id: self.room.id,
            room_name: self.room.name,
            offset: self.offset,
            week_start: self.week.start(),
            week_end: self.week.end(),
            import: self.import,
            block: self.block,
            slots: self.slots,
            state: self.state,
            status,
            error,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

pub struct Orchestrator {
    connector: Arc<dyn ControlPlaneConnector>,
    settings: WorkflowSettings,
    abort: AbortFlag,
}

impl Orchestrator {
    pub fn new(connector: Arc<dyn ControlPlaneConnector>, settings: WorkflowSettings) -> Self {
        Self {
            connector,
            settings,
            abort: AbortFlag::new(),
        }
    }

    pub fn with_abort_flag(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Executes one full run against `room`. Failures are folded into the
    /// returned report rather than returned as errors.
    pub async fn run(&self, room: &Room, offset: MinuteOffsetSelection) -> RunReport {
        let mut run = WorkflowRun::new(room, offset, self.settings.week);
        info!(
            room_id = room.id.0,
            room = %room.name,
            %offset,
            week_start = %self.settings.week.start(),
            "workflow: run started"
        );
        let outcome = self.drive(&mut run).await;
        run.finish(outcome.err())
    }

    async fn drive(&self, run: &mut WorkflowRun) -> Result<(), WorkflowError> {
        let room = run.room.clone();
        let auth_retry = self.settings.auth_retry;
        let commit_retry = self.settings.commit_retry;

        let plane = self.connector.connect(&room).await.map_err(|error| {
            WorkflowError::AuthenticationError {
                attempts: 0,
                message: error.to_string(),
            }
        })?;
        let plane: &dyn ControlPlane = plane.as_ref();

        let credentials = &room.credentials;
        self.retrying("authenticate", auth_retry, move || {
            plane.authenticate(credentials)
        })
        .await
        .map_err(|failure| WorkflowError::AuthenticationError {
            attempts: failure.attempts,
            message: failure.error.to_string(),
        })?;
        run.advance(WorkflowState::Authenticated);

        self.checkpoint(run)?;
        let labels = self
            .retrying("list import candidates", commit_retry, move || {
                plane.list_import_candidates()
            })
            .await
            .map_err(|failure| discovery_failed("import candidates", failure))?
            .value;
        let detected = detect_import(&discover_candidates(&labels))?;

        let blocks = self
            .retrying("list blocks", commit_retry, move || plane.list_blocks())
            .await
            .map_err(|failure| discovery_failed("blocks", failure))?
            .value;
        let selection = select_block(detected.format, &blocks, self.settings.scan_limit)?;
        let new_name = compose_block_name(&room.name, detected.format, &detected.film_name)?;

        let slots = weekly_slots(run.offset);
        run.import = Some(ImportReport {
            label: detected.candidate.label.clone(),
            class: detected.candidate.class,
            format: detected.format,
            film_name: detected.film_name.clone(),
        });
        run.block = Some(BlockReport {
            block_id: selection.block.id,
            previous_name: selection.block.name.clone(),
            new_name: new_name.clone(),
            content_marker: room.content_marker.clone(),
            other_matches: selection.other_matches.clone(),
        });
        run.slots = slots
            .iter()
            .map(|slot| SlotReport::pending(*slot, run.week.date_of(slot.weekday)))
            .collect();

        self.checkpoint(run)?;
        let candidate = &detected.candidate;
        let volume = self.settings.volume;
        let import = self
            .retrying("commit import", commit_retry, move || {
                plane.commit_import(candidate, volume)
            })
            .await
            .map_err(|failure| WorkflowError::ImportCommitFailed {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            })?;
        info!(
            room_id = room.id.0,
            label = %candidate.label,
            volume,
            attempts = import.attempts,
            "workflow: import committed"
        );
        run.advance(WorkflowState::ImportSelected);

        self.checkpoint(run)?;
        let block_id = selection.block.id;
        let swap = FeatureSwap {
            block_id,
            marker: room.content_marker.clone(),
            label: candidate.label.clone(),
        };
        let swap_ref = &swap;
        let replaced = self
            .retrying("replace feature", commit_retry, move || {
                plane.replace_feature(swap_ref)
            })
            .await
            .map_err(|failure| WorkflowError::FeatureReplaceFailed {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            })?;
        info!(
            room_id = room.id.0,
            block_id = block_id.0,
            marker = %swap.marker,
            label = %swap.label,
            attempts = replaced.attempts,
            "workflow: block feature replaced"
        );

        // The block only counts as renamed once it plays the new feature.
        self.checkpoint(run)?;
        let name = new_name.as_str();
        let rename = self
            .retrying("rename block", commit_retry, move || {
                plane.rename_block(block_id, name)
            })
            .await
            .map_err(|failure| WorkflowError::RenameCommitFailed {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            })?;
        info!(
            room_id = room.id.0,
            block_id = block_id.0,
            %new_name,
            attempts = rename.attempts,
            "workflow: block renamed"
        );
        run.advance(WorkflowState::BlockRenamed);

        for (index, slot) in slots.iter().enumerate() {
            self.checkpoint(run)?;
            let commit = SlotCommit {
                block_id,
                block_title: new_name.clone(),
                date: run.week.date_of(slot.weekday),
                slot: *slot,
            };
            let commit_ref = &commit;
            let outcome = match self
                .retrying("commit slot", commit_retry, move || {
                    plane.commit_schedule_slot(commit_ref)
                })
                .await
            {
                Ok(done) => {
                    info!(
                        room_id = room.id.0,
                        weekday = %slot.weekday,
                        date = %commit.date,
                        start = %slot.start.format("%H:%M"),
                        attempts = done.attempts,
                        "workflow: slot committed"
                    );
                    SlotOutcome::Committed {
                        attempts: done.attempts,
                    }
                }
                Err(failure) => {
                    let error = WorkflowError::SlotCommitFailed {
                        weekday: slot.weekday,
                        attempts: failure.attempts,
                        message: failure.error.to_string(),
                    };
                    error!(
                        room_id = room.id.0,
                        weekday = %slot.weekday,
                        %error,
                        "workflow: slot not committed, continuing with next slot"
                    );
                    SlotOutcome::Failed { error }
                }
            };
            run.slots[index].outcome = outcome;
            run.advance(WorkflowState::SlotsScheduled {
                attempted: index + 1,
            });
        }

        run.advance(WorkflowState::Complete);
        Ok(())
    }

    fn checkpoint(&self, run: &WorkflowRun) -> Result<(), WorkflowError> {
        if self.abort.is_aborted() {
            warn!(room_id = run.room.id.0, state = ?run.state, "workflow: abort requested");
            return Err(WorkflowError::Aborted { state: run.state });
        }
        Ok(())
    }

    async fn retrying<T, F, Fut>(
        &self,
        action: &'static str,
        policy: RetryPolicy,
        mut operation: F,
    ) -> Result<Attempted<T>, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.settings.action_timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::Timeout(self.settings.action_timeout)),
                };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        info!(action, attempt, "workflow: action succeeded after retry");
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        action,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "workflow: transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    warn!(action, attempt, max_attempts, %error, "workflow: giving up on action");
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

fn discovery_failed(resource: &str, failure: Exhausted) -> WorkflowError {
    WorkflowError::DiscoveryFailed {
        resource: resource.to_string(),
        attempts: failure.attempts,
        message: failure.error.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
