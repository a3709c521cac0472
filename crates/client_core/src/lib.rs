use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::domain::{
    Block, BlockId, Credentials, FeatureSwap, ImportCandidate, Room, SlotCommit,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub mod orchestrator;
pub use orchestrator::{AbortFlag, Orchestrator, RetryPolicy, WorkflowRun, WorkflowSettings};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("control plane not ready: {0}")]
    NotReady(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("session is not authenticated")]
    Unauthenticated,
    #[error("rejected by control plane: {0}")]
    Rejected(String),
    #[error("unexpected control plane response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Whether another attempt of the same action may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::NotReady(_) | Self::Transport(_)
        )
    }

    fn from_status(status: StatusCode, detail: String) -> Self {
        match status.as_u16() {
            409 | 423 | 425 | 503 => Self::NotReady(detail),
            408 | 429 => Self::Transport(detail),
            code if code >= 500 => Self::Transport(detail),
            _ => Self::Rejected(detail),
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::from_status(status, err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The stateful management session a projector exposes for one room.
///
/// Implementations are driven strictly sequentially by the orchestrator; none
/// of these calls is issued while another one is in flight.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError>;
    /// Raw labels of the packages found on removable media, in device order.
    async fn list_import_candidates(&self) -> Result<Vec<String>, SessionError>;
    async fn commit_import(
        &self,
        candidate: &ImportCandidate,
        volume: u8,
    ) -> Result<(), SessionError>;
    /// Blocks in device order (newest first).
    async fn list_blocks(&self) -> Result<Vec<Block>, SessionError>;
    /// Replaces the feature cued under `swap.marker` in the block and saves it.
    async fn replace_feature(&self, swap: &FeatureSwap) -> Result<(), SessionError>;
    async fn rename_block(&self, block_id: BlockId, name: &str) -> Result<(), SessionError>;
    async fn commit_schedule_slot(&self, commit: &SlotCommit) -> Result<(), SessionError>;
}

#[async_trait]
pub trait ControlPlaneConnector: Send + Sync {
    async fn connect(&self, room: &Room) -> Result<Arc<dyn ControlPlane>, SessionError>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct MediaListResponse {
    items: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    label: String,
}

#[derive(Debug, Serialize)]
struct IngestRequest<'a> {
    label: &'a str,
    volume: u8,
}

#[derive(Debug, Deserialize)]
struct ShowListResponse {
    shows: Vec<ShowSummary>,
}

#[derive(Debug, Deserialize)]
struct ShowSummary {
    id: i64,
    title: String,
}

#[derive(Debug, Serialize)]
struct ReplaceFeatureRequest<'a> {
    marker: &'a str,
    label: &'a str,
}

#[derive(Debug, Serialize)]
struct RenameShowRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct SchedulerEntryRequest<'a> {
    show_id: i64,
    title: &'a str,
    date: NaiveDate,
    weekday: Weekday,
    start: String,
    close_lamp: bool,
}

/// JSON-over-HTTPS session against a projector's management API.
pub struct HttpControlPlane {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpControlPlane {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn session_token(&self) -> Result<String, SessionError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(SessionError::Unauthenticated)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let body: LoginResponse = self
            .http
            .post(format!("{}/api/session", self.base_url))
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        *self.token.write().await = Some(body.token);
        info!(
            base_url = %self.base_url,
            username = %credentials.username,
            "control_plane: session opened"
        );
        Ok(())
    }

    async fn list_import_candidates(&self) -> Result<Vec<String>, SessionError> {
        let token = self.session_token().await?;
        let body: MediaListResponse = self
            .http
            .get(format!("{}/api/ingest/usb", self.base_url))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(count = body.items.len(), "control_plane: removable media listed");
        Ok(body.items.into_iter().map(|item| item.label).collect())
    }

    async fn commit_import(
        &self,
        candidate: &ImportCandidate,
        volume: u8,
    ) -> Result<(), SessionError> {
        let token = self.session_token().await?;
        self.http
            .post(format!("{}/api/ingest", self.base_url))
            .bearer_auth(token)
            .json(&IngestRequest {
                label: &candidate.label,
                volume,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_blocks(&self) -> Result<Vec<Block>, SessionError> {
        let token = self.session_token().await?;
        let body: ShowListResponse = self
            .http
            .get(format!("{}/api/shows", self.base_url))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body
            .shows
            .into_iter()
            .map(|show| Block::new(show.id, show.title))
            .collect())
    }

    async fn replace_feature(&self, swap: &FeatureSwap) -> Result<(), SessionError> {
        let token = self.session_token().await?;
        self.http
            .put(format!(
                "{}/api/shows/{}/feature",
                self.base_url, swap.block_id.0
            ))
            .bearer_auth(token)
            .json(&ReplaceFeatureRequest {
                marker: &swap.marker,
                label: &swap.label,
            })
            .send()
            .await?
            .error_for_status()?;
        debug!(
            block_id = swap.block_id.0,
            marker = %swap.marker,
            "control_plane: block feature replaced"
        );
        Ok(())
    }

    async fn rename_block(&self, block_id: BlockId, name: &str) -> Result<(), SessionError> {
        let token = self.session_token().await?;
        self.http
            .put(format!("{}/api/shows/{}", self.base_url, block_id.0))
            .bearer_auth(token)
            .json(&RenameShowRequest { title: name })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn commit_schedule_slot(&self, commit: &SlotCommit) -> Result<(), SessionError> {
        let token = self.session_token().await?;
        self.http
            .post(format!("{}/api/scheduler/entries", self.base_url))
            .bearer_auth(token)
            .json(&SchedulerEntryRequest {
                show_id: commit.block_id.0,
                title: &commit.block_title,
                date: commit.date,
                weekday: commit.slot.weekday,
                start: commit.slot.start.format("%H:%M").to_string(),
                close_lamp: commit.slot.close_lamp,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpConnectorOptions {
    pub request_timeout: Duration,
    /// Projectors ship self-signed certificates on their management port.
    pub accept_invalid_certs: bool,
}

impl Default for HttpConnectorOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    options: HttpConnectorOptions,
}

impl HttpConnector {
    pub fn new(options: HttpConnectorOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ControlPlaneConnector for HttpConnector {
    async fn connect(&self, room: &Room) -> Result<Arc<dyn ControlPlane>, SessionError> {
        let http = Client::builder()
            .timeout(self.options.request_timeout)
            .danger_accept_invalid_certs(self.options.accept_invalid_certs)
            .build()
            .map_err(|err| SessionError::Transport(err.to_string()))?;
        debug!(room_id = room.id.0, base_url = %room.base_url, "control_plane: client built");
        Ok(Arc::new(HttpControlPlane::new(http, room.base_url.clone())))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
