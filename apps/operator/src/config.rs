use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use client_core::{orchestrator::DEFAULT_VOLUME, HttpConnectorOptions};
use planner::DEFAULT_SCAN_LIMIT;
use serde::Deserialize;
use shared::domain::{Credentials, Room, RoomId};
use tracing::{info, warn};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "operator.toml";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Rooms known without any configuration: id, block prefix, management URL
/// and the playlist cue the feature sits under.
const BUILTIN_ROOMS: [(i64, &str, &str, &str); 2] = [
    (2, "Selectotel", "https://10.66.80.192:43744", "VOLUME_NORMAL"),
    (3, "Brunet", "https://10.66.80.193:43744", "DCI_XYZ_FLAT"),
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub rooms: Vec<Room>,
    pub volume: u8,
    pub scan_limit: usize,
    pub accept_invalid_certs: bool,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == id)
    }

    pub fn connector_options(&self) -> HttpConnectorOptions {
        HttpConnectorOptions {
            request_timeout: self.request_timeout,
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    defaults: FileDefaults,
    #[serde(default)]
    rooms: Vec<FileRoom>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileDefaults {
    username: Option<String>,
    password: Option<String>,
    volume: Option<u8>,
    scan_limit: Option<usize>,
    accept_invalid_certs: Option<bool>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRoom {
    id: i64,
    name: Option<String>,
    url: Option<String>,
    marker: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug)]
struct RoomDraft {
    id: i64,
    name: Option<String>,
    url: Option<String>,
    marker: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Reads `.env`, the config file and the process environment.
///
/// An explicitly given config path must exist; the default one is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "config: loaded .env file");
    }

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => Some(raw),
        Err(_) if !required => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config '{}'", path.display()))
        }
    };
    if raw.is_some() {
        info!(path = %path.display(), "config: loaded config file");
    }

    resolve_settings(raw.as_deref(), |key| std::env::var(key).ok())
        .with_context(|| format!("invalid configuration (file '{}')", path.display()))
}

/// Layers built-in defaults, an optional toml document and environment
/// overrides looked up through `env`.
///
/// `BARCO_USERNAME` and `BARCO_PASSWORD` apply to every room, replacing any
/// per-room credentials from the file.
pub fn resolve_settings<F>(file: Option<&str>, env: F) -> anyhow::Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut drafts: Vec<RoomDraft> = BUILTIN_ROOMS
        .iter()
        .map(|&(id, name, url, marker)| RoomDraft {
            id,
            name: Some(name.to_string()),
            url: Some(url.to_string()),
            marker: Some(marker.to_string()),
            username: None,
            password: None,
        })
        .collect();
    let mut username = DEFAULT_USERNAME.to_string();
    let mut password: Option<String> = None;
    let mut volume = DEFAULT_VOLUME;
    let mut scan_limit = DEFAULT_SCAN_LIMIT;
    let mut accept_invalid_certs = true;
    let mut request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;

    if let Some(raw) = file {
        let file_cfg: FileConfig = toml::from_str(raw).context("malformed config file")?;
        let defaults = file_cfg.defaults;
        if let Some(v) = defaults.username {
            username = v;
        }
        if defaults.password.is_some() {
            password = defaults.password;
        }
        if let Some(v) = defaults.volume {
            volume = v;
        }
        if let Some(v) = defaults.scan_limit {
            scan_limit = v;
        }
        if let Some(v) = defaults.accept_invalid_certs {
            accept_invalid_certs = v;
        }
        if let Some(v) = defaults.request_timeout_secs {
            request_timeout_secs = v;
        }

        for entry in file_cfg.rooms {
            match drafts.iter_mut().find(|draft| draft.id == entry.id) {
                Some(draft) => {
                    if entry.name.is_some() {
                        draft.name = entry.name;
                    }
                    if entry.url.is_some() {
                        draft.url = entry.url;
                    }
                    if entry.marker.is_some() {
                        draft.marker = entry.marker;
                    }
                    if entry.username.is_some() {
                        draft.username = entry.username;
                    }
                    if entry.password.is_some() {
                        draft.password = entry.password;
                    }
                }
                None => drafts.push(RoomDraft {
                    id: entry.id,
                    name: entry.name,
                    url: entry.url,
                    marker: entry.marker,
                    username: entry.username,
                    password: entry.password,
                }),
            }
        }
    }

    for draft in drafts.iter_mut() {
        if let Some(v) = env(&format!("BARCO_URL_SALLE{}", draft.id)) {
            draft.url = Some(v);
        }
        if let Some(v) = env(&format!("OPERATOR__ROOM_{}_URL", draft.id)) {
            draft.url = Some(v);
        }
        if let Some(v) = env(&format!("OPERATOR__ROOM_{}_NAME", draft.id)) {
            draft.name = Some(v);
        }
        if let Some(v) = env(&format!("OPERATOR__ROOM_{}_MARKER", draft.id)) {
            draft.marker = Some(v);
        }
    }
    if let Some(v) = env("BARCO_USERNAME") {
        username = v;
        drafts.iter_mut().for_each(|draft| draft.username = None);
    }
    if let Some(v) = env("BARCO_PASSWORD") {
        password = Some(v);
        drafts.iter_mut().for_each(|draft| draft.password = None);
    }
    if let Some(v) = env("DEFAULT_VOLUME") {
        match v.trim().parse::<u8>() {
            Ok(parsed) => volume = parsed,
            Err(_) => warn!(value = %v, "config: ignoring malformed DEFAULT_VOLUME"),
        }
    }
    if let Some(v) = env("OPERATOR__SCAN_LIMIT") {
        match v.trim().parse::<usize>() {
            Ok(parsed) => scan_limit = parsed,
            Err(_) => warn!(value = %v, "config: ignoring malformed OPERATOR__SCAN_LIMIT"),
        }
    }

    if volume > 100 {
        bail!("volume {volume} is outside 0..=100");
    }
    if scan_limit == 0 {
        bail!("scan_limit must be at least 1");
    }

    let rooms = drafts
        .into_iter()
        .map(|draft| finish_room(draft, &username, password.as_deref()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Settings {
        rooms,
        volume,
        scan_limit,
        accept_invalid_certs,
        request_timeout: Duration::from_secs(request_timeout_secs),
    })
}

fn finish_room(
    draft: RoomDraft,
    default_username: &str,
    default_password: Option<&str>,
) -> anyhow::Result<Room> {
    let id = draft.id;
    let name = draft
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| anyhow!("room {id} has no name"))?;
    let raw_url = draft
        .url
        .ok_or_else(|| anyhow!("room {id} has no url"))?;
    let url = Url::parse(raw_url.trim())
        .with_context(|| format!("room {id} url '{raw_url}' is not a valid url"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("room {id} url '{raw_url}' must use http or https");
    }
    let marker = draft
        .marker
        .filter(|marker| !marker.trim().is_empty())
        .ok_or_else(|| anyhow!("room {id} has no content marker"))?;
    let password = draft
        .password
        .or_else(|| default_password.map(str::to_string))
        .ok_or_else(|| {
            anyhow!("no password configured for room {id}; set BARCO_PASSWORD or [defaults].password")
        })?;

    Ok(Room {
        id: RoomId(id),
        name: name.trim().to_string(),
        base_url: url.as_str().trim_end_matches('/').to_string(),
        credentials: Credentials {
            username: draft
                .username
                .unwrap_or_else(|| default_username.to_string()),
            password,
        },
        content_marker: marker.trim().to_string(),
    })
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
