use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use shared::domain::GridDimensions;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "grid_client.toml";

const DEFAULT_SERVER_ADDRESS: &str = "localhost:8080";

/// Upper bound on `rows * columns`; the whole grid is held in memory.
pub const MAX_GRID_CELLS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Zero disables reconnecting: the first loss ends the session.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// How long a connection must stay open before its loss no longer counts
    /// against `max_attempts`.
    pub stable_after: Duration,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Backoff before the zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            stable_after: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_address: String,
    pub secure: bool,
    pub dimensions: GridDimensions,
    pub identity_path: PathBuf,
    pub snapshot_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_address: option_env!("GRID_SERVER_ADDRESS")
                .unwrap_or(DEFAULT_SERVER_ADDRESS)
                .to_string(),
            secure: !cfg!(debug_assertions),
            dimensions: GridDimensions::new(14, 5),
            identity_path: PathBuf::from("./data/identity.json"),
            snapshot_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientSettings {
    pub fn websocket_url(&self, username: &str) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = self.base_url(scheme)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server address cannot carry a path: {}", self.server_address))?
            .clear()
            .push("ws")
            .push(username);
        Ok(url)
    }

    pub fn snapshot_url(&self) -> Result<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        self.base_url(scheme)
    }

    fn base_url(&self, scheme: &str) -> Result<Url> {
        let raw = format!("{scheme}://{}/", self.server_address);
        Url::parse(&raw).with_context(|| format!("invalid server address '{}'", self.server_address))
    }

    pub fn validate(&self) -> Result<()> {
        let address = self.server_address.trim();
        if address.is_empty() {
            bail!("server_address must not be empty");
        }
        if address.contains("://") {
            bail!("server_address must not include a scheme: '{address}'");
        }
        if self.dimensions.rows == 0 || self.dimensions.columns == 0 {
            bail!("grid dimensions must be non-zero, got {}", self.dimensions);
        }
        match self.dimensions.checked_cell_count() {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => bail!(
                "grid {} exceeds the limit of {MAX_GRID_CELLS} cells",
                self.dimensions
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_address: Option<String>,
    secure: Option<bool>,
    rows: Option<usize>,
    columns: Option<usize>,
    identity_path: Option<PathBuf>,
    snapshot_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    reconnect_attempts: Option<u32>,
    reconnect_initial_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
    reconnect_stable_after_secs: Option<u64>,
}

/// Defaults, then `grid_client.toml` in the working directory if present,
/// then `APP__*` environment variables.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
            apply_file_settings(&mut settings, file_cfg);
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    }

    apply_env_overrides(&mut settings, env)?;
    settings.validate()?;
    Ok(settings)
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_address {
        settings.server_address = v;
    }
    if let Some(v) = file_cfg.secure {
        settings.secure = v;
    }
    if let Some(v) = file_cfg.rows {
        settings.dimensions.rows = v;
    }
    if let Some(v) = file_cfg.columns {
        settings.dimensions.columns = v;
    }
    if let Some(v) = file_cfg.identity_path {
        settings.identity_path = v;
    }
    if let Some(v) = file_cfg.snapshot_timeout_secs {
        settings.snapshot_timeout = Duration::from_secs(v);
    }
    if let Some(v) = file_cfg.connect_timeout_secs {
        settings.connect_timeout = Duration::from_secs(v);
    }
    if let Some(v) = file_cfg.reconnect_attempts {
        settings.reconnect.max_attempts = v;
    }
    if let Some(v) = file_cfg.reconnect_initial_delay_ms {
        settings.reconnect.initial_delay = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.reconnect_max_delay_ms {
        settings.reconnect.max_delay = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.reconnect_stable_after_secs {
        settings.reconnect.stable_after = Duration::from_secs(v);
    }
}

fn apply_env_overrides(
    settings: &mut ClientSettings,
    env: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = env("APP__SERVER_ADDRESS") {
        settings.server_address = v;
    }
    if let Some(v) = env("APP__SECURE") {
        settings.secure = parse_bool(&v).context("APP__SECURE")?;
    }
    if let Some(v) = env("APP__GRID_ROWS") {
        settings.dimensions.rows = v.trim().parse().context("APP__GRID_ROWS")?;
    }
    if let Some(v) = env("APP__GRID_COLUMNS") {
        settings.dimensions.columns = v.trim().parse().context("APP__GRID_COLUMNS")?;
    }
    if let Some(v) = env("APP__IDENTITY_PATH") {
        settings.identity_path = PathBuf::from(v);
    }
    if let Some(v) = env("APP__RECONNECT_ATTEMPTS") {
        settings.reconnect.max_attempts = v.trim().parse().context("APP__RECONNECT_ATTEMPTS")?;
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
