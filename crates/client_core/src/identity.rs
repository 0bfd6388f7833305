//! Where the username lives between runs.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};

/// Fixed key the username is stored under.
pub const USERNAME_KEY: &str = "username";

pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn store(&self, username: &str) -> Result<()>;
}

/// Trims and rejects blank usernames.
pub fn normalize_username(raw: &str) -> Result<String> {
    let username = raw.trim();
    if username.is_empty() {
        bail!("username must not be empty");
    }
    Ok(username.to_string())
}

/// JSON object on disk; unrelated keys in the same file are preserved.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read '{}'", self.path.display()))
            }
        };
        match serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse '{}'", self.path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!(
                "'{}' does not contain a JSON object",
                self.path.display()
            )),
        }
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        let map = self.read_object()?;
        Ok(map
            .get(USERNAME_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }

    fn store(&self, username: &str) -> Result<()> {
        let mut map = self.read_object()?;
        map.insert(USERNAME_KEY.to_string(), Value::String(username.to_string()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory '{}'", parent.display())
            })?;
        }
        let raw = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write '{}'", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    username: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new(username: Option<String>) -> Self {
        Self {
            username: Mutex::new(username),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        let guard = self
            .username
            .lock()
            .map_err(|_| anyhow!("identity store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn store(&self, username: &str) -> Result<()> {
        let mut guard = self
            .username
            .lock()
            .map_err(|_| anyhow!("identity store lock poisoned"))?;
        *guard = Some(username.to_string());
        Ok(())
    }
}
