//! Tier backends.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;

/// Minimal key/value interface every tier implements.
pub trait TierStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local map. Backs the ephemeral tier and stands in for any tier in tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation errors until `set_failing(false)`.
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory store unavailable");
        }
        Ok(())
    }
}

impl TierStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.values.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.check()?;
        self.values.lock().clear();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed
// ─────────────────────────────────────────────────────────────────────────────

const SESSION_FILE: &str = "session.json";

/// JSON file on disk. Backs the durable tier.
///
/// Every write goes to a temp file that is renamed over the old one, so a crash
/// mid-write never leaves a half-written session behind.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create session dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join(SESSION_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt session file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).context("Failed to read session file"),
        }
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if values.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    Err(e).context("Failed to remove session file")
                }
                _ => Ok(()),
            };
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(values)?).context("Failed to write session file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl TierStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut values = self.load().unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut values = self.load().unwrap_or_default();
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.save(&BTreeMap::new())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie jar
// ─────────────────────────────────────────────────────────────────────────────

/// Cookie-visible tier. Values are scoped to `path` and rendered as headers for
/// same-origin requests and for the embedding shell.
pub struct CookieJar {
    path: String,
    cookies: Mutex<BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cookies: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `Cookie` request header value, if the jar holds anything.
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies.lock();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// One `Set-Cookie` line per stored value.
    pub fn set_cookie_lines(&self) -> Vec<String> {
        self.cookies
            .lock()
            .iter()
            .map(|(name, value)| format!("{name}={value}; Path={}; SameSite=Lax", self.path))
            .collect()
    }
}

impl TierStore for CookieJar {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cookies.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if value.contains(';') || value.contains(char::is_whitespace) {
            bail!("value for cookie {key} is not cookie-safe");
        }
        self.cookies.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.cookies.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.cookies.lock().clear();
        Ok(())
    }
}
