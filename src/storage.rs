// Durable client-side state: the authenticated session (token + profile
// snapshot) and the checkout ledger that survives restarts. Everything is
// small JSON files under the per-user config directory.

use crate::error::{ChatError, Result};
use crate::models::UserRef;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

static DATA_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Redirect all durable state to `dir`. Used by tests so they never touch
/// the real config directory. First call wins.
pub fn set_data_dir_override(dir: &Path) {
    let _ = DATA_DIR_OVERRIDE.set(dir.to_path_buf());
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = DATA_DIR_OVERRIDE.get() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        return Ok(dir.clone());
    }
    let dir = dirs::config_dir()
        .ok_or_else(|| ChatError::Storage("could not determine config directory".to_string()))?
        .join("haggle");

    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

/// The authenticated session. The token is the bearer credential attached
/// to every HTTP request and to the socket handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Base64-encoded at rest; use [`Session::token`] to read it.
    token: String,
    pub user: UserRef,
}

impl Session {
    pub fn new(token: &str, user: UserRef) -> Self {
        Session {
            token: BASE64.encode(token),
            user,
        }
    }

    pub fn token(&self) -> String {
        String::from_utf8(BASE64.decode(&self.token).unwrap_or_default()).unwrap_or_default()
    }
}

fn session_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("session.json"))
}

pub fn save_session(session: &Session) -> Result<()> {
    let file = File::create(session_path()?)?;
    serde_json::to_writer_pretty(file, session)?;

    info!("Session saved for {}", session.user.id);
    Ok(())
}

pub fn load_session() -> Result<Option<Session>> {
    let path = session_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(&path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let session: Session = serde_json::from_str(&contents)?;
    info!("Loaded session for {} from {}", session.user.id, path.display());

    Ok(Some(session))
}

/// Remove the stored session. Idempotent; missing file is fine.
pub fn clear_session() -> Result<()> {
    let path = session_path()?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// One-shot checkout guard. Once a message id is marked completed, checkout
/// can never be initiated from that message again, reloads included. Kept
/// as a trait so a server-backed idempotency key can replace the file later.
pub trait CheckoutLedger {
    fn has_completed(&self, message_id: &str) -> bool;
    fn mark_completed(&mut self, message_id: &str) -> Result<()>;
}

/// File-backed ledger: a JSON array of message ids, rewritten on every mark.
/// The set stays tiny (one entry per accepted-offer checkout).
pub struct FileCheckoutLedger {
    path: PathBuf,
    completed: BTreeSet<String>,
}

impl FileCheckoutLedger {
    pub fn open() -> Result<Self> {
        Self::open_at(data_dir()?.join("checkout_ledger.json"))
    }

    pub fn open_at(path: PathBuf) -> Result<Self> {
        let completed = if path.exists() {
            let mut file = File::open(&path)?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeSet::new()
        };

        Ok(FileCheckoutLedger { path, completed })
    }

    fn persist(&self) -> Result<()> {
        let file = File::create(&self.path)?;
        serde_json::to_writer(file, &self.completed)?;
        Ok(())
    }
}

impl CheckoutLedger for FileCheckoutLedger {
    fn has_completed(&self, message_id: &str) -> bool {
        self.completed.contains(message_id)
    }

    fn mark_completed(&mut self, message_id: &str) -> Result<()> {
        if self.completed.insert(message_id.to_string()) {
            self.persist()?;
        }
        Ok(())
    }
}

/// In-memory ledger for tests and embedders that bring their own
/// persistence.
#[derive(Default)]
pub struct MemoryCheckoutLedger {
    completed: BTreeSet<String>,
}

impl CheckoutLedger for MemoryCheckoutLedger {
    fn has_completed(&self, message_id: &str) -> bool {
        self.completed.contains(message_id)
    }

    fn mark_completed(&mut self, message_id: &str) -> Result<()> {
        self.completed.insert(message_id.to_string());
        Ok(())
    }
}
