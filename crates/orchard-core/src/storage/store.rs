//! Loading and saving the versioned engine document.
//!
//! `load` never fails: a missing document yields the default state, and a
//! document that cannot be migrated or validated is backed up verbatim under
//! a content-addressed key before the engine starts from defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::migrations::{self, Migrated};
use super::validation;
use super::KvStore;
use crate::engine::EngineState;
use crate::error::{MigrationError, StorageError};

pub use super::migrations::CURRENT_VERSION;

/// Key the engine document is stored under.
pub const STATE_KEY: &str = "engine_state";

/// The document as written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u64,
    #[serde(flatten)]
    pub state: EngineState,
}

impl From<EngineState> for PersistedState {
    fn from(state: EngineState) -> Self {
        Self {
            version: CURRENT_VERSION,
            state,
        }
    }
}

#[derive(Serialize)]
struct Document<'a> {
    version: u64,
    #[serde(flatten)]
    state: &'a EngineState,
}

/// Where the loaded state came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadSource {
    /// Nothing was stored yet.
    Fresh,
    /// Stored at the current version.
    Current,
    /// Upgraded from an older version.
    Migrated { from: u64 },
    /// The stored document was unusable; defaults were loaded.
    FellBack {
        reason: String,
        backup_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub source: LoadSource,
    /// Entities that were filtered or repaired during validation.
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn clean(source: LoadSource) -> Self {
        Self {
            source,
            warnings: Vec::new(),
        }
    }

    /// Whether the stored document should be rewritten right away.
    ///
    /// Never after a failed read: the original was not backed up.
    pub fn needs_rewrite(&self) -> bool {
        match &self.source {
            LoadSource::FellBack {
                backup_key: None, ..
            } => false,
            LoadSource::Migrated { .. } | LoadSource::FellBack { .. } => true,
            LoadSource::Fresh | LoadSource::Current => !self.warnings.is_empty(),
        }
    }
}

/// Persists the engine document through a [`KvStore`].
pub struct StateStore<S> {
    kv: S,
    /// The stored document could not be read and has not been backed up.
    unread: bool,
}

impl<S: KvStore> StateStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv, unread: false }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    /// Whether a stored document exists that could not be read yet.
    /// Writes are refused until it is readable and backed up.
    pub fn has_unread_state(&self) -> bool {
        self.unread
    }

    /// Load, migrate and validate the stored document.
    pub fn load(&mut self, now: DateTime<Utc>) -> (EngineState, LoadReport) {
        let raw = match self.kv.get(STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (EngineState::default(), LoadReport::clean(LoadSource::Fresh)),
            Err(e) => {
                tracing::error!(error = %e, "failed to read engine state; starting from defaults");
                self.unread = true;
                return (
                    EngineState::default(),
                    LoadReport::clean(LoadSource::FellBack {
                        reason: e.to_string(),
                        backup_key: None,
                    }),
                );
            }
        };

        match decode(&raw, now) {
            Ok((state, migrated, warnings)) => {
                let source = if migrated.was_migrated() {
                    tracing::info!(from = migrated.from_version, to = CURRENT_VERSION, "engine state migrated");
                    LoadSource::Migrated {
                        from: migrated.from_version,
                    }
                } else {
                    LoadSource::Current
                };
                (state, LoadReport { source, warnings })
            }
            Err(e) => {
                let backup_key = self.back_up(&raw);
                tracing::error!(
                    error = %e,
                    backup = backup_key.as_deref().unwrap_or("<none>"),
                    "engine state unusable; starting from defaults"
                );
                (
                    EngineState::default(),
                    LoadReport::clean(LoadSource::FellBack {
                        reason: e.to_string(),
                        backup_key,
                    }),
                )
            }
        }
    }

    /// Write the current document.
    ///
    /// After a failed read the stored document is first copied to its
    /// backup key; while it still cannot be read nothing is written.
    ///
    /// # Errors
    /// Returns [`StorageError::PersistenceFailure`] if the state cannot be
    /// encoded or written, or the unread original cannot be preserved.
    pub fn persist(&mut self, state: &EngineState) -> Result<(), StorageError> {
        self.preserve_unread()?;
        let doc = Document {
            version: CURRENT_VERSION,
            state,
        };
        let json = serde_json::to_string(&doc)
            .map_err(|e| StorageError::PersistenceFailure(e.to_string()))?;
        self.kv
            .set(STATE_KEY, &json)
            .map_err(|e| match e {
                StorageError::PersistenceFailure(_) => e,
                other => StorageError::PersistenceFailure(other.to_string()),
            })
    }

    /// Raw text of a backup written by a fallback load.
    pub fn backup(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.kv.get(key)
    }

    fn preserve_unread(&mut self) -> Result<(), StorageError> {
        if !self.unread {
            return Ok(());
        }
        match self.kv.get(STATE_KEY) {
            Ok(None) => {}
            Ok(Some(raw)) => {
                let key = backup_key(&raw);
                self.kv.set(&key, &raw).map_err(|e| {
                    StorageError::PersistenceFailure(format!("could not back up stored state: {e}"))
                })?;
                tracing::info!(backup = %key, "unread engine state backed up before overwrite");
            }
            Err(e) => {
                return Err(StorageError::PersistenceFailure(format!(
                    "stored state unreadable, not overwriting it: {e}"
                )))
            }
        }
        self.unread = false;
        Ok(())
    }

    fn back_up(&mut self, raw: &str) -> Option<String> {
        let key = backup_key(raw);
        match self.kv.set(&key, raw) {
            Ok(()) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "could not back up unusable engine state");
                None
            }
        }
    }
}

/// Backup key for a raw payload: the first 12 hex digits of its SHA-256.
pub fn backup_key(raw: &str) -> String {
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    format!("{STATE_KEY}.corrupt.{}", &digest[..12])
}

fn decode(
    raw: &str,
    now: DateTime<Utc>,
) -> Result<(EngineState, Migrated, Vec<String>), MigrationError> {
    let value = serde_json::from_str(raw).map_err(MigrationError::MalformedPayload)?;
    let migrated = migrations::migrate(value, now)?;
    let validated = validation::validate(&migrated.value)?;
    Ok((validated.state, migrated, validated.warnings))
}
