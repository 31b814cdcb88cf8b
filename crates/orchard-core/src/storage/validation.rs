//! Validation of a migrated payload.
//!
//! Two outcomes are distinguished. A *warning* means one entity was bad and
//! has been filtered or repaired; the rest of the state loads. A structural
//! failure means the document as a whole cannot be trusted and the caller
//! falls back to the default state.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::blocklist::{BlocklistSettings, BlocklistState, UnlockSession};
use crate::engine::EngineState;
use crate::error::MigrationError;
use crate::focus::{FocusSession, FocusState};
use crate::rewards::RewardLedger;

/// A state that passed validation, with what had to be dropped or fixed.
#[derive(Debug, Clone)]
pub struct Validated {
    pub state: EngineState,
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct Warnings(Vec<String>);

impl Warnings {
    fn push(&mut self, message: String) {
        tracing::warn!(%message, "engine state entity rejected");
        self.0.push(message);
    }
}

/// Validate a payload at the current schema version.
///
/// # Errors
/// Returns [`MigrationError::Structural`] when a group or collection has the
/// wrong shape or the ledger cannot be read, and
/// [`MigrationError::Integrity`] when the ledger totals do not reconcile.
pub fn validate(value: &Value) -> Result<Validated, MigrationError> {
    let root = value
        .as_object()
        .ok_or_else(|| MigrationError::structural("$", "root is not an object"))?;
    let mut warnings = Warnings::default();

    let focus = validate_focus(group(root, "focus")?, &mut warnings)?;
    let rewards = validate_rewards(group(root, "rewards")?)?;
    let blocklist = validate_blocklist(group(root, "blocklist")?, &mut warnings)?;

    Ok(Validated {
        state: EngineState {
            focus,
            rewards,
            blocklist,
        },
        warnings: warnings.0,
    })
}

fn group(root: &Map<String, Value>, name: &str) -> Result<Map<String, Value>, MigrationError> {
    match root.get(name) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(MigrationError::structural(
            format!("$.{name}"),
            "group is not an object",
        )),
    }
}

fn array<'a>(group: &'a Map<String, Value>, path: &str, key: &str) -> Result<&'a [Value], MigrationError> {
    match group.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(MigrationError::structural(
            format!("{path}.{key}"),
            "collection is not an array",
        )),
    }
}

fn parse<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

fn describe(value: &Value) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(|id| format!("'{id}'"))
        .unwrap_or_else(|| "without id".to_string())
}

// ── Focus ────────────────────────────────────────────────────────────

fn validate_focus(
    focus: Map<String, Value>,
    warnings: &mut Warnings,
) -> Result<FocusState, MigrationError> {
    let mut seen = HashSet::new();
    let mut sessions = Vec::new();

    for (i, raw) in array(&focus, "$.focus", "sessions")?.iter().enumerate() {
        let session: FocusSession = match parse(raw) {
            Ok(s) => s,
            Err(e) => {
                warnings.push(format!("focus.sessions[{i}] {}: {e}", describe(raw)));
                continue;
            }
        };
        let problems = session.invariant_violations();
        if !problems.is_empty() {
            warnings.push(format!(
                "focus.sessions[{i}] '{}': {}",
                session.id,
                problems.join("; ")
            ));
            continue;
        }
        if !seen.insert(session.id.clone()) {
            warnings.push(format!("focus.sessions[{i}] duplicate id '{}'", session.id));
            continue;
        }
        sessions.push(session);
    }

    let current_session = match focus.get("currentSession") {
        None | Some(Value::Null) => None,
        Some(raw) => match parse::<FocusSession>(raw) {
            Err(e) => {
                warnings.push(format!("focus.currentSession {}: {e}", describe(raw)));
                None
            }
            Ok(session) => {
                let problems = session.invariant_violations();
                if !problems.is_empty() {
                    warnings.push(format!(
                        "focus.currentSession '{}': {}",
                        session.id,
                        problems.join("; ")
                    ));
                    None
                } else if seen.contains(&session.id) {
                    warnings.push(format!(
                        "focus.currentSession '{}' duplicates a history entry",
                        session.id
                    ));
                    None
                } else if session.status.is_terminal() {
                    warnings.push(format!(
                        "focus.currentSession '{}' is {}; moved to history",
                        session.id, session.status
                    ));
                    sessions.push(session);
                    None
                } else {
                    Some(session)
                }
            }
        },
    };

    Ok(FocusState {
        current_session,
        sessions,
    })
}

// ── Rewards ──────────────────────────────────────────────────────────

fn validate_rewards(mut rewards: Map<String, Value>) -> Result<RewardLedger, MigrationError> {
    for key in ["balance", "totalEarned", "totalSpent"] {
        match rewards.get(key) {
            None | Some(Value::Null) => {
                rewards.insert(key.to_string(), Value::from(0u64));
            }
            Some(v) if v.is_u64() => {}
            Some(v) => {
                return Err(MigrationError::structural(
                    format!("$.rewards.{key}"),
                    format!("not a non-negative integer: {v}"),
                ))
            }
        }
    }
    for (i, raw) in array(&rewards, "$.rewards", "transactions")?.iter().enumerate() {
        if let Err(e) = parse::<crate::rewards::RewardTransaction>(raw) {
            return Err(MigrationError::structural(
                format!("$.rewards.transactions[{i}]"),
                e.to_string(),
            ));
        }
    }

    let ledger: RewardLedger = parse(&Value::Object(rewards))
        .map_err(|e| MigrationError::structural("$.rewards", e.to_string()))?;
    ledger
        .check_integrity()
        .map_err(|e| MigrationError::Integrity(e.to_string()))?;
    Ok(ledger)
}

// ── Blocklist ────────────────────────────────────────────────────────

fn validate_blocklist(
    blocklist: Map<String, Value>,
    warnings: &mut Warnings,
) -> Result<BlocklistState, MigrationError> {
    let settings = match blocklist.get("settings") {
        None | Some(Value::Null) => BlocklistSettings::default(),
        Some(raw) => match parse::<BlocklistSettings>(raw) {
            Ok(settings) if settings.is_within_bounds() => settings,
            Ok(settings) => {
                warnings.push("blocklist.settings out of range; clamped".to_string());
                settings.clamped()
            }
            Err(e) => {
                warnings.push(format!("blocklist.settings unreadable, using defaults: {e}"));
                BlocklistSettings::default()
            }
        },
    };

    let mut seen = HashSet::new();
    let mut history = Vec::new();
    for (i, raw) in array(&blocklist, "$.blocklist", "unlockHistory")?.iter().enumerate() {
        let path = format!("blocklist.unlockHistory[{i}]");
        if let Some(unlock) = unlock_entry(raw, &path, &mut seen, warnings) {
            history.push(unlock);
        }
    }

    let mut active: Vec<UnlockSession> = Vec::new();
    for (i, raw) in array(&blocklist, "$.blocklist", "activeUnlockSessions")?
        .iter()
        .enumerate()
    {
        let path = format!("blocklist.activeUnlockSessions[{i}]");
        let Some(unlock) = unlock_entry(raw, &path, &mut seen, warnings) else {
            continue;
        };
        if !unlock.is_active {
            warnings.push(format!("{path} '{}' is inactive; moved to history", unlock.id));
            history.push(unlock);
        } else if active.iter().any(|a| a.app_tokens.overlaps(&unlock.app_tokens)) {
            warnings.push(format!("{path} '{}' overlaps an earlier active unlock", unlock.id));
        } else {
            active.push(unlock);
        }
    }

    Ok(BlocklistState {
        settings,
        active_unlock_sessions: active,
        unlock_history: history,
    })
}

fn unlock_entry(
    raw: &Value,
    path: &str,
    seen: &mut HashSet<String>,
    warnings: &mut Warnings,
) -> Option<UnlockSession> {
    let unlock: UnlockSession = match parse(raw) {
        Ok(u) => u,
        Err(e) => {
            warnings.push(format!("{path} {}: {e}", describe(raw)));
            return None;
        }
    };
    if unlock.app_tokens.is_empty() {
        warnings.push(format!("{path} '{}' has no app tokens", unlock.id));
        return None;
    }
    if !seen.insert(unlock.id.clone()) {
        warnings.push(format!("{path} duplicate id '{}'", unlock.id));
        return None;
    }
    Some(unlock)
}
