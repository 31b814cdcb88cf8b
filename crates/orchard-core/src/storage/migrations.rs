//! Versioned migrations for the persisted engine document.
//!
//! Each step upgrades the JSON payload from exactly one version to the next
//! and they always run in order. A payload already at
//! [`CURRENT_VERSION`] passes through untouched.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::error::MigrationError;

/// Current persisted schema version.
///
/// Increment this when adding a new [`MigrationStep`].
pub const CURRENT_VERSION: u64 = 3;

const DATE_FIELDS: [&str; 5] = ["startTime", "endTime", "createdAt", "updatedAt", "endedAt"];

/// Entity collections that may be stored as a map plus an id list.
const COLLECTIONS: [(&str, &str); 4] = [
    ("focus", "sessions"),
    ("rewards", "transactions"),
    ("blocklist", "activeUnlockSessions"),
    ("blocklist", "unlockHistory"),
];

/// Top-level keys from the flat layout and the group they belong to.
const FLAT_KEYS: [(&str, &str, &str); 10] = [
    ("currentSession", "focus", "currentSession"),
    ("sessions", "focus", "sessions"),
    ("balance", "rewards", "balance"),
    ("totalEarned", "rewards", "totalEarned"),
    ("totalSpent", "rewards", "totalSpent"),
    ("transactions", "rewards", "transactions"),
    ("settings", "blocklist", "settings"),
    ("blockSettings", "blocklist", "settings"),
    ("unlockSessions", "blocklist", "activeUnlockSessions"),
    ("activeUnlockSessions", "blocklist", "activeUnlockSessions"),
];

const LEGACY_GROUPS: [(&str, &str); 3] = [
    ("timer", "focus"),
    ("wallet", "rewards"),
    ("shield", "blocklist"),
];

/// One upgrade, named by what it does and keyed by the version it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// v0 → v1: move flat and deprecated top-level keys into
    /// `focus` / `rewards` / `blocklist`.
    RegroupTopLevel,
    /// v1 → v2: turn `{byId, allIds}` collections into arrays.
    FlattenEntityMaps,
    /// v2 → v3: normalise timestamps and add the v3 fields.
    CoerceTimestamps,
}

impl MigrationStep {
    pub const ALL: [MigrationStep; 3] = [
        MigrationStep::RegroupTopLevel,
        MigrationStep::FlattenEntityMaps,
        MigrationStep::CoerceTimestamps,
    ];

    pub fn from_version(self) -> u64 {
        match self {
            MigrationStep::RegroupTopLevel => 0,
            MigrationStep::FlattenEntityMaps => 1,
            MigrationStep::CoerceTimestamps => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MigrationStep::RegroupTopLevel => "regroup_top_level",
            MigrationStep::FlattenEntityMaps => "flatten_entity_maps",
            MigrationStep::CoerceTimestamps => "coerce_timestamps",
        }
    }

    fn apply(self, root: &mut Map<String, Value>, now: DateTime<Utc>) -> Result<(), MigrationError> {
        match self {
            MigrationStep::RegroupTopLevel => regroup_top_level(root)?,
            MigrationStep::FlattenEntityMaps => flatten_entity_maps(root)?,
            MigrationStep::CoerceTimestamps => coerce_timestamps(root, now)?,
        }
        root.insert("version".into(), json!(self.from_version() + 1));
        Ok(())
    }
}

/// Result of bringing a payload up to date.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub value: Value,
    pub from_version: u64,
    pub applied: Vec<MigrationStep>,
}

impl Migrated {
    pub fn was_migrated(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Work out which schema version a payload was written with.
///
/// An explicit `version` wins. Without one, a payload that already has the
/// grouped layout is v1 and anything else is v0.
///
/// # Errors
/// Returns an error if the root is not an object, the version is not an
/// unsigned integer, or it is newer than [`CURRENT_VERSION`].
pub fn detect_version(value: &Value) -> Result<u64, MigrationError> {
    let root = value
        .as_object()
        .ok_or_else(|| MigrationError::structural("$", "root is not an object"))?;

    let version = match root.get("version") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| MigrationError::structural("$.version", format!("not a version number: {v}")))?,
        None if root.contains_key("focus") || root.contains_key("rewards") => 1,
        None => 0,
    };

    if version > CURRENT_VERSION {
        return Err(MigrationError::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }
    Ok(version)
}

/// Apply every pending step in order.
///
/// # Errors
/// Returns an error if the version cannot be determined or a step meets a
/// shape it cannot upgrade.
pub fn migrate(mut value: Value, now: DateTime<Utc>) -> Result<Migrated, MigrationError> {
    let from_version = detect_version(&value)?;
    let mut applied = Vec::new();

    let root = value
        .as_object_mut()
        .ok_or_else(|| MigrationError::structural("$", "root is not an object"))?;

    for step in MigrationStep::ALL {
        if from_version <= step.from_version() {
            tracing::info!(step = step.name(), from = step.from_version(), "migrating engine state");
            step.apply(root, now)?;
            applied.push(step);
        }
    }

    Ok(Migrated {
        value,
        from_version,
        applied,
    })
}

// ── v0 → v1 ──────────────────────────────────────────────────────────

fn group_mut<'a>(
    root: &'a mut Map<String, Value>,
    group: &str,
) -> Result<&'a mut Map<String, Value>, MigrationError> {
    root.entry(group)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| MigrationError::structural(format!("$.{group}"), "group is not an object"))
}

fn regroup_top_level(root: &mut Map<String, Value>) -> Result<(), MigrationError> {
    for (legacy, group) in LEGACY_GROUPS {
        let Some(old) = root.remove(legacy) else {
            continue;
        };
        let Value::Object(old) = old else {
            return Err(MigrationError::structural(
                format!("$.{legacy}"),
                "group is not an object",
            ));
        };
        let target = group_mut(root, group)?;
        for (key, value) in old {
            target.entry(key).or_insert(value);
        }
    }

    for (flat, group, field) in FLAT_KEYS {
        let Some(value) = root.remove(flat) else {
            continue;
        };
        group_mut(root, group)?.entry(field).or_insert(value);
    }

    for group in ["focus", "rewards", "blocklist"] {
        group_mut(root, group)?;
    }
    Ok(())
}

// ── v1 → v2 ──────────────────────────────────────────────────────────

fn flatten_entity_maps(root: &mut Map<String, Value>) -> Result<(), MigrationError> {
    for (group, field) in COLLECTIONS {
        let Some(collection) = root
            .get_mut(group)
            .and_then(Value::as_object_mut)
            .and_then(|g| g.get_mut(field))
        else {
            continue;
        };
        if let Value::Object(map) = collection {
            let flat = flatten(std::mem::take(map), &format!("$.{group}.{field}"))?;
            *collection = Value::Array(flat);
        }
    }
    Ok(())
}

fn flatten(mut shape: Map<String, Value>, path: &str) -> Result<Vec<Value>, MigrationError> {
    let (entities, ids) = match (shape.remove("byId"), shape.remove("allIds")) {
        (Some(e), ids) => (e, ids),
        (None, _) => match (shape.remove("entities"), shape.remove("ids")) {
            (Some(e), ids) => (e, ids),
            (None, _) => {
                return Err(MigrationError::structural(
                    path,
                    "collection is an object without byId/entities",
                ))
            }
        },
    };

    let Value::Object(mut entities) = entities else {
        return Err(MigrationError::structural(path, "entity map is not an object"));
    };
    let ids: Vec<String> = match ids {
        Some(Value::Array(ids)) => ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_owned))
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(MigrationError::structural(path, "id list is not an array")),
    };

    let mut flat = Vec::with_capacity(entities.len());
    for id in ids {
        if let Some(entity) = entities.remove(&id) {
            flat.push(with_id(entity, id));
        }
    }
    flat.extend(entities.into_iter().map(|(id, entity)| with_id(entity, id)));
    Ok(flat)
}

fn with_id(mut entity: Value, id: String) -> Value {
    if let Value::Object(fields) = &mut entity {
        fields.entry("id").or_insert(Value::String(id));
    }
    entity
}

// ── v2 → v3 ──────────────────────────────────────────────────────────

fn coerce_timestamps(root: &mut Map<String, Value>, now: DateTime<Utc>) -> Result<(), MigrationError> {
    for group in ["focus", "rewards", "blocklist"] {
        if let Some(value) = root.get_mut(group) {
            coerce_dates_in(value, now);
        }
    }

    let focus = group_mut(root, "focus")?;
    if let Some(current) = focus.get_mut("currentSession") {
        rename_category(current);
    }
    if let Some(Value::Array(sessions)) = focus.get_mut("sessions") {
        sessions.iter_mut().for_each(rename_category);
    }

    let rewards = group_mut(root, "rewards")?;
    if !rewards.contains_key("archived") {
        let archived = carried_forward(rewards);
        rewards.insert("archived".into(), archived);
    }
    group_mut(root, "blocklist")?
        .entry("unlockHistory")
        .or_insert_with(|| json!([]));
    Ok(())
}

/// Totals that predate the transaction log. Older documents kept running
/// totals without a complete log, so the difference is carried forward as
/// already archived.
fn carried_forward(rewards: &Map<String, Value>) -> Value {
    let total = |key: &str| rewards.get(key).and_then(Value::as_u64).unwrap_or(0);
    let (mut earned, mut spent) = (0u64, 0u64);
    if let Some(Value::Array(transactions)) = rewards.get("transactions") {
        for tx in transactions {
            let amount = tx.get("amount").and_then(Value::as_u64).unwrap_or(0);
            match tx.get("type").and_then(Value::as_str) {
                Some("earned") => earned = earned.saturating_add(amount),
                Some("spent") => spent = spent.saturating_add(amount),
                _ => {}
            }
        }
    }
    json!({
        "earned": total("totalEarned").saturating_sub(earned),
        "spent": total("totalSpent").saturating_sub(spent),
        "count": 0,
    })
}

fn coerce_dates_in(value: &mut Value, now: DateTime<Utc>) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields.iter_mut() {
                if DATE_FIELDS.contains(&key.as_str()) {
                    if !field.is_null() {
                        *field = Value::String(format_timestamp(coerce_timestamp(field, now)));
                    }
                } else if key != "metadata" {
                    coerce_dates_in(field, now);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| coerce_dates_in(item, now)),
        _ => {}
    }
}

fn rename_category(session: &mut Value) {
    if let Value::Object(fields) = session {
        if let Some(category) = fields.remove("categoryId") {
            fields.entry("tagId").or_insert(category);
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Interpret a stored date, falling back to `now` when it is unreadable.
pub fn coerce_timestamp(value: &Value, now: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        tracing::warn!(%value, "unreadable timestamp replaced with now");
        now
    })
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let millis = if n >= MILLIS_THRESHOLD { n } else { n * 1000.0 };
    // Truncation to whole milliseconds.
    DateTime::from_timestamp_millis(millis as i64)
}
