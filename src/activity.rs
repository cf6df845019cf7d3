//! Append-only audit trail of group mutations with field-level diffs.

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::access;
use crate::error::AppResult;
use crate::models::{Action, ActivityEntry, EntityType};

const IGNORED_FIELDS: &[&str] = &["created_at", "updated_at"];
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
    pub before: Option<i64>,
    pub entity_type: Option<EntityType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPage {
    pub entries: Vec<ActivityEntry>,
    pub next_before: Option<i64>,
}

/// Field-by-field difference of two JSON objects as `{field: {from, to}}`.
/// Non-object inputs are treated as empty objects.
pub fn diff(before: &Value, after: &Value) -> Map<String, Value> {
    let empty = Map::new();
    let old = before.as_object().unwrap_or(&empty);
    let new = after.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut out = Map::new();
    for key in keys {
        if IGNORED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let from = old.get(key).unwrap_or(&Value::Null);
        let to = new.get(key).unwrap_or(&Value::Null);
        if from != to {
            out.insert(key.clone(), json!({"from": from, "to": to}));
        }
    }
    out
}

pub fn record(
    conn: &Connection,
    group_id: i64,
    actor_user_id: i64,
    entity_type: EntityType,
    entity_id: i64,
    action: Action,
    changes: Map<String, Value>,
) -> AppResult<i64> {
    let changes = serde_json::to_string(&Value::Object(changes))?;
    conn.execute(
        "INSERT INTO activity_log (group_id, actor_user_id, entity_type, entity_id, action, changes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![group_id, actor_user_id, entity_type, entity_id, action, changes, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn record_create<T: Serialize>(
    conn: &Connection,
    group_id: i64,
    actor_user_id: i64,
    entity_type: EntityType,
    entity_id: i64,
    entity: &T,
) -> AppResult<i64> {
    let after = serde_json::to_value(entity)?;
    let changes = diff(&Value::Object(Map::new()), &after);
    record(
        conn,
        group_id,
        actor_user_id,
        entity_type,
        entity_id,
        Action::Create,
        changes,
    )
}

/// Records an update; returns `None` when nothing tracked changed.
pub fn record_update<T: Serialize>(
    conn: &Connection,
    group_id: i64,
    actor_user_id: i64,
    entity_type: EntityType,
    entity_id: i64,
    before: &T,
    after: &T,
) -> AppResult<Option<i64>> {
    let changes = diff(&serde_json::to_value(before)?, &serde_json::to_value(after)?);
    if changes.is_empty() {
        return Ok(None);
    }
    record(
        conn,
        group_id,
        actor_user_id,
        entity_type,
        entity_id,
        Action::Update,
        changes,
    )
    .map(Some)
}

/// Single-field change entry, e.g. for delete/restore/role changes.
pub fn change(field: &str, from: impl Serialize, to: impl Serialize) -> AppResult<Map<String, Value>> {
    let mut out = Map::new();
    out.insert(
        field.to_string(),
        json!({"from": serde_json::to_value(from)?, "to": serde_json::to_value(to)?}),
    );
    Ok(out)
}

pub fn list(
    conn: &Connection,
    group_id: i64,
    user_id: i64,
    query: &ActivityQuery,
) -> AppResult<ActivityPage> {
    access::require_member(conn, group_id, user_id)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let mut stmt = conn.prepare(
        "SELECT a.id, a.group_id, a.actor_user_id, u.display_name, a.entity_type, a.entity_id,
                a.action, a.changes, a.created_at
         FROM activity_log a JOIN users u ON u.id = a.actor_user_id
         WHERE a.group_id = ?1
           AND (?2 IS NULL OR a.id < ?2)
           AND (?3 IS NULL OR a.entity_type = ?3)
         ORDER BY a.id DESC
         LIMIT ?4",
    )?;
    let rows = stmt.query_map(
        params![group_id, query.before, query.entity_type, limit + 1],
        |row| {
            let raw: String = row.get(7)?;
            Ok(ActivityEntry {
                id: row.get(0)?,
                group_id: row.get(1)?,
                actor_user_id: row.get(2)?,
                actor_name: row.get(3)?,
                entity_type: row.get(4)?,
                entity_id: row.get(5)?,
                action: row.get(6)?,
                changes: serde_json::from_str(&raw).unwrap_or(Value::Null),
                created_at: row.get(8)?,
            })
        },
    )?;
    let mut entries = rows.collect::<Result<Vec<_>, _>>()?;

    let has_more = entries.len() as i64 > limit;
    entries.truncate(limit as usize);
    let next_before = if has_more {
        entries.last().map(|e| e.id)
    } else {
        None
    };
    Ok(ActivityPage {
        entries,
        next_before,
    })
}
