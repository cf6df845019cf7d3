use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Deserialize;

use crate::access;
use crate::activity;
use crate::error::{AppError, AppResult};
use crate::models::{Action, EntityType, Player, Position};
use crate::validate::{double_option, in_range, required_text};

const MAX_NAME_LEN: usize = 60;
const MIN_SKILL: i64 = 1;
const MAX_SKILL: i64 = 10;
const DEFAULT_SKILL: i64 = 5;

pub(crate) const PLAYER_COLUMNS: &str = "id, group_id, name, position, skill, user_id, sort_order, active, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    #[serde(default)]
    pub position: Position,
    pub skill: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub skill: Option<i64>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub user_id: Option<Option<i64>>,
}

pub(crate) fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
        skill: row.get(4)?,
        user_id: row.get(5)?,
        sort_order: row.get(6)?,
        active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

/// Loads a player of the group, deleted or not.
pub(crate) fn fetch_player(conn: &Connection, group_id: i64, player_id: i64) -> AppResult<Player> {
    let player = conn
        .query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1 AND group_id = ?2"),
            params![player_id, group_id],
            player_from_row,
        )
        .optional()?;
    player.ok_or_else(|| AppError::not_found("player"))
}

fn fetch_live_player(conn: &Connection, group_id: i64, player_id: i64) -> AppResult<Player> {
    let player = fetch_player(conn, group_id, player_id)?;
    if player.deleted_at.is_some() {
        return Err(AppError::not_found("player"));
    }
    Ok(player)
}

/// Live, active players of the group matching `ids`, in the given order.
pub(crate) fn load_selectable(conn: &Connection, group_id: i64, ids: &[i64]) -> AppResult<Vec<Player>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(*id) {
            return Err(AppError::validation(format!("player {id} listed twice")));
        }
        let player = fetch_player(conn, group_id, *id)
            .map_err(|_| AppError::validation(format!("player {id} is not in this group")))?;
        if player.deleted_at.is_some() {
            return Err(AppError::validation(format!("player {} is deleted", player.name)));
        }
        if !player.active {
            return Err(AppError::validation(format!("player {} is inactive", player.name)));
        }
        out.push(player);
    }
    Ok(out)
}

fn ensure_name_free(conn: &Connection, group_id: i64, name: &str, except: Option<i64>) -> AppResult<()> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM players
                        WHERE group_id = ?1 AND deleted_at IS NULL
                          AND name = ?2 COLLATE NOCASE AND (?3 IS NULL OR id != ?3))",
        params![group_id, name, except],
        |row| row.get(0),
    )?;
    if taken {
        return Err(AppError::conflict(format!("a player named {name} already exists")));
    }
    Ok(())
}

fn ensure_linkable(conn: &Connection, group_id: i64, user_id: i64, except: Option<i64>) -> AppResult<()> {
    if access::member_role(conn, group_id, user_id)?.is_none() {
        return Err(AppError::validation("linked user must be a member of the group"));
    }
    let linked: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM players
                        WHERE group_id = ?1 AND deleted_at IS NULL AND user_id = ?2
                          AND (?3 IS NULL OR id != ?3))",
        params![group_id, user_id, except],
        |row| row.get(0),
    )?;
    if linked {
        return Err(AppError::conflict("user is already linked to another player"));
    }
    Ok(())
}

pub fn list_players(
    conn: &Connection,
    actor: i64,
    group_id: i64,
    include_deleted: bool,
) -> AppResult<Vec<Player>> {
    let member = access::require_member(conn, group_id, actor)?;
    let include_deleted = include_deleted && member.is_admin();
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players
         WHERE group_id = ?1 AND (?2 OR deleted_at IS NULL)
         ORDER BY sort_order, id"
    ))?;
    let rows = stmt.query_map(params![group_id, include_deleted], player_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_player(conn: &Connection, actor: i64, group_id: i64, player_id: i64) -> AppResult<Player> {
    access::require_member(conn, group_id, actor)?;
    fetch_live_player(conn, group_id, player_id)
}

pub fn create_player(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    input: &NewPlayer,
) -> AppResult<Player> {
    let name = required_text(&input.name, "name", MAX_NAME_LEN)?;
    let skill = in_range(input.skill.unwrap_or(DEFAULT_SKILL), "skill", MIN_SKILL, MAX_SKILL)?;

    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    ensure_name_free(&tx, group_id, &name, None)?;
    if let Some(user_id) = input.user_id {
        ensure_linkable(&tx, group_id, user_id, None)?;
    }

    let next_order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM players WHERE group_id = ?1",
        params![group_id],
        |row| row.get(0),
    )?;
    let now = Utc::now();
    tx.execute(
        "INSERT INTO players (group_id, name, position, skill, user_id, sort_order, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
        params![group_id, name, input.position, skill, input.user_id, next_order, now],
    )?;
    let player = fetch_player(&tx, group_id, tx.last_insert_rowid())?;
    activity::record_create(&tx, group_id, actor, EntityType::Player, player.id, &player)?;
    tx.commit()?;
    Ok(player)
}

pub fn update_player(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    player_id: i64,
    patch: &PlayerPatch,
) -> AppResult<Player> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let before = fetch_live_player(&tx, group_id, player_id)?;

    let name = match patch.name.as_deref() {
        Some(raw) => required_text(raw, "name", MAX_NAME_LEN)?,
        None => before.name.clone(),
    };
    if !name.eq_ignore_ascii_case(&before.name) {
        ensure_name_free(&tx, group_id, &name, Some(player_id))?;
    }
    let skill = match patch.skill {
        Some(skill) => in_range(skill, "skill", MIN_SKILL, MAX_SKILL)?,
        None => before.skill,
    };
    let user_id = match patch.user_id {
        Some(Some(user_id)) => {
            if before.user_id != Some(user_id) {
                ensure_linkable(&tx, group_id, user_id, Some(player_id))?;
            }
            Some(user_id)
        }
        Some(None) => None,
        None => before.user_id,
    };
    let position = patch.position.unwrap_or(before.position);
    let active = patch.active.unwrap_or(before.active);

    tx.execute(
        "UPDATE players SET name = ?1, position = ?2, skill = ?3, user_id = ?4, active = ?5, updated_at = ?6
         WHERE id = ?7",
        params![name, position, skill, user_id, active, Utc::now(), player_id],
    )?;
    let after = fetch_player(&tx, group_id, player_id)?;
    activity::record_update(&tx, group_id, actor, EntityType::Player, player_id, &before, &after)?;
    tx.commit()?;
    Ok(after)
}

pub fn delete_player(conn: &mut Connection, actor: i64, group_id: i64, player_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    fetch_live_player(&tx, group_id, player_id)?;
    let now = Utc::now();
    tx.execute(
        "UPDATE players SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, player_id],
    )?;
    let changes = activity::change("deleted_at", Option::<()>::None, now)?;
    activity::record(&tx, group_id, actor, EntityType::Player, player_id, Action::Delete, changes)?;
    tx.commit()?;
    Ok(())
}

pub fn restore_player(conn: &mut Connection, actor: i64, group_id: i64, player_id: i64) -> AppResult<Player> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let player = fetch_player(&tx, group_id, player_id)?;
    let Some(deleted_at) = player.deleted_at else {
        return Err(AppError::conflict("player is not deleted"));
    };
    ensure_name_free(&tx, group_id, &player.name, Some(player_id))?;
    let mut user_id = player.user_id;
    if let Some(linked) = user_id {
        // Drop a stale link rather than blocking the restore.
        if ensure_linkable(&tx, group_id, linked, Some(player_id)).is_err() {
            user_id = None;
        }
    }
    tx.execute(
        "UPDATE players SET deleted_at = NULL, user_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![user_id, Utc::now(), player_id],
    )?;
    let mut changes = activity::change("deleted_at", deleted_at, Option::<()>::None)?;
    if user_id != player.user_id {
        changes.extend(activity::change("user_id", player.user_id, user_id)?);
    }
    activity::record(&tx, group_id, actor, EntityType::Player, player_id, Action::Restore, changes)?;
    let restored = fetch_player(&tx, group_id, player_id)?;
    tx.commit()?;
    Ok(restored)
}

pub fn reorder_players(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    ordered_ids: &[i64],
) -> AppResult<Vec<Player>> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let current: Vec<i64> = list_players(&tx, actor, group_id, false)?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let requested: HashSet<i64> = ordered_ids.iter().copied().collect();
    if requested.len() != ordered_ids.len() {
        return Err(AppError::validation("player order contains duplicates"));
    }
    let expected: HashSet<i64> = current.iter().copied().collect();
    if requested != expected {
        return Err(AppError::validation(
            "player order must list every player of the group exactly once",
        ));
    }

    if current != ordered_ids {
        let now = Utc::now();
        for (idx, id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE players SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
                params![idx as i64, now, id],
            )?;
        }
        let changes = activity::change("order", &current, ordered_ids)?;
        activity::record(&tx, group_id, actor, EntityType::Group, group_id, Action::Reorder, changes)?;
    }
    let players = list_players(&tx, actor, group_id, false)?;
    tx.commit()?;
    Ok(players)
}
