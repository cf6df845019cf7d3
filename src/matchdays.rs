use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Deserialize;
use tracing::info;

use crate::access;
use crate::activity;
use crate::error::{AppError, AppResult};
use crate::games;
use crate::models::{Action, EntityType, Matchday, MatchdayDetail, MatchdayStatus};
use crate::teams;
use crate::validate::{double_option, in_range, optional_text, query_flag, required_text};

const MAX_TITLE_LEN: usize = 80;
const MAX_LOCATION_LEN: usize = 120;
const MAX_NOTES_LEN: usize = 1000;
pub const MIN_TEAMS: i64 = 2;
pub const MAX_TEAMS: i64 = 6;

pub(crate) const MATCHDAY_COLUMNS: &str = "id, group_id, title, scheduled_at, location, notes, team_count, status, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewMatchday {
    pub title: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub team_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchdayPatch {
    pub title: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    pub team_count: Option<i64>,
    pub status: Option<MatchdayStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchdayFilter {
    pub status: Option<MatchdayStatus>,
    #[serde(default, deserialize_with = "query_flag")]
    pub include_deleted: bool,
}

pub(crate) fn matchday_from_row(row: &Row<'_>) -> rusqlite::Result<Matchday> {
    Ok(Matchday {
        id: row.get(0)?,
        group_id: row.get(1)?,
        title: row.get(2)?,
        scheduled_at: row.get(3)?,
        location: row.get(4)?,
        notes: row.get(5)?,
        team_count: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

pub(crate) fn fetch_matchday(conn: &Connection, group_id: i64, matchday_id: i64) -> AppResult<Matchday> {
    let matchday = conn
        .query_row(
            &format!("SELECT {MATCHDAY_COLUMNS} FROM matchdays WHERE id = ?1 AND group_id = ?2"),
            params![matchday_id, group_id],
            matchday_from_row,
        )
        .optional()?;
    matchday.ok_or_else(|| AppError::not_found("matchday"))
}

pub(crate) fn fetch_live_matchday(conn: &Connection, group_id: i64, matchday_id: i64) -> AppResult<Matchday> {
    let matchday = fetch_matchday(conn, group_id, matchday_id)?;
    if matchday.deleted_at.is_some() {
        return Err(AppError::not_found("matchday"));
    }
    Ok(matchday)
}

pub fn list_matchdays(
    conn: &Connection,
    actor: i64,
    group_id: i64,
    filter: &MatchdayFilter,
) -> AppResult<Vec<Matchday>> {
    let member = access::require_member(conn, group_id, actor)?;
    let include_deleted = filter.include_deleted && member.is_admin();
    let mut stmt = conn.prepare(&format!(
        "SELECT {MATCHDAY_COLUMNS} FROM matchdays
         WHERE group_id = ?1 AND (?2 OR deleted_at IS NULL) AND (?3 IS NULL OR status = ?3)
         ORDER BY scheduled_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map(
        params![group_id, include_deleted, filter.status],
        matchday_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_matchday(conn: &Connection, actor: i64, group_id: i64, matchday_id: i64) -> AppResult<MatchdayDetail> {
    access::require_member(conn, group_id, actor)?;
    let matchday = fetch_live_matchday(conn, group_id, matchday_id)?;
    Ok(MatchdayDetail {
        teams: teams::rosters(conn, matchday.id)?,
        games: games::games_of_matchday(conn, matchday.id)?,
        matchday,
    })
}

pub fn create_matchday(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    input: &NewMatchday,
) -> AppResult<Matchday> {
    let title = required_text(&input.title, "title", MAX_TITLE_LEN)?;
    let location = optional_text(input.location.as_deref(), "location", MAX_LOCATION_LEN)?;
    let notes = optional_text(input.notes.as_deref(), "notes", MAX_NOTES_LEN)?;
    let team_count = in_range(input.team_count.unwrap_or(MIN_TEAMS), "team_count", MIN_TEAMS, MAX_TEAMS)?;

    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let now = Utc::now();
    tx.execute(
        "INSERT INTO matchdays (group_id, title, scheduled_at, location, notes, team_count, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            group_id,
            title,
            input.scheduled_at,
            location,
            notes,
            team_count,
            MatchdayStatus::Scheduled,
            now
        ],
    )?;
    let matchday = fetch_matchday(&tx, group_id, tx.last_insert_rowid())?;
    activity::record_create(&tx, group_id, actor, EntityType::Matchday, matchday.id, &matchday)?;
    tx.commit()?;
    Ok(matchday)
}

pub fn update_matchday(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    matchday_id: i64,
    patch: &MatchdayPatch,
) -> AppResult<Matchday> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let before = fetch_live_matchday(&tx, group_id, matchday_id)?;

    let title = match patch.title.as_deref() {
        Some(raw) => required_text(raw, "title", MAX_TITLE_LEN)?,
        None => before.title.clone(),
    };
    let location = match &patch.location {
        Some(raw) => optional_text(raw.as_deref(), "location", MAX_LOCATION_LEN)?,
        None => before.location.clone(),
    };
    let notes = match &patch.notes {
        Some(raw) => optional_text(raw.as_deref(), "notes", MAX_NOTES_LEN)?,
        None => before.notes.clone(),
    };
    let team_count = match patch.team_count {
        Some(count) => in_range(count, "team_count", MIN_TEAMS, MAX_TEAMS)?,
        None => before.team_count,
    };
    let scheduled_at = patch.scheduled_at.unwrap_or(before.scheduled_at);
    let status = patch.status.unwrap_or(before.status);

    tx.execute(
        "UPDATE matchdays SET title = ?1, scheduled_at = ?2, location = ?3, notes = ?4,
                              team_count = ?5, status = ?6, updated_at = ?7
         WHERE id = ?8",
        params![title, scheduled_at, location, notes, team_count, status, Utc::now(), matchday_id],
    )?;
    let after = fetch_matchday(&tx, group_id, matchday_id)?;
    activity::record_update(&tx, group_id, actor, EntityType::Matchday, matchday_id, &before, &after)?;
    tx.commit()?;
    Ok(after)
}

/// Soft-deletes the matchday and its live games under one timestamp.
pub fn delete_matchday(conn: &mut Connection, actor: i64, group_id: i64, matchday_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    fetch_live_matchday(&tx, group_id, matchday_id)?;
    let now = Utc::now();
    tx.execute(
        "UPDATE matchdays SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, matchday_id],
    )?;
    let games = tx.execute(
        "UPDATE games SET deleted_at = ?1, updated_at = ?1 WHERE matchday_id = ?2 AND deleted_at IS NULL",
        params![now, matchday_id],
    )?;
    let mut changes = activity::change("deleted_at", Option::<()>::None, now)?;
    changes.extend(activity::change("games_deleted", 0, games)?);
    activity::record(&tx, group_id, actor, EntityType::Matchday, matchday_id, Action::Delete, changes)?;
    tx.commit()?;

    info!(group_id, matchday_id, games, "deleted matchday");
    Ok(())
}

/// Restores the matchday and exactly the games removed together with it.
pub fn restore_matchday(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    matchday_id: i64,
) -> AppResult<Matchday> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let matchday = fetch_matchday(&tx, group_id, matchday_id)?;
    let Some(deleted_at) = matchday.deleted_at else {
        return Err(AppError::conflict("matchday is not deleted"));
    };
    let now = Utc::now();
    tx.execute(
        "UPDATE matchdays SET deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
        params![now, matchday_id],
    )?;
    let games = tx.execute(
        "UPDATE games SET deleted_at = NULL, updated_at = ?1 WHERE matchday_id = ?2 AND deleted_at = ?3",
        params![now, matchday_id, deleted_at],
    )?;
    let mut changes = activity::change("deleted_at", deleted_at, Option::<()>::None)?;
    changes.extend(activity::change("games_restored", 0, games)?);
    activity::record(&tx, group_id, actor, EntityType::Matchday, matchday_id, Action::Restore, changes)?;
    let restored = fetch_matchday(&tx, group_id, matchday_id)?;
    tx.commit()?;

    info!(group_id, matchday_id, games, "restored matchday");
    Ok(restored)
}
