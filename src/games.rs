use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Deserialize;

use crate::access;
use crate::activity;
use crate::error::{AppError, AppResult};
use crate::matchdays;
use crate::models::{Action, EntityType, EventKind, Game, GameDetail, GameEvent, GameStatus};
use crate::shootouts;
use crate::teams;
use crate::validate::in_range;

const MAX_SCORE: i64 = 99;
const MAX_MINUTE: i64 = 200;

pub(crate) const GAME_COLUMNS: &str = "id, matchday_id, home_team_id, away_team_id, home_score, away_score, status, sequence, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewGame {
    pub home_team_id: i64,
    pub away_team_id: i64,
    #[serde(default)]
    pub home_score: i64,
    #[serde(default)]
    pub away_score: i64,
    pub status: Option<GameStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GamePatch {
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub status: Option<GameStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub kind: EventKind,
    pub player_id: i64,
    pub assist_player_id: Option<i64>,
    pub minute: Option<i64>,
}

pub(crate) fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        matchday_id: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        home_score: row.get(4)?,
        away_score: row.get(5)?,
        status: row.get(6)?,
        sequence: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<GameEvent> {
    Ok(GameEvent {
        id: row.get(0)?,
        game_id: row.get(1)?,
        kind: row.get(2)?,
        player_id: row.get(3)?,
        team_id: row.get(4)?,
        assist_player_id: row.get(5)?,
        minute: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn fetch_game(conn: &Connection, group_id: i64, game_id: i64) -> AppResult<Game> {
    access::game_in_group(conn, group_id, game_id)?;
    let game = conn
        .query_row(
            &format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"),
            params![game_id],
            game_from_row,
        )
        .optional()?;
    game.ok_or_else(|| AppError::not_found("game"))
}

pub(crate) fn fetch_live_game(conn: &Connection, group_id: i64, game_id: i64) -> AppResult<Game> {
    let game = fetch_game(conn, group_id, game_id)?;
    if game.deleted_at.is_some() {
        return Err(AppError::not_found("game"));
    }
    Ok(game)
}

/// Live games of a matchday in play order.
pub(crate) fn games_of_matchday(conn: &Connection, matchday_id: i64) -> AppResult<Vec<Game>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GAME_COLUMNS} FROM games
         WHERE matchday_id = ?1 AND deleted_at IS NULL
         ORDER BY sequence, id"
    ))?;
    let rows = stmt.query_map(params![matchday_id], game_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn events_of_game(conn: &Connection, game_id: i64) -> AppResult<Vec<GameEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, game_id, kind, player_id, team_id, assist_player_id, minute, created_at
         FROM game_events WHERE game_id = ?1
         ORDER BY minute IS NULL, minute, id",
    )?;
    let rows = stmt.query_map(params![game_id], event_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn live_games_involving(conn: &Connection, team_id: i64) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM games
         WHERE deleted_at IS NULL AND (home_team_id = ?1 OR away_team_id = ?1)",
        params![team_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Hard-deletes soft-deleted games of a matchday (optionally only those
/// involving `team_id`) together with their events and shootouts.
pub(crate) fn purge_deleted_games(conn: &Connection, matchday_id: i64, team_id: Option<i64>) -> AppResult<usize> {
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM games
             WHERE matchday_id = ?1 AND deleted_at IS NOT NULL
               AND (?2 IS NULL OR home_team_id = ?2 OR away_team_id = ?2)",
        )?;
        let rows = stmt.query_map(params![matchday_id, team_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    for id in &ids {
        conn.execute("DELETE FROM penalty_shootouts WHERE game_id = ?1", params![id])?;
        conn.execute("DELETE FROM game_events WHERE game_id = ?1", params![id])?;
        conn.execute("DELETE FROM games WHERE id = ?1", params![id])?;
    }
    Ok(ids.len())
}

/// Goals credited by events, keyed by team.
fn credited_goals(conn: &Connection, game_id: i64) -> AppResult<HashMap<i64, i64>> {
    let mut stmt =
        conn.prepare("SELECT team_id, COUNT(*) FROM game_events WHERE game_id = ?1 GROUP BY team_id")?;
    let rows = stmt.query_map(params![game_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
}

fn check_teams(conn: &Connection, matchday_id: i64, home: i64, away: i64) -> AppResult<()> {
    if home == away {
        return Err(AppError::validation("a team cannot play itself"));
    }
    let teams = teams::teams_of_matchday(conn, matchday_id)?;
    for id in [home, away] {
        if !teams.iter().any(|t| t.id == id) {
            return Err(AppError::validation(format!(
                "team {id} does not belong to this matchday"
            )));
        }
    }
    Ok(())
}

pub fn list_games(conn: &Connection, actor: i64, group_id: i64, matchday_id: i64) -> AppResult<Vec<Game>> {
    access::require_member(conn, group_id, actor)?;
    matchdays::fetch_live_matchday(conn, group_id, matchday_id)?;
    games_of_matchday(conn, matchday_id)
}

pub(crate) fn game_detail(conn: &Connection, game: Game) -> AppResult<GameDetail> {
    Ok(GameDetail {
        events: events_of_game(conn, game.id)?,
        shootout: shootouts::shootout_of_game(conn, game.id)?,
        game,
    })
}

pub fn get_game(conn: &Connection, actor: i64, group_id: i64, game_id: i64) -> AppResult<GameDetail> {
    access::require_member(conn, group_id, actor)?;
    let game = fetch_live_game(conn, group_id, game_id)?;
    game_detail(conn, game)
}

pub fn create_game(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    matchday_id: i64,
    input: &NewGame,
) -> AppResult<Game> {
    let home_score = in_range(input.home_score, "home_score", 0, MAX_SCORE)?;
    let away_score = in_range(input.away_score, "away_score", 0, MAX_SCORE)?;

    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    matchdays::fetch_live_matchday(&tx, group_id, matchday_id)?;
    check_teams(&tx, matchday_id, input.home_team_id, input.away_team_id)?;

    let sequence: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence), 0) + 1 FROM games WHERE matchday_id = ?1",
        params![matchday_id],
        |row| row.get(0),
    )?;
    let now = Utc::now();
    tx.execute(
        "INSERT INTO games (matchday_id, home_team_id, away_team_id, home_score, away_score, status, sequence, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            matchday_id,
            input.home_team_id,
            input.away_team_id,
            home_score,
            away_score,
            input.status.unwrap_or(GameStatus::Scheduled),
            sequence,
            now
        ],
    )?;
    let game = fetch_game(&tx, group_id, tx.last_insert_rowid())?;
    activity::record_create(&tx, group_id, actor, EntityType::Game, game.id, &game)?;
    tx.commit()?;
    Ok(game)
}

pub fn update_game(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    game_id: i64,
    patch: &GamePatch,
) -> AppResult<GameDetail> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let before = fetch_live_game(&tx, group_id, game_id)?;

    let home_team_id = patch.home_team_id.unwrap_or(before.home_team_id);
    let away_team_id = patch.away_team_id.unwrap_or(before.away_team_id);
    let home_score = in_range(patch.home_score.unwrap_or(before.home_score), "home_score", 0, MAX_SCORE)?;
    let away_score = in_range(patch.away_score.unwrap_or(before.away_score), "away_score", 0, MAX_SCORE)?;
    let status = patch.status.unwrap_or(before.status);

    let credited = credited_goals(&tx, game_id)?;
    let teams_changed = home_team_id != before.home_team_id || away_team_id != before.away_team_id;
    if teams_changed {
        check_teams(&tx, before.matchday_id, home_team_id, away_team_id)?;
        if !credited.is_empty() {
            return Err(AppError::conflict("teams cannot change once goals are recorded"));
        }
    }
    for (team_id, score) in [(home_team_id, home_score), (away_team_id, away_score)] {
        let goals = credited.get(&team_id).copied().unwrap_or(0);
        if score < goals {
            return Err(AppError::validation(format!(
                "score {score} is below the {goals} goals already recorded for team {team_id}"
            )));
        }
    }
    if shootouts::shootout_of_game(&tx, game_id)?.is_some()
        && (home_score != away_score || status != GameStatus::Finished || teams_changed)
    {
        return Err(AppError::conflict(
            "game has a penalty shootout; delete it before changing the result",
        ));
    }

    tx.execute(
        "UPDATE games SET home_team_id = ?1, away_team_id = ?2, home_score = ?3, away_score = ?4,
                          status = ?5, updated_at = ?6
         WHERE id = ?7",
        params![home_team_id, away_team_id, home_score, away_score, status, Utc::now(), game_id],
    )?;
    let after = fetch_game(&tx, group_id, game_id)?;
    activity::record_update(&tx, group_id, actor, EntityType::Game, game_id, &before, &after)?;
    let detail = game_detail(&tx, after)?;
    tx.commit()?;
    Ok(detail)
}

pub fn delete_game(conn: &mut Connection, actor: i64, group_id: i64, game_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    fetch_live_game(&tx, group_id, game_id)?;
    let now = Utc::now();
    tx.execute(
        "UPDATE games SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, game_id],
    )?;
    let changes = activity::change("deleted_at", Option::<()>::None, now)?;
    activity::record(&tx, group_id, actor, EntityType::Game, game_id, Action::Delete, changes)?;
    tx.commit()?;
    Ok(())
}

pub fn restore_game(conn: &mut Connection, actor: i64, group_id: i64, game_id: i64) -> AppResult<GameDetail> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let game = fetch_game(&tx, group_id, game_id)?;
    let Some(deleted_at) = game.deleted_at else {
        return Err(AppError::conflict("game is not deleted"));
    };
    let matchday = matchdays::fetch_matchday(&tx, group_id, game.matchday_id)?;
    if matchday.deleted_at.is_some() {
        return Err(AppError::conflict("restore the matchday first"));
    }
    tx.execute(
        "UPDATE games SET deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
        params![Utc::now(), game_id],
    )?;
    let changes = activity::change("deleted_at", deleted_at, Option::<()>::None)?;
    activity::record(&tx, group_id, actor, EntityType::Game, game_id, Action::Restore, changes)?;
    let restored = fetch_game(&tx, group_id, game_id)?;
    let detail = game_detail(&tx, restored)?;
    tx.commit()?;
    Ok(detail)
}

/// Records a goal. `team_id` on the stored event is the team credited with it,
/// which for an own goal is the opponent of the scorer's team.
pub fn add_event(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    game_id: i64,
    input: &NewEvent,
) -> AppResult<GameEvent> {
    let minute = input
        .minute
        .map(|m| in_range(m, "minute", 0, MAX_MINUTE))
        .transpose()?;

    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let game = fetch_live_game(&tx, group_id, game_id)?;

    let player_team = teams::team_of_player(&tx, game.matchday_id, input.player_id)?
        .filter(|team| *team == game.home_team_id || *team == game.away_team_id)
        .ok_or_else(|| AppError::validation("player is not on either team of this game"))?;
    let credited_team = match input.kind {
        EventKind::Goal => player_team,
        EventKind::OwnGoal => game
            .opponent_of(player_team)
            .ok_or_else(|| AppError::validation("player is not on either team of this game"))?,
    };

    if let Some(assist) = input.assist_player_id {
        if input.kind != EventKind::Goal {
            return Err(AppError::validation("only goals can have an assist"));
        }
        if assist == input.player_id {
            return Err(AppError::validation("a player cannot assist their own goal"));
        }
        if teams::team_of_player(&tx, game.matchday_id, assist)? != Some(player_team) {
            return Err(AppError::validation("assisting player must be on the scorer's team"));
        }
    }

    let already = credited_goals(&tx, game_id)?
        .get(&credited_team)
        .copied()
        .unwrap_or(0);
    let score = game.score_for(credited_team).unwrap_or(0);
    if already + 1 > score {
        return Err(AppError::validation(format!(
            "team {credited_team} scored {score}; update the score before adding more goals"
        )));
    }

    tx.execute(
        "INSERT INTO game_events (game_id, kind, player_id, team_id, assist_player_id, minute, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            game_id,
            input.kind,
            input.player_id,
            credited_team,
            input.assist_player_id,
            minute,
            Utc::now()
        ],
    )?;
    let event_id = tx.last_insert_rowid();
    let event = tx.query_row(
        "SELECT id, game_id, kind, player_id, team_id, assist_player_id, minute, created_at
         FROM game_events WHERE id = ?1",
        params![event_id],
        event_from_row,
    )?;
    activity::record_create(&tx, group_id, actor, EntityType::GameEvent, event.id, &event)?;
    tx.commit()?;
    Ok(event)
}

pub fn delete_event(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    game_id: i64,
    event_id: i64,
) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    fetch_live_game(&tx, group_id, game_id)?;
    let event = tx
        .query_row(
            "SELECT id, game_id, kind, player_id, team_id, assist_player_id, minute, created_at
             FROM game_events WHERE id = ?1 AND game_id = ?2",
            params![event_id, game_id],
            event_from_row,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("event"))?;
    tx.execute("DELETE FROM game_events WHERE id = ?1", params![event_id])?;
    let changes = activity::diff(&serde_json::to_value(&event)?, &serde_json::Value::Null);
    activity::record(&tx, group_id, actor, EntityType::GameEvent, event_id, Action::Delete, changes)?;
    tx.commit()?;
    Ok(())
}
