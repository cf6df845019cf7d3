use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use tracing::info;

use crate::access;
use crate::activity;
use crate::error::{AppError, AppResult};
use crate::games;
use crate::models::{Action, EntityType, Game, GameStatus, PenaltyKick, PenaltyShootout};
use crate::teams;

const MAX_KICKS: usize = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct KickInput {
    pub team_id: i64,
    pub player_id: i64,
    pub scored: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShootoutInput {
    pub kicks: Vec<KickInput>,
}

/// Scores and winner derived from a kick sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShootoutTally {
    pub home_score: i64,
    pub away_score: i64,
    pub winner_team_id: Option<i64>,
}

pub fn tally(game: &Game, kicks: &[KickInput]) -> ShootoutTally {
    let scored = |team| kicks.iter().filter(|k| k.team_id == team && k.scored).count() as i64;
    let home_score = scored(game.home_team_id);
    let away_score = scored(game.away_team_id);
    ShootoutTally {
        home_score,
        away_score,
        winner_team_id: winner(game.home_team_id, game.away_team_id, home_score, away_score),
    }
}

fn winner(home: i64, away: i64, home_score: i64, away_score: i64) -> Option<i64> {
    match home_score.cmp(&away_score) {
        Ordering::Greater => Some(home),
        Ordering::Less => Some(away),
        Ordering::Equal => None,
    }
}

fn kicks_of(conn: &Connection, shootout_id: i64) -> AppResult<Vec<PenaltyKick>> {
    let mut stmt = conn.prepare(
        "SELECT id, round, team_id, player_id, scored FROM penalty_kicks
         WHERE shootout_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![shootout_id], |row| {
        Ok(PenaltyKick {
            id: row.get(0)?,
            round: row.get(1)?,
            team_id: row.get(2)?,
            player_id: row.get(3)?,
            scored: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn shootout_of_game(conn: &Connection, game_id: i64) -> AppResult<Option<PenaltyShootout>> {
    let head = conn
        .query_row(
            "SELECT s.id, s.created_at, s.updated_at, g.home_team_id, g.away_team_id
             FROM penalty_shootouts s JOIN games g ON g.id = s.game_id
             WHERE s.game_id = ?1",
            params![game_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((id, created_at, updated_at, home, away)) = head else {
        return Ok(None);
    };
    let kicks = kicks_of(conn, id)?;
    let scored = |team| kicks.iter().filter(|k| k.team_id == team && k.scored).count() as i64;
    let home_score = scored(home);
    let away_score = scored(away);
    Ok(Some(PenaltyShootout {
        id,
        game_id,
        home_score,
        away_score,
        winner_team_id: winner(home, away, home_score, away_score),
        kicks,
        created_at,
        updated_at,
    }))
}

/// Stores the shootout of a drawn game, replacing any earlier one.
pub fn record_shootout(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    game_id: i64,
    input: &ShootoutInput,
) -> AppResult<PenaltyShootout> {
    if input.kicks.is_empty() || input.kicks.len() > MAX_KICKS {
        return Err(AppError::validation(format!(
            "a shootout needs 1 to {MAX_KICKS} kicks"
        )));
    }

    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let game = games::fetch_live_game(&tx, group_id, game_id)?;
    if game.status != GameStatus::Finished || !game.is_level() {
        return Err(AppError::conflict(
            "only a finished, level game can go to penalties",
        ));
    }

    let mut rosters: HashMap<i64, i64> = HashMap::new();
    for kick in &input.kicks {
        if kick.team_id != game.home_team_id && kick.team_id != game.away_team_id {
            return Err(AppError::validation(format!(
                "team {} is not playing this game",
                kick.team_id
            )));
        }
        let team = match rosters.get(&kick.player_id) {
            Some(team) => Some(*team),
            None => teams::team_of_player(&tx, game.matchday_id, kick.player_id)?,
        };
        if team != Some(kick.team_id) {
            return Err(AppError::validation(format!(
                "player {} does not play for team {}",
                kick.player_id, kick.team_id
            )));
        }
        rosters.insert(kick.player_id, kick.team_id);
    }

    let result = tally(&game, &input.kicks);
    if result.winner_team_id.is_none() {
        return Err(AppError::validation("a shootout must produce a winner"));
    }

    let before = shootout_of_game(&tx, game_id)?;
    let now = Utc::now();
    let shootout_id = match &before {
        Some(existing) => {
            tx.execute(
                "DELETE FROM penalty_kicks WHERE shootout_id = ?1",
                params![existing.id],
            )?;
            tx.execute(
                "UPDATE penalty_shootouts SET updated_at = ?1 WHERE id = ?2",
                params![now, existing.id],
            )?;
            existing.id
        }
        None => {
            tx.execute(
                "INSERT INTO penalty_shootouts (game_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![game_id, now],
            )?;
            tx.last_insert_rowid()
        }
    };

    let mut rounds: HashMap<i64, i64> = HashMap::new();
    for kick in &input.kicks {
        let round = rounds.entry(kick.team_id).or_insert(0);
        *round += 1;
        tx.execute(
            "INSERT INTO penalty_kicks (shootout_id, round, team_id, player_id, scored)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![shootout_id, *round, kick.team_id, kick.player_id, kick.scored],
        )?;
    }

    let after = shootout_of_game(&tx, game_id)?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("shootout vanished after insert")))?;
    match &before {
        Some(before) => {
            activity::record_update(&tx, group_id, actor, EntityType::Shootout, shootout_id, before, &after)?;
        }
        None => {
            activity::record_create(&tx, group_id, actor, EntityType::Shootout, shootout_id, &after)?;
        }
    }
    tx.commit()?;

    info!(
        group_id,
        game_id,
        home = after.home_score,
        away = after.away_score,
        "recorded shootout"
    );
    Ok(after)
}

pub fn delete_shootout(conn: &mut Connection, actor: i64, group_id: i64, game_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    games::fetch_live_game(&tx, group_id, game_id)?;
    let shootout = shootout_of_game(&tx, game_id)?.ok_or_else(|| AppError::not_found("shootout"))?;
    tx.execute("DELETE FROM penalty_shootouts WHERE id = ?1", params![shootout.id])?;
    let changes = activity::change("winner_team_id", shootout.winner_team_id, Option::<()>::None)?;
    activity::record(&tx, group_id, actor, EntityType::Shootout, shootout.id, Action::Delete, changes)?;
    tx.commit()?;
    Ok(())
}
