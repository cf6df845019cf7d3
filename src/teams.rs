use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::access;
use crate::activity;
use crate::error::{AppError, AppResult};
use crate::games;
use crate::matchdays::{self, MAX_TEAMS, MIN_TEAMS};
use crate::models::{Action, EntityType, Team, TeamRoster};
use crate::players::{self, PLAYER_COLUMNS, player_from_row};
use crate::team_gen::{self, Strategy};
use crate::validate::{in_range, required_text};

const MAX_TEAM_NAME_LEN: usize = 40;
const MAX_COLOR_LEN: usize = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTeam {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub player_ids: Vec<i64>,
    pub team_count: Option<i64>,
    #[serde(default)]
    pub strategy: Strategy,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTeams {
    pub strategy: Strategy,
    pub seed: u64,
    pub teams: Vec<TeamRoster>,
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        matchday_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

pub(crate) fn fetch_team(conn: &Connection, team_id: i64) -> AppResult<Team> {
    let team = conn
        .query_row(
            "SELECT id, matchday_id, name, color, sort_order FROM teams WHERE id = ?1",
            params![team_id],
            team_from_row,
        )
        .optional()?;
    team.ok_or_else(|| AppError::not_found("team"))
}

pub(crate) fn teams_of_matchday(conn: &Connection, matchday_id: i64) -> AppResult<Vec<Team>> {
    let mut stmt = conn.prepare(
        "SELECT id, matchday_id, name, color, sort_order FROM teams
         WHERE matchday_id = ?1 ORDER BY sort_order, id",
    )?;
    let rows = stmt.query_map(params![matchday_id], team_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Team currently holding `player_id` on the matchday, if any.
pub(crate) fn team_of_player(conn: &Connection, matchday_id: i64, player_id: i64) -> AppResult<Option<i64>> {
    let team = conn
        .query_row(
            "SELECT team_id FROM team_assignments WHERE matchday_id = ?1 AND player_id = ?2",
            params![matchday_id, player_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(team)
}

fn roster_of(conn: &Connection, team: Team) -> AppResult<TeamRoster> {
    let columns = PLAYER_COLUMNS
        .split(", ")
        .map(|c| format!("p.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {columns} FROM team_assignments a JOIN players p ON p.id = a.player_id
         WHERE a.team_id = ?1 ORDER BY p.sort_order, p.id"
    ))?;
    let rows = stmt.query_map(params![team.id], player_from_row)?;
    let players = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(TeamRoster {
        total_skill: team_gen::total_skill(&players),
        team,
        players,
    })
}

pub(crate) fn rosters(conn: &Connection, matchday_id: i64) -> AppResult<Vec<TeamRoster>> {
    teams_of_matchday(conn, matchday_id)?
        .into_iter()
        .map(|team| roster_of(conn, team))
        .collect()
}

pub fn list_teams(conn: &Connection, actor: i64, group_id: i64, matchday_id: i64) -> AppResult<Vec<TeamRoster>> {
    access::require_member(conn, group_id, actor)?;
    matchdays::fetch_live_matchday(conn, group_id, matchday_id)?;
    rosters(conn, matchday_id)
}

fn team_color(raw: Option<&str>, fallback_idx: usize) -> AppResult<String> {
    match raw {
        Some(raw) => required_text(raw, "color", MAX_COLOR_LEN),
        None => Ok(team_gen::team_color(fallback_idx).to_string()),
    }
}

pub fn create_team(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    matchday_id: i64,
    input: &NewTeam,
) -> AppResult<TeamRoster> {
    let name = required_text(&input.name, "name", MAX_TEAM_NAME_LEN)?;

    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    matchdays::fetch_live_matchday(&tx, group_id, matchday_id)?;
    let existing = teams_of_matchday(&tx, matchday_id)?;
    if existing.len() as i64 >= MAX_TEAMS {
        return Err(AppError::conflict(format!(
            "a matchday can have at most {MAX_TEAMS} teams"
        )));
    }
    let color = team_color(input.color.as_deref(), existing.len())?;
    let sort_order = existing.iter().map(|t| t.sort_order + 1).max().unwrap_or(0);
    tx.execute(
        "INSERT INTO teams (matchday_id, name, color, sort_order) VALUES (?1, ?2, ?3, ?4)",
        params![matchday_id, name, color, sort_order],
    )?;
    let team = fetch_team(&tx, tx.last_insert_rowid())?;
    activity::record_create(&tx, group_id, actor, EntityType::Team, team.id, &team)?;
    let roster = roster_of(&tx, team)?;
    tx.commit()?;
    Ok(roster)
}

fn live_team(conn: &Connection, group_id: i64, team_id: i64) -> AppResult<Team> {
    access::team_in_group(conn, group_id, team_id)?;
    let team = fetch_team(conn, team_id)?;
    matchdays::fetch_live_matchday(conn, group_id, team.matchday_id)?;
    Ok(team)
}

pub fn update_team(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    team_id: i64,
    patch: &TeamPatch,
) -> AppResult<TeamRoster> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let before = live_team(&tx, group_id, team_id)?;
    let name = match patch.name.as_deref() {
        Some(raw) => required_text(raw, "name", MAX_TEAM_NAME_LEN)?,
        None => before.name.clone(),
    };
    let color = match patch.color.as_deref() {
        Some(raw) => required_text(raw, "color", MAX_COLOR_LEN)?,
        None => before.color.clone(),
    };
    tx.execute(
        "UPDATE teams SET name = ?1, color = ?2 WHERE id = ?3",
        params![name, color, team_id],
    )?;
    let after = fetch_team(&tx, team_id)?;
    activity::record_update(&tx, group_id, actor, EntityType::Team, team_id, &before, &after)?;
    let roster = roster_of(&tx, after)?;
    tx.commit()?;
    Ok(roster)
}

pub fn delete_team(conn: &mut Connection, actor: i64, group_id: i64, team_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let team = live_team(&tx, group_id, team_id)?;
    if games::live_games_involving(&tx, team_id)? > 0 {
        return Err(AppError::conflict("team plays in a recorded game"));
    }
    games::purge_deleted_games(&tx, team.matchday_id, Some(team_id))?;
    tx.execute("DELETE FROM team_assignments WHERE team_id = ?1", params![team_id])?;
    tx.execute("DELETE FROM teams WHERE id = ?1", params![team_id])?;
    let changes = activity::change("name", &team.name, Option::<()>::None)?;
    activity::record(&tx, group_id, actor, EntityType::Team, team_id, Action::Delete, changes)?;
    tx.commit()?;
    Ok(())
}

/// Sets the roster of a team; listed players leave their other team of the day.
pub fn assign_players(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    team_id: i64,
    player_ids: &[i64],
) -> AppResult<TeamRoster> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let team = live_team(&tx, group_id, team_id)?;
    let selected = players::load_selectable(&tx, group_id, player_ids)?;
    let before: Vec<i64> = roster_of(&tx, team.clone())?
        .players
        .iter()
        .map(|p| p.id)
        .collect();

    tx.execute("DELETE FROM team_assignments WHERE team_id = ?1", params![team_id])?;
    for player in &selected {
        tx.execute(
            "INSERT INTO team_assignments (matchday_id, player_id, team_id) VALUES (?1, ?2, ?3)
             ON CONFLICT (matchday_id, player_id) DO UPDATE SET team_id = excluded.team_id",
            params![team.matchday_id, player.id, team_id],
        )?;
    }

    let roster = roster_of(&tx, team)?;
    let after: Vec<i64> = roster.players.iter().map(|p| p.id).collect();
    if before != after {
        let changes = activity::change("players", &before, &after)?;
        activity::record(&tx, group_id, actor, EntityType::Team, team_id, Action::Update, changes)?;
    }
    tx.commit()?;
    Ok(roster)
}

pub fn generate_teams(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    matchday_id: i64,
    request: &GenerateRequest,
) -> AppResult<GeneratedTeams> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let matchday = matchdays::fetch_live_matchday(&tx, group_id, matchday_id)?;
    if !games::games_of_matchday(&tx, matchday_id)?.is_empty() {
        return Err(AppError::conflict(
            "teams cannot be regenerated once games are recorded",
        ));
    }

    let team_count = in_range(
        request.team_count.unwrap_or(matchday.team_count),
        "team_count",
        MIN_TEAMS,
        MAX_TEAMS,
    )?;
    if request.player_ids.is_empty() {
        return Err(AppError::validation("at least one player is required"));
    }
    let selected = players::load_selectable(&tx, group_id, &request.player_ids)?;
    if (selected.len() as i64) < team_count {
        return Err(AppError::validation(format!(
            "{} players cannot form {team_count} teams",
            selected.len()
        )));
    }

    let seed = request.seed.unwrap_or_else(rand::random);
    let split = team_gen::build_teams(&selected, team_count as usize, request.strategy, seed);

    games::purge_deleted_games(&tx, matchday_id, None)?;
    tx.execute(
        "DELETE FROM team_assignments WHERE matchday_id = ?1",
        params![matchday_id],
    )?;
    tx.execute("DELETE FROM teams WHERE matchday_id = ?1", params![matchday_id])?;

    for (idx, members) in split.iter().enumerate() {
        tx.execute(
            "INSERT INTO teams (matchday_id, name, color, sort_order) VALUES (?1, ?2, ?3, ?4)",
            params![
                matchday_id,
                team_gen::team_name(idx),
                team_gen::team_color(idx),
                idx as i64
            ],
        )?;
        let team_id = tx.last_insert_rowid();
        for player in members {
            tx.execute(
                "INSERT INTO team_assignments (matchday_id, player_id, team_id) VALUES (?1, ?2, ?3)",
                params![matchday_id, player.id, team_id],
            )?;
        }
    }

    let teams = rosters(&tx, matchday_id)?;
    let mut changes = serde_json::Map::new();
    changes.insert(
        "teams".to_string(),
        json!({
            "from": null,
            "to": teams
                .iter()
                .map(|t| json!({"name": t.team.name, "players": t.players.iter().map(|p| p.id).collect::<Vec<_>>()}))
                .collect::<Vec<_>>(),
        }),
    );
    changes.insert(
        "strategy".to_string(),
        json!({"from": null, "to": request.strategy}),
    );
    changes.insert("seed".to_string(), json!({"from": null, "to": seed}));
    activity::record(&tx, group_id, actor, EntityType::Matchday, matchday_id, Action::Generate, changes)?;
    tx.commit()?;

    info!(group_id, matchday_id, team_count, seed, "generated teams");
    Ok(GeneratedTeams {
        strategy: request.strategy,
        seed,
        teams,
    })
}
