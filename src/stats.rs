//! Aggregated results: per-player season tables, matchday standings and
//! individual Elo ratings. Loading is split from the pure aggregation so the
//! tables can be computed (and benchmarked) without a database.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::access;
use crate::elo::{self, EloConfig, RatedGame};
use crate::error::{AppError, AppResult};
use crate::matchdays;
use crate::models::{EventKind, GameStatus};
use crate::teams;

const WIN_POINTS: i64 = 3;
const DRAW_POINTS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StatsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// A finished game with everything needed to score it.
#[derive(Debug, Clone)]
pub struct StatsGame {
    pub game_id: i64,
    pub matchday_id: i64,
    pub matchday_title: String,
    pub scheduled_at: DateTime<Utc>,
    pub sequence: i64,
    pub home_team_id: i64,
    pub home_team: String,
    pub away_team_id: i64,
    pub away_team: String,
    pub home_score: i64,
    pub away_score: i64,
    pub home_players: Vec<i64>,
    pub away_players: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct StatsEvent {
    pub game_id: i64,
    pub kind: EventKind,
    pub player_id: i64,
    pub team_id: i64,
    pub assist_player_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StatsKick {
    pub game_id: i64,
    pub team_id: i64,
    pub player_id: i64,
    pub scored: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StatsInput {
    /// Chronological.
    pub games: Vec<StatsGame>,
    pub events: Vec<StatsEvent>,
    pub kicks: Vec<StatsKick>,
    /// id -> (name, deleted)
    pub players: HashMap<i64, (String, bool)>,
}

impl StatsInput {
    /// Winner of each game's shootout, derived from its kicks.
    pub fn shootout_winners(&self) -> HashMap<i64, i64> {
        let mut goals: HashMap<(i64, i64), i64> = HashMap::new();
        for kick in &self.kicks {
            *goals.entry((kick.game_id, kick.team_id)).or_insert(0) += kick.scored as i64;
        }
        let mut out = HashMap::new();
        for game in &self.games {
            let home = goals.get(&(game.game_id, game.home_team_id));
            let away = goals.get(&(game.game_id, game.away_team_id));
            if home.is_none() && away.is_none() {
                continue;
            }
            let (home, away) = (home.copied().unwrap_or(0), away.copied().unwrap_or(0));
            if home > away {
                out.insert(game.game_id, game.home_team_id);
            } else if away > home {
                out.insert(game.game_id, game.away_team_id);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: i64,
    pub name: String,
    pub deleted: bool,
    pub matchdays: i64,
    pub games: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub points: i64,
    pub win_rate: f64,
    pub goals: i64,
    pub assists: i64,
    pub own_goals: i64,
    pub penalties_taken: i64,
    pub penalties_scored: i64,
    pub shootout_wins: i64,
    pub rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsTotals {
    pub matchdays: i64,
    pub games: i64,
    pub goals: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub players: Vec<PlayerStats>,
    pub totals: StatsTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStanding {
    pub team_id: i64,
    pub name: String,
    pub color: String,
    pub played: i64,
    pub won: i64,
    pub drawn: i64,
    pub lost: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_difference: i64,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorerRow {
    pub player_id: i64,
    pub name: String,
    pub goals: i64,
    pub assists: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchdayStandings {
    pub matchday_id: i64,
    pub table: Vec<TeamStanding>,
    pub top_scorers: Vec<ScorerRow>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn outcome(goals_for: i64, goals_against: i64) -> (i64, i64, i64) {
    match goals_for.cmp(&goals_against) {
        std::cmp::Ordering::Greater => (1, 0, 0),
        std::cmp::Ordering::Equal => (0, 1, 0),
        std::cmp::Ordering::Less => (0, 0, 1),
    }
}

/// Per-player table and totals. A game decided on penalties still counts as
/// a draw; the shootout winners are credited in `shootout_wins`.
pub fn aggregate(input: &StatsInput) -> (Vec<PlayerStats>, StatsTotals) {
    #[derive(Default)]
    struct Acc {
        matchdays: BTreeSet<i64>,
        games: i64,
        wins: i64,
        draws: i64,
        losses: i64,
        goals: i64,
        assists: i64,
        own_goals: i64,
        penalties_taken: i64,
        penalties_scored: i64,
        shootout_wins: i64,
    }

    let winners = input.shootout_winners();
    let mut acc: HashMap<i64, Acc> = HashMap::new();
    let mut matchdays = BTreeSet::new();
    let mut total_goals = 0;

    for game in &input.games {
        matchdays.insert(game.matchday_id);
        total_goals += game.home_score + game.away_score;
        let sides = [
            (&game.home_players, game.home_team_id, game.home_score, game.away_score),
            (&game.away_players, game.away_team_id, game.away_score, game.home_score),
        ];
        for (players, team_id, scored, conceded) in sides {
            let (w, d, l) = outcome(scored, conceded);
            let won_shootout = winners.get(&game.game_id) == Some(&team_id);
            for id in players {
                let row = acc.entry(*id).or_default();
                row.matchdays.insert(game.matchday_id);
                row.games += 1;
                row.wins += w;
                row.draws += d;
                row.losses += l;
                row.shootout_wins += won_shootout as i64;
            }
        }
    }

    for event in &input.events {
        match event.kind {
            EventKind::Goal => acc.entry(event.player_id).or_default().goals += 1,
            EventKind::OwnGoal => acc.entry(event.player_id).or_default().own_goals += 1,
        }
        if let Some(assist) = event.assist_player_id {
            acc.entry(assist).or_default().assists += 1;
        }
    }

    for kick in &input.kicks {
        let row = acc.entry(kick.player_id).or_default();
        row.penalties_taken += 1;
        row.penalties_scored += kick.scored as i64;
    }

    let rated: Vec<RatedGame> = input
        .games
        .iter()
        .map(|g| RatedGame {
            home_players: g.home_players.clone(),
            away_players: g.away_players.clone(),
            home_goals: g.home_score,
            away_goals: g.away_score,
        })
        .collect();
    let cfg = EloConfig::default();
    let ratings = elo::compute_player_elo(&rated, cfg);

    let mut rows: Vec<PlayerStats> = acc
        .into_iter()
        .map(|(player_id, a)| {
            let (name, deleted) = input
                .players
                .get(&player_id)
                .cloned()
                .unwrap_or_else(|| (format!("#{player_id}"), true));
            let win_rate = if a.games > 0 {
                round_to(a.wins as f64 / a.games as f64, 3)
            } else {
                0.0
            };
            PlayerStats {
                player_id,
                name,
                deleted,
                matchdays: a.matchdays.len() as i64,
                games: a.games,
                wins: a.wins,
                draws: a.draws,
                losses: a.losses,
                points: a.wins * WIN_POINTS + a.draws * DRAW_POINTS,
                win_rate,
                goals: a.goals,
                assists: a.assists,
                own_goals: a.own_goals,
                penalties_taken: a.penalties_taken,
                penalties_scored: a.penalties_scored,
                shootout_wins: a.shootout_wins,
                rating: round_to(ratings.get(&player_id).copied().unwrap_or(cfg.start), 1),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goals.cmp(&a.goals))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then(a.player_id.cmp(&b.player_id))
    });

    let totals = StatsTotals {
        matchdays: matchdays.len() as i64,
        games: input.games.len() as i64,
        goals: total_goals,
    };
    (rows, totals)
}

/// League table of one matchday's teams over `games`.
pub fn standings(teams: &[(i64, String, String)], games: &[StatsGame]) -> Vec<TeamStanding> {
    let mut table: Vec<TeamStanding> = teams
        .iter()
        .map(|(team_id, name, color)| TeamStanding {
            team_id: *team_id,
            name: name.clone(),
            color: color.clone(),
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
        })
        .collect();

    for game in games {
        for (team_id, scored, conceded) in [
            (game.home_team_id, game.home_score, game.away_score),
            (game.away_team_id, game.away_score, game.home_score),
        ] {
            let Some(row) = table.iter_mut().find(|r| r.team_id == team_id) else {
                continue;
            };
            let (w, d, l) = outcome(scored, conceded);
            row.played += 1;
            row.won += w;
            row.drawn += d;
            row.lost += l;
            row.goals_for += scored;
            row.goals_against += conceded;
        }
    }
    for row in &mut table {
        row.goal_difference = row.goals_for - row.goals_against;
        row.points = row.won * WIN_POINTS + row.drawn * DRAW_POINTS;
    }
    table.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference.cmp(&a.goal_difference))
            .then(b.goals_for.cmp(&a.goals_for))
            .then_with(|| a.name.cmp(&b.name))
    });
    table
}

pub fn top_scorers(events: &[StatsEvent], players: &HashMap<i64, (String, bool)>) -> Vec<ScorerRow> {
    let mut acc: HashMap<i64, (i64, i64)> = HashMap::new();
    for event in events {
        if event.kind == EventKind::Goal {
            acc.entry(event.player_id).or_default().0 += 1;
        }
        if let Some(assist) = event.assist_player_id {
            acc.entry(assist).or_default().1 += 1;
        }
    }
    let mut rows: Vec<ScorerRow> = acc
        .into_iter()
        .map(|(player_id, (goals, assists))| ScorerRow {
            player_id,
            name: players
                .get(&player_id)
                .map(|(name, _)| name.clone())
                .unwrap_or_else(|| format!("#{player_id}")),
            goals,
            assists,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.goals
            .cmp(&a.goals)
            .then(b.assists.cmp(&a.assists))
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

fn check_range(query: &StatsQuery) -> AppResult<()> {
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(AppError::validation("from must not be after to"));
    }
    Ok(())
}

fn in_range(query: &StatsQuery, at: DateTime<Utc>) -> bool {
    let day = at.date_naive();
    query.from.is_none_or(|from| day >= from) && query.to.is_none_or(|to| day <= to)
}

/// Finished, live games of live matchdays, optionally limited to one matchday.
pub(crate) fn load_input(
    conn: &Connection,
    group_id: i64,
    query: &StatsQuery,
    matchday_id: Option<i64>,
) -> AppResult<StatsInput> {
    let mut rosters: HashMap<i64, Vec<i64>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT a.team_id, a.player_id FROM team_assignments a
             JOIN matchdays m ON m.id = a.matchday_id
             WHERE m.group_id = ?1 AND m.deleted_at IS NULL AND (?2 IS NULL OR m.id = ?2)
             ORDER BY a.player_id",
        )?;
        let rows = stmt.query_map(params![group_id, matchday_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (team_id, player_id) = row?;
            rosters.entry(team_id).or_default().push(player_id);
        }
    }

    let mut games = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT g.id, g.matchday_id, m.title, m.scheduled_at, g.sequence,
                    g.home_team_id, ht.name, g.away_team_id, aw.name, g.home_score, g.away_score
             FROM games g
             JOIN matchdays m ON m.id = g.matchday_id
             JOIN teams ht ON ht.id = g.home_team_id
             JOIN teams aw ON aw.id = g.away_team_id
             WHERE m.group_id = ?1 AND m.deleted_at IS NULL AND g.deleted_at IS NULL
               AND g.status = ?2 AND (?3 IS NULL OR m.id = ?3)",
        )?;
        let rows = stmt.query_map(
            params![group_id, GameStatus::Finished, matchday_id],
            |row| {
                let home_team_id: i64 = row.get(5)?;
                let away_team_id: i64 = row.get(7)?;
                Ok(StatsGame {
                    game_id: row.get(0)?,
                    matchday_id: row.get(1)?,
                    matchday_title: row.get(2)?,
                    scheduled_at: row.get(3)?,
                    sequence: row.get(4)?,
                    home_team_id,
                    home_team: row.get(6)?,
                    away_team_id,
                    away_team: row.get(8)?,
                    home_score: row.get(9)?,
                    away_score: row.get(10)?,
                    home_players: rosters.get(&home_team_id).cloned().unwrap_or_default(),
                    away_players: rosters.get(&away_team_id).cloned().unwrap_or_default(),
                })
            },
        )?;
        for game in rows {
            let game = game?;
            if in_range(query, game.scheduled_at) {
                games.push(game);
            }
        }
    }
    games.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then(a.matchday_id.cmp(&b.matchday_id))
            .then(a.sequence.cmp(&b.sequence))
            .then(a.game_id.cmp(&b.game_id))
    });
    let counted: BTreeSet<i64> = games.iter().map(|g| g.game_id).collect();

    let events = {
        let mut stmt = conn.prepare(
            "SELECT e.game_id, e.kind, e.player_id, e.team_id, e.assist_player_id
             FROM game_events e JOIN games g ON g.id = e.game_id
             JOIN matchdays m ON m.id = g.matchday_id
             WHERE m.group_id = ?1
             ORDER BY e.id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(StatsEvent {
                game_id: row.get(0)?,
                kind: row.get(1)?,
                player_id: row.get(2)?,
                team_id: row.get(3)?,
                assist_player_id: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for event in rows {
            let event = event?;
            if counted.contains(&event.game_id) {
                out.push(event);
            }
        }
        out
    };

    let kicks = {
        let mut stmt = conn.prepare(
            "SELECT s.game_id, k.team_id, k.player_id, k.scored
             FROM penalty_kicks k JOIN penalty_shootouts s ON s.id = k.shootout_id
             JOIN games g ON g.id = s.game_id
             JOIN matchdays m ON m.id = g.matchday_id
             WHERE m.group_id = ?1
             ORDER BY k.id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(StatsKick {
                game_id: row.get(0)?,
                team_id: row.get(1)?,
                player_id: row.get(2)?,
                scored: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for kick in rows {
            let kick = kick?;
            if counted.contains(&kick.game_id) {
                out.push(kick);
            }
        }
        out
    };

    let players = {
        let mut stmt = conn.prepare(
            "SELECT id, name, deleted_at IS NOT NULL FROM players WHERE group_id = ?1",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((row.get::<_, i64>(0)?, (row.get::<_, String>(1)?, row.get::<_, bool>(2)?)))
        })?;
        rows.collect::<Result<HashMap<_, _>, _>>()?
    };

    Ok(StatsInput {
        games,
        events,
        kicks,
        players,
    })
}

/// The input behind a group's statistics, read once so callers can render
/// several views of it.
pub(crate) fn load_group_input(conn: &Connection, group_id: i64, query: &StatsQuery) -> AppResult<StatsInput> {
    check_range(query)?;
    load_input(conn, group_id, query, None)
}

pub(crate) fn summarize(query: &StatsQuery, input: &StatsInput) -> GroupStats {
    let (players, totals) = aggregate(input);
    GroupStats {
        from: query.from,
        to: query.to,
        players,
        totals,
    }
}

pub fn group_stats(conn: &Connection, actor: i64, group_id: i64, query: &StatsQuery) -> AppResult<GroupStats> {
    access::require_member(conn, group_id, actor)?;
    let input = load_group_input(conn, group_id, query)?;
    Ok(summarize(query, &input))
}

pub fn matchday_standings(
    conn: &Connection,
    actor: i64,
    group_id: i64,
    matchday_id: i64,
) -> AppResult<MatchdayStandings> {
    access::require_member(conn, group_id, actor)?;
    matchdays::fetch_live_matchday(conn, group_id, matchday_id)?;
    let input = load_input(conn, group_id, &StatsQuery::default(), Some(matchday_id))?;
    let teams: Vec<(i64, String, String)> = teams::teams_of_matchday(conn, matchday_id)?
        .into_iter()
        .map(|t| (t.id, t.name, t.color))
        .collect();
    Ok(MatchdayStandings {
        matchday_id,
        table: standings(&teams, &input.games),
        top_scorers: top_scorers(&input.events, &input.players),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: i64, matchday: i64, home: (i64, &[i64]), away: (i64, &[i64]), score: (i64, i64)) -> StatsGame {
        StatsGame {
            game_id: id,
            matchday_id: matchday,
            matchday_title: format!("Day {matchday}"),
            scheduled_at: Utc::now(),
            sequence: id,
            home_team_id: home.0,
            home_team: format!("T{}", home.0),
            away_team_id: away.0,
            away_team: format!("T{}", away.0),
            home_score: score.0,
            away_score: score.1,
            home_players: home.1.to_vec(),
            away_players: away.1.to_vec(),
        }
    }

    fn goal(game_id: i64, player_id: i64, team_id: i64, assist: Option<i64>) -> StatsEvent {
        StatsEvent {
            game_id,
            kind: EventKind::Goal,
            player_id,
            team_id,
            assist_player_id: assist,
        }
    }

    fn names() -> HashMap<i64, (String, bool)> {
        [(1, "Ana"), (2, "Ben"), (3, "Cy"), (4, "Dee")]
            .into_iter()
            .map(|(id, n)| (id, (n.to_string(), id == 4)))
            .collect()
    }

    fn input() -> StatsInput {
        StatsInput {
            games: vec![
                game(1, 1, (10, &[1, 2]), (20, &[3, 4]), (2, 1)),
                game(2, 1, (10, &[1, 2]), (20, &[3, 4]), (1, 1)),
            ],
            events: vec![
                goal(1, 1, 10, Some(2)),
                goal(1, 1, 10, None),
                goal(1, 3, 20, None),
                StatsEvent {
                    game_id: 2,
                    kind: EventKind::OwnGoal,
                    player_id: 4,
                    team_id: 10,
                    assist_player_id: None,
                },
                goal(2, 3, 20, None),
            ],
            kicks: vec![
                StatsKick { game_id: 2, team_id: 10, player_id: 1, scored: true },
                StatsKick { game_id: 2, team_id: 20, player_id: 3, scored: false },
            ],
            players: names(),
        }
    }

    #[test]
    fn aggregate_counts_results_and_events() {
        let (rows, totals) = aggregate(&input());
        assert_eq!(totals, StatsTotals { matchdays: 1, games: 2, goals: 5 });

        let ana = rows.iter().find(|r| r.player_id == 1).expect("ana");
        assert_eq!((ana.wins, ana.draws, ana.losses), (1, 1, 0));
        assert_eq!(ana.points, 4);
        assert_eq!(ana.goals, 2);
        assert_eq!(ana.penalties_taken, 1);
        assert_eq!(ana.penalties_scored, 1);
        assert_eq!(ana.shootout_wins, 1);
        assert_eq!(ana.matchdays, 1);
        assert!((ana.win_rate - 0.5).abs() < 1e-9);

        let dee = rows.iter().find(|r| r.player_id == 4).expect("dee");
        assert!(dee.deleted);
        assert_eq!(dee.own_goals, 1);
        assert_eq!(dee.shootout_wins, 0);

        let ben = rows.iter().find(|r| r.player_id == 2).expect("ben");
        assert_eq!(ben.assists, 1);
    }

    #[test]
    fn aggregate_sorts_by_points_then_goals_then_name() {
        let (rows, _) = aggregate(&input());
        let order: Vec<i64> = rows.iter().map(|r| r.player_id).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert!(rows[0].rating > rows[2].rating);
    }

    #[test]
    fn standings_rank_by_points_and_goal_difference() {
        let teams = vec![
            (10, "Team A".to_string(), "white".to_string()),
            (20, "Team B".to_string(), "black".to_string()),
            (30, "Team C".to_string(), "red".to_string()),
        ];
        let games = vec![
            game(1, 1, (10, &[]), (20, &[]), (2, 1)),
            game(2, 1, (30, &[]), (20, &[]), (0, 3)),
            game(3, 1, (10, &[]), (30, &[]), (1, 1)),
        ];
        let table = standings(&teams, &games);
        let names: Vec<&str> = table.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Team A", "Team B", "Team C"]);
        assert_eq!(table[0].points, 4);
        assert_eq!(table[1].goal_difference, 2);
        assert_eq!(table[2].played, 2);
        assert_eq!(table[2].points, 1);
    }

    #[test]
    fn top_scorers_ignore_own_goals() {
        let rows = top_scorers(&input().events, &names());
        assert_eq!(rows[0].name, "Ana");
        assert_eq!(rows[0].goals, 2);
        assert!(rows.iter().all(|r| r.player_id != 4));
    }
}
