use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::access;
use crate::error::{AppError, AppResult};
use crate::stats::{self, GroupStats, StatsInput, StatsQuery};

pub struct ExportReport {
    pub players: usize,
    pub matchdays: usize,
    pub games: usize,
}

enum Cell {
    Text(String),
    Number(f64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names.iter().map(|n| Cell::from(*n)).collect()
}

fn player_rows(stats: &GroupStats) -> Vec<Vec<Cell>> {
    let mut rows = vec![header(&[
        "Player ID",
        "Player",
        "Deleted",
        "Matchdays",
        "Games",
        "Wins",
        "Draws",
        "Losses",
        "Points",
        "Win Rate",
        "Goals",
        "Assists",
        "Own Goals",
        "Penalties Taken",
        "Penalties Scored",
        "Shootout Wins",
        "Rating",
    ])];
    for p in &stats.players {
        rows.push(vec![
            p.player_id.into(),
            p.name.clone().into(),
            if p.deleted { "yes" } else { "no" }.into(),
            p.matchdays.into(),
            p.games.into(),
            p.wins.into(),
            p.draws.into(),
            p.losses.into(),
            p.points.into(),
            p.win_rate.into(),
            p.goals.into(),
            p.assists.into(),
            p.own_goals.into(),
            p.penalties_taken.into(),
            p.penalties_scored.into(),
            p.shootout_wins.into(),
            p.rating.into(),
        ]);
    }
    rows
}

fn matchday_rows(input: &StatsInput) -> Vec<Vec<Cell>> {
    let mut per_day: BTreeMap<(String, i64), (String, i64, i64)> = BTreeMap::new();
    for g in &input.games {
        let key = (g.scheduled_at.format("%F %H:%M").to_string(), g.matchday_id);
        let entry = per_day
            .entry(key)
            .or_insert_with(|| (g.matchday_title.clone(), 0, 0));
        entry.1 += 1;
        entry.2 += g.home_score + g.away_score;
    }
    let mut rows = vec![header(&["Matchday ID", "Date", "Title", "Games", "Goals"])];
    for ((date, id), (title, games, goals)) in per_day {
        rows.push(vec![id.into(), date.into(), title.into(), games.into(), goals.into()]);
    }
    rows
}

fn game_rows(input: &StatsInput) -> Vec<Vec<Cell>> {
    let winners = input.shootout_winners();
    let mut rows = vec![header(&[
        "Game ID",
        "Matchday",
        "Date",
        "Game #",
        "Home",
        "Away",
        "Home Goals",
        "Away Goals",
        "Penalties Winner",
    ])];
    for g in &input.games {
        let shootout = match winners.get(&g.game_id) {
            Some(id) if *id == g.home_team_id => g.home_team.clone(),
            Some(_) => g.away_team.clone(),
            None => String::new(),
        };
        rows.push(vec![
            g.game_id.into(),
            g.matchday_title.clone().into(),
            g.scheduled_at.format("%F %H:%M").to_string().into(),
            g.sequence.into(),
            g.home_team.clone().into(),
            g.away_team.clone().into(),
            g.home_score.into(),
            g.away_score.into(),
            shootout.into(),
        ]);
    }
    rows
}

fn build_workbook(stats: &GroupStats, input: &StatsInput) -> Result<(Workbook, ExportReport)> {
    let players = player_rows(stats);
    let matchdays = matchday_rows(input);
    let games = game_rows(input);
    let report = ExportReport {
        players: players.len() - 1,
        matchdays: matchdays.len() - 1,
        games: games.len() - 1,
    };

    let mut workbook = Workbook::new();
    for (name, rows) in [("Players", &players), ("Matchdays", &matchdays), ("Games", &games)] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, rows)?;
    }
    Ok((workbook, report))
}

fn load(conn: &Connection, group_id: i64, query: &StatsQuery) -> AppResult<(GroupStats, StatsInput)> {
    let input = stats::load_group_input(conn, group_id, query)?;
    Ok((stats::summarize(query, &input), input))
}

/// Writes the group's statistics workbook to `path`.
pub fn export_group_stats(conn: &Connection, group_id: i64, path: &Path) -> Result<ExportReport> {
    access::load_group(conn, group_id)?;
    let (stats, input) = load(conn, group_id, &StatsQuery::default())?;
    let (mut workbook, report) = build_workbook(&stats, &input)?;
    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;
    Ok(report)
}

/// Same workbook as [`export_group_stats`], rendered in memory for download.
pub fn export_group_stats_bytes(
    conn: &Connection,
    actor: i64,
    group_id: i64,
    query: &StatsQuery,
) -> AppResult<Vec<u8>> {
    access::require_member(conn, group_id, actor)?;
    let (stats, input) = load(conn, group_id, query)?;
    let (mut workbook, _) = build_workbook(&stats, &input)?;
    let bytes = workbook
        .save_to_buffer()
        .context("render workbook")
        .map_err(AppError::Internal)?;
    Ok(bytes)
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<Cell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            let written = match value {
                Cell::Text(text) => worksheet.write_string(r, c, text),
                Cell::Number(n) => worksheet.write_number(r, c, *n),
            };
            written.with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
