use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::models::{Player, Position};

pub const TEAM_COLORS: &[&str] = &["white", "black", "red", "blue", "green", "yellow"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Balanced,
    Random,
}

pub fn team_name(idx: usize) -> String {
    let letter = (b'A' + (idx % 26) as u8) as char;
    format!("Team {letter}")
}

pub fn team_color(idx: usize) -> &'static str {
    TEAM_COLORS[idx % TEAM_COLORS.len()]
}

pub fn build_teams(
    players: &[Player],
    team_count: usize,
    strategy: Strategy,
    seed: u64,
) -> Vec<Vec<Player>> {
    match strategy {
        Strategy::Balanced => balance_teams(players, team_count, seed),
        Strategy::Random => random_teams(players, team_count, seed),
    }
}

/// Goalkeepers are spread first, then outfield players by descending skill,
/// each into the smallest team (ties: lowest skill total, then lowest index).
pub fn balance_teams(players: &[Player], team_count: usize, seed: u64) -> Vec<Vec<Player>> {
    let team_count = team_count.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut teams: Vec<Vec<Player>> = vec![Vec::new(); team_count];
    let mut totals = vec![0i64; team_count];

    let (mut keepers, mut outfield): (Vec<Player>, Vec<Player>) = players
        .iter()
        .cloned()
        .partition(|p| p.position == Position::Goalkeeper);

    keepers.shuffle(&mut rng);
    keepers.sort_by(|a, b| b.skill.cmp(&a.skill));
    let mut keeper_counts = vec![0usize; team_count];
    for keeper in keepers {
        let idx = (0..team_count)
            .min_by_key(|&i| (keeper_counts[i], totals[i], i))
            .unwrap_or(0);
        keeper_counts[idx] += 1;
        totals[idx] += keeper.skill;
        teams[idx].push(keeper);
    }

    outfield.shuffle(&mut rng);
    outfield.sort_by(|a, b| b.skill.cmp(&a.skill));
    for player in outfield {
        let idx = (0..team_count)
            .min_by_key(|&i| (teams[i].len(), totals[i], i))
            .unwrap_or(0);
        totals[idx] += player.skill;
        teams[idx].push(player);
    }

    teams
}

pub fn random_teams(players: &[Player], team_count: usize, seed: u64) -> Vec<Vec<Player>> {
    let team_count = team_count.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = players.to_vec();
    shuffled.shuffle(&mut rng);

    let mut teams: Vec<Vec<Player>> = vec![Vec::new(); team_count];
    for (idx, player) in shuffled.into_iter().enumerate() {
        teams[idx % team_count].push(player);
    }
    teams
}

pub fn total_skill(team: &[Player]) -> i64 {
    team.iter().map(|p| p.skill).sum()
}
