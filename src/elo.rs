use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct EloConfig {
    pub k: f64,
    pub start: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 24.0,
            start: 1000.0,
        }
    }
}

/// One finished game seen from the rating's point of view.
#[derive(Debug, Clone)]
pub struct RatedGame {
    pub home_players: Vec<i64>,
    pub away_players: Vec<i64>,
    pub home_goals: i64,
    pub away_goals: i64,
}

/// Individual ratings after replaying `games`, which must already be in
/// chronological order. A side's strength is the mean of its players.
pub fn compute_player_elo(games: &[RatedGame], cfg: EloConfig) -> HashMap<i64, f64> {
    let mut elo: HashMap<i64, f64> = HashMap::new();
    for g in games {
        if g.home_players.is_empty() || g.away_players.is_empty() {
            continue;
        }
        let rh = side_rating(&mut elo, &g.home_players, cfg.start);
        let ra = side_rating(&mut elo, &g.away_players, cfg.start);

        let expected_home = expected_score(rh, ra);
        let s_home = if g.home_goals > g.away_goals {
            1.0
        } else if g.home_goals < g.away_goals {
            0.0
        } else {
            0.5
        };

        let delta = cfg.k * (s_home - expected_home);
        for id in &g.home_players {
            *elo.entry(*id).or_insert(cfg.start) += delta;
        }
        for id in &g.away_players {
            *elo.entry(*id).or_insert(cfg.start) -= delta;
        }
    }
    elo
}

fn side_rating(elo: &mut HashMap<i64, f64>, players: &[i64], start: f64) -> f64 {
    let sum: f64 = players
        .iter()
        .map(|id| *elo.entry(*id).or_insert(start))
        .sum();
    sum / players.len() as f64
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}
