//! Fills a database with a demo group: players, a few past matchdays with
//! generated teams, finished games, goals and the odd penalty shootout.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use matchday::auth::{self, RegisterInput, SessionPolicy};
use matchday::config::Config;
use matchday::db;
use matchday::games::{self, GamePatch, NewEvent, NewGame};
use matchday::groups::{self, NewGroup};
use matchday::matchdays::{self, MatchdayPatch, NewMatchday};
use matchday::models::{EventKind, GameStatus, MatchdayStatus, Position, TeamRoster};
use matchday::players::{self, NewPlayer};
use matchday::shootouts::{self, KickInput, ShootoutInput};
use matchday::team_gen::Strategy;
use matchday::teams::{self, GenerateRequest};

const DEMO_EMAIL: &str = "demo@matchday.local";
const DEMO_PASSWORD: &str = "matchday-demo";
const PLAYER_NAMES: &[&str] = &[
    "Alex", "Bruno", "Carla", "Dani", "Emre", "Femi", "Gus", "Hana", "Ivo", "Jonas", "Kai",
    "Lena", "Milo", "Nora",
];
const MATCHDAYS: i64 = 3;
const GAMES_PER_MATCHDAY: usize = 3;
const MAX_PENALTY_ROUNDS: usize = 25;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = Config::load()?;
    let db_path = arg_value("--db").map(PathBuf::from).unwrap_or(config.db_path);
    let seed = match arg_value("--seed") {
        Some(raw) => raw.parse().context("--seed must be an unsigned integer")?,
        None => rand::thread_rng().r#gen(),
    };
    let mut rng = StdRng::seed_from_u64(seed);

    let mut conn = db::open_db(&db_path)?;
    let policy = SessionPolicy {
        password_rounds: config.password_rounds,
        ttl_hours: config.session_ttl_hours,
    };
    let (admin, _) = auth::register(
        &mut conn,
        &RegisterInput {
            email: DEMO_EMAIL.to_string(),
            password: DEMO_PASSWORD.to_string(),
            display_name: "Demo Admin".to_string(),
        },
        policy,
    )
    .context("register demo admin (is the database already seeded?)")?;

    let group = groups::create_group(
        &mut conn,
        admin.id,
        &NewGroup {
            name: "Thursday Five-a-side".to_string(),
            description: Some("Demo group".to_string()),
        },
    )?;
    let gid = group.group.id;

    let mut player_ids = Vec::new();
    for (idx, name) in PLAYER_NAMES.iter().enumerate() {
        let position = match idx {
            0 | 1 => Position::Goalkeeper,
            _ => *[Position::Defender, Position::Midfielder, Position::Forward, Position::Any]
                .choose(&mut rng)
                .unwrap_or(&Position::Any),
        };
        let player = players::create_player(
            &mut conn,
            admin.id,
            gid,
            &NewPlayer {
                name: name.to_string(),
                position,
                skill: Some(rng.gen_range(3..=9)),
                user_id: None,
            },
        )?;
        player_ids.push(player.id);
    }

    let mut games_played = 0;
    for week in (1..=MATCHDAYS).rev() {
        let matchday = matchdays::create_matchday(
            &mut conn,
            admin.id,
            gid,
            &NewMatchday {
                title: format!("Week {}", MATCHDAYS - week + 1),
                scheduled_at: Utc::now() - Duration::weeks(week),
                location: Some("Riverside pitch 3".to_string()),
                notes: None,
                team_count: Some(2),
            },
        )?;
        let generated = teams::generate_teams(
            &mut conn,
            admin.id,
            gid,
            matchday.id,
            &GenerateRequest {
                player_ids: player_ids.clone(),
                team_count: None,
                strategy: Strategy::Balanced,
                seed: Some(rng.r#gen()),
            },
        )?;
        let [home, away, ..] = generated.teams.as_slice() else {
            bail!("team generation returned fewer than two teams");
        };

        for round in 0..GAMES_PER_MATCHDAY {
            let (first, second) = if round % 2 == 0 { (home, away) } else { (away, home) };
            play_game(&mut conn, &mut rng, admin.id, gid, matchday.id, first, second)?;
            games_played += 1;
        }

        matchdays::update_matchday(
            &mut conn,
            admin.id,
            gid,
            matchday.id,
            &MatchdayPatch {
                status: Some(MatchdayStatus::Completed),
                ..MatchdayPatch::default()
            },
        )?;
    }

    println!("Demo data seeded (seed {seed})");
    println!("DB: {}", db_path.display());
    println!("Login: {DEMO_EMAIL} / {DEMO_PASSWORD}");
    println!("Group: {} (invite code {})", group.group.name, group.group.invite_code);
    println!("Players: {}  Matchdays: {MATCHDAYS}  Games: {games_played}", player_ids.len());
    Ok(())
}

fn play_game(
    conn: &mut rusqlite::Connection,
    rng: &mut StdRng,
    actor: i64,
    gid: i64,
    matchday_id: i64,
    home: &TeamRoster,
    away: &TeamRoster,
) -> Result<()> {
    let game = games::create_game(
        conn,
        actor,
        gid,
        matchday_id,
        &NewGame {
            home_team_id: home.team.id,
            away_team_id: away.team.id,
            home_score: 0,
            away_score: 0,
            status: None,
        },
    )?;
    let home_score = rng.gen_range(0..=4);
    let away_score = rng.gen_range(0..=4);
    games::update_game(
        conn,
        actor,
        gid,
        game.id,
        &GamePatch {
            home_score: Some(home_score),
            away_score: Some(away_score),
            status: Some(GameStatus::Finished),
            ..GamePatch::default()
        },
    )?;

    for (team, goals) in [(home, home_score), (away, away_score)] {
        for _ in 0..goals {
            let Some(scorer) = team.players.choose(rng) else {
                continue;
            };
            let assist = team
                .players
                .iter()
                .filter(|p| p.id != scorer.id)
                .collect::<Vec<_>>()
                .choose(rng)
                .map(|p| p.id)
                .filter(|_| rng.gen_bool(0.6));
            games::add_event(
                conn,
                actor,
                gid,
                game.id,
                &NewEvent {
                    kind: EventKind::Goal,
                    player_id: scorer.id,
                    assist_player_id: assist,
                    minute: Some(rng.gen_range(1..=40)),
                },
            )?;
        }
    }

    if home_score == away_score {
        shootouts::record_shootout(conn, actor, gid, game.id, &penalties(rng, home, away))?;
    }
    Ok(())
}

/// Five kicks each, then sudden death until one side leads. Kicking stops
/// as soon as the result can no longer change.
fn penalties(rng: &mut StdRng, home: &TeamRoster, away: &TeamRoster) -> ShootoutInput {
    let mut kicks = Vec::new();
    if home.players.is_empty() || away.players.is_empty() {
        return ShootoutInput { kicks };
    }
    let mut goals = [0i64; 2];
    let mut taken = [0usize; 2];
    'rounds: for round in 0..MAX_PENALTY_ROUNDS {
        for (side, team) in [home, away].into_iter().enumerate() {
            let kicker = &team.players[round % team.players.len()];
            let scored = rng.gen_bool(0.75);
            goals[side] += scored as i64;
            taken[side] += 1;
            kicks.push(KickInput {
                team_id: team.team.id,
                player_id: kicker.id,
                scored,
            });
            if shootout_decided(goals, taken) {
                break 'rounds;
            }
        }
    }
    ShootoutInput { kicks }
}

/// `goals` and `taken` are indexed home, away.
fn shootout_decided(goals: [i64; 2], taken: [usize; 2]) -> bool {
    const REGULATION: usize = 5;
    let [home, away] = goals;
    if taken[0] == taken[1] && taken[0] >= REGULATION {
        return home != away;
    }
    if taken[0] > REGULATION || taken[1] > REGULATION {
        return false;
    }
    let home_left = (REGULATION - taken[0]) as i64;
    let away_left = (REGULATION - taken[1]) as i64;
    home > away + away_left || away > home + home_left
}

fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix)
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
