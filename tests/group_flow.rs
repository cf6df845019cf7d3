use chrono::{Duration, Utc};
use rusqlite::Connection;

use matchday::activity::{self, ActivityQuery};
use matchday::auth::{self, RegisterInput, SessionPolicy};
use matchday::db;
use matchday::error::AppError;
use matchday::games::{self, GamePatch, NewEvent, NewGame};
use matchday::groups::{self, NewGroup};
use matchday::matchdays::{self, MatchdayFilter, NewMatchday};
use matchday::models::{Action, EntityType, EventKind, GameStatus, Player, Position, Role, TeamRoster};
use matchday::players::{self, NewPlayer, PlayerPatch};
use matchday::shootouts::{self, KickInput, ShootoutInput};
use matchday::stats::{self, StatsQuery};
use matchday::team_gen::Strategy;
use matchday::teams::{self, GenerateRequest, NewTeam, TeamPatch};

const POLICY: SessionPolicy = SessionPolicy {
    password_rounds: 1_000,
    ttl_hours: 24,
};

struct Fixture {
    conn: Connection,
    admin: i64,
    member: i64,
    gid: i64,
    mid: i64,
    home: TeamRoster,
    away: TeamRoster,
}

fn register(conn: &mut Connection, email: &str, name: &str) -> i64 {
    let input = RegisterInput {
        email: email.to_string(),
        password: "correct horse".to_string(),
        display_name: name.to_string(),
    };
    auth::register(conn, &input, POLICY).expect("register").0.id
}

fn add_player(conn: &mut Connection, admin: i64, gid: i64, name: &str, skill: i64, position: Position) -> Player {
    let input = NewPlayer {
        name: name.to_string(),
        position,
        skill: Some(skill),
        user_id: None,
    };
    players::create_player(conn, admin, gid, &input).expect("create player")
}

fn new_matchday(conn: &mut Connection, admin: i64, gid: i64, title: &str) -> i64 {
    let input = NewMatchday {
        title: title.to_string(),
        scheduled_at: Utc::now() - Duration::days(1),
        location: Some("Hall 2".to_string()),
        notes: None,
        team_count: Some(2),
    };
    matchdays::create_matchday(conn, admin, gid, &input)
        .expect("create matchday")
        .id
}

fn game_input(home: &TeamRoster, away: &TeamRoster, score: (i64, i64)) -> NewGame {
    NewGame {
        home_team_id: home.team.id,
        away_team_id: away.team.id,
        home_score: score.0,
        away_score: score.1,
        status: Some(GameStatus::Finished),
    }
}

fn goal(player_id: i64, assist: Option<i64>) -> NewEvent {
    NewEvent {
        kind: EventKind::Goal,
        player_id,
        assist_player_id: assist,
        minute: Some(12),
    }
}

fn fixture() -> Fixture {
    let mut conn = db::open_in_memory().expect("db");
    let admin = register(&mut conn, "admin@example.test", "Ada");
    let member = register(&mut conn, "bob@example.test", "Bob");

    let group = groups::create_group(
        &mut conn,
        admin,
        &NewGroup {
            name: "Tuesday Futsal".to_string(),
            description: None,
        },
    )
    .expect("create group");
    let gid = group.group.id;
    groups::join_group(&mut conn, member, &group.group.invite_code).expect("join");

    let mut ids = Vec::new();
    for (name, skill, position) in [
        ("Gina", 8, Position::Goalkeeper),
        ("Hugo", 6, Position::Goalkeeper),
        ("Ines", 9, Position::Forward),
        ("Jack", 7, Position::Midfielder),
        ("Kofi", 5, Position::Defender),
        ("Lars", 3, Position::Any),
    ] {
        ids.push(add_player(&mut conn, admin, gid, name, skill, position).id);
    }

    let mid = new_matchday(&mut conn, admin, gid, "Week 1");
    let generated = teams::generate_teams(
        &mut conn,
        admin,
        gid,
        mid,
        &GenerateRequest {
            player_ids: ids,
            team_count: None,
            strategy: Strategy::Balanced,
            seed: Some(7),
        },
    )
    .expect("generate teams");
    assert_eq!(generated.seed, 7);
    let mut teams = generated.teams.into_iter();
    let home = teams.next().expect("team a");
    let away = teams.next().expect("team b");

    Fixture {
        conn,
        admin,
        member,
        gid,
        mid,
        home,
        away,
    }
}

#[test]
fn membership_and_roles_are_enforced() {
    let mut f = fixture();
    let outsider = register(&mut f.conn, "eve@example.test", "Eve");

    assert!(matches!(
        players::list_players(&f.conn, outsider, f.gid, false),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        players::create_player(
            &mut f.conn,
            f.member,
            f.gid,
            &NewPlayer {
                name: "Zed".to_string(),
                position: Position::Any,
                skill: None,
                user_id: None,
            },
        ),
        Err(AppError::Forbidden(_))
    ));

    let invite = groups::get_group(&f.conn, f.member, f.gid)
        .expect("group")
        .group
        .invite_code;
    let again = groups::join_group(&mut f.conn, f.member, &invite.to_lowercase()).expect("rejoin");
    assert_eq!(again.role, Role::Member);
    assert_eq!(again.member_count, 2);

    assert!(matches!(
        groups::leave_group(&mut f.conn, f.admin, f.gid),
        Err(AppError::Conflict(_))
    ));
    let promoted = groups::change_role(&mut f.conn, f.admin, f.gid, f.member, Role::Admin).expect("promote");
    assert_eq!(promoted.role, Role::Admin);
    groups::leave_group(&mut f.conn, f.admin, f.gid).expect("admin can leave once another admin exists");
    assert!(matches!(
        groups::get_group(&f.conn, f.admin, f.gid),
        Err(AppError::Forbidden(_))
    ));
}

#[test]
fn player_names_are_unique_and_skill_is_bounded() {
    let mut f = fixture();
    let dup = NewPlayer {
        name: "gina".to_string(),
        position: Position::Any,
        skill: Some(5),
        user_id: None,
    };
    assert!(matches!(
        players::create_player(&mut f.conn, f.admin, f.gid, &dup),
        Err(AppError::Conflict(_))
    ));
    let wild = NewPlayer {
        name: "Mona".to_string(),
        position: Position::Any,
        skill: Some(11),
        user_id: None,
    };
    assert!(matches!(
        players::create_player(&mut f.conn, f.admin, f.gid, &wild),
        Err(AppError::Validation(_))
    ));

    let linked = players::create_player(
        &mut f.conn,
        f.admin,
        f.gid,
        &NewPlayer {
            name: "Bob".to_string(),
            position: Position::Any,
            skill: None,
            user_id: Some(f.member),
        },
    )
    .expect("linked player");
    assert_eq!(linked.skill, 5);
    assert_eq!(linked.user_id, Some(f.member));
}

#[test]
fn generated_teams_are_balanced() {
    let f = fixture();
    assert_eq!(f.home.players.len(), 3);
    assert_eq!(f.away.players.len(), 3);
    for team in [&f.home, &f.away] {
        let keepers = team
            .players
            .iter()
            .filter(|p| p.position == Position::Goalkeeper)
            .count();
        assert_eq!(keepers, 1);
    }
    assert_eq!(f.home.team.name, "Team A");
    assert_eq!(f.away.team.color, "black");
    assert!((f.home.total_skill - f.away.total_skill).abs() <= 4);
}

#[test]
fn events_must_fit_the_score() {
    let mut f = fixture();
    let game = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (2, 1)))
        .expect("game");
    assert_eq!(game.sequence, 1);

    let (a0, a1) = (f.home.players[0].id, f.home.players[1].id);
    let (b0, b1) = (f.away.players[0].id, f.away.players[1].id);

    games::add_event(&mut f.conn, f.admin, f.gid, game.id, &goal(a0, Some(a1))).expect("home goal");
    games::add_event(&mut f.conn, f.admin, f.gid, game.id, &goal(b0, None)).expect("away goal");
    let own = games::add_event(
        &mut f.conn,
        f.admin,
        f.gid,
        game.id,
        &NewEvent {
            kind: EventKind::OwnGoal,
            player_id: b1,
            assist_player_id: None,
            minute: None,
        },
    )
    .expect("own goal");
    assert_eq!(own.team_id, f.home.team.id);

    assert!(matches!(
        games::add_event(&mut f.conn, f.admin, f.gid, game.id, &goal(a0, None)),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        games::add_event(&mut f.conn, f.admin, f.gid, game.id, &goal(a0, Some(b0))),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        games::update_game(
            &mut f.conn,
            f.admin,
            f.gid,
            game.id,
            &GamePatch {
                home_score: Some(1),
                ..GamePatch::default()
            },
        ),
        Err(AppError::Validation(_))
    ));

    let detail = games::get_game(&f.conn, f.member, f.gid, game.id).expect("detail");
    assert_eq!(detail.events.len(), 3);
    assert!(detail.shootout.is_none());

    assert!(matches!(
        games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.home, (0, 0))),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        teams::generate_teams(
            &mut f.conn,
            f.admin,
            f.gid,
            f.mid,
            &GenerateRequest {
                player_ids: vec![a0, b0],
                team_count: None,
                strategy: Strategy::Random,
                seed: None,
            },
        ),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn shootouts_need_a_level_finished_game_and_a_winner() {
    let mut f = fixture();
    let decided = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (3, 1)))
        .expect("decided game");
    let level = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (1, 1)))
        .expect("level game");

    let (a0, b0) = (f.home.players[0].id, f.away.players[0].id);
    let kick = |team_id: i64, player_id: i64, scored: bool| KickInput {
        team_id,
        player_id,
        scored,
    };
    let winning = ShootoutInput {
        kicks: vec![kick(f.home.team.id, a0, true), kick(f.away.team.id, b0, false)],
    };

    assert!(matches!(
        shootouts::record_shootout(&mut f.conn, f.admin, f.gid, decided.id, &winning),
        Err(AppError::Conflict(_))
    ));
    let wrong_team = ShootoutInput {
        kicks: vec![kick(f.home.team.id, b0, true)],
    };
    assert!(matches!(
        shootouts::record_shootout(&mut f.conn, f.admin, f.gid, level.id, &wrong_team),
        Err(AppError::Validation(_))
    ));
    let drawn = ShootoutInput {
        kicks: vec![kick(f.home.team.id, a0, true), kick(f.away.team.id, b0, true)],
    };
    assert!(matches!(
        shootouts::record_shootout(&mut f.conn, f.admin, f.gid, level.id, &drawn),
        Err(AppError::Validation(_))
    ));

    let shootout =
        shootouts::record_shootout(&mut f.conn, f.admin, f.gid, level.id, &winning).expect("shootout");
    assert_eq!(shootout.winner_team_id, Some(f.home.team.id));
    assert_eq!((shootout.home_score, shootout.away_score), (1, 0));
    assert!(shootout.kicks.iter().all(|k| k.round == 1));

    assert!(matches!(
        games::update_game(
            &mut f.conn,
            f.admin,
            f.gid,
            level.id,
            &GamePatch {
                home_score: Some(2),
                ..GamePatch::default()
            },
        ),
        Err(AppError::Conflict(_))
    ));

    let replaced = ShootoutInput {
        kicks: vec![
            kick(f.home.team.id, a0, false),
            kick(f.away.team.id, b0, true),
            kick(f.home.team.id, a0, false),
            kick(f.away.team.id, b0, true),
        ],
    };
    let shootout =
        shootouts::record_shootout(&mut f.conn, f.admin, f.gid, level.id, &replaced).expect("replace");
    assert_eq!(shootout.winner_team_id, Some(f.away.team.id));
    assert_eq!(shootout.kicks.iter().map(|k| k.round).max(), Some(2));

    shootouts::delete_shootout(&mut f.conn, f.admin, f.gid, level.id).expect("delete shootout");
    let detail = games::get_game(&f.conn, f.admin, f.gid, level.id).expect("detail");
    assert!(detail.shootout.is_none());
}

#[test]
fn stats_and_standings_follow_results() {
    let mut f = fixture();
    let (a0, a1) = (f.home.players[0].id, f.home.players[1].id);
    let (b0, b1) = (f.away.players[0].id, f.away.players[1].id);

    let first = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (2, 1)))
        .expect("first");
    games::add_event(&mut f.conn, f.admin, f.gid, first.id, &goal(a0, Some(a1))).expect("goal");
    games::add_event(&mut f.conn, f.admin, f.gid, first.id, &goal(b0, None)).expect("goal");
    games::add_event(
        &mut f.conn,
        f.admin,
        f.gid,
        first.id,
        &NewEvent {
            kind: EventKind::OwnGoal,
            player_id: b1,
            assist_player_id: None,
            minute: Some(30),
        },
    )
    .expect("own goal");

    let second = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (1, 1)))
        .expect("second");
    shootouts::record_shootout(
        &mut f.conn,
        f.admin,
        f.gid,
        second.id,
        &ShootoutInput {
            kicks: vec![
                KickInput {
                    team_id: f.home.team.id,
                    player_id: a0,
                    scored: true,
                },
                KickInput {
                    team_id: f.away.team.id,
                    player_id: b0,
                    scored: false,
                },
            ],
        },
    )
    .expect("shootout");

    // Unfinished games are ignored.
    games::create_game(
        &mut f.conn,
        f.admin,
        f.gid,
        f.mid,
        &NewGame {
            status: Some(GameStatus::Scheduled),
            ..game_input(&f.home, &f.away, (0, 0))
        },
    )
    .expect("scheduled game");

    let stats = stats::group_stats(&f.conn, f.member, f.gid, &StatsQuery::default()).expect("stats");
    assert_eq!(stats.totals.games, 2);
    assert_eq!(stats.totals.goals, 5);
    assert_eq!(stats.totals.matchdays, 1);
    assert_eq!(stats.players.len(), 6);

    let scorer = stats.players.iter().find(|p| p.player_id == a0).expect("a0");
    assert_eq!((scorer.wins, scorer.draws, scorer.losses), (1, 1, 0));
    assert_eq!(scorer.points, 4);
    assert_eq!(scorer.goals, 1);
    assert_eq!(scorer.shootout_wins, 1);
    assert_eq!((scorer.penalties_taken, scorer.penalties_scored), (1, 1));
    assert!(scorer.rating > 1000.0);

    let unlucky = stats.players.iter().find(|p| p.player_id == b1).expect("b1");
    assert_eq!(unlucky.own_goals, 1);
    assert_eq!(unlucky.points, 1);
    assert!(stats.players[0].points >= stats.players[5].points);

    let future = StatsQuery {
        from: Some((Utc::now() + Duration::days(3)).date_naive()),
        to: None,
    };
    let empty = stats::group_stats(&f.conn, f.member, f.gid, &future).expect("filtered");
    assert_eq!(empty.totals.games, 0);
    assert!(empty.players.is_empty());

    let backwards = StatsQuery {
        from: Some(Utc::now().date_naive()),
        to: Some((Utc::now() - Duration::days(10)).date_naive()),
    };
    assert!(matches!(
        stats::group_stats(&f.conn, f.member, f.gid, &backwards),
        Err(AppError::Validation(_))
    ));

    let table = stats::matchday_standings(&f.conn, f.member, f.gid, f.mid).expect("standings");
    assert_eq!(table.table[0].team_id, f.home.team.id);
    assert_eq!(table.table[0].points, 4);
    assert_eq!(
        (table.table[0].goals_for, table.table[0].goals_against),
        (3, 2)
    );
    assert_eq!(table.table[1].points, 1);
    assert_eq!(table.top_scorers.len(), 3);
    assert!(table.top_scorers.iter().all(|r| r.player_id != b1));

    players::delete_player(&mut f.conn, f.admin, f.gid, a0).expect("delete player");
    let stats = stats::group_stats(&f.conn, f.member, f.gid, &StatsQuery::default()).expect("stats");
    let gone = stats.players.iter().find(|p| p.player_id == a0).expect("deleted player kept");
    assert!(gone.deleted);
}

#[test]
fn matchday_delete_and_restore_cascade_to_games() {
    let mut f = fixture();
    let first = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (1, 0)))
        .expect("first");
    let second = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (0, 2)))
        .expect("second");

    games::delete_game(&mut f.conn, f.admin, f.gid, second.id).expect("delete game");
    matchdays::delete_matchday(&mut f.conn, f.admin, f.gid, f.mid).expect("delete matchday");

    let visible = matchdays::list_matchdays(&f.conn, f.member, f.gid, &MatchdayFilter::default()).expect("list");
    assert!(visible.is_empty());
    assert!(matches!(
        games::get_game(&f.conn, f.admin, f.gid, first.id),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        games::restore_game(&mut f.conn, f.admin, f.gid, second.id),
        Err(AppError::Conflict(_))
    ));
    let with_deleted = matchdays::list_matchdays(
        &f.conn,
        f.admin,
        f.gid,
        &MatchdayFilter {
            status: None,
            include_deleted: true,
        },
    )
    .expect("list deleted");
    assert_eq!(with_deleted.len(), 1);

    matchdays::restore_matchday(&mut f.conn, f.admin, f.gid, f.mid).expect("restore matchday");
    let live = games::list_games(&f.conn, f.member, f.gid, f.mid).expect("games");
    assert_eq!(live.iter().map(|g| g.id).collect::<Vec<_>>(), vec![first.id]);

    games::restore_game(&mut f.conn, f.admin, f.gid, second.id).expect("restore game");
    let detail = matchdays::get_matchday(&f.conn, f.member, f.gid, f.mid).expect("detail");
    assert_eq!(detail.games.len(), 2);
    assert_eq!(detail.teams.len(), 2);
}

#[test]
fn deleted_games_are_purged_when_teams_are_regenerated() {
    let mut f = fixture();
    let game = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (1, 0)))
        .expect("game");
    games::add_event(&mut f.conn, f.admin, f.gid, game.id, &goal(f.home.players[0].id, None)).expect("goal");
    games::delete_game(&mut f.conn, f.admin, f.gid, game.id).expect("delete");

    let ids: Vec<i64> = f
        .home
        .players
        .iter()
        .chain(f.away.players.iter())
        .map(|p| p.id)
        .collect();
    let regenerated = teams::generate_teams(
        &mut f.conn,
        f.admin,
        f.gid,
        f.mid,
        &GenerateRequest {
            player_ids: ids,
            team_count: Some(3),
            strategy: Strategy::Random,
            seed: Some(11),
        },
    )
    .expect("regenerate");
    assert_eq!(regenerated.teams.len(), 3);
    assert!(regenerated.teams.iter().all(|t| t.players.len() == 2));
    assert!(matches!(
        games::restore_game(&mut f.conn, f.admin, f.gid, game.id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn assigning_players_moves_them_between_teams() {
    let mut f = fixture();
    let mover = f.home.players[2].id;
    let mut roster: Vec<i64> = f.away.players.iter().map(|p| p.id).collect();
    roster.push(mover);

    let away = teams::assign_players(&mut f.conn, f.admin, f.gid, f.away.team.id, &roster).expect("assign");
    assert_eq!(away.players.len(), 4);
    let all = teams::list_teams(&f.conn, f.member, f.gid, f.mid).expect("teams");
    let home = all.iter().find(|t| t.team.id == f.home.team.id).expect("home");
    assert_eq!(home.players.len(), 2);
    assert!(home.players.iter().all(|p| p.id != mover));

    players::update_player(
        &mut f.conn,
        f.admin,
        f.gid,
        mover,
        &PlayerPatch {
            active: Some(false),
            ..PlayerPatch::default()
        },
    )
    .expect("deactivate");
    assert!(matches!(
        teams::assign_players(&mut f.conn, f.admin, f.gid, f.home.team.id, &[mover]),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn activity_log_records_each_mutation_once() {
    let mut f = fixture();
    let query = ActivityQuery::default();
    let before = activity::list(&f.conn, f.gid, f.member, &query).expect("activity");
    let pid = f.home.players[0].id;
    let name = f.home.players[0].name.clone();

    players::update_player(
        &mut f.conn,
        f.admin,
        f.gid,
        pid,
        &PlayerPatch {
            name: Some(name),
            ..PlayerPatch::default()
        },
    )
    .expect("no-op update");
    let unchanged = activity::list(&f.conn, f.gid, f.member, &query).expect("activity");
    assert_eq!(unchanged.entries.len(), before.entries.len());

    players::update_player(
        &mut f.conn,
        f.admin,
        f.gid,
        pid,
        &PlayerPatch {
            skill: Some(10),
            ..PlayerPatch::default()
        },
    )
    .expect("update");
    let latest = activity::list(&f.conn, f.gid, f.member, &query).expect("activity");
    let entry = &latest.entries[0];
    assert_eq!(entry.entity_id, pid);
    assert_eq!(entry.actor_name, "Ada");
    assert_eq!(entry.changes["skill"]["to"], serde_json::json!(10));
    assert!(entry.changes.get("updated_at").is_none());

    let page = activity::list(
        &f.conn,
        f.gid,
        f.member,
        &ActivityQuery {
            limit: Some(3),
            ..ActivityQuery::default()
        },
    )
    .expect("page");
    assert_eq!(page.entries.len(), 3);
    let cursor = page.next_before.expect("more pages");
    let next = activity::list(
        &f.conn,
        f.gid,
        f.member,
        &ActivityQuery {
            limit: Some(3),
            before: Some(cursor),
            entity_type: None,
        },
    )
    .expect("next page");
    assert!(next.entries.iter().all(|e| e.id < cursor));
}

fn player_ids(conn: &Connection, actor: i64, gid: i64) -> Vec<i64> {
    players::list_players(conn, actor, gid, false)
        .expect("players")
        .into_iter()
        .map(|p| p.id)
        .collect()
}

fn new_team(name: &str) -> NewTeam {
    NewTeam {
        name: name.to_string(),
        color: None,
    }
}

#[test]
fn players_can_be_reordered() {
    let mut f = fixture();
    let mut order = player_ids(&f.conn, f.admin, f.gid);
    order.reverse();

    let reordered = players::reorder_players(&mut f.conn, f.admin, f.gid, &order).expect("reorder");
    assert_eq!(reordered.iter().map(|p| p.id).collect::<Vec<_>>(), order);
    assert_eq!(player_ids(&f.conn, f.member, f.gid), order);

    let query = ActivityQuery::default();
    let latest = activity::list(&f.conn, f.gid, f.member, &query).expect("activity");
    let entry = &latest.entries[0];
    assert_eq!(entry.action, Action::Reorder);
    assert_eq!(entry.entity_type, EntityType::Group);
    assert_eq!(entry.entity_id, f.gid);
    assert_eq!(entry.changes["order"]["to"], serde_json::json!(order));

    players::reorder_players(&mut f.conn, f.admin, f.gid, &order).expect("same order");
    let after = activity::list(&f.conn, f.gid, f.member, &query).expect("activity");
    assert_eq!(after.entries[0].id, entry.id);

    let mut duplicated = order.clone();
    duplicated[1] = duplicated[0];
    assert!(matches!(
        players::reorder_players(&mut f.conn, f.admin, f.gid, &duplicated),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        players::reorder_players(&mut f.conn, f.admin, f.gid, &order[1..]),
        Err(AppError::Validation(_))
    ));
    let mut stranger = order.clone();
    stranger[0] = 9_999;
    assert!(matches!(
        players::reorder_players(&mut f.conn, f.admin, f.gid, &stranger),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        players::reorder_players(&mut f.conn, f.member, f.gid, &order),
        Err(AppError::Forbidden(_))
    ));
    assert_eq!(player_ids(&f.conn, f.admin, f.gid), order);
}

#[test]
fn restoring_a_player_needs_a_free_name() {
    let mut f = fixture();
    let old = add_player(&mut f.conn, f.admin, f.gid, "Mona", 6, Position::Defender);
    players::delete_player(&mut f.conn, f.admin, f.gid, old.id).expect("delete");
    let newer = add_player(&mut f.conn, f.admin, f.gid, "mona", 4, Position::Any);

    assert!(matches!(
        players::restore_player(&mut f.conn, f.admin, f.gid, old.id),
        Err(AppError::Conflict(_))
    ));

    players::delete_player(&mut f.conn, f.admin, f.gid, newer.id).expect("delete newer");
    let restored = players::restore_player(&mut f.conn, f.admin, f.gid, old.id).expect("restore");
    assert_eq!(restored.name, "Mona");
    assert!(restored.deleted_at.is_none());
    assert!(matches!(
        players::restore_player(&mut f.conn, f.admin, f.gid, old.id),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn groups_can_be_deleted_and_restored() {
    let mut f = fixture();
    assert!(matches!(
        groups::delete_group(&mut f.conn, f.member, f.gid),
        Err(AppError::Forbidden(_))
    ));
    groups::delete_group(&mut f.conn, f.admin, f.gid).expect("delete group");

    assert!(groups::list_groups(&f.conn, f.admin, false).expect("list").is_empty());
    let with_deleted = groups::list_groups(&f.conn, f.admin, true).expect("list deleted");
    assert_eq!(with_deleted.len(), 1);
    assert_eq!(with_deleted[0].group.id, f.gid);
    assert!(with_deleted[0].group.deleted_at.is_some());
    assert!(groups::list_groups(&f.conn, f.member, true).expect("member list").is_empty());
    assert!(matches!(
        groups::get_group(&f.conn, f.admin, f.gid),
        Err(AppError::NotFound(_))
    ));

    assert!(matches!(
        groups::restore_group(&mut f.conn, f.member, f.gid),
        Err(AppError::Forbidden(_))
    ));
    let restored = groups::restore_group(&mut f.conn, f.admin, f.gid).expect("restore group");
    assert!(restored.group.deleted_at.is_none());
    assert_eq!(restored.member_count, 2);
    assert_eq!(groups::list_groups(&f.conn, f.member, false).expect("list").len(), 1);
    assert!(matches!(
        groups::restore_group(&mut f.conn, f.admin, f.gid),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn invite_codes_rotate_and_admins_manage_members() {
    let mut f = fixture();
    let carol = register(&mut f.conn, "carol@example.test", "Carol");
    let dave = register(&mut f.conn, "dave@example.test", "Dave");
    let old_code = groups::get_group(&f.conn, f.admin, f.gid)
        .expect("group")
        .group
        .invite_code;
    groups::join_group(&mut f.conn, carol, &old_code).expect("carol joins");

    assert!(matches!(
        groups::regenerate_invite_code(&mut f.conn, f.member, f.gid),
        Err(AppError::Forbidden(_))
    ));
    let rotated = groups::regenerate_invite_code(&mut f.conn, f.admin, f.gid).expect("rotate");
    assert_ne!(rotated.invite_code, old_code);
    assert!(matches!(
        groups::join_group(&mut f.conn, dave, &old_code),
        Err(AppError::NotFound(_))
    ));
    groups::join_group(&mut f.conn, dave, &rotated.invite_code).expect("dave joins");

    assert!(matches!(
        groups::remove_member(&mut f.conn, f.member, f.gid, carol),
        Err(AppError::Forbidden(_))
    ));
    groups::remove_member(&mut f.conn, f.admin, f.gid, carol).expect("remove carol");
    let members = groups::list_members(&f.conn, f.admin, f.gid).expect("members");
    assert_eq!(members.len(), 3);
    assert!(members.iter().all(|m| m.user_id != carol));
    assert!(matches!(
        players::list_players(&f.conn, carol, f.gid, false),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        groups::remove_member(&mut f.conn, f.admin, f.gid, carol),
        Err(AppError::NotFound(_))
    ));

    assert!(matches!(
        groups::change_role(&mut f.conn, f.admin, f.gid, f.admin, Role::Member),
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        groups::remove_member(&mut f.conn, f.admin, f.gid, f.admin),
        Err(AppError::Conflict(_))
    ));
    let admins = groups::list_members(&f.conn, f.admin, f.gid)
        .expect("members")
        .into_iter()
        .filter(|m| m.role == Role::Admin)
        .count();
    assert_eq!(admins, 1);
}

#[test]
fn teams_are_capped_and_guarded_by_games() {
    let mut f = fixture();
    assert!(matches!(
        teams::create_team(&mut f.conn, f.member, f.gid, f.mid, &new_team("Team C")),
        Err(AppError::Forbidden(_))
    ));

    let mut added = Vec::new();
    for name in ["Team C", "Team D", "Team E", "Team F"] {
        let team = teams::create_team(&mut f.conn, f.admin, f.gid, f.mid, &new_team(name)).expect("create team");
        assert!(team.players.is_empty());
        added.push(team.team);
    }
    assert_eq!(teams::list_teams(&f.conn, f.member, f.gid, f.mid).expect("teams").len(), 6);
    assert!(matches!(
        teams::create_team(&mut f.conn, f.admin, f.gid, f.mid, &new_team("Team G")),
        Err(AppError::Conflict(_))
    ));

    let renamed = teams::update_team(
        &mut f.conn,
        f.admin,
        f.gid,
        added[0].id,
        &TeamPatch {
            name: Some("  Reds ".to_string()),
            color: Some("red".to_string()),
        },
    )
    .expect("update team");
    assert_eq!(renamed.team.name, "Reds");
    assert_eq!(renamed.team.color, "red");
    assert!(matches!(
        teams::update_team(
            &mut f.conn,
            f.admin,
            f.gid,
            added[0].id,
            &TeamPatch {
                name: Some("   ".to_string()),
                ..TeamPatch::default()
            },
        ),
        Err(AppError::Validation(_))
    ));

    teams::delete_team(&mut f.conn, f.admin, f.gid, added[0].id).expect("delete unused team");
    assert_eq!(teams::list_teams(&f.conn, f.member, f.gid, f.mid).expect("teams").len(), 5);

    games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (1, 0))).expect("game");
    assert!(matches!(
        teams::delete_team(&mut f.conn, f.admin, f.gid, f.home.team.id),
        Err(AppError::Conflict(_))
    ));
    assert_eq!(teams::list_teams(&f.conn, f.member, f.gid, f.mid).expect("teams").len(), 5);
}

#[test]
fn game_teams_are_locked_by_goals_and_shootouts() {
    let mut f = fixture();
    let spare = teams::create_team(&mut f.conn, f.admin, f.gid, f.mid, &new_team("Team C"))
        .expect("spare team")
        .team;

    let scored = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (1, 0)))
        .expect("game");
    games::add_event(&mut f.conn, f.admin, f.gid, scored.id, &goal(f.home.players[0].id, None)).expect("goal");
    for patch in [
        GamePatch {
            home_team_id: Some(spare.id),
            ..GamePatch::default()
        },
        GamePatch {
            away_team_id: Some(spare.id),
            ..GamePatch::default()
        },
    ] {
        assert!(matches!(
            games::update_game(&mut f.conn, f.admin, f.gid, scored.id, &patch),
            Err(AppError::Conflict(_))
        ));
    }

    let level = games::create_game(&mut f.conn, f.admin, f.gid, f.mid, &game_input(&f.home, &f.away, (0, 0)))
        .expect("level game");
    let moved = games::update_game(
        &mut f.conn,
        f.admin,
        f.gid,
        level.id,
        &GamePatch {
            away_team_id: Some(spare.id),
            ..GamePatch::default()
        },
    )
    .expect("teams can change before any goal");
    assert_eq!(moved.game.away_team_id, spare.id);
    games::update_game(
        &mut f.conn,
        f.admin,
        f.gid,
        level.id,
        &GamePatch {
            away_team_id: Some(f.away.team.id),
            ..GamePatch::default()
        },
    )
    .expect("teams restored");

    let kicks = ShootoutInput {
        kicks: vec![
            KickInput {
                team_id: f.home.team.id,
                player_id: f.home.players[0].id,
                scored: true,
            },
            KickInput {
                team_id: f.away.team.id,
                player_id: f.away.players[0].id,
                scored: false,
            },
        ],
    };
    shootouts::record_shootout(&mut f.conn, f.admin, f.gid, level.id, &kicks).expect("shootout");

    for patch in [
        GamePatch {
            status: Some(GameStatus::Scheduled),
            ..GamePatch::default()
        },
        GamePatch {
            away_team_id: Some(spare.id),
            ..GamePatch::default()
        },
    ] {
        assert!(matches!(
            games::update_game(&mut f.conn, f.admin, f.gid, level.id, &patch),
            Err(AppError::Conflict(_))
        ));
    }
    let unchanged = games::get_game(&f.conn, f.admin, f.gid, level.id).expect("detail");
    assert_eq!(unchanged.game.status, GameStatus::Finished);
    assert_eq!(unchanged.game.away_team_id, f.away.team.id);

    shootouts::delete_shootout(&mut f.conn, f.admin, f.gid, level.id).expect("delete shootout");
    let reopened = games::update_game(
        &mut f.conn,
        f.admin,
        f.gid,
        level.id,
        &GamePatch {
            status: Some(GameStatus::Scheduled),
            ..GamePatch::default()
        },
    )
    .expect("status can change once the shootout is gone");
    assert_eq!(reopened.game.status, GameStatus::Scheduled);
}
