use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;

use crate::error::{AppError, AppResult};

/// Shared handle to the single sqlite connection. Work runs on the blocking pool.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn call<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Internal(anyhow!("database lock poisoned")))?;
            f(&mut guard)
        })
        .await
        .map_err(|err| AppError::Internal(anyhow!("database task failed: {err}")))?
    }
}

/// Runs CPU-heavy work such as password hashing on the blocking pool
/// without taking the connection.
pub async fn blocking<F, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AppError::Internal(anyhow!("blocking task failed: {err}")))?
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

        CREATE TABLE IF NOT EXISTS play_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NULL,
            invite_code TEXT NOT NULL UNIQUE,
            created_by INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id INTEGER NOT NULL REFERENCES play_groups(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            role TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES play_groups(id),
            name TEXT NOT NULL,
            position TEXT NOT NULL,
            skill INTEGER NOT NULL,
            user_id INTEGER NULL REFERENCES users(id),
            sort_order INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_group ON players(group_id);

        CREATE TABLE IF NOT EXISTS matchdays (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES play_groups(id),
            title TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            location TEXT NULL,
            notes TEXT NULL,
            team_count INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matchdays_group ON matchdays(group_id);
        CREATE INDEX IF NOT EXISTS idx_matchdays_scheduled ON matchdays(scheduled_at);

        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            matchday_id INTEGER NOT NULL REFERENCES matchdays(id),
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_teams_matchday ON teams(matchday_id);

        CREATE TABLE IF NOT EXISTS team_assignments (
            matchday_id INTEGER NOT NULL REFERENCES matchdays(id),
            player_id INTEGER NOT NULL REFERENCES players(id),
            team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            PRIMARY KEY (matchday_id, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_team_assignments_team ON team_assignments(team_id);

        CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            matchday_id INTEGER NOT NULL REFERENCES matchdays(id),
            home_team_id INTEGER NOT NULL REFERENCES teams(id),
            away_team_id INTEGER NOT NULL REFERENCES teams(id),
            home_score INTEGER NOT NULL,
            away_score INTEGER NOT NULL,
            status TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_matchday ON games(matchday_id);

        CREATE TABLE IF NOT EXISTS game_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL REFERENCES games(id),
            kind TEXT NOT NULL,
            player_id INTEGER NOT NULL REFERENCES players(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            assist_player_id INTEGER NULL REFERENCES players(id),
            minute INTEGER NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_game_events_game ON game_events(game_id);

        CREATE TABLE IF NOT EXISTS penalty_shootouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL UNIQUE REFERENCES games(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS penalty_kicks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            shootout_id INTEGER NOT NULL REFERENCES penalty_shootouts(id) ON DELETE CASCADE,
            round INTEGER NOT NULL,
            team_id INTEGER NOT NULL REFERENCES teams(id),
            player_id INTEGER NOT NULL REFERENCES players(id),
            scored INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_penalty_kicks_shootout ON penalty_kicks(shootout_id);

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES play_groups(id),
            actor_user_id INTEGER NOT NULL REFERENCES users(id),
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            changes TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_activity_group ON activity_log(group_id, id);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}
