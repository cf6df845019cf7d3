use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::User;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TOKEN_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_DISPLAY_NAME_LEN: usize = 60;

// Verified against when the email is unknown so both paths cost the same.
static DUMMY_HASH: OnceCell<String> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub password_rounds: u32,
    pub ttl_hours: i64,
}

pub fn hash_password(password: &str, rounds: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(password, &salt, rounds);
    format!(
        "{HASH_SCHEME}${rounds}${}${}",
        BASE64.encode(salt),
        BASE64.encode(key)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(rounds), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt), BASE64.decode(expected)) else {
        return false;
    };
    let key = derive_key(password, &salt, rounds);
    constant_time_eq(&key, &expected)
}

fn derive_key(password: &str, salt: &[u8], rounds: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut key);
    key
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn token_digest(token: &str) -> String {
    BASE64.encode(Sha256::digest(token.as_bytes()))
}

pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::validation("email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(AppError::validation("email is malformed"));
    }
    Ok(email)
}

/// A validated registration whose password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
}

/// Validates the input and hashes the password. Needs no connection, so
/// callers can run it without holding the database.
pub fn prepare_account(input: &RegisterInput, rounds: u32) -> AppResult<NewAccount> {
    let email = normalize_email(&input.email)?;
    let display_name = input.display_name.trim();
    if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(AppError::validation(format!(
            "display name must be 1 to {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(NewAccount {
        email,
        display_name: display_name.to_string(),
        password_hash: hash_password(&input.password, rounds),
    })
}

pub fn create_account(
    conn: &mut Connection,
    account: &NewAccount,
    ttl_hours: i64,
) -> AppResult<(User, String)> {
    let tx = conn.transaction()?;
    let taken: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![account.email],
            |row| row.get(0),
        )?;
    if taken {
        return Err(AppError::conflict("email already registered"));
    }

    let now = Utc::now();
    tx.execute(
        "INSERT INTO users (email, display_name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![account.email, account.display_name, account.password_hash, now],
    )?;
    let user = User {
        id: tx.last_insert_rowid(),
        email: account.email.clone(),
        display_name: account.display_name.clone(),
        created_at: now,
    };
    let token = insert_session(&tx, user.id, ttl_hours)?;
    tx.commit()?;

    info!(user_id = user.id, "registered user");
    Ok((user, token))
}

pub fn register(
    conn: &mut Connection,
    input: &RegisterInput,
    policy: SessionPolicy,
) -> AppResult<(User, String)> {
    let account = prepare_account(input, policy.password_rounds)?;
    create_account(conn, &account, policy.ttl_hours)
}

/// The account behind `email` with its stored password hash.
pub fn find_credentials(conn: &Connection, email: &str) -> AppResult<Option<(User, String)>> {
    let email = email.trim().to_lowercase();
    let row = conn
        .query_row(
            "SELECT id, email, display_name, created_at, password_hash FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok((
                    User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        created_at: row.get(3)?,
                    },
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;
    Ok(row)
}

/// Verifies `password` against what [`find_credentials`] returned. An unknown
/// account still pays for one hash.
pub fn check_password(
    password: &str,
    found: Option<(User, String)>,
    rounds: u32,
) -> AppResult<User> {
    let Some((user, hash)) = found else {
        let dummy = DUMMY_HASH.get_or_init(|| hash_password("unused-password", rounds));
        let _ = verify_password(password, dummy);
        warn!("login rejected for unknown email");
        return Err(AppError::Unauthorized);
    };
    if !verify_password(password, &hash) {
        warn!(user_id = user.id, "login rejected: wrong password");
        return Err(AppError::Unauthorized);
    }
    Ok(user)
}

/// Starts a session for an authenticated user, dropping their expired ones.
pub fn open_session(conn: &mut Connection, user_id: i64, ttl_hours: i64) -> AppResult<String> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM sessions WHERE user_id = ?1 AND expires_at <= ?2",
        params![user_id, Utc::now()],
    )?;
    let token = insert_session(&tx, user_id, ttl_hours)?;
    tx.commit()?;
    Ok(token)
}

pub fn login(
    conn: &mut Connection,
    input: &LoginInput,
    policy: SessionPolicy,
) -> AppResult<(User, String)> {
    let found = find_credentials(conn, &input.email)?;
    let user = check_password(&input.password, found, policy.password_rounds)?;
    let token = open_session(conn, user.id, policy.ttl_hours)?;
    Ok((user, token))
}

fn session_expiry(now: DateTime<Utc>, ttl_hours: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::Internal(anyhow!("session ttl of {ttl_hours} hours is out of range")))
}

fn insert_session(conn: &Connection, user_id: i64, ttl_hours: i64) -> AppResult<String> {
    let token = new_token();
    let now = Utc::now();
    let expires_at = session_expiry(now, ttl_hours)?;
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![token_digest(&token), user_id, now, expires_at],
    )?;
    Ok(token)
}

pub fn logout(conn: &Connection, token: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![token_digest(token)],
    )?;
    Ok(())
}

pub fn authenticate(conn: &Connection, token: &str) -> AppResult<User> {
    let digest = token_digest(token);
    let row = conn
        .query_row(
            "SELECT u.id, u.email, u.display_name, u.created_at, s.expires_at
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?1",
            params![digest],
            |row| {
                Ok((
                    User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        created_at: row.get(3)?,
                    },
                    row.get::<_, DateTime<Utc>>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((user, expires_at)) = row else {
        return Err(AppError::Unauthorized);
    };
    if expires_at <= Utc::now() {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![digest])?;
        return Err(AppError::Unauthorized);
    }
    Ok(user)
}

pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
