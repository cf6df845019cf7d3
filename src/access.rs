//! Group-scoped authorization guards.
//!
//! Members may read everything in their group; mutations need the admin role.
//! Soft-deleted groups behave as missing except for [`require_admin_any`].

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{AppError, AppResult};
use crate::models::{Group, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub group_id: i64,
    pub user_id: i64,
    pub role: Role,
}

impl Membership {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub(crate) const GROUP_COLUMNS: &str =
    "id, name, description, invite_code, created_by, created_at, updated_at, deleted_at";

pub(crate) fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        invite_code: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted_at: row.get(7)?,
    })
}

fn find_group(conn: &Connection, group_id: i64) -> AppResult<Option<Group>> {
    let group = conn
        .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM play_groups WHERE id = ?1"),
            params![group_id],
            group_from_row,
        )
        .optional()?;
    Ok(group)
}

pub fn load_group(conn: &Connection, group_id: i64) -> AppResult<Group> {
    match find_group(conn, group_id)? {
        Some(group) if group.deleted_at.is_none() => Ok(group),
        _ => Err(AppError::not_found("group")),
    }
}

pub fn member_role(conn: &Connection, group_id: i64, user_id: i64) -> AppResult<Option<Role>> {
    let role = conn
        .query_row(
            "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(role)
}

pub fn require_member(conn: &Connection, group_id: i64, user_id: i64) -> AppResult<Membership> {
    load_group(conn, group_id)?;
    membership(conn, group_id, user_id)
}

pub fn require_admin(conn: &Connection, group_id: i64, user_id: i64) -> AppResult<Membership> {
    let member = require_member(conn, group_id, user_id)?;
    admin_only(member)
}

/// Like [`require_admin`] but also accepts a soft-deleted group.
pub fn require_admin_any(
    conn: &Connection,
    group_id: i64,
    user_id: i64,
) -> AppResult<(Group, Membership)> {
    let group = find_group(conn, group_id)?.ok_or_else(|| AppError::not_found("group"))?;
    let member = membership(conn, group_id, user_id)?;
    Ok((group, admin_only(member)?))
}

fn membership(conn: &Connection, group_id: i64, user_id: i64) -> AppResult<Membership> {
    let role = member_role(conn, group_id, user_id)?
        .ok_or_else(|| AppError::forbidden("not a member of this group"))?;
    Ok(Membership {
        group_id,
        user_id,
        role,
    })
}

fn admin_only(member: Membership) -> AppResult<Membership> {
    if !member.is_admin() {
        return Err(AppError::forbidden("group admin role required"));
    }
    Ok(member)
}

pub fn admin_count(conn: &Connection, group_id: i64) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND role = 'admin'",
        params![group_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Resolves the group owning a matchday, rejecting ids from other groups.
pub fn matchday_in_group(conn: &Connection, group_id: i64, matchday_id: i64) -> AppResult<()> {
    owned_by_group(
        conn,
        "SELECT group_id FROM matchdays WHERE id = ?1",
        matchday_id,
        group_id,
        "matchday",
    )
}

pub fn game_in_group(conn: &Connection, group_id: i64, game_id: i64) -> AppResult<()> {
    owned_by_group(
        conn,
        "SELECT m.group_id FROM games g JOIN matchdays m ON m.id = g.matchday_id WHERE g.id = ?1",
        game_id,
        group_id,
        "game",
    )
}

pub fn team_in_group(conn: &Connection, group_id: i64, team_id: i64) -> AppResult<()> {
    owned_by_group(
        conn,
        "SELECT m.group_id FROM teams t JOIN matchdays m ON m.id = t.matchday_id WHERE t.id = ?1",
        team_id,
        group_id,
        "team",
    )
}

fn owned_by_group(
    conn: &Connection,
    sql: &str,
    id: i64,
    group_id: i64,
    what: &str,
) -> AppResult<()> {
    let owner: Option<i64> = conn.query_row(sql, params![id], |row| row.get(0)).optional()?;
    match owner {
        Some(owner) if owner == group_id => Ok(()),
        _ => Err(AppError::not_found(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::Utc;

    fn seed(conn: &Connection) {
        let now = Utc::now();
        conn.execute_batch(
            "INSERT INTO users (id, email, display_name, password_hash, created_at)
               VALUES (1, 'a@x', 'A', 'h', '2026-01-01 00:00:00+00:00'),
                      (2, 'b@x', 'B', 'h', '2026-01-01 00:00:00+00:00'),
                      (3, 'c@x', 'C', 'h', '2026-01-01 00:00:00+00:00');",
        )
        .expect("users");
        conn.execute(
            "INSERT INTO play_groups (id, name, invite_code, created_by, created_at, updated_at)
             VALUES (1, 'Tuesday', 'ABCDEFGH', 1, ?1, ?1)",
            params![now],
        )
        .expect("group");
        conn.execute_batch(
            "INSERT INTO group_members VALUES (1, 1, 'admin', '2026-01-01 00:00:00+00:00');
             INSERT INTO group_members VALUES (1, 2, 'member', '2026-01-01 00:00:00+00:00');",
        )
        .expect("members");
    }

    #[test]
    fn guards_distinguish_roles() {
        let conn = open_in_memory().expect("db");
        seed(&conn);
        assert!(require_admin(&conn, 1, 1).is_ok());
        assert!(require_member(&conn, 1, 2).is_ok());
        assert!(matches!(
            require_admin(&conn, 1, 2),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            require_member(&conn, 1, 3),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            require_member(&conn, 99, 1),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn deleted_group_is_hidden_except_for_restore_guard() {
        let conn = open_in_memory().expect("db");
        seed(&conn);
        conn.execute(
            "UPDATE play_groups SET deleted_at = ?1 WHERE id = 1",
            params![Utc::now()],
        )
        .expect("delete");
        assert!(matches!(
            require_member(&conn, 1, 1),
            Err(AppError::NotFound(_))
        ));
        let (group, member) = require_admin_any(&conn, 1, 1).expect("admin any");
        assert!(group.deleted_at.is_some());
        assert!(member.is_admin());
        assert!(matches!(
            require_admin_any(&conn, 1, 2),
            Err(AppError::Forbidden(_))
        ));
    }
}
