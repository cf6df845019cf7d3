use chrono::Utc;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use tracing::info;

use crate::access::{self, GROUP_COLUMNS, group_from_row};
use crate::activity;
use crate::error::{AppError, AppResult};
use crate::models::{Action, EntityType, Group, GroupSummary, Member, Role};
use crate::validate::{double_option, optional_text, required_text};

const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const INVITE_LEN: usize = 8;
const MAX_NAME_LEN: usize = 80;
const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

fn unused_invite_code(conn: &Connection) -> AppResult<String> {
    loop {
        let code = generate_invite_code();
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM play_groups WHERE invite_code = ?1)",
            params![code],
            |row| row.get(0),
        )?;
        if !taken {
            return Ok(code);
        }
    }
}

fn summary(conn: &Connection, group: Group, role: Role) -> AppResult<GroupSummary> {
    let member_count = conn.query_row(
        "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
        params![group.id],
        |row| row.get(0),
    )?;
    Ok(GroupSummary {
        group,
        role,
        member_count,
    })
}

fn fetch_group(conn: &Connection, group_id: i64) -> AppResult<Group> {
    let group = conn
        .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM play_groups WHERE id = ?1"),
            params![group_id],
            group_from_row,
        )
        .optional()?;
    group.ok_or_else(|| AppError::not_found("group"))
}

pub fn create_group(conn: &mut Connection, actor: i64, input: &NewGroup) -> AppResult<GroupSummary> {
    let name = required_text(&input.name, "name", MAX_NAME_LEN)?;
    let description = optional_text(input.description.as_deref(), "description", MAX_DESCRIPTION_LEN)?;

    let tx = conn.transaction()?;
    let now = Utc::now();
    let invite_code = unused_invite_code(&tx)?;
    tx.execute(
        "INSERT INTO play_groups (name, description, invite_code, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![name, description, invite_code, actor, now],
    )?;
    let group_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        params![group_id, actor, Role::Admin, now],
    )?;
    let group = fetch_group(&tx, group_id)?;
    activity::record_create(&tx, group_id, actor, EntityType::Group, group_id, &group)?;
    let out = summary(&tx, group, Role::Admin)?;
    tx.commit()?;

    info!(group_id, user_id = actor, "created group");
    Ok(out)
}

pub fn list_groups(conn: &Connection, actor: i64, include_deleted: bool) -> AppResult<Vec<GroupSummary>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.name, g.description, g.invite_code, g.created_by, g.created_at,
                g.updated_at, g.deleted_at, m.role
         FROM play_groups g JOIN group_members m ON m.group_id = g.id
         WHERE m.user_id = ?1
           AND (g.deleted_at IS NULL OR (?2 AND m.role = 'admin'))
         ORDER BY g.name COLLATE NOCASE, g.id",
    )?;
    let rows = stmt.query_map(params![actor, include_deleted], |row| {
        Ok((group_from_row(row)?, row.get::<_, Role>(8)?))
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(group, role)| summary(conn, group, role))
        .collect()
}

pub fn get_group(conn: &Connection, actor: i64, group_id: i64) -> AppResult<GroupSummary> {
    let member = access::require_member(conn, group_id, actor)?;
    let group = access::load_group(conn, group_id)?;
    summary(conn, group, member.role)
}

pub fn update_group(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    patch: &GroupPatch,
) -> AppResult<Group> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let before = access::load_group(&tx, group_id)?;

    let name = match patch.name.as_deref() {
        Some(raw) => required_text(raw, "name", MAX_NAME_LEN)?,
        None => before.name.clone(),
    };
    let description = match &patch.description {
        Some(raw) => optional_text(raw.as_deref(), "description", MAX_DESCRIPTION_LEN)?,
        None => before.description.clone(),
    };
    if name == before.name && description == before.description {
        return Ok(before);
    }

    tx.execute(
        "UPDATE play_groups SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, description, Utc::now(), group_id],
    )?;
    let after = fetch_group(&tx, group_id)?;
    activity::record_update(&tx, group_id, actor, EntityType::Group, group_id, &before, &after)?;
    tx.commit()?;
    Ok(after)
}

pub fn delete_group(conn: &mut Connection, actor: i64, group_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let now = Utc::now();
    tx.execute(
        "UPDATE play_groups SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, group_id],
    )?;
    let changes = activity::change("deleted_at", Option::<()>::None, now)?;
    activity::record(&tx, group_id, actor, EntityType::Group, group_id, Action::Delete, changes)?;
    tx.commit()?;

    info!(group_id, user_id = actor, "deleted group");
    Ok(())
}

pub fn restore_group(conn: &mut Connection, actor: i64, group_id: i64) -> AppResult<GroupSummary> {
    let tx = conn.transaction()?;
    let (group, member) = access::require_admin_any(&tx, group_id, actor)?;
    let Some(deleted_at) = group.deleted_at else {
        return Err(AppError::conflict("group is not deleted"));
    };
    tx.execute(
        "UPDATE play_groups SET deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
        params![Utc::now(), group_id],
    )?;
    let changes = activity::change("deleted_at", deleted_at, Option::<()>::None)?;
    activity::record(&tx, group_id, actor, EntityType::Group, group_id, Action::Restore, changes)?;
    let out = summary(&tx, fetch_group(&tx, group_id)?, member.role)?;
    tx.commit()?;

    info!(group_id, user_id = actor, "restored group");
    Ok(out)
}

pub fn join_group(conn: &mut Connection, actor: i64, invite_code: &str) -> AppResult<GroupSummary> {
    let code = invite_code.trim().to_uppercase();
    if code.is_empty() {
        return Err(AppError::validation("invite code is required"));
    }

    let tx = conn.transaction()?;
    let group = tx
        .query_row(
            &format!(
                "SELECT {GROUP_COLUMNS} FROM play_groups WHERE invite_code = ?1 AND deleted_at IS NULL"
            ),
            params![code],
            group_from_row,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("group"))?;

    if let Some(role) = access::member_role(&tx, group.id, actor)? {
        return summary(&tx, group, role);
    }

    tx.execute(
        "INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        params![group.id, actor, Role::Member, Utc::now()],
    )?;
    let changes = activity::change("role", Option::<()>::None, Role::Member)?;
    activity::record(&tx, group.id, actor, EntityType::Member, actor, Action::Join, changes)?;
    let out = summary(&tx, group, Role::Member)?;
    tx.commit()?;

    info!(group_id = out.group.id, user_id = actor, "user joined group");
    Ok(out)
}

pub fn regenerate_invite_code(conn: &mut Connection, actor: i64, group_id: i64) -> AppResult<Group> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let before = access::load_group(&tx, group_id)?;
    let code = unused_invite_code(&tx)?;
    tx.execute(
        "UPDATE play_groups SET invite_code = ?1, updated_at = ?2 WHERE id = ?3",
        params![code, Utc::now(), group_id],
    )?;
    let changes = activity::change("invite_code", &before.invite_code, &code)?;
    activity::record(
        &tx,
        group_id,
        actor,
        EntityType::Group,
        group_id,
        Action::RegenerateInvite,
        changes,
    )?;
    let after = fetch_group(&tx, group_id)?;
    tx.commit()?;
    Ok(after)
}

pub fn list_members(conn: &Connection, actor: i64, group_id: i64) -> AppResult<Vec<Member>> {
    access::require_member(conn, group_id, actor)?;
    let mut stmt = conn.prepare(
        "SELECT m.group_id, m.user_id, u.display_name, u.email, m.role, m.joined_at
         FROM group_members m JOIN users u ON u.id = m.user_id
         WHERE m.group_id = ?1
         ORDER BY m.role = 'admin' DESC, u.display_name COLLATE NOCASE, u.id",
    )?;
    let rows = stmt.query_map(params![group_id], |row| {
        Ok(Member {
            group_id: row.get(0)?,
            user_id: row.get(1)?,
            display_name: row.get(2)?,
            email: row.get(3)?,
            role: row.get(4)?,
            joined_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn target_role(conn: &Connection, group_id: i64, user_id: i64) -> AppResult<Role> {
    access::member_role(conn, group_id, user_id)?.ok_or_else(|| AppError::not_found("member"))
}

fn ensure_not_last_admin(conn: &Connection, group_id: i64, role: Role) -> AppResult<()> {
    if role == Role::Admin && access::admin_count(conn, group_id)? <= 1 {
        return Err(AppError::conflict("a group must keep at least one admin"));
    }
    Ok(())
}

pub fn change_role(
    conn: &mut Connection,
    actor: i64,
    group_id: i64,
    user_id: i64,
    role: Role,
) -> AppResult<Member> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let current = target_role(&tx, group_id, user_id)?;
    if current != role {
        if role == Role::Member {
            ensure_not_last_admin(&tx, group_id, current)?;
        }
        tx.execute(
            "UPDATE group_members SET role = ?1 WHERE group_id = ?2 AND user_id = ?3",
            params![role, group_id, user_id],
        )?;
        let changes = activity::change("role", current, role)?;
        activity::record(&tx, group_id, actor, EntityType::Member, user_id, Action::RoleChange, changes)?;
    }
    let member = list_members(&tx, actor, group_id)?
        .into_iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| AppError::not_found("member"))?;
    tx.commit()?;
    Ok(member)
}

pub fn remove_member(conn: &mut Connection, actor: i64, group_id: i64, user_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    access::require_admin(&tx, group_id, actor)?;
    let role = target_role(&tx, group_id, user_id)?;
    ensure_not_last_admin(&tx, group_id, role)?;
    tx.execute(
        "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, user_id],
    )?;
    let changes = activity::change("role", role, Option::<()>::None)?;
    activity::record(&tx, group_id, actor, EntityType::Member, user_id, Action::Remove, changes)?;
    tx.commit()?;
    Ok(())
}

pub fn leave_group(conn: &mut Connection, actor: i64, group_id: i64) -> AppResult<()> {
    let tx = conn.transaction()?;
    let member = access::require_member(&tx, group_id, actor)?;
    ensure_not_last_admin(&tx, group_id, member.role)?;
    tx.execute(
        "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, actor],
    )?;
    let changes = activity::change("role", member.role, Option::<()>::None)?;
    activity::record(&tx, group_id, actor, EntityType::Member, actor, Action::Leave, changes)?;
    tx.commit()?;
    Ok(())
}
