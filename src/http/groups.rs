use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::AppResult;
use crate::groups::{self, GroupPatch, NewGroup};
use crate::http::AppState;
use crate::http::extract::{AuthUser, Ids, JsonBody, QueryParams};
use crate::models::{Group, GroupSummary, Member, Role};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default, deserialize_with = "crate::validate::query_flag")]
    pub include_deleted: bool,
}

#[derive(Deserialize)]
pub struct JoinBody {
    invite_code: String,
}

#[derive(Deserialize)]
pub struct RoleBody {
    role: Role,
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    QueryParams(params): QueryParams<ListParams>,
) -> AppResult<Json<Vec<GroupSummary>>> {
    let groups = state
        .db
        .call(move |conn| groups::list_groups(conn, user.id, params.include_deleted))
        .await?;
    Ok(Json(groups))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(input): JsonBody<NewGroup>,
) -> AppResult<(StatusCode, Json<GroupSummary>)> {
    let group = state
        .db
        .call(move |conn| groups::create_group(conn, user.id, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn join(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<JoinBody>,
) -> AppResult<Json<GroupSummary>> {
    let group = state
        .db
        .call(move |conn| groups::join_group(conn, user.id, &body.invite_code))
        .await?;
    Ok(Json(group))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
) -> AppResult<Json<GroupSummary>> {
    let group = state
        .db
        .call(move |conn| groups::get_group(conn, user.id, gid))
        .await?;
    Ok(Json(group))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    JsonBody(patch): JsonBody<GroupPatch>,
) -> AppResult<Json<Group>> {
    let group = state
        .db
        .call(move |conn| groups::update_group(conn, user.id, gid, &patch))
        .await?;
    Ok(Json(group))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| groups::delete_group(conn, user.id, gid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
) -> AppResult<Json<GroupSummary>> {
    let group = state
        .db
        .call(move |conn| groups::restore_group(conn, user.id, gid))
        .await?;
    Ok(Json(group))
}

pub async fn regenerate_invite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
) -> AppResult<Json<Group>> {
    let group = state
        .db
        .call(move |conn| groups::regenerate_invite_code(conn, user.id, gid))
        .await?;
    Ok(Json(group))
}

pub async fn leave(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| groups::leave_group(conn, user.id, gid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn members(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
) -> AppResult<Json<Vec<Member>>> {
    let members = state
        .db
        .call(move |conn| groups::list_members(conn, user.id, gid))
        .await?;
    Ok(Json(members))
}

pub async fn change_role(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, uid)): Ids<(i64, i64)>,
    JsonBody(body): JsonBody<RoleBody>,
) -> AppResult<Json<Member>> {
    let member = state
        .db
        .call(move |conn| groups::change_role(conn, user.id, gid, uid, body.role))
        .await?;
    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, uid)): Ids<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| groups::remove_member(conn, user.id, gid, uid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
