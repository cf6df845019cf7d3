use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::AppResult;
use crate::http::AppState;
use crate::http::extract::{AuthUser, Ids, JsonBody, QueryParams};
use crate::matchdays::{self, MatchdayFilter, MatchdayPatch, NewMatchday};
use crate::models::{Matchday, MatchdayDetail, TeamRoster};
use crate::teams::{self, GenerateRequest, GeneratedTeams, NewTeam, TeamPatch};

#[derive(Deserialize)]
pub struct RosterBody {
    player_ids: Vec<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    QueryParams(filter): QueryParams<MatchdayFilter>,
) -> AppResult<Json<Vec<Matchday>>> {
    let matchdays = state
        .db
        .call(move |conn| matchdays::list_matchdays(conn, user.id, gid, &filter))
        .await?;
    Ok(Json(matchdays))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    JsonBody(input): JsonBody<NewMatchday>,
) -> AppResult<(StatusCode, Json<Matchday>)> {
    let matchday = state
        .db
        .call(move |conn| matchdays::create_matchday(conn, user.id, gid, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(matchday)))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
) -> AppResult<Json<MatchdayDetail>> {
    let detail = state
        .db
        .call(move |conn| matchdays::get_matchday(conn, user.id, gid, mid))
        .await?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
    JsonBody(patch): JsonBody<MatchdayPatch>,
) -> AppResult<Json<Matchday>> {
    let matchday = state
        .db
        .call(move |conn| matchdays::update_matchday(conn, user.id, gid, mid, &patch))
        .await?;
    Ok(Json(matchday))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| matchdays::delete_matchday(conn, user.id, gid, mid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
) -> AppResult<Json<Matchday>> {
    let matchday = state
        .db
        .call(move |conn| matchdays::restore_matchday(conn, user.id, gid, mid))
        .await?;
    Ok(Json(matchday))
}

pub async fn list_teams(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
) -> AppResult<Json<Vec<TeamRoster>>> {
    let teams = state
        .db
        .call(move |conn| teams::list_teams(conn, user.id, gid, mid))
        .await?;
    Ok(Json(teams))
}

pub async fn create_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
    JsonBody(input): JsonBody<NewTeam>,
) -> AppResult<(StatusCode, Json<TeamRoster>)> {
    let team = state
        .db
        .call(move |conn| teams::create_team(conn, user.id, gid, mid, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn generate_teams(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
    JsonBody(request): JsonBody<GenerateRequest>,
) -> AppResult<(StatusCode, Json<GeneratedTeams>)> {
    let generated = state
        .db
        .call(move |conn| teams::generate_teams(conn, user.id, gid, mid, &request))
        .await?;
    Ok((StatusCode::CREATED, Json(generated)))
}

pub async fn update_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, tid)): Ids<(i64, i64)>,
    JsonBody(patch): JsonBody<TeamPatch>,
) -> AppResult<Json<TeamRoster>> {
    let team = state
        .db
        .call(move |conn| teams::update_team(conn, user.id, gid, tid, &patch))
        .await?;
    Ok(Json(team))
}

pub async fn delete_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, tid)): Ids<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| teams::delete_team(conn, user.id, gid, tid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_players(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, tid)): Ids<(i64, i64)>,
    JsonBody(body): JsonBody<RosterBody>,
) -> AppResult<Json<TeamRoster>> {
    let team = state
        .db
        .call(move |conn| teams::assign_players(conn, user.id, gid, tid, &body.player_ids))
        .await?;
    Ok(Json(team))
}
