use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::AppResult;
use crate::http::AppState;
use crate::http::extract::{AuthUser, Ids, JsonBody, QueryParams};
use crate::http::groups::ListParams;
use crate::models::Player;
use crate::players::{self, NewPlayer, PlayerPatch};

#[derive(Deserialize)]
pub struct OrderBody {
    player_ids: Vec<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    QueryParams(params): QueryParams<ListParams>,
) -> AppResult<Json<Vec<Player>>> {
    let players = state
        .db
        .call(move |conn| players::list_players(conn, user.id, gid, params.include_deleted))
        .await?;
    Ok(Json(players))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    JsonBody(input): JsonBody<NewPlayer>,
) -> AppResult<(StatusCode, Json<Player>)> {
    let player = state
        .db
        .call(move |conn| players::create_player(conn, user.id, gid, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(player)))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, pid)): Ids<(i64, i64)>,
) -> AppResult<Json<Player>> {
    let player = state
        .db
        .call(move |conn| players::get_player(conn, user.id, gid, pid))
        .await?;
    Ok(Json(player))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, pid)): Ids<(i64, i64)>,
    JsonBody(patch): JsonBody<PlayerPatch>,
) -> AppResult<Json<Player>> {
    let player = state
        .db
        .call(move |conn| players::update_player(conn, user.id, gid, pid, &patch))
        .await?;
    Ok(Json(player))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, pid)): Ids<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| players::delete_player(conn, user.id, gid, pid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, pid)): Ids<(i64, i64)>,
) -> AppResult<Json<Player>> {
    let player = state
        .db
        .call(move |conn| players::restore_player(conn, user.id, gid, pid))
        .await?;
    Ok(Json(player))
}

pub async fn reorder(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    JsonBody(body): JsonBody<OrderBody>,
) -> AppResult<Json<Vec<Player>>> {
    let players = state
        .db
        .call(move |conn| players::reorder_players(conn, user.id, gid, &body.player_ids))
        .await?;
    Ok(Json(players))
}
