use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::error::AppResult;
use crate::games::{self, GamePatch, NewEvent, NewGame};
use crate::http::AppState;
use crate::http::extract::{AuthUser, Ids, JsonBody};
use crate::models::{Game, GameDetail, GameEvent, PenaltyShootout};
use crate::shootouts::{self, ShootoutInput};

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
) -> AppResult<Json<Vec<Game>>> {
    let games = state
        .db
        .call(move |conn| games::list_games(conn, user.id, gid, mid))
        .await?;
    Ok(Json(games))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
    JsonBody(input): JsonBody<NewGame>,
) -> AppResult<(StatusCode, Json<Game>)> {
    let game = state
        .db
        .call(move |conn| games::create_game(conn, user.id, gid, mid, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(game)))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
) -> AppResult<Json<GameDetail>> {
    let game = state
        .db
        .call(move |conn| games::get_game(conn, user.id, gid, game_id))
        .await?;
    Ok(Json(game))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
    JsonBody(patch): JsonBody<GamePatch>,
) -> AppResult<Json<GameDetail>> {
    let game = state
        .db
        .call(move |conn| games::update_game(conn, user.id, gid, game_id, &patch))
        .await?;
    Ok(Json(game))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| games::delete_game(conn, user.id, gid, game_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
) -> AppResult<Json<GameDetail>> {
    let game = state
        .db
        .call(move |conn| games::restore_game(conn, user.id, gid, game_id))
        .await?;
    Ok(Json(game))
}

pub async fn add_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
    JsonBody(input): JsonBody<NewEvent>,
) -> AppResult<(StatusCode, Json<GameEvent>)> {
    let event = state
        .db
        .call(move |conn| games::add_event(conn, user.id, gid, game_id, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id, eid)): Ids<(i64, i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| games::delete_event(conn, user.id, gid, game_id, eid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_shootout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
    JsonBody(input): JsonBody<ShootoutInput>,
) -> AppResult<Json<PenaltyShootout>> {
    let shootout = state
        .db
        .call(move |conn| shootouts::record_shootout(conn, user.id, gid, game_id, &input))
        .await?;
    Ok(Json(shootout))
}

pub async fn delete_shootout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, game_id)): Ids<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .db
        .call(move |conn| shootouts::delete_shootout(conn, user.id, gid, game_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
