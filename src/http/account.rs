use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::auth::{self, LoginInput, RegisterInput};
use crate::db;
use crate::error::AppResult;
use crate::http::AppState;
use crate::http::extract::{AuthUser, BearerToken, JsonBody};
use crate::models::User;

#[derive(Serialize)]
pub struct SessionResponse {
    user: User,
    token: String,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let policy = state.session_policy();
    let account = db::blocking(move || auth::prepare_account(&input, policy.password_rounds)).await?;
    let (user, token) = state
        .db
        .call(move |conn| auth::create_account(conn, &account, policy.ttl_hours))
        .await?;
    Ok((StatusCode::CREATED, Json(SessionResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> AppResult<Json<SessionResponse>> {
    let policy = state.session_policy();
    let email = input.email.clone();
    let found = state
        .db
        .call(move |conn| auth::find_credentials(conn, &email))
        .await?;
    let user = db::blocking(move || {
        auth::check_password(&input.password, found, policy.password_rounds)
    })
    .await?;
    let user_id = user.id;
    let token = state
        .db
        .call(move |conn| auth::open_session(conn, user_id, policy.ttl_hours))
        .await?;
    Ok(Json(SessionResponse { user, token }))
}

pub async fn logout(State(state): State<AppState>, BearerToken(token): BearerToken) -> AppResult<StatusCode> {
    state.db.call(move |conn| auth::logout(conn, &token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
