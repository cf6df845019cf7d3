use axum::Json;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;

use crate::activity::{self, ActivityPage, ActivityQuery};
use crate::error::AppResult;
use crate::http::AppState;
use crate::http::extract::{AuthUser, Ids, QueryParams};
use crate::stats::{self, GroupStats, MatchdayStandings, StatsQuery};
use crate::stats_export;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub async fn stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    QueryParams(query): QueryParams<StatsQuery>,
) -> AppResult<Json<GroupStats>> {
    let stats = state
        .db
        .call(move |conn| stats::group_stats(conn, user.id, gid, &query))
        .await?;
    Ok(Json(stats))
}

pub async fn export(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    QueryParams(query): QueryParams<StatsQuery>,
) -> AppResult<impl IntoResponse> {
    let bytes = state
        .db
        .call(move |conn| stats_export::export_group_stats_bytes(conn, user.id, gid, &query))
        .await?;
    let disposition = format!("attachment; filename=\"group-{gid}-stats.xlsx\"");
    Ok(([(CONTENT_TYPE, XLSX_MIME.to_string()), (CONTENT_DISPOSITION, disposition)], bytes))
}

pub async fn standings(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids((gid, mid)): Ids<(i64, i64)>,
) -> AppResult<Json<MatchdayStandings>> {
    let standings = state
        .db
        .call(move |conn| stats::matchday_standings(conn, user.id, gid, mid))
        .await?;
    Ok(Json(standings))
}

pub async fn activity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Ids(gid): Ids<i64>,
    QueryParams(query): QueryParams<ActivityQuery>,
) -> AppResult<Json<ActivityPage>> {
    let page = state
        .db
        .call(move |conn| activity::list(conn, gid, user.id, &query))
        .await?;
    Ok(Json(page))
}
