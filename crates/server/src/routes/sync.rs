use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use campuswatch_api::{NewUser, SyncUsersResponse};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct SyncQuery {
    campus_id: Option<String>,
}

/// POST /api/sync-users?campus_id= — refresh the local directory from the
/// provider's campus membership (authenticated).
///
/// Runs on a service-level token so it never depends on the requesting
/// user's own provider session. Any upstream failure aborts before the
/// bulk-upsert transaction opens — no partial directory is written.
pub async fn sync_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncUsersResponse>, ApiErr> {
    let campus_id: i64 = query
        .campus_id
        .as_deref()
        .unwrap_or("1")
        .parse()
        .map_err(|_| ApiErr::bad_request("invalid campus id"))?;

    let token = state
        .campus
        .client_credentials_token()
        .await
        .map_err(ApiErr::from)?;

    let members = state
        .campus
        .all_campus_users(campus_id, &token)
        .await
        .map_err(ApiErr::from)?;

    // Synced members are always provisioned non-staff; the upsert never
    // touches an existing staff flag.
    let users: Vec<NewUser> = members
        .into_iter()
        .map(|profile| NewUser {
            login: profile.login,
            email: profile.email,
            display_name: profile.display_name,
        })
        .collect();

    let count = state.db.bulk_upsert_users(&users).map_err(ApiErr::from)?;

    tracing::info!(campus_id, count, requested_by = %user.login, "campus directory synced");

    Ok(Json(SyncUsersResponse {
        message: format!("Users synced successfully from campus {campus_id}"),
        count,
        requested_by: user.login,
    }))
}
