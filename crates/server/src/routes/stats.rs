use axum::{Json, extract::State};
use campuswatch_api::UserCountResponse;

use crate::error::ApiErr;
use crate::storage::Db;

/// GET /api/stats — size of the local directory.
pub async fn user_count(State(db): State<Db>) -> Result<Json<UserCountResponse>, ApiErr> {
    let total_users = db.user_count().map_err(ApiErr::from)?;
    Ok(Json(UserCountResponse { total_users }))
}
