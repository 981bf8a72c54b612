use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use campuswatch_api::{ProjectListResponse, StudentSearchResponse};

use crate::campus::CampusClient;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::Db;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
    /// `source=campus` bypasses the local directory and searches the
    /// provider live with a service-level token.
    source: Option<String>,
}

/// GET /api/students/search?q= — directory search (authenticated).
///
/// Defaults to the locally synced directory so typing in the report form
/// does not hit the provider per keystroke.
pub async fn search(
    State(db): State<Db>,
    State(campus): State<CampusClient>,
    _user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<StudentSearchResponse>, ApiErr> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiErr::bad_request("query parameter required"));
    }

    let students = if query.source.as_deref() == Some("campus") {
        let token = campus.client_credentials_token().await.map_err(ApiErr::from)?;
        campus.search_users(q, &token).await.map_err(ApiErr::from)?
    } else {
        db.search_users(q).map_err(ApiErr::from)?
    };

    Ok(Json(StudentSearchResponse { students }))
}

/// GET /api/students/{login}/projects — proxy the provider's project
/// listing for one student (authenticated).
pub async fn projects(
    State(campus): State<CampusClient>,
    _user: AuthUser,
    Path(login): Path<String>,
) -> Result<Json<ProjectListResponse>, ApiErr> {
    let token = campus.client_credentials_token().await.map_err(ApiErr::from)?;
    let projects = campus
        .student_projects(&login, &token)
        .await
        .map_err(ApiErr::from)?;

    Ok(Json(ProjectListResponse { projects }))
}
