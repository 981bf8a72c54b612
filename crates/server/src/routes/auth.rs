use std::collections::HashMap;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, Query, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};

use campuswatch_api::{MeResponse, NewUser, User, crypto};

use crate::campus::CampusClient;
use crate::error::ApiErr;
use crate::storage::Db;
use crate::{AppConfig, AppState};

/// Signed session cookie. One credential: login + expiry under an HMAC, so
/// there is no separate plaintext-login cookie to keep in sync.
pub const SESSION_COOKIE: &str = "session";

/// Short-lived anti-forgery state issued at /login, consumed at /callback.
pub const STATE_COOKIE: &str = "oauth_state";

// ---------------------------------------------------------------------------
// Cookie helpers
// ---------------------------------------------------------------------------

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn build_cookie(name: &str, value: &str, max_age_secs: u64) -> String {
    format!("{name}={value}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax")
}

fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

pub fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

// ---------------------------------------------------------------------------
// Auth extractors
// ---------------------------------------------------------------------------

fn unauthorized(msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": msg})),
    )
        .into_response()
}

/// Authenticated user: the session cookie must verify and resolve to a
/// directory row.
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Db::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = cookie_value(&parts.headers, SESSION_COOKIE)
            .ok_or_else(|| unauthorized("not authenticated"))?;

        let login = crypto::verify_session(&token, &config.session_secret, now_unix())
            .map_err(|e| unauthorized(e.message()))?;

        let user = db
            .user_by_login(&login)
            .map_err(|e| {
                tracing::error!("session lookup: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "internal server error"})),
                )
                    .into_response()
            })?
            .ok_or_else(|| {
                // Session verifies but the row is gone (e.g. wiped database).
                // Diagnostic context is deliberate, see the /api/me handler.
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "error": "user not found in database",
                        "login_from_session": login,
                        "hint": "log out and back in via /login",
                    })),
                )
                    .into_response()
            })?;

        Ok(AuthUser(user))
    }
}

/// Staff tier: authenticated and `is_staff`. Absence of the flag is a 403,
/// distinct in kind from an unauthenticated 401.
pub struct StaffUser(pub User);

impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": "staff access required"})),
            )
                .into_response());
        }
        Ok(StaffUser(user))
    }
}

// ---------------------------------------------------------------------------
// GET /login — redirect to the provider's authorize page
// ---------------------------------------------------------------------------

pub async fn login(
    State(config): State<AppConfig>,
    State(campus): State<CampusClient>,
) -> Result<impl IntoResponse, ApiErr> {
    if config.session_secret.is_empty() {
        return Err(ApiErr::internal("SESSION_SECRET not configured"));
    }

    let state = crypto::generate_state().map_err(ApiErr::from)?;
    let url = campus.authorize_url(&state);

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            build_cookie(STATE_COOKIE, &state, crypto::STATE_TTL_SECS),
        )]),
        Redirect::temporary(&url),
    ))
}

// ---------------------------------------------------------------------------
// GET /callback — validate state, exchange code, establish the session
// ---------------------------------------------------------------------------

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiErr> {
    let stored_state = cookie_value(&headers, STATE_COOKIE)
        .ok_or_else(|| ApiErr::bad_request("missing OAuth state cookie"))?;
    let returned_state = params
        .get("state")
        .ok_or_else(|| ApiErr::bad_request("missing state parameter"))?;
    if *returned_state != stored_state {
        return Err(ApiErr::bad_request("invalid OAuth state"));
    }

    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiErr::bad_request("missing authorization code"))?;

    let profile = state.campus.exchange_code(code).await.map_err(ApiErr::from)?;

    let user = state
        .db
        .upsert_user(&NewUser {
            login: profile.login,
            email: profile.email,
            display_name: profile.display_name,
        })
        .map_err(ApiErr::from)?;

    tracing::info!(login = %user.login, "campus login");

    let token = crypto::sign_session(&user.login, &state.config.session_secret, now_unix());

    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                build_cookie(SESSION_COOKIE, &token, crypto::SESSION_TTL_SECS),
            ),
            (header::SET_COOKIE, clear_cookie(STATE_COOKIE)),
        ]),
        Redirect::temporary("/dashboard"),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/me — session introspection (debug-oriented)
// ---------------------------------------------------------------------------

pub async fn me(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, ApiErr> {
    let token = cookie_value(&headers, SESSION_COOKIE)
        .ok_or_else(|| ApiErr::unauthorized("not authenticated"))?;
    let login = crypto::verify_session(&token, &config.session_secret, now_unix())
        .map_err(ApiErr::from)?;

    let response = match db.user_by_login(&login).map_err(ApiErr::from)? {
        Some(user) => MeResponse {
            authenticated: true,
            login: user.login,
            display_name: Some(user.display_name),
            email: Some(user.email),
            in_database: true,
            hint: None,
        },
        None => MeResponse {
            authenticated: true,
            login,
            display_name: None,
            email: None,
            in_database: false,
            hint: Some("user not in database — re-login via /login".into()),
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    use crate::storage::init_db;

    #[derive(Clone)]
    struct TestState {
        db: Db,
        config: AppConfig,
    }

    impl FromRef<TestState> for Db {
        fn from_ref(state: &TestState) -> Self {
            state.db.clone()
        }
    }

    impl FromRef<TestState> for AppConfig {
        fn from_ref(state: &TestState) -> Self {
            state.config.clone()
        }
    }

    fn test_state() -> (TestState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = init_db(&dir.path().join("auth.db")).expect("database init");
        let state = TestState {
            db,
            config: AppConfig {
                session_secret: "test-secret".into(),
            },
        };
        (state, dir)
    }

    fn parts_with_cookie(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/staff/reports");
        if let Some(value) = cookie {
            builder = builder.header(header::COOKIE, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[tokio::test]
    async fn missing_session_cookie_is_unauthorized() {
        let (state, _dir) = test_state();
        let mut parts = parts_with_cookie(None);

        let Err(rejection) = AuthUser::from_request_parts(&mut parts, &state).await else {
            panic!("expected a rejection without a session cookie");
        };
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_staff_session_is_forbidden_not_unauthorized() {
        let (state, _dir) = test_state();
        state
            .db
            .upsert_user(&NewUser {
                login: "jdoe".into(),
                email: "jdoe@student.campus".into(),
                display_name: "JDOE".into(),
            })
            .expect("user");
        let token = crypto::sign_session("jdoe", "test-secret", now_unix());
        let cookie = format!("{SESSION_COOKIE}={token}");

        let mut parts = parts_with_cookie(Some(&cookie));
        let Ok(AuthUser(user)) = AuthUser::from_request_parts(&mut parts, &state).await else {
            panic!("valid session for an existing user must authenticate");
        };
        assert_eq!(user.login, "jdoe");

        let mut parts = parts_with_cookie(Some(&cookie));
        let Err(rejection) = StaffUser::from_request_parts(&mut parts, &state).await else {
            panic!("non-staff user must not pass the staff tier");
        };
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn session_for_unknown_login_is_unauthorized() {
        let (state, _dir) = test_state();
        let token = crypto::sign_session("ghost", "test-secret", now_unix());
        let cookie = format!("{SESSION_COOKIE}={token}");
        let mut parts = parts_with_cookie(Some(&cookie));

        let Err(rejection) = AuthUser::from_request_parts(&mut parts, &state).await else {
            panic!("session without a directory row must be rejected");
        };
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("oauth_state=abc; session=tok.en.sig"),
        );
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("tok.en.sig"));
        assert_eq!(cookie_value(&headers, "oauth_state").as_deref(), Some("abc"));
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn cookie_value_ignores_prefix_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("session_old=stale; session=fresh"),
        );
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("fresh"));
    }

    #[test]
    fn session_cookie_is_http_only_with_ttl() {
        let cookie = build_cookie(SESSION_COOKIE, "tok", crypto::SESSION_TTL_SECS);
        assert!(cookie.starts_with("session=tok;"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn state_cookie_lives_five_minutes() {
        let cookie = build_cookie(STATE_COOKIE, "abc", crypto::STATE_TTL_SECS);
        assert!(cookie.contains("Max-Age=300"));
        assert!(clear_cookie(STATE_COOKIE).contains("Max-Age=0"));
    }
}
