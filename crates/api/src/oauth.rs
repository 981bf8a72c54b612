//! Campus identity-provider OAuth2 support.
//!
//! This module contains only configuration, URL builders, and JSON parsing.
//! No HTTP calls or DB access — those live in the server's `CampusClient`
//! adapter, which receives the config by explicit construction rather than
//! through process-global state.

use serde::{Deserialize, Serialize};

use crate::{Profile, ServiceError, StudentSearchResult};

/// Page size used when walking the provider's campus-membership listing.
pub const CAMPUS_PAGE_SIZE: usize = 100;

/// Maximum number of hits returned by a live provider login search.
pub const SEARCH_PAGE_SIZE: usize = 10;

// ── Provider Configuration ──────────────────────────────────────────────────

/// OAuth2 provider configuration. Loaded from environment variables once at
/// startup and carried in the application state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    /// Base URL of the provider's REST API (profile, search, projects, campus).
    pub api_base_url: String,

    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: String,
}

/// Create a provider config for a 42-intra-shaped campus API.
///
/// `base_url` overrides the provider host for self-hosted or mock instances.
pub fn campus_preset(
    base_url: Option<String>,
    client_id: String,
    client_secret: String,
    redirect_url: String,
) -> ProviderConfig {
    let base = base_url
        .as_deref()
        .unwrap_or("https://api.intra.42.fr")
        .trim_end_matches('/')
        .to_string();

    ProviderConfig {
        authorize_url: format!("{base}/oauth/authorize"),
        token_url: format!("{base}/oauth/token"),
        api_base_url: format!("{base}/v2"),
        client_id,
        client_secret,
        redirect_url,
        scopes: "public".into(),
    }
}

// ── URL Builders (pure functions, no HTTP) ──────────────────────────────────

/// Build the authorize URL the user's browser is redirected to. `state` is
/// the anti-forgery token the callback must round-trip.
pub fn build_authorize_url(config: &ProviderConfig, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&state={}&scope={}&response_type=code",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_url),
        urlencoding::encode(state),
        urlencoding::encode(&config.scopes),
    )
}

/// Token exchange body (authorization-code grant) as urlencoded form pairs.
///
/// OAuth2 token endpoints are required to accept urlencoded form input.
pub fn build_token_request_form(config: &ProviderConfig, code: &str) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "authorization_code".into()),
        ("client_id".into(), config.client_id.clone()),
        ("client_secret".into(), config.client_secret.clone()),
        ("code".into(), code.to_string()),
        ("redirect_uri".into(), config.redirect_url.clone()),
    ]
}

/// Token body for the client-credentials grant — a service-level token
/// representing the application itself, used by campus sync so it never
/// depends on a particular staff member's session lifetime.
pub fn build_client_credentials_form(config: &ProviderConfig) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "client_credentials".into()),
        ("client_id".into(), config.client_id.clone()),
        ("client_secret".into(), config.client_secret.clone()),
    ]
}

pub fn search_users_url(config: &ProviderConfig, query: &str) -> String {
    format!(
        "{}/users?search[login]={}&per_page={}",
        config.api_base_url,
        urlencoding::encode(query),
        SEARCH_PAGE_SIZE,
    )
}

pub fn student_projects_url(config: &ProviderConfig, login: &str) -> String {
    format!(
        "{}/users/{}/projects_users",
        config.api_base_url,
        urlencoding::encode(login),
    )
}

pub fn campus_users_url(
    config: &ProviderConfig,
    campus_id: i64,
    page: usize,
    per_page: usize,
) -> String {
    format!(
        "{}/campus/{campus_id}/users?page={page}&per_page={per_page}",
        config.api_base_url,
    )
}

// ── Response Parsing ────────────────────────────────────────────────────────

/// Parse `access_token` from an OAuth token response.
///
/// Supports both JSON (`{"access_token":"..."}`) and query-string style
/// (`access_token=...&scope=...`) payloads.
pub fn parse_access_token_response(raw: &str) -> Result<String, ServiceError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ServiceError::UpstreamAuth(
            "token exchange failed: empty response body".into(),
        ));
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(token) = json
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Ok(token.to_string());
        }

        let err = json.get("error").and_then(|v| v.as_str());
        let err_desc = json.get("error_description").and_then(|v| v.as_str());
        let detail = match (err, err_desc) {
            (Some(e), Some(d)) if !d.is_empty() => format!("{e}: {d}"),
            (Some(e), _) => e.to_string(),
            (_, Some(d)) if !d.is_empty() => d.to_string(),
            _ => "no access_token field in JSON response".to_string(),
        };

        return Err(ServiceError::UpstreamAuth(format!(
            "token exchange failed: {detail}"
        )));
    }

    for pair in body.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == "access_token" && !v.trim().is_empty() {
            return Ok(v.trim().to_string());
        }
    }

    Err(ServiceError::UpstreamAuth(
        "token exchange failed: no access_token field in response".into(),
    ))
}

/// Extract a campus profile from the provider's userinfo JSON.
///
/// `id` and `login` are mandatory; a payload without them is malformed.
/// Email and display name default to empty — some service-level listings
/// omit them.
pub fn extract_profile(json: &serde_json::Value) -> Result<Profile, ServiceError> {
    let id = json["id"]
        .as_i64()
        .ok_or_else(|| ServiceError::UpstreamAuth("profile payload missing 'id' field".into()))?;
    let login = json["login"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ServiceError::UpstreamAuth("profile payload missing 'login' field".into())
        })?;

    Ok(Profile {
        id,
        login: login.to_string(),
        email: json["email"].as_str().unwrap_or_default().to_string(),
        display_name: json["displayname"].as_str().unwrap_or_default().to_string(),
    })
}

/// Parse a login-search response into directory hits.
pub fn parse_search_results(
    json: &serde_json::Value,
) -> Result<Vec<StudentSearchResult>, ServiceError> {
    let entries = json
        .as_array()
        .ok_or_else(|| ServiceError::UpstreamApi("search response is not an array".into()))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let login = entry["login"].as_str()?;
            Some(StudentSearchResult {
                login: login.to_string(),
                display_name: entry["displayname"].as_str().unwrap_or_default().to_string(),
                email: entry["email"].as_str().unwrap_or_default().to_string(),
            })
        })
        .collect())
}

/// Parse a project-enrollment listing into an ordered sequence of project
/// names, preserving the provider's ordering.
pub fn parse_project_names(json: &serde_json::Value) -> Result<Vec<String>, ServiceError> {
    let entries = json
        .as_array()
        .ok_or_else(|| ServiceError::UpstreamApi("projects response is not an array".into()))?;

    Ok(entries
        .iter()
        .filter_map(|entry| entry["project"]["name"].as_str().map(str::to_string))
        .collect())
}

/// Parse one page of the campus-membership listing. Any malformed member is
/// a decode error for the whole page — the caller discards all accumulation.
pub fn parse_campus_page(json: &serde_json::Value) -> Result<Vec<Profile>, ServiceError> {
    let entries = json
        .as_array()
        .ok_or_else(|| ServiceError::UpstreamApi("campus listing is not an array".into()))?;

    entries
        .iter()
        .map(|entry| {
            extract_profile(entry)
                .map_err(|e| ServiceError::UpstreamApi(format!("campus listing entry: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        campus_preset(
            None,
            "cid".into(),
            "secret".into(),
            "https://app.example/callback".into(),
        )
    }

    #[test]
    fn preset_builds_intra_endpoints() {
        let c = config();
        assert_eq!(c.authorize_url, "https://api.intra.42.fr/oauth/authorize");
        assert_eq!(c.token_url, "https://api.intra.42.fr/oauth/token");
        assert_eq!(c.api_base_url, "https://api.intra.42.fr/v2");
    }

    #[test]
    fn preset_accepts_override_with_trailing_slash() {
        let c = campus_preset(
            Some("http://localhost:9000/".into()),
            "cid".into(),
            "s".into(),
            "r".into(),
        );
        assert_eq!(c.token_url, "http://localhost:9000/oauth/token");
    }

    #[test]
    fn authorize_url_encodes_parameters() {
        let url = build_authorize_url(&config(), "st ate");
        assert!(url.starts_with("https://api.intra.42.fr/oauth/authorize?client_id=cid"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example%2Fcallback"));
        assert!(url.contains("state=st%20ate"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn token_form_carries_required_fields() {
        let form = build_token_request_form(&config(), "code-1");
        assert!(form.contains(&("grant_type".into(), "authorization_code".into())));
        assert!(form.contains(&("code".into(), "code-1".into())));
        assert!(form.contains(&("redirect_uri".into(), "https://app.example/callback".into())));
    }

    #[test]
    fn client_credentials_form_has_no_redirect() {
        let form = build_client_credentials_form(&config());
        assert!(form.contains(&("grant_type".into(), "client_credentials".into())));
        assert!(!form.iter().any(|(k, _)| k == "redirect_uri"));
    }

    #[test]
    fn parse_access_token_json_ok() {
        let raw = r#"{"access_token":"tok_123","token_type":"bearer"}"#;
        assert_eq!(
            parse_access_token_response(raw).expect("token parse"),
            "tok_123"
        );
    }

    #[test]
    fn parse_access_token_form_ok() {
        let raw = "access_token=tok_abc&scope=public&token_type=bearer";
        assert_eq!(
            parse_access_token_response(raw).expect("token parse"),
            "tok_abc"
        );
    }

    #[test]
    fn parse_access_token_error_has_reason() {
        let raw = r#"{"error":"invalid_grant","error_description":"The code has expired."}"#;
        let err = parse_access_token_response(raw).expect_err("must fail");
        assert!(err.message().contains("invalid_grant"));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn extract_profile_requires_id_and_login() {
        let ok = serde_json::json!({
            "id": 77, "login": "jdoe", "email": "jdoe@student.campus",
            "displayname": "Jane Doe",
        });
        let profile = extract_profile(&ok).expect("well-formed profile");
        assert_eq!(profile.id, 77);
        assert_eq!(profile.display_name, "Jane Doe");

        let missing = serde_json::json!({"id": 77, "email": "x@y"});
        assert!(extract_profile(&missing).is_err());
    }

    #[test]
    fn search_url_encodes_query() {
        let url = search_users_url(&config(), "jd oe");
        assert_eq!(
            url,
            "https://api.intra.42.fr/v2/users?search[login]=jd%20oe&per_page=10"
        );
    }

    #[test]
    fn project_names_preserve_order() {
        let json = serde_json::json!([
            {"project": {"name": "libft"}},
            {"final_mark": 0},
            {"project": {"name": "get_next_line"}},
        ]);
        let names = parse_project_names(&json).expect("array parses");
        assert_eq!(names, vec!["libft", "get_next_line"]);
    }

    #[test]
    fn campus_page_rejects_malformed_member() {
        let json = serde_json::json!([
            {"id": 1, "login": "a"},
            {"email": "broken@campus"},
        ]);
        let err = parse_campus_page(&json).expect_err("malformed entry fails the page");
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn campus_page_parses_members() {
        let json = serde_json::json!([
            {"id": 1, "login": "a", "email": "a@c", "displayname": "A"},
            {"id": 2, "login": "b", "email": "b@c", "displayname": "B"},
        ]);
        let members = parse_campus_page(&json).expect("page parses");
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].login, "b");
    }
}
