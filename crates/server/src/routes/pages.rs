use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};

use campuswatch_api::crypto;

use crate::AppConfig;
use crate::routes::auth::{SESSION_COOKIE, cookie_value, now_unix};
use crate::storage::Db;

const INDEX_HTML: &str = include_str!("../../templates/index.html");
const DASHBOARD_HTML: &str = include_str!("../../templates/dashboard.html");
const ADMIN_HTML: &str = include_str!("../../templates/admin.html");
const ACCESS_DENIED_HTML: &str = include_str!("../../templates/access_denied.html");

/// GET / — landing page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /dashboard — report submission shell; data comes from the JSON API.
pub async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /admin — staff-only page.
///
/// Unauthenticated visitors are sent to /login; an authenticated non-staff
/// user gets an access-denied page (403), not a redirect, so the two
/// failures stay distinguishable in the browser too.
pub async fn admin(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    headers: HeaderMap,
) -> Response {
    let login = cookie_value(&headers, SESSION_COOKIE)
        .and_then(|token| crypto::verify_session(&token, &config.session_secret, now_unix()).ok());

    let Some(login) = login else {
        return Redirect::temporary("/login").into_response();
    };

    let user = match db.user_by_login(&login) {
        Ok(Some(user)) => user,
        Ok(None) => return Redirect::temporary("/login").into_response(),
        Err(e) => {
            tracing::error!("admin page lookup: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !user.is_staff {
        return (
            StatusCode::FORBIDDEN,
            Html(render(ACCESS_DENIED_HTML, &user.display_name)),
        )
            .into_response();
    }

    Html(render(ADMIN_HTML, &user.display_name)).into_response()
}

fn render(template: &str, user_name: &str) -> String {
    template.replace("{{user_name}}", &html_escape(user_name))
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_and_escapes_the_name() {
        let page = render("<p>Hello {{user_name}}</p>", "Jane <script>");
        assert_eq!(page, "<p>Hello Jane &lt;script&gt;</p>");
    }

    #[test]
    fn templates_carry_the_name_placeholder() {
        assert!(ADMIN_HTML.contains("{{user_name}}"));
        assert!(ACCESS_DENIED_HTML.contains("{{user_name}}"));
    }
}
