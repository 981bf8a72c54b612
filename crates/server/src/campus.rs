//! Campus identity-provider HTTP adapter.
//!
//! Thin wrapper around `reqwest` over the pure URL builders and payload
//! parsers in `campuswatch_api::oauth`. Constructed once in `main` and
//! carried in the application state — nothing here is process-global.

use std::future::Future;

use campuswatch_api::oauth::{self, ProviderConfig};
use campuswatch_api::{Profile, ServiceError, StudentSearchResult};

#[derive(Clone)]
pub struct CampusClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl CampusClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Authorize URL for the browser redirect, embedding the anti-forgery
    /// state the callback must round-trip.
    pub fn authorize_url(&self, state: &str) -> String {
        oauth::build_authorize_url(&self.config, state)
    }

    /// Exchange an authorization code for the authenticated user's profile.
    /// Token-exchange failure, a non-200 profile fetch, and a malformed
    /// profile payload all surface as upstream auth errors.
    pub async fn exchange_code(&self, code: &str) -> Result<Profile, ServiceError> {
        let raw = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&oauth::build_token_request_form(&self.config, code))
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(format!("token exchange request: {e}")))?
            .text()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(format!("token exchange body: {e}")))?;
        let token = oauth::parse_access_token_response(&raw)?;

        let resp = self
            .http
            .get(format!("{}/me", self.config.api_base_url))
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(format!("profile request: {e}")))?;
        if !resp.status().is_success() {
            return Err(ServiceError::UpstreamAuth(format!(
                "profile fetch returned {}",
                resp.status()
            )));
        }
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(format!("profile decode: {e}")))?;

        oauth::extract_profile(&json)
    }

    /// Service-level bearer token via the client-credentials grant.
    pub async fn client_credentials_token(&self) -> Result<String, ServiceError> {
        let raw = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&oauth::build_client_credentials_form(&self.config))
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(format!("service token request: {e}")))?
            .text()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(format!("service token body: {e}")))?;
        oauth::parse_access_token_response(&raw)
    }

    /// Live provider search: up to 10 members whose login matches `query`.
    pub async fn search_users(
        &self,
        query: &str,
        token: &str,
    ) -> Result<Vec<StudentSearchResult>, ServiceError> {
        let json = self
            .get_json(&oauth::search_users_url(&self.config, query), token, "search")
            .await?;
        oauth::parse_search_results(&json)
    }

    /// Ordered project names from a student's enrollment records.
    pub async fn student_projects(
        &self,
        login: &str,
        token: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let json = self
            .get_json(
                &oauth::student_projects_url(&self.config, login),
                token,
                "projects",
            )
            .await?;
        oauth::parse_project_names(&json)
    }

    /// One page of the campus-membership listing.
    pub async fn campus_users_page(
        &self,
        campus_id: i64,
        token: &str,
        page: usize,
    ) -> Result<Vec<Profile>, ServiceError> {
        let url =
            oauth::campus_users_url(&self.config, campus_id, page, oauth::CAMPUS_PAGE_SIZE);
        let json = self.get_json(&url, token, "campus listing").await?;
        oauth::parse_campus_page(&json)
    }

    /// Full campus membership. Any page failure aborts the whole listing —
    /// the caller never sees a partial accumulation.
    pub async fn all_campus_users(
        &self,
        campus_id: i64,
        token: &str,
    ) -> Result<Vec<Profile>, ServiceError> {
        collect_paginated(|page| self.campus_users_page(campus_id, token, page)).await
    }

    async fn get_json(
        &self,
        url: &str,
        token: &str,
        context: &str,
    ) -> Result<serde_json::Value, ServiceError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamApi(format!("{context} request: {e}")))?;
        if !resp.status().is_success() {
            return Err(ServiceError::UpstreamApi(format!(
                "{context} returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| ServiceError::UpstreamApi(format!("{context} decode: {e}")))
    }
}

/// Walk a paginated listing from page 1, accumulating until a short page
/// (< page size) or an empty page signals end of data.
async fn collect_paginated<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, ServiceError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ServiceError>>,
{
    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch_page(page).await?;
        if batch.is_empty() {
            break;
        }
        let short = batch.len() < oauth::CAMPUS_PAGE_SIZE;
        all.extend(batch);
        if short {
            break;
        }
        page += 1;
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paged(counts: &[usize]) -> Mutex<Vec<Vec<u32>>> {
        Mutex::new(counts.iter().map(|&n| vec![0u32; n]).collect())
    }

    async fn run(pages: &Mutex<Vec<Vec<u32>>>, fetched: &AtomicUsize) -> Result<Vec<u32>, ServiceError> {
        collect_paginated(|_page| {
            fetched.fetch_add(1, Ordering::SeqCst);
            let batch = {
                let mut remaining = pages.lock().expect("pages mutex");
                if remaining.is_empty() {
                    Vec::new()
                } else {
                    remaining.remove(0)
                }
            };
            async move { Ok(batch) }
        })
        .await
    }

    #[tokio::test]
    async fn pagination_stops_after_empty_page() {
        let pages = paged(&[100, 0]);
        let fetched = AtomicUsize::new(0);
        let all = run(&pages, &fetched).await.expect("listing");
        assert_eq!(all.len(), 100);
        assert_eq!(fetched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pagination_stops_after_short_page() {
        let pages = paged(&[100, 42]);
        let fetched = AtomicUsize::new(0);
        let all = run(&pages, &fetched).await.expect("listing");
        assert_eq!(all.len(), 142);
        assert_eq!(fetched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_first_page_needs_one_fetch() {
        let pages = paged(&[7]);
        let fetched = AtomicUsize::new(0);
        let all = run(&pages, &fetched).await.expect("listing");
        assert_eq!(all.len(), 7);
        assert_eq!(fetched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_error_discards_accumulation() {
        let fetched = AtomicUsize::new(0);
        let result: Result<Vec<u32>, ServiceError> = collect_paginated(|page| {
            fetched.fetch_add(1, Ordering::SeqCst);
            async move {
                if page == 1 {
                    Ok(vec![0u32; 100])
                } else {
                    Err(ServiceError::UpstreamApi("campus listing returned 500".into()))
                }
            }
        })
        .await;
        assert!(result.is_err(), "partial accumulation must not be returned");
        assert_eq!(fetched.load(Ordering::SeqCst), 2);
    }
}
