//!
//! src/fetch.rs  Andrew Belles  Sept 10th, 2025
//!
//! Defines methods for hitting the Spotify endpoints the pipelines need
//! and returning unparsed items. There is no retry; a failed call ends the run.
//!

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, header, redirect};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::SpotifyAuth;
use crate::config::{HttpConfig, SpotifyConfig};
use crate::types::{TimeRange, TopKind};
use crate::CrawlerError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder  {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, CrawlerError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| CrawlerError::Http(format!("build client: {e}")))
}

/// 401/403 mean the token or grant is bad; anything else is a plain http failure
pub fn status_error(status: StatusCode, body: &str) -> CrawlerError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN =>
            CrawlerError::Auth(format!("status {status}: {body}")),
        _ => CrawlerError::Http(format!("status {status}: {body}")),
    }
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    pub http: Client,
    pub cfg: SpotifyConfig
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) ->
        Result<Self, CrawlerError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    /// POST {token_url} with client credentials and a form grant
    pub fn token_request(&self, form: &[(&str, &str)]) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(form)
    }

    /// GET /v1/me/top/{artists|tracks}?limit=&time_range=
    pub fn top_items(
        &self,
        kind: TopKind,
        limit: u32,
        window: TimeRange,
        bearer: &str
    ) -> Result<RequestBuilder, CrawlerError> {
        let url = self.cfg.api_base.join(&format!("me/top/{}", kind.as_str()))
            .map_err(|e| CrawlerError::Config(format!("top url: {e}")))?;
        Ok(self.http.get(url).bearer_auth(bearer).query(&[
            ("limit", limit.to_string().as_str()),
            ("time_range", window.as_str())
        ]))
    }
}

///
/// The single read the pipelines make against the streaming api
///
#[async_trait]
pub trait TopSource: Send + Sync {
    async fn fetch_top(&self, kind: TopKind, limit: u32, window: TimeRange) ->
        Result<Vec<Value>, CrawlerError>;
}

pub struct SpotifyTopSource {
    client: SpotifyClient,
    auth: SpotifyAuth
}

impl SpotifyTopSource {
    pub fn new(client: SpotifyClient, auth: SpotifyAuth) -> Self {
        Self { client, auth }
    }
}

#[async_trait]
impl TopSource for SpotifyTopSource {
    async fn fetch_top(&self, kind: TopKind, limit: u32, window: TimeRange) ->
        Result<Vec<Value>, CrawlerError> {
        let bearer = self.auth.access_token().await?;

        debug!(kind = kind.as_str(), limit, window = window.as_str(), "fetch.top");
        let response = self.client.top_items(kind, limit, window, &bearer)?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let mut page: Value = response.json().await?;
        let items = match page.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(CrawlerError::Parse(
                format!("top {} response has no items array", kind.as_str())
            )),
        };

        info!(kind = kind.as_str(), count = items.len(), "fetch.top.done");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config;

    fn live() -> bool {
        std::env::var("LIVE_HTTP").ok().as_deref() == Some("1")
    }

    fn test_client() -> SpotifyClient {
        let vars = HashMap::from([
            ("SPOTIFY_ID", "client"),
            ("SPOTIFY_SECRET", "secret"),
            ("POSTGRES_NAME", "u"),
            ("POSTGRES_PASSWORD", "p"),
            ("POSTGRES_HOST", "localhost"),
            ("POSTGRES_PORT", "5432"),
            ("POSTGRES_DB", "d"),
        ]);
        let cfgs = config::load_config_from(
            &|k: &str| vars.get(k).map(|v| v.to_string())
        ).unwrap();
        SpotifyClient::new(&cfgs.http, &cfgs.spotify).unwrap()
    }

    #[test]
    fn top_items_targets_me_top_with_query() {
        let spotify = test_client();
        let request = spotify.top_items(TopKind::Tracks, 50, TimeRange::Medium, "tok")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.url().path(), "/v1/me/top/tracks");
        assert_eq!(request.url().query(), Some("limit=50&time_range=medium_term"));
        assert_eq!(
            request.headers().get(header::AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn token_request_uses_basic_auth_and_form() {
        let spotify = test_client();
        let request = spotify.token_request(&[("grant_type", "refresh_token")])
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "https://accounts.spotify.com/api/token");
        let auth = request.headers().get(header::AUTHORIZATION).unwrap();
        assert!(auth.to_str().unwrap().starts_with("Basic "));
        assert_eq!(
            request.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn unauthorized_maps_to_auth_error() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "expired"), CrawlerError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "scope"), CrawlerError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""), CrawlerError::Http(_)
        ));
    }

    #[tokio::test]
    async fn spotify_top_testbench() -> Result<(), CrawlerError> {
        dotenvy::dotenv().ok();

        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let spotify = SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;
        let auth = SpotifyAuth::new(spotify.clone());
        let source = SpotifyTopSource::new(spotify, auth);

        let items = source.fetch_top(TopKind::Artists, 5, TimeRange::Short).await?;
        println!("artists: {}", serde_json::to_string_pretty(&items)?);
        assert!(items.len() <= 5);

        Ok(())
    }
}
