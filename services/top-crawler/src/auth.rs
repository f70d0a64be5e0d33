//!
//! src/auth.rs  Andrew Belles  Sept 14th, 2025
//!
//! Spotify authorization code flow for `user-top-read`. Tokens are cached
//! on disk and refreshed when close to expiry; the browser round trip only
//! happens when there is nothing usable in the cache.
//!

use std::{fs, io::{ErrorKind, Write}, path::{Path, PathBuf}};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SpotifyConfig;
use crate::fetch::{SpotifyClient, status_error};
use crate::CrawlerError;

/// Tokens this close to expiry are treated as expired
pub const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: i64,            // unix seconds
    pub refresh_token: Option<String>
}

impl CachedToken {
    pub fn is_fresh(&self, now: i64) -> bool {
        self.expires_at - now > EXPIRY_SKEW_SECS
    }
}

/// Body returned by the token endpoint for both grants
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    scope: Option<String>,
    expires_in: i64,
    refresh_token: Option<String>
}

fn bearer() -> String { "Bearer".to_string() }

impl TokenResponse {
    /// A refresh may omit the refresh token, in which case the old one stays valid
    fn into_cached(self, now: i64, previous_refresh: Option<String>) -> CachedToken {
        CachedToken {
            access_token: self.access_token,
            token_type: self.token_type,
            scope: self.scope,
            expires_at: now + self.expires_in,
            refresh_token: self.refresh_token.or(previous_refresh)
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct TokenCache {
    path: PathBuf
}

impl TokenCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// A cache that is missing or unreadable just means we authorize again
    pub fn load(&self) -> Option<CachedToken> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "auth.cache.unreadable");
                return None
            }
        };
        match serde_json::from_str(&text) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "auth.cache.invalid");
                None
            }
        }
    }

    pub fn save(&self, token: &CachedToken) -> Result<(), CrawlerError> {
        let parent = self.path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer(temp.as_file_mut(), token)?;
        temp.as_file_mut().flush()?;
        temp.persist(&self.path).map_err(|e| CrawlerError::Io(e.error))?;

        debug!(path = %self.path.display(), "auth.cache.saved");
        Ok(())
    }
}

/// The token endpoint answers a bad grant or bad client with 400/401/403.
/// Other failures, 429 included, keep their http classification.
fn grant_error(status: StatusCode, body: &str) -> CrawlerError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN =>
            CrawlerError::Auth(format!("status {status}: {body}")),
        _ => status_error(status, body),
    }
}

/// Where the user is sent to grant access
pub fn authorize_url(cfg: &SpotifyConfig, state: &str) -> Url {
    let mut url = cfg.auth_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &cfg.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", cfg.redirect_uri.as_str())
        .append_pair("scope", &cfg.scope)
        .append_pair("state", state);
    url
}

///
/// Pulls the authorization code out of the url the browser was redirected
/// to. The `state` must round trip unchanged.
///
pub fn parse_redirect(redirected: &str, expected_state: &str) ->
    Result<String, CrawlerError> {
    let url = Url::parse(redirected.trim())
        .map_err(|e| CrawlerError::Auth(format!("redirect url invalid: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "error" => return Err(CrawlerError::Auth(format!("authorization denied: {v}"))),
            "code"  => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(CrawlerError::Auth("state mismatch in redirect".to_string()));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| CrawlerError::Auth("no code in redirect".to_string()))
}

async fn prompt_for_redirect(url: &Url) -> Result<String, CrawlerError> {
    println!("Open this url in a browser and grant access:\n\n    {url}\n");
    println!("Then paste the url you were redirected to:");

    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .map_err(|e| CrawlerError::Auth(format!("prompt aborted: {e}")))?
    .map_err(CrawlerError::from)
}

pub struct SpotifyAuth {
    client: SpotifyClient,
    cache: TokenCache
}

impl SpotifyAuth {
    pub fn new(client: SpotifyClient) -> Self {
        let cache = TokenCache::new(&client.cfg.token_cache);
        Self { client, cache }
    }

    /// A bearer token valid for at least `EXPIRY_SKEW_SECS`
    pub async fn access_token(&self) -> Result<String, CrawlerError> {
        let token = match self.cache.load() {
            Some(token) if token.is_fresh(now()) => {
                debug!("auth.cache.hit");
                token
            }
            Some(CachedToken { refresh_token: Some(refresh), .. }) => {
                info!("auth.refresh");
                let token = self.refresh(&refresh).await?;
                self.cache.save(&token)?;
                token
            }
            _ => {
                info!("auth.authorize");
                let token = self.authorize().await?;
                self.cache.save(&token)?;
                token
            }
        };
        Ok(token.access_token)
    }

    async fn authorize(&self) -> Result<CachedToken, CrawlerError> {
        let state = uuid::Uuid::new_v4().to_string();
        let url = authorize_url(&self.client.cfg, &state);
        let redirected = prompt_for_redirect(&url).await?;
        let code = parse_redirect(&redirected, &state)?;

        let redirect_uri = self.client.cfg.redirect_uri.to_string();
        self.grant(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str())
        ], None).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CachedToken, CrawlerError> {
        self.grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token)
        ], Some(refresh_token.to_string())).await
    }

    async fn grant(&self, form: &[(&str, &str)], previous_refresh: Option<String>) ->
        Result<CachedToken, CrawlerError> {
        let response = self.client.token_request(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(grant_error(status, &body));
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.into_cached(now(), previous_refresh))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config;

    fn spotify_cfg() -> SpotifyConfig {
        let vars = HashMap::from([
            ("SPOTIFY_ID", "client-123"),
            ("SPOTIFY_SECRET", "secret"),
            ("POSTGRES_NAME", "u"),
            ("POSTGRES_PASSWORD", "p"),
            ("POSTGRES_HOST", "localhost"),
            ("POSTGRES_PORT", "5432"),
            ("POSTGRES_DB", "d"),
        ]);
        config::load_config_from(&|k: &str| vars.get(k).map(|v| v.to_string()))
            .unwrap()
            .spotify
    }

    fn token(expires_at: i64) -> CachedToken {
        CachedToken {
            access_token: "access".to_string(),
            token_type: "Bearer".to_string(),
            scope: Some("user-top-read".to_string()),
            expires_at,
            refresh_token: Some("refresh".to_string())
        }
    }

    #[test]
    fn authorize_url_carries_flow_parameters() {
        let url = authorize_url(&spotify_cfg(), "state-1");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8888/callback");
        assert_eq!(pairs["scope"], "user-top-read");
        assert_eq!(pairs["state"], "state-1");
    }

    #[test]
    fn redirect_yields_code_when_state_matches() {
        let code = parse_redirect(
            "http://127.0.0.1:8888/callback?code=AQB42&state=abc\n", "abc"
        ).unwrap();
        assert_eq!(code, "AQB42");
    }

    #[test]
    fn redirect_rejects_denial_mismatch_and_missing_code() {
        let denied = parse_redirect(
            "http://127.0.0.1:8888/callback?error=access_denied&state=abc", "abc"
        );
        assert!(matches!(denied, Err(CrawlerError::Auth(ref m)) if m.contains("access_denied")));

        let mismatch = parse_redirect(
            "http://127.0.0.1:8888/callback?code=x&state=other", "abc"
        );
        assert!(matches!(mismatch, Err(CrawlerError::Auth(_))));

        let no_code = parse_redirect("http://127.0.0.1:8888/callback?state=abc", "abc");
        assert!(matches!(no_code, Err(CrawlerError::Auth(_))));

        assert!(parse_redirect("not a url", "abc").is_err());
    }

    #[test]
    fn freshness_respects_skew() {
        assert!(token(1_000 + EXPIRY_SKEW_SECS + 1).is_fresh(1_000));
        assert!(!token(1_000 + EXPIRY_SKEW_SECS).is_fresh(1_000));
        assert!(!token(500).is_fresh(1_000));
    }

    #[test]
    fn refresh_without_new_refresh_token_keeps_old_one() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"access_token": "new", "token_type": "Bearer",
                "scope": "user-top-read", "expires_in": 3600}"#
        ).unwrap();
        let cached = body.into_cached(100, Some("old-refresh".to_string()));

        assert_eq!(cached.access_token, "new");
        assert_eq!(cached.expires_at, 3_700);
        assert_eq!(cached.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn only_credential_statuses_become_auth_errors() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(grant_error(status, "invalid_grant"), CrawlerError::Auth(_)));
        }
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR
        ] {
            assert!(matches!(grant_error(status, ""), CrawlerError::Http(_)));
        }
    }

    #[test]
    fn unreadable_cache_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        // reading a directory is an io error other than NotFound
        let cache = TokenCache::new(dir.path());
        assert_eq!(cache.load(), None);

        let cache = TokenCache::new(dir.path().join("missing").join(".cache"));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn cache_round_trips_and_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join(".cache"));
        assert_eq!(cache.load(), None);

        cache.save(&token(42)).unwrap();
        assert_eq!(cache.load(), Some(token(42)));

        fs::write(dir.path().join(".cache"), "{not json").unwrap();
        assert_eq!(cache.load(), None);
    }
}
