//!
//! src/config.rs  Andrew Belles  Sept 13th, 2025
//!
//! Builds the explicit configuration for both pipelines from the process
//! environment. Everything is validated once at startup.
//!

use std::{fmt, path::PathBuf, time};

use url::Url;

use crate::CrawlerError;
use crate::types::TimeRange;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

/// Spotify never returns more than 50 top items per page
pub const TOP_LIMIT_MAX: u32 = 50;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_SCOPE: &str = "user-top-read";

/// Variable lookup used by every builder; the process env in production
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Wrapper over the lookup to return an invalid environment var error
fn env_check(env: Lookup, s: &str) -> Result<String, CrawlerError> {
    match env(s) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CrawlerError::Config(format!("{s} was not set"))),
    }
}

fn env_or(env: Lookup, s: &str, default: &str) -> String {
    env(s)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Parses a Spotify endpoint and pins it to https on the expected host
fn spotify_url(env: Lookup, var: &str, default: &str, host: &str) ->
    Result<Url, CrawlerError> {
    let raw = env_or(env, var, default);
    let url = Url::parse(&raw)
        .map_err(|e| CrawlerError::Config(format!("{var} invalid {e}")))?;

    ensure_https(&url).map_err(CrawlerError::Config)?;
    ensure_host(&url, host).map_err(CrawlerError::Config)?;
    Ok(url)
}

///
/// Configuration that Spotify expects for the authorization code flow
///
#[derive(Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub auth_url: Url,
    pub token_url: Url,
    pub api_base: Url,
    pub scope: String,
    pub token_cache: PathBuf
}

impl fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("api_base", &self.api_base.as_str())
            .field("scope", &self.scope)
            .field("token_cache", &self.token_cache)
            .finish()
    }
}

fn build_spotify(env: Lookup) -> Result<SpotifyConfig, CrawlerError> {
    let client_id     = env_check(env, "SPOTIFY_ID")?;
    let client_secret = env_check(env, "SPOTIFY_SECRET")?;

    let redirect_uri = env_or(env, "SPOTIFY_REDIRECT_URI", DEFAULT_REDIRECT_URI);
    let redirect_uri = Url::parse(&redirect_uri)
        .map_err(|e| CrawlerError::Config(format!("SPOTIFY_REDIRECT_URI invalid {e}")))?;

    let auth_url = spotify_url(
        env, "SPOTIFY_AUTH_URL",
        "https://accounts.spotify.com/authorize", "accounts.spotify.com"
    )?;
    let token_url = spotify_url(
        env, "SPOTIFY_TOKEN_URL",
        "https://accounts.spotify.com/api/token", "accounts.spotify.com"
    )?;
    let mut api_base = spotify_url(
        env, "SPOTIFY_API_BASE",
        "https://api.spotify.com/v1/", "api.spotify.com"
    )?;
    ensure_trailing_slash(&mut api_base);

    let token_cache = PathBuf::from(env_or(env, "SPOTIFY_TOKEN_CACHE", ".cache"));

    Ok( SpotifyConfig {
        client_id, client_secret, redirect_uri, auth_url, token_url, api_base,
        scope: DEFAULT_SCOPE.to_string(),
        token_cache
    })
}

///
/// Connection parameters for the Postgres mirror of the historical files.
/// Each parameter comes from its own variable.
///
#[derive(Clone)]
pub struct PostgresConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

fn build_postgres(env: Lookup) -> Result<PostgresConfig, CrawlerError> {
    let username = env_check(env, "POSTGRES_NAME")?;
    let password = env_check(env, "POSTGRES_PASSWORD")?;
    let host     = env_check(env, "POSTGRES_HOST")?;
    let port     = env_check(env, "POSTGRES_PORT")?;
    let database = env_check(env, "POSTGRES_DB")?;

    let port = port.trim().parse::<u16>()
        .map_err(|e| CrawlerError::Config(format!("POSTGRES_PORT invalid {e}")))?;

    Ok( PostgresConfig { username, password, host, port, database } )
}

///
/// What to ask Spotify for on each run
///
#[derive(Debug, Clone, Copy)]
pub struct TopConfig {
    pub limit: u32,
    pub time_range: TimeRange
}

impl Default for TopConfig {
    fn default() -> Self {
        Self { limit: TOP_LIMIT_MAX, time_range: TimeRange::Medium }
    }
}

fn build_top(env: Lookup) -> Result<TopConfig, CrawlerError> {
    let mut top = TopConfig::default();

    if let Some(raw) = env("TOP_LIMIT").filter(|v| !v.trim().is_empty()) {
        let limit = raw.trim().parse::<u32>()
            .map_err(|e| CrawlerError::Config(format!("TOP_LIMIT invalid {e}")))?;
        if limit == 0 || limit > TOP_LIMIT_MAX {
            return Err(CrawlerError::Config(
                format!("TOP_LIMIT must be within 1..={TOP_LIMIT_MAX}, got {limit}")
            ));
        }
        top.limit = limit;
    }

    if let Some(raw) = env("TOP_TIME_RANGE").filter(|v| !v.trim().is_empty()) {
        top.time_range = TimeRange::parse(raw.trim()).ok_or_else(||
            CrawlerError::Config(format!("TOP_TIME_RANGE invalid: {raw}"))
        )?;
    }

    Ok(top)
}

///
/// Where the json history lives
///
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf
}

///
/// Configuration for Http timeouts, etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS
        }
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,top_crawler=debug,reqwest=warn,sqlx=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: true,
            include_file_line: true,
            include_target: true
        }
    }
}

fn build_logging(env: Lookup) -> Result<LoggingConfig, CrawlerError> {
    let mut logging = LoggingConfig::default();
    match env("LOG_FORMAT").as_deref().map(str::trim) {
        None | Some("") | Some("json") => {},
        Some("pretty") => logging.format = LogFormat::Pretty,
        Some(other) => return Err(
            CrawlerError::Config(format!("LOG_FORMAT invalid: {other}"))
        )
    }
    Ok(logging)
}

///
/// AppConfig which holds everything a pipeline run needs
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub postgres: PostgresConfig,
    pub top: TopConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, CrawlerError> {
    dotenvy::dotenv().ok();
    load_config_from(&|k: &str| std::env::var(k).ok())
}

pub fn load_config_from(env: Lookup) -> Result<AppConfig, CrawlerError> {
    let spotify  = build_spotify(env)?;
    let postgres = build_postgres(env)?;
    let top      = build_top(env)?;
    let store    = StoreConfig {
        data_dir: PathBuf::from(env_or(env, "DATA_DIR", "."))
    };
    let http     = HttpConfig::default();
    let logging  = build_logging(env)?;

    Ok( AppConfig { spotify, postgres, top, store, http, logging } )
}
