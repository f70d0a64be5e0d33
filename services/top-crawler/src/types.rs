//!
//! src/types.rs  Andrew Belles  Sept 13th, 2025
//!
//! Record shapes persisted by the two pipelines and the trait that lets
//! the merge, store and table code stay generic over them.
//!

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::{Postgres, query_builder::Separated};

use crate::errors::CrawlerError;

pub const UNKNOWN_GENRE: &str = "Unknown Genre";

/// Spotify's `time_range` windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Short,
    Medium,
    Long
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Short  => "short_term",
            TimeRange::Medium => "medium_term",
            TimeRange::Long   => "long_term"
        }
    }
    pub fn parse(s: &str) -> Option<TimeRange> {
        match s {
            "short_term"  => Some(TimeRange::Short),
            "medium_term" => Some(TimeRange::Medium),
            "long_term"   => Some(TimeRange::Long),
            _ => None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKind {
    Artists,
    Tracks
}

impl TopKind {
    /// Path segment under `/me/top/`
    pub fn as_str(self) -> &'static str {
        match self {
            TopKind::Artists => "artists",
            TopKind::Tracks  => "tracks"
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TopKind::Artists => "Top Artists",
            TopKind::Tracks  => "Top Tracks"
        }
    }

    /// Cumulative, deduplicated history
    pub fn history_file(self) -> String {
        format!("all_top_{}.json", self.as_str())
    }

    /// Only what the current run fetched
    pub fn fresh_file(self) -> String {
        format!("top_{}.json", self.as_str())
    }

    pub fn table(self) -> String {
        format!("all_top_{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str
}

///
/// A row of one of the historical sets. `key` is the natural key the merge
/// collapses on; `COLUMNS` mirror the serde field names in order.
///
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: TopKind;
    const COLUMNS: &'static [Column];

    fn key(&self) -> &str;

    /// Converts one raw item from `/me/top/{kind}`
    fn from_item(item: &Value) -> Result<Self, CrawlerError>;

    /// Binds this record's values in `COLUMNS` order
    fn push_row(&self, row: &mut Separated<'_, '_, Postgres, &'static str>);

    /// Ordering applied to the merged set before it is persisted
    fn finalize(_records: &mut Vec<Self>) {}
}

fn required_str<'a>(item: &'a Value, pointer: &str, kind: TopKind) ->
    Result<&'a str, CrawlerError> {
    item.pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| CrawlerError::Parse(
            format!("{} item missing {pointer}", kind.as_str())
        ))
}

fn required_i64(item: &Value, pointer: &str, kind: TopKind) ->
    Result<i64, CrawlerError> {
    item.pointer(pointer)
        .and_then(Value::as_i64)
        .ok_or_else(|| CrawlerError::Parse(
            format!("{} item missing {pointer}", kind.as_str())
        ))
}

/// Popularity is 0..=100 upstream; anything outside i32 is a malformed item
fn required_i32(item: &Value, pointer: &str, kind: TopKind) ->
    Result<i32, CrawlerError> {
    let n = required_i64(item, pointer, kind)?;
    i32::try_from(n).map_err(|_| CrawlerError::Parse(
        format!("{} item {pointer} out of range: {n}", kind.as_str())
    ))
}

fn required_genres(item: &Value, kind: TopKind) -> Result<Vec<String>, CrawlerError> {
    let invalid = || CrawlerError::Parse(
        format!("{} item missing /genres", kind.as_str())
    );
    let mut genres = item.get("genres")
        .and_then(Value::as_array)
        .ok_or_else(invalid)?
        .iter()
        .map(|g| g.as_str().map(str::to_string).ok_or_else(invalid))
        .collect::<Result<Vec<String>, _>>()?;
    if genres.is_empty() {
        genres.push(UNKNOWN_GENRE.to_string());
    }
    Ok(genres)
}

/// The key must be present; `null` is the only accepted non-string
fn nullable_str(item: &Value, key: &str, kind: TopKind) ->
    Result<Option<String>, CrawlerError> {
    match item.get(key) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Null) => Ok(None),
        _ => Err(CrawlerError::Parse(
            format!("{} item missing /{key}", kind.as_str())
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: i32,
    pub profile_link: String
}

impl Record for ArtistRecord {
    const KIND: TopKind = TopKind::Artists;
    const COLUMNS: &'static [Column] = &[
        Column { name: "name",         sql_type: "TEXT" },
        Column { name: "genres",       sql_type: "TEXT[]" },
        Column { name: "popularity",   sql_type: "INTEGER" },
        Column { name: "profile_link", sql_type: "TEXT" },
    ];

    fn key(&self) -> &str {
        &self.name
    }

    fn from_item(item: &Value) -> Result<Self, CrawlerError> {
        let kind = Self::KIND;
        Ok(Self {
            name: required_str(item, "/name", kind)?.to_string(),
            genres: required_genres(item, kind)?,
            popularity: required_i32(item, "/popularity", kind)?,
            profile_link: required_str(item, "/external_urls/spotify", kind)?.to_string()
        })
    }

    fn push_row(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.name.clone())
            .push_bind(self.genres.clone())
            .push_bind(self.popularity)
            .push_bind(self.profile_link.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub track_name: String,
    pub artist_name: String,
    pub duration_ms: i64,
    pub popularity: i32,
    pub preview_link: Option<String>
}

impl Record for TrackRecord {
    const KIND: TopKind = TopKind::Tracks;
    const COLUMNS: &'static [Column] = &[
        Column { name: "id",           sql_type: "TEXT" },
        Column { name: "track_name",   sql_type: "TEXT" },
        Column { name: "artist_name",  sql_type: "TEXT" },
        Column { name: "duration_ms",  sql_type: "BIGINT" },
        Column { name: "popularity",   sql_type: "INTEGER" },
        Column { name: "preview_link", sql_type: "TEXT" },
    ];

    fn key(&self) -> &str {
        &self.id
    }

    fn from_item(item: &Value) -> Result<Self, CrawlerError> {
        let kind = Self::KIND;
        Ok(Self {
            id: required_str(item, "/uri", kind)?.to_string(),
            track_name: required_str(item, "/name", kind)?.to_string(),
            artist_name: required_str(item, "/artists/0/name", kind)?.to_string(),
            duration_ms: required_i64(item, "/duration_ms", kind)?,
            popularity: required_i32(item, "/popularity", kind)?,
            preview_link: nullable_str(item, "preview_url", kind)?
        })
    }

    fn push_row(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.id.clone())
            .push_bind(self.track_name.clone())
            .push_bind(self.artist_name.clone())
            .push_bind(self.duration_ms)
            .push_bind(self.popularity)
            .push_bind(self.preview_link.clone());
    }

    fn finalize(records: &mut Vec<Self>) {
        records.sort_by(|a, b| a.track_name.cmp(&b.track_name));
    }
}
