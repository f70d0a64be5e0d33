//!
//! src/persistent.rs  Andrew Belles  Sept 12th, 2025
//!
//! Postgres mirror of the historical json sets. A table is a disposable
//! copy of its file: every run drops it and loads the merged set again.
//!

use async_trait::async_trait;
use sqlx::{
    Pool, Postgres, QueryBuilder,
    postgres::{PgConnectOptions, PgPoolOptions}
};
use tracing::{debug, info};

use crate::config::PostgresConfig;
use crate::errors::CrawlerError;
use crate::types::Record;

/// Keeps a single insert well under postgres' 65535 bind parameter cap
pub const INSERT_CHUNK_ROWS: usize = 1000;

///
/// Destination for a merged set
///
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn replace_table<R: Record>(&self, table: &str, records: &[R]) ->
        Result<u64, CrawlerError>;
}

/// Table names are interpolated into DDL, so only plain identifiers pass
pub fn validate_table_name(table: &str) -> Result<(), CrawlerError> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CrawlerError::Db(format!("invalid table name: {table:?}")))
    }
}

pub fn create_table_sql<R: Record>(table: &str) -> String {
    let columns = R::COLUMNS.iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {table} ({columns});")
}

fn insert_prefix<R: Record>(table: &str) -> String {
    let columns = R::COLUMNS.iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) ")
}

pub struct Persistent {
    pool: Pool<Postgres>
}

impl Persistent {
    /// Lazy pool: nothing touches the network until the first table write,
    /// so the json files are already on disk when a connection fails
    pub fn new(cfg: &PostgresConfig) -> Self {
        let opts = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.username)
            .password(&cfg.password)
            .database(&cfg.database);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(opts);

        debug!(host = %cfg.host, port = cfg.port, database = %cfg.database, "db.configured");
        Self { pool }
    }
}

#[async_trait]
impl TableSink for Persistent {
    async fn replace_table<R: Record>(&self, table: &str, records: &[R]) ->
        Result<u64, CrawlerError> {
        validate_table_name(table)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {table};"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&create_table_sql::<R>(table))
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0_u64;
        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix::<R>(table));
            builder.push_values(chunk, |mut row, record| record.push_row(&mut row));
            inserted += builder.build()
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        info!(table, rows = inserted, "db.replace_table");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtistRecord, TrackRecord};

    fn live() -> bool {
        std::env::var("LIVE_DB").ok().as_deref() == Some("1")
    }

    #[test]
    fn table_names_must_be_plain_identifiers() {
        assert!(validate_table_name("all_top_artists").is_ok());
        assert!(validate_table_name("_t2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("x; DROP TABLE users").is_err());
        assert!(validate_table_name("Mixed").is_err());
    }

    #[test]
    fn ddl_uses_record_field_names() {
        assert_eq!(
            create_table_sql::<ArtistRecord>("all_top_artists"),
            "CREATE TABLE all_top_artists (name TEXT, genres TEXT[], \
             popularity INTEGER, profile_link TEXT);"
        );
        assert_eq!(
            insert_prefix::<TrackRecord>("all_top_tracks"),
            "INSERT INTO all_top_tracks (id, track_name, artist_name, \
             duration_ms, popularity, preview_link) "
        );
    }

    #[tokio::test]
    async fn replace_table_testbench() -> Result<(), CrawlerError> {
        dotenvy::dotenv().ok();
        if !live() {
            eprintln!("Set LIVE_DB=1 to run");
            return Ok(())
        }

        let cfgs = crate::config::load_config()?;
        let db = Persistent::new(&cfgs.postgres);
        let records = vec![
            TrackRecord {
                id: "spotify:track:6GtOsEzNUhJghrIf6UTbRV".to_string(),
                track_name: "Breathe Deeper".to_string(),
                artist_name: "Tame Impala".to_string(),
                duration_ms: 372_000,
                popularity: 68,
                preview_link: None
            }
        ];

        let rows = db.replace_table("top_crawler_testbench", &records).await?;
        assert_eq!(rows, 1);
        let rows = db.replace_table("top_crawler_testbench", &records).await?;
        assert_eq!(rows, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM top_crawler_testbench;")
            .fetch_one(&db.pool)
            .await?;
        assert_eq!(count, 1);

        sqlx::query("DROP TABLE top_crawler_testbench;").execute(&db.pool).await?;
        Ok(())
    }
}
