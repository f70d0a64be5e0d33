//!
//! src/pipeline.rs  Andrew Belles  Sept 14th, 2025
//!
//! One run of a top artists or top tracks pipeline:
//! read history -> fetch -> merge -> write json -> replace table.
//! Each step finishes before the next starts and any error ends the run.
//!

use tracing::{info, instrument};

use crate::config::TopConfig;
use crate::errors::CrawlerError;
use crate::fetch::TopSource;
use crate::merge;
use crate::persistent::TableSink;
use crate::sink::JsonSink;
use crate::types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub historical: usize,
    pub fresh: usize,
    pub merged: usize
}

pub struct Pipeline<'a, S: TopSource, D: TableSink> {
    pub top: TopConfig,
    pub source: &'a S,
    pub store: &'a JsonSink,
    pub db: &'a D
}

impl<'a, S: TopSource, D: TableSink> Pipeline<'a, S, D> {
    pub fn new(top: TopConfig, source: &'a S, store: &'a JsonSink, db: &'a D) -> Self {
        Self { top, source, store, db }
    }

    #[instrument(skip(self), fields(kind = R::KIND.as_str()))]
    pub async fn run<R: Record>(&self) -> Result<RunSummary, CrawlerError> {
        let kind = R::KIND;
        info!(limit = self.top.limit, window = self.top.time_range.as_str(), "pipeline.start");

        let historical: Vec<R> = self.store.read_records(&kind.history_file())?;
        let historical_len = historical.len();

        let items = self.source
            .fetch_top(kind, self.top.limit, self.top.time_range)
            .await?;
        let fresh = items.iter()
            .map(R::from_item)
            .collect::<Result<Vec<R>, _>>()?;

        let merged = merge::merge(historical, &fresh);

        self.store.write_records(&kind.fresh_file(), &fresh)?;
        self.store.write_records(&kind.history_file(), &merged)?;

        self.db.replace_table(&kind.table(), &merged).await?;

        let summary = RunSummary {
            historical: historical_len,
            fresh: fresh.len(),
            merged: merged.len()
        };
        info!(
            historical = summary.historical,
            fresh = summary.fresh,
            merged = summary.merged,
            "pipeline.done"
        );
        Ok(summary)
    }
}
