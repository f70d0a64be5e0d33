//!
//! src/main.rs  Andrew Belles  Sept 13, 2025
//!
//! Entry point of the top artists / top tracks pipelines. Meant to be run
//! by a scheduler, one invocation at a time:
//!
//!     top-crawler artists | tracks | all
//!

mod auth;
mod config;
mod errors;
mod logging;

mod fetch;
mod merge;
mod persistent;
mod pipeline;
mod sink;
mod types;

use crate::errors::CrawlerError;
use crate::types::{ArtistRecord, TopKind, TrackRecord};

/// Which pipelines the invocation runs, parsed from the first argument
fn selected_kinds(arg: Option<&str>) -> Result<Vec<TopKind>, CrawlerError> {
    match arg {
        Some("artists") => Ok(vec![TopKind::Artists]),
        Some("tracks")  => Ok(vec![TopKind::Tracks]),
        Some("all")     => Ok(vec![TopKind::Artists, TopKind::Tracks]),
        Some(other) => Err(CrawlerError::Config(
            format!("unknown pipeline {other:?}, expected artists|tracks|all")
        )),
        None => Err(CrawlerError::Config(
            "usage: top-crawler artists|tracks|all".to_string()
        )),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CrawlerError> {
    let arg = std::env::args().nth(1);
    let kinds = selected_kinds(arg.as_deref())?;

    let cfgs = config::load_config()?;
    let _guard = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service="top-crawler",
        version=%env!("CARGO_PKG_VERSION"),
        config=?cfgs,
        "starting"
    );

    let spotify = fetch::SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;
    let auth    = auth::SpotifyAuth::new(spotify.clone());
    let source  = fetch::SpotifyTopSource::new(spotify, auth);
    let store   = sink::JsonSink::new(&cfgs.store.data_dir);
    let db      = persistent::Persistent::new(&cfgs.postgres);
    let pipeline = pipeline::Pipeline::new(cfgs.top, &source, &store, &db);

    for kind in kinds {
        match kind {
            TopKind::Artists => pipeline.run::<ArtistRecord>().await?,
            TopKind::Tracks  => pipeline.run::<TrackRecord>().await?,
        };

        println!("{} Pipeline executed!", kind.label());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    #[test]
    fn argument_selects_pipelines() {
        assert_eq!(selected_kinds(Some("artists")).unwrap(), vec![TopKind::Artists]);
        assert_eq!(selected_kinds(Some("tracks")).unwrap(), vec![TopKind::Tracks]);
        assert_eq!(
            selected_kinds(Some("all")).unwrap(),
            vec![TopKind::Artists, TopKind::Tracks]
        );
        assert!(selected_kinds(Some("albums")).is_err());
        assert!(selected_kinds(None).is_err());
    }

    #[test]
    fn record_kinds_line_up_with_pipelines() {
        assert_eq!(ArtistRecord::KIND, TopKind::Artists);
        assert_eq!(TrackRecord::KIND, TopKind::Tracks);
    }
}
