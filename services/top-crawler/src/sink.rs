//!
//! src/sink.rs  Andrew Belles  Sept 12th, 2025
//!
//! Local json persistence for the historical and fresh record sets.
//! Files are json arrays indented by four spaces and always fully rewritten.
//!

use std::{fs, io::{BufReader, Write}, path::{Path, PathBuf}};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::debug;

use crate::errors::CrawlerError;
use crate::types::Record;

pub struct JsonSink {
    root: PathBuf
}

impl JsonSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Reads a previously written set; a missing file is an empty history
    pub fn read_records<R: Record>(&self, file: &str) -> Result<Vec<R>, CrawlerError> {
        let path = self.path(file);
        let handle = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store.read.absent");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let records: Vec<R> = serde_json::from_reader(BufReader::new(handle))
            .map_err(|e| CrawlerError::Parse(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), count = records.len(), "store.read");
        Ok(records)
    }

    /// Replaces `file` atomically with `records`
    pub fn write_records<R: Record>(&self, file: &str, records: &[R]) ->
        Result<PathBuf, CrawlerError> {
        let path = self.path(file);
        let parent = path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        fs::create_dir_all(&parent).map_err(|e|
            CrawlerError::Io(std::io::Error::new(
                e.kind(), format!("create dir {}: {e}", parent.display())
            )))?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        {
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut ser = Serializer::with_formatter(temp.as_file_mut(), formatter);
            records.serialize(&mut ser)?;
        }
        temp.as_file_mut().write_all(b"\n")?;
        temp.as_file_mut().sync_all()?;

        temp.persist(&path).map_err(|e|
            CrawlerError::Io(std::io::Error::new(
                e.error.kind(), format!("persist {}: {}", path.display(), e.error)
            )))?;

        debug!(path = %path.display(), count = records.len(), "store.write");
        Ok(path)
    }
}
