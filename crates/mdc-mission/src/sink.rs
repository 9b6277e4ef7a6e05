use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use mdc_proto::record::CollectionCycleRecord;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("results file i/o")]
    Io(#[from] std::io::Error),
    #[error("results encoding")]
    Json(#[from] serde_json::Error),
    #[error("{0} does not end with a JSON array")]
    Malformed(PathBuf),
}

pub trait RecordSink: Send {
    fn append(&mut self, record: &CollectionCycleRecord) -> Result<(), SinkError>;
}

/// In-memory log.
impl RecordSink for Vec<CollectionCycleRecord> {
    fn append(&mut self, record: &CollectionCycleRecord) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}

/// JSON array on disk, grown in place: the closing `\n]` is cut off and
/// rewritten after the new entry so the file stays a valid array.
#[derive(Debug, Clone)]
pub struct JsonArrayFile {
    path: PathBuf,
}

impl JsonArrayFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<CollectionCycleRecord>, SinkError> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl RecordSink for JsonArrayFile {
    fn append(&mut self, record: &CollectionCycleRecord) -> Result<(), SinkError> {
        let body = serde_json::to_string_pretty(record)?;
        let mut f = OpenOptions::new().read(true).write(true).create(true).open(&self.path)?;
        let len = f.metadata()?.len();

        if len == 0 {
            write!(f, "[\n{}\n]", body)?;
        } else {
            if len < 2 {
                return Err(SinkError::Malformed(self.path.clone()));
            }
            let mut tail = [0u8; 2];
            f.seek(SeekFrom::End(-2))?;
            f.read_exact(&mut tail)?;
            if &tail != b"\n]" {
                return Err(SinkError::Malformed(self.path.clone()));
            }
            f.set_len(len - 2)?;
            f.seek(SeekFrom::End(0))?;
            write!(f, ",\n{}\n]", body)?;
        }
        f.sync_all()?;

        info!("results appended to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdc_proto::record::NodeSummary;

    fn record(scenario: &str, reliability: f64) -> CollectionCycleRecord {
        CollectionCycleRecord {
            scenario: scenario.into(),
            start_time: "2024-06-01T14:00:00Z".into(),
            end_time: Some("2024-06-01T14:03:10Z".into()),
            duration_s: Some(190.0),
            reliability: Some(reliability),
            aborted: false,
            nodes: vec![NodeSummary { node: 2, mean_latency_s: Some(0.31), awake_duration_ms: Some(2300) }],
        }
    }

    #[test]
    fn appends_keep_a_valid_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonArrayFile::new(dir.path().join("MDCn_naive.json"));

        sink.append(&record("WuR", 1.0)).unwrap();
        sink.append(&record("DC ( 100 / 1000 )", 0.5)).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert!(text.starts_with("[\n"));
        assert!(text.ends_with("\n]"));

        let all = sink.load().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], record("WuR", 1.0));
        assert_eq!(all[1].reliability, Some(0.5));
    }

    #[test]
    fn refuses_to_extend_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, "{\"a\": 1}\n").unwrap();

        let mut sink = JsonArrayFile::new(&path);
        assert!(matches!(sink.append(&record("WuR", 1.0)), Err(SinkError::Malformed(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\": 1}\n");
    }
}
