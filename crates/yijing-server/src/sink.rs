//! Append-only history of completed interpretations.
//!
//! The orchestrator appends one [`DivinationRecord`] per synchronous
//! interpretation. Sink failures are logged by the caller and never reach the
//! client.

use crate::{Error, Result, interpret::InterpretRequest, interpret::Interpretation};
use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use uuid::Uuid;
use yijing::Reading;

pub const DIVINATIONS_FILE: &str = "divinations.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivinationRecord {
    pub id: Uuid,
    pub matter: String,
    pub hexagram: String,
    pub lines: Reading,
    pub interpretation: String,
    pub advice: String,
    /// Local wall-clock time, no offset.
    pub created_at: NaiveDateTime,
}

impl DivinationRecord {
    pub fn new(request: InterpretRequest, result: &Interpretation) -> Self {
        Self {
            id: Uuid::new_v4(),
            matter: request.matter,
            hexagram: request.hexagram,
            lines: request.lines,
            interpretation: result.interpretation.clone(),
            advice: result.advice.clone(),
            created_at: chrono::Local::now().naive_local(),
        }
    }
}

pub trait RecordSink: Send + Sync + 'static {
    fn append(&self, record: DivinationRecord) -> BoxFuture<'_, Result<()>>;

    /// Every record, oldest first.
    fn list(&self) -> BoxFuture<'_, Result<Vec<DivinationRecord>>>;
}

/// Keeps records in memory; used when no data directory is configured.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<DivinationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn append(&self, record: DivinationRecord) -> BoxFuture<'_, Result<()>> {
        self.records.lock().push(record);
        Box::pin(futures::future::ready(Ok(())))
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<DivinationRecord>>> {
        let records = self.records.lock().clone();
        Box::pin(futures::future::ready(Ok(records)))
    }
}

/// Keeps records as a pretty-printed JSON array in one file.
///
/// Each append rewrites the whole file through a temporary sibling and a
/// rename; appends are serialized by an async mutex.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A sink writing `divinations.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DIVINATIONS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<DivinationRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error("read", &e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| self.error("parse", &e))
    }

    async fn store(&self, records: &[DivinationRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error("create directory for", &e))?;
        }
        let json = serde_json::to_vec_pretty(records).map_err(|e| self.error("encode", &e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.error("write", &e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error("replace", &e))
    }

    fn error(&self, action: &str, err: &dyn core::fmt::Display) -> Error {
        Error::Sink {
            context: format!("failed to {action} {}: {err}", self.path.display()),
        }
    }
}

impl RecordSink for JsonFileSink {
    fn append(&self, record: DivinationRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut records = self.load().await?;
            records.push(record);
            self.store(&records).await
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<DivinationRecord>>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            self.load().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yijing::Line;

    fn record(matter: &str) -> DivinationRecord {
        DivinationRecord::new(
            InterpretRequest {
                matter: matter.into(),
                hexagram: "地天泰".into(),
                lines: Reading::new([
                    Line::YoungYang,
                    Line::OldYang,
                    Line::YoungYang,
                    Line::YoungYin,
                    Line::OldYin,
                    Line::YoungYin,
                ]),
            },
            &Interpretation {
                interpretation: "小往大来。".into(),
                advice: "建议：把握时机。".into(),
            },
        )
    }

    #[tokio::test]
    async fn file_sink_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::in_dir(&dir.path().join("data"));

        assert!(sink.list().await.unwrap().is_empty());
        sink.append(record("first")).await.unwrap();
        sink.append(record("second")).await.unwrap();

        let records = sink.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].matter, "first");
        assert_eq!(records[1].matter, "second");
    }

    #[tokio::test]
    async fn file_format_is_camel_case_tokens_and_unescaped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::in_dir(dir.path());
        sink.append(record("事业")).await.unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let entry = &value[0];
        assert!(entry["createdAt"].is_string());
        assert_eq!(entry["lines"][1], "old-yang");
        assert_eq!(entry["hexagram"], "地天泰");
        assert!(text.contains("事业"));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::in_dir(dir.path());
        std::fs::write(sink.path(), "{not json").unwrap();

        assert!(matches!(
            sink.append(record("x")).await,
            Err(Error::Sink { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let sink = std::sync::Arc::new(JsonFileSink::in_dir(dir.path()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let sink = sink.clone();
                tokio::spawn(async move { sink.append(record(&format!("m{i}"))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(sink.list().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn memory_sink_round_trip() {
        let sink = MemorySink::new();
        sink.append(record("a")).await.unwrap();
        assert_eq!(sink.list().await.unwrap()[0].matter, "a");
    }
}
