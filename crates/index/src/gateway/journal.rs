//! Append-only JSON-lines journal of index mutations.
//!
//! Each line is one self-contained record; an external full-text indexer
//! tails the file and applies records in order.
//!
//! A record is either fully on disk or absent. A failed append truncates the
//! file back to the last complete line, and `open` drops a torn tail left by a
//! crash, so a new record never lands on the end of a partial one.

use std::{
  io::{Read, Seek, SeekFrom},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
  fs::{File, OpenOptions},
  io::AsyncWriteExt,
  sync::Mutex,
};
use tracing::{debug, info, warn};

use super::{GatewayError, IndexGateway, directory_prefix};
use crate::document::Document;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord<'a> {
  Upsert { at: DateTime<Utc>, document: &'a Document },
  Delete { at: DateTime<Utc>, path: &'a str },
  DeletePrefix { at: DateTime<Utc>, prefix: &'a str },
  Commit { at: DateTime<Utc> },
}

pub struct JournalIndex {
  path: PathBuf,
  writer: Mutex<JournalFile>,
}

struct JournalFile {
  file: File,
  /// Length up to the end of the last complete record
  len: u64,
}

impl JournalIndex {
  /// Open (or create) the journal, appending to any existing content
  pub async fn open(path: &Path) -> Result<Self, GatewayError> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    let owned = path.to_path_buf();
    let len = tokio::task::spawn_blocking(move || repair_torn_tail(&owned))
      .await
      .map_err(std::io::Error::other)??;
    info!(path = %path.display(), bytes = len, "Opened mutation journal");

    Ok(Self {
      path: path.to_path_buf(),
      writer: Mutex::new(JournalFile { file, len }),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  async fn append(&self, record: &JournalRecord<'_>) -> Result<(), GatewayError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    let mut writer = self.writer.lock().await;

    let written = async {
      writer.file.write_all(&line).await?;
      writer.file.flush().await
    }
    .await;

    match written {
      Ok(()) => {
        writer.len += line.len() as u64;
        Ok(())
      }
      Err(e) => {
        let len = writer.len;
        if let Err(truncate) = writer.file.set_len(len).await {
          warn!(path = %self.path.display(), error = %truncate, "Failed to drop partial journal record");
        }
        Err(e.into())
      }
    }
  }
}

/// Cut the file back to just after its last newline; returns the new length
fn repair_torn_tail(path: &Path) -> std::io::Result<u64> {
  let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
  let len = file.metadata()?.len();
  let mut buf = [0u8; 4096];
  let mut end = len;

  while end > 0 {
    let start = end.saturating_sub(buf.len() as u64);
    let chunk = &mut buf[..(end - start) as usize];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(chunk)?;
    if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
      end = start + pos as u64 + 1;
      break;
    }
    end = start;
  }

  if end < len {
    warn!(path = %path.display(), dropped = len - end, "Dropping torn record at end of journal");
    file.set_len(end)?;
  }
  Ok(end)
}

#[async_trait::async_trait]
impl IndexGateway for JournalIndex {
  fn name(&self) -> &str {
    "journal"
  }

  async fn upsert(&self, document: Document) -> Result<(), GatewayError> {
    self
      .append(&JournalRecord::Upsert {
        at: Utc::now(),
        document: &document,
      })
      .await
  }

  async fn delete(&self, path: &str) -> Result<(), GatewayError> {
    self.append(&JournalRecord::Delete { at: Utc::now(), path }).await
  }

  async fn delete_prefix(&self, prefix: &str) -> Result<(), GatewayError> {
    let prefix = directory_prefix(prefix);
    self
      .append(&JournalRecord::DeletePrefix {
        at: Utc::now(),
        prefix: &prefix,
      })
      .await
  }

  async fn commit(&self) -> Result<(), GatewayError> {
    self.append(&JournalRecord::Commit { at: Utc::now() }).await?;
    let writer = self.writer.lock().await;
    writer.file.sync_data().await?;
    debug!(path = %self.path.display(), "Journal committed");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_journal_records_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("journal").join("mutations.jsonl");
    let journal = JournalIndex::open(&path).await.unwrap();

    let doc = Document {
      path: "/r/a.txt".to_string(),
      file_name: "a.txt".to_string(),
      extension: Some("txt".to_string()),
      size: 5,
      mtime_millis: 42,
      content: "hello".to_string(),
    };
    journal.upsert(doc).await.unwrap();
    journal.delete("/r/b.txt").await.unwrap();
    journal.delete_prefix("/r/old").await.unwrap();
    journal.commit().await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let ops: Vec<String> = content
      .lines()
      .map(|l| {
        let value: serde_json::Value = serde_json::from_str(l).unwrap();
        value["op"].as_str().unwrap().to_string()
      })
      .collect();
    assert_eq!(ops, vec!["upsert", "delete", "delete_prefix", "commit"]);
    assert!(content.contains("\"prefix\":\"/r/old/\""));
    assert!(content.contains("\"content\":\"hello\""));
  }

  #[tokio::test]
  async fn test_open_drops_torn_tail_before_appending() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutations.jsonl");
    let complete = r#"{"op":"delete","at":"2024-01-01T00:00:00Z","path":"/r/x"}"#;
    std::fs::write(&path, format!("{complete}\n{{\"op\":\"dele")).unwrap();

    let journal = JournalIndex::open(&path).await.unwrap();
    journal.delete("/r/y").await.unwrap();
    journal.commit().await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], complete);
    for line in &lines {
      serde_json::from_str::<serde_json::Value>(line).unwrap();
    }
    assert!(lines[1].contains("\"path\":\"/r/y\""));
  }

  #[tokio::test]
  async fn test_open_of_journal_without_newline_empties_it() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutations.jsonl");
    std::fs::write(&path, "{\"op\":\"ups").unwrap();

    let journal = JournalIndex::open(&path).await.unwrap();
    journal.commit().await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.starts_with("{\"op\":\"commit\""));
  }
}
