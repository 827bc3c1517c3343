//! Append-only journal backing the durable store.
//!
//! One JSON object per line. Each committed transaction is exactly one
//! `commit` line carrying both the item change and the outbox append, so a
//! line is either fully present (committed) or absent/torn (never happened).
//!
//! # Recovery
//!
//! [`Journal::open`] replays every valid line. A final line that does not parse
//! (crash mid-write, possibly splitting a UTF-8 character) or whose sequence
//! does not increase is treated as uncommitted and truncated away before new
//! appends go after it. A damaged line followed by further lines is reported
//! as [`JournalError::Corrupt`] and the file is left as it is.
//!
//! # Compaction
//!
//! [`Journal::rewrite`] writes a replacement journal to `<path>.tmp`, fsyncs it,
//! renames it over the original and fsyncs the directory. A crash at any point
//! leaves either the old or the new journal intact.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::item::{Item, ItemId};

use super::{OutboxEntry, ProducerId, Sequence};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A damaged line with committed lines after it. Not a torn write, so
    /// nothing is truncated.
    #[error("journal corrupt at line {line} (byte {offset}): {reason}")]
    Corrupt {
        line: usize,
        offset: u64,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, JournalError>;

/// A single state change inside a committed transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    PutItem { item: Item },
    RemoveItem { id: ItemId },
    Append { entry: OutboxEntry },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalRecord {
    /// First line of every journal; fixes the producer id for its lifetime and
    /// carries the sequence watermark across compactions.
    Genesis {
        producer: ProducerId,
        #[serde(default = "first_sequence")]
        next_sequence: Sequence,
    },
    Commit { changes: Vec<Change> },
    Delivered { sequence: Sequence, at: DateTime<Utc> },
}

fn first_sequence() -> Sequence {
    Sequence::FIRST
}

#[derive(Serialize, Deserialize)]
struct JournalLine<R> {
    seq: u64,
    ts: DateTime<Utc>,
    record: R,
}

pub struct Journal {
    file: File,
    path: PathBuf,
    next_seq: u64,
    sync: bool,
}

impl Journal {
    /// Open (or create) the journal at `path`, returning it together with every
    /// record that survived replay.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> Result<(Self, Vec<JournalRecord>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (records, next_seq) = replay(&path)?;
        let file = open_append(&path)?;

        Ok((
            Journal {
                file,
                path,
                next_seq,
                sync,
            },
            records,
        ))
    }

    /// Append one record as a single line.
    ///
    /// On any failure the file is cut back to its previous length, so a record
    /// reported as failed never reappears on replay.
    pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let line = JournalLine {
            seq: self.next_seq,
            ts: Utc::now(),
            record,
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let len_before = self.file.metadata()?.len();
        let written = self.file.write_all(&bytes).and_then(|()| {
            if self.sync {
                self.file.sync_all()
            } else {
                Ok(())
            }
        });

        if let Err(err) = written {
            if let Err(truncate_err) = self.file.set_len(len_before) {
                warn!(error = %truncate_err, path = %self.path.display(), "failed to roll back partial journal write");
            }
            return Err(err.into());
        }

        self.next_seq += 1;
        Ok(())
    }

    /// Atomically replace the journal's contents with `records`.
    pub fn rewrite(&mut self, records: &[JournalRecord]) -> Result<()> {
        self.rewrite_with(records, fsync_dir)
    }

    fn rewrite_with(
        &mut self,
        records: &[JournalRecord],
        sync_dir: impl FnOnce(&Path) -> io::Result<()>,
    ) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let ts = Utc::now();
            for (seq, record) in records.iter().enumerate() {
                let line = JournalLine {
                    seq: seq as u64,
                    ts,
                    record,
                };
                serde_json::to_writer(&mut tmp, &line)?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }

        // Opened before the rename so the handle follows the new file; once
        // the rename lands nothing may fail before `self.file` is swapped.
        let file = open_append(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        self.file = file;
        self.next_seq = records.len() as u64;

        if let Some(parent) = self.path.parent() {
            sync_dir(parent)?;
        }
        info!(path = %self.path.display(), records = records.len(), "journal compacted");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    File::open(dir)?.sync_all()
}

/// Read every valid line. Only the final line may be damaged; it is
/// truncated away. A damaged line with anything after it is corruption and
/// fails the open without touching the file.
fn replay(path: &Path) -> Result<(Vec<JournalRecord>, u64)> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }

    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut last_valid_pos = 0u64;
    let mut current_pos = 0u64;
    let mut line_no = 0usize;
    let mut max_seq: Option<u64> = None;
    // First unreadable line: (line number, byte offset, reason).
    let mut damaged: Option<(usize, u64, String)> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes_read = reader.read_until(b'\n', &mut line)?;
        if bytes_read == 0 {
            break;
        }
        let line_start = current_pos;
        current_pos += bytes_read as u64;
        line_no += 1;

        if line.trim_ascii().is_empty() {
            if damaged.is_none() {
                last_valid_pos = current_pos;
            }
            continue;
        }

        if let Some((bad_line, offset, reason)) = damaged.take() {
            return Err(JournalError::Corrupt {
                line: bad_line,
                offset,
                reason,
            });
        }

        // A line without its newline was never completely written.
        if line.last() != Some(&b'\n') {
            damaged = Some((line_no, line_start, "incomplete line".to_string()));
            continue;
        }

        match serde_json::from_slice::<JournalLine<JournalRecord>>(&line) {
            Ok(parsed) if max_seq.map_or(true, |prev| parsed.seq > prev) => {
                max_seq = Some(parsed.seq);
                records.push(parsed.record);
                last_valid_pos = current_pos;
            }
            Ok(parsed) => {
                damaged = Some((
                    line_no,
                    line_start,
                    format!("sequence {} does not follow {}", parsed.seq, max_seq.unwrap_or(0)),
                ));
            }
            Err(err) => damaged = Some((line_no, line_start, err.to_string())),
        }
    }

    if last_valid_pos < file_len {
        warn!(
            path = %path.display(),
            valid_bytes = last_valid_pos,
            file_len,
            "truncating incomplete journal tail"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(last_valid_pos)?;
        file.sync_all()?;
    }

    let next_seq = max_seq.map(|seq| seq + 1).unwrap_or(0);
    Ok((records, next_seq))
}

#[cfg(test)]
impl Journal {
    /// Swap in a read-only handle so every later append fails.
    pub(crate) fn fail_writes(&mut self) -> io::Result<()> {
        self.file = File::open(&self.path)?;
        Ok(())
    }
}
