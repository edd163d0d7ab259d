//! Sequential log reader with resumable seek (spec.md §4.4).
//!
//! Grounded on `logio.cc`'s `LogReader`: records are read lazily block by
//! block; running off the end of a file rolls to `file_num + 1`, which is
//! allowed not to exist yet (treated as "no data", not an error) so a
//! reader can sit at the tail of a log a writer is actively appending to.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};

use super::filename;
use super::pos::LogPos;
use super::recorder::{self, decompress};

/// Outcome of [`LogReader::get_next_record`].
pub enum ReadOutcome {
    Record(Vec<u8>),
    /// Nothing available right now; not an error. The reader position is
    /// unchanged and a later call may succeed once the writer appends
    /// more data.
    NoData,
}

pub struct LogReader {
    log_dir: PathBuf,
    file_base: String,
    block_size: u32,
    file_num: u32,
    block_num: u32,
    record_num: u32,
    file: Option<File>,
    block: Vec<u8>,
    block_offset: usize,
    corrupt_records: u64,
}

impl LogReader {
    pub fn new(log_dir: impl Into<PathBuf>, file_base: impl Into<String>, block_size: u32) -> Self {
        Self {
            log_dir: log_dir.into(),
            file_base: file_base.into(),
            block_size,
            file_num: 0,
            block_num: 0,
            record_num: 0,
            file: None,
            block: Vec::new(),
            block_offset: 0,
            corrupt_records: 0,
        }
    }

    pub fn corrupt_record_count(&self) -> u64 {
        self.corrupt_records
    }

    pub fn tell(&self) -> LogPos {
        LogPos::new(self.file_num, self.block_num, self.record_num)
    }

    /// Seek to `pos`. If `pos` is `(n, 0, 0)` and file `n-1` exists, the
    /// reader is positioned at "beginning of file n" without opening it —
    /// this is what lets a reader seek to end-of-log legally even before
    /// the writer has created file `n` (spec §4.4).
    pub async fn seek(&mut self, pos: LogPos) -> Result<()> {
        self.file = None;
        self.block.clear();
        self.block_offset = 0;
        self.file_num = pos.file_num;
        self.block_num = pos.block_num;
        self.record_num = 0;

        if pos.block_num == 0 && pos.record_num == 0 && pos.file_num > 0 && self.file_exists(pos.file_num - 1).await {
            return Ok(());
        }

        self.open_file(pos.file_num).await?;
        self.load_block(pos.block_num).await?;
        for _ in 0..pos.record_num {
            if matches!(self.get_next_record().await?, ReadOutcome::NoData) {
                return Err(Error::Invariant("seek target record_num beyond block contents".into()));
            }
        }
        Ok(())
    }

    /// Find the first numbered file in the directory and position at its
    /// start (spec §4.4 `Rewind`).
    pub async fn rewind(&mut self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.log_dir).await?;
        let mut lowest = None;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
            if let Some(n) = filename::parse_file_num(&name, &self.file_base, self.block_size) {
                lowest = Some(lowest.map_or(n, |l: u32| l.min(n)));
            }
        }
        self.seek(LogPos::new(lowest.unwrap_or(0), 0, 0)).await
    }

    async fn file_exists(&self, file_num: u32) -> bool {
        let path = filename::compose(&self.log_dir, &self.file_base, self.block_size, file_num);
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn open_file(&mut self, file_num: u32) -> Result<()> {
        let path = filename::compose(&self.log_dir, &self.file_base, self.block_size, file_num);
        self.file = Some(File::open(&path).await?);
        self.file_num = file_num;
        Ok(())
    }

    async fn load_block(&mut self, block_num: u32) -> Result<bool> {
        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };
        file.seek(std::io::SeekFrom::Start(block_num as u64 * self.block_size as u64)).await?;
        let mut buf = vec![0u8; self.block_size as usize];
        let mut read = 0usize;
        while read < buf.len() {
            let n = file.read(&mut buf[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read < buf.len() {
            // partial block: rewind logically, report "not enough data".
            file.seek(std::io::SeekFrom::Start(block_num as u64 * self.block_size as u64)).await?;
            return Ok(false);
        }
        self.block = buf;
        self.block_offset = 0;
        self.block_num = block_num;
        self.record_num = 0;
        Ok(true)
    }

    /// Read the next record, transparently crossing block and file
    /// boundaries. `ReadOutcome::NoData` is returned (not an error) once
    /// the log's current tail is reached.
    pub async fn get_next_record(&mut self) -> Result<ReadOutcome> {
        loop {
            if self.block_offset >= self.block.len() {
                if !self.advance_block().await? {
                    return Ok(ReadOutcome::NoData);
                }
            }

            let header_len = recorder::header_len();
            let remaining = &self.block[self.block_offset..];
            let Some(header) = recorder::parse_header(remaining) else {
                // Not enough bytes left in this block for a full header;
                // the rest is padding from `finalize_block`.
                self.block_offset = self.block.len();
                continue;
            };
            let body_start = self.block_offset + header_len;
            let body_end = body_start + header.len as usize;
            if body_end > self.block.len() {
                self.corrupt_records += 1;
                tracing::warn!(
                    file_num = self.file_num,
                    block_num = self.block_num,
                    "log record header claims a length past the block boundary"
                );
                self.block_offset = self.block.len();
                continue;
            }

            let body = &self.block[body_start..body_end];
            let record = if header.compressed {
                match decompress(body) {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        self.corrupt_records += 1;
                        self.block_offset = body_end;
                        self.record_num += 1;
                        continue;
                    }
                }
            } else {
                body.to_vec()
            };

            self.block_offset = body_end;
            self.record_num += 1;
            return Ok(ReadOutcome::Record(record));
        }
    }

    async fn advance_block(&mut self) -> Result<bool> {
        if self.file.is_none() {
            if !self.file_exists(self.file_num).await {
                return Ok(false);
            }
            self.open_file(self.file_num).await?;
        }

        if self.load_block(self.block_num.wrapping_add(if self.block.is_empty() { 0 } else { 1 })).await? {
            return Ok(true);
        }

        // current file exhausted; try rolling to file_num + 1, which may
        // not exist yet — that's "no data", not an error.
        let next_file = self.file_num + 1;
        if !self.file_exists(next_file).await {
            return Ok(false);
        }
        self.open_file(next_file).await?;
        self.load_block(0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::writer::LogWriter;

    #[tokio::test]
    async fn reads_back_records_written_earlier() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = LogWriter::new(dir.path(), "rec", 64, 4, false, false);
            writer.initialize().await.unwrap();
            writer.write_record(b"one").await.unwrap();
            writer.write_record(b"two").await.unwrap();
            writer.close().await.unwrap();
        }

        let mut reader = LogReader::new(dir.path(), "rec", 64);
        reader.rewind().await.unwrap();

        let mut out = Vec::new();
        loop {
            match reader.get_next_record().await.unwrap() {
                ReadOutcome::Record(r) => out.push(r),
                ReadOutcome::NoData => break,
            }
        }
        assert_eq!(out, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn missing_next_file_is_no_data_not_error() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = LogWriter::new(dir.path(), "rec", 64, 4, false, false);
            writer.initialize().await.unwrap();
            writer.write_record(b"only").await.unwrap();
            writer.close().await.unwrap();
        }
        let mut reader = LogReader::new(dir.path(), "rec", 64);
        reader.rewind().await.unwrap();
        reader.get_next_record().await.unwrap();
        match reader.get_next_record().await.unwrap() {
            ReadOutcome::NoData => {}
            ReadOutcome::Record(_) => panic!("expected no more data"),
        }
    }

    #[tokio::test]
    async fn deflated_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = LogWriter::new(dir.path(), "rec", 256, 4, false, true);
            writer.initialize().await.unwrap();
            writer.write_record(&vec![5u8; 100]).await.unwrap();
            writer.close().await.unwrap();
        }
        let mut reader = LogReader::new(dir.path(), "rec", 256);
        reader.rewind().await.unwrap();
        match reader.get_next_record().await.unwrap() {
            ReadOutcome::Record(r) => assert_eq!(r, vec![5u8; 100]),
            ReadOutcome::NoData => panic!("expected a record"),
        }
    }
}
