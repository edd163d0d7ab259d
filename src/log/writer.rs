//! Append-only persistent log writer (spec.md §4.3).
//!
//! Grounded on `logio.cc`'s `LogWriter`: a process-exclusive lock file,
//! directory scan to resume `file_num`, and fixed-size block rollover.
//! Where the original accumulates into an in-memory `io::MemoryStream`
//! and flushes whole blocks with a raw `File::Write`, this uses
//! `tokio::fs::File` so the writer can live on the same reactor as
//! everything else without blocking it.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};

use super::filename;
use super::pos::LogPos;
use super::recorder::Recorder;

pub struct LogWriter {
    log_dir: PathBuf,
    file_base: String,
    block_size: u32,
    blocks_per_file: u32,
    temporary_incomplete_file: bool,
    recorder: Recorder,
    file_num: u32,
    block_num: u32,
    record_num: u32,
    file: Option<File>,
}

impl LogWriter {
    pub fn new(
        log_dir: impl Into<PathBuf>,
        file_base: impl Into<String>,
        block_size: u32,
        blocks_per_file: u32,
        temporary_incomplete_file: bool,
        deflate: bool,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            file_base: file_base.into(),
            block_size,
            blocks_per_file,
            temporary_incomplete_file,
            recorder: Recorder::new(block_size, deflate),
            file_num: 0,
            block_num: 0,
            record_num: 0,
            file: None,
        }
    }

    /// Acquire the exclusive lock file and resume `file_num` from the
    /// highest-numbered existing file in `log_dir` (spec §4.3
    /// `Initialize`).
    pub async fn initialize(&mut self) -> Result<()> {
        if !fs::metadata(&self.log_dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(Error::Invariant(format!("not a directory: {}", self.log_dir.display())));
        }

        self.acquire_lock().await?;

        self.file_num = self.scan_highest_file_num().await.map(|n| n + 1).unwrap_or(0);

        if self.temporary_incomplete_file {
            fs::create_dir_all(self.log_dir.join("temp")).await?;
        }

        self.open_current_file().await?;
        Ok(())
    }

    async fn acquire_lock(&self) -> Result<()> {
        let lock_path = filename::lock_file(&self.log_dir, &self.file_base);
        if let Ok(existing) = fs::read_to_string(&lock_path).await {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if pid != 0 && process_is_alive(pid) {
                    return Err(Error::Invariant(format!(
                        "log already locked by pid {pid}: {}",
                        lock_path.display()
                    )));
                }
            }
        }
        fs::write(&lock_path, std::process::id().to_string()).await?;
        Ok(())
    }

    async fn scan_highest_file_num(&self) -> Option<u32> {
        let mut entries = fs::read_dir(&self.log_dir).await.ok()?;
        let mut highest = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(n) = filename::parse_file_num(name, &self.file_base, self.block_size) {
                highest = Some(highest.map_or(n, |h: u32| h.max(n)));
            }
        }
        highest
    }

    async fn open_current_file(&mut self) -> Result<()> {
        let path = self.current_file_path();
        let mut file = OpenOptions::new().create(true).append(false).read(true).write(true).open(&path).await?;
        let len = file.metadata().await?.len();
        let truncated_len = len - (len % self.block_size as u64);
        if truncated_len != len {
            tracing::warn!(
                path = %path.display(),
                lost_bytes = len - truncated_len,
                "truncating partial block left over from a previous writer"
            );
            file.set_len(truncated_len).await?;
        }
        file.seek(std::io::SeekFrom::Start(truncated_len)).await?;
        self.block_num = (truncated_len / self.block_size as u64) as u32;
        self.record_num = 0;
        self.file = Some(file);
        Ok(())
    }

    fn current_file_path(&self) -> PathBuf {
        let dir = if self.temporary_incomplete_file {
            self.log_dir.join("temp")
        } else {
            self.log_dir.clone()
        };
        filename::compose(&dir, &self.file_base, self.block_size, self.file_num)
    }

    /// Append one record, rolling over to the next file once the current
    /// one reaches `block_size * blocks_per_file` (spec §4.3 rollover).
    pub async fn write_record(&mut self, payload: &[u8]) -> Result<()> {
        self.recorder.push_record(payload);
        self.record_num += 1;
        while let Some(block) = self.recorder.take_block() {
            self.write_block(&block).await?;
        }
        Ok(())
    }

    async fn write_block(&mut self, block: &[u8]) -> Result<()> {
        if self.block_num >= self.blocks_per_file {
            self.rollover().await?;
        }
        let file = self.file.as_mut().expect("initialize() must run before writing");
        file.write_all(block).await?;
        self.block_num += 1;
        self.record_num = 0;
        Ok(())
    }

    async fn rollover(&mut self) -> Result<()> {
        self.finish_current_file().await?;
        self.file_num += 1;
        self.block_num = 0;
        self.open_current_file().await?;
        Ok(())
    }

    async fn finish_current_file(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else { return Ok(()) };
        file.flush().await?;
        if self.temporary_incomplete_file {
            let temp_path = self.current_file_path();
            let final_path =
                filename::compose(&self.log_dir, &self.file_base, self.block_size, self.file_num);
            self.file = None;
            fs::rename(&temp_path, &final_path).await?;
        }
        Ok(())
    }

    /// Finalize any partial block (zero-padded) and flush to disk (spec
    /// §4.3 `Flush`).
    pub async fn flush(&mut self) -> Result<()> {
        if let Some(block) = self.recorder.finalize_block() {
            self.write_block(&block).await?;
        }
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    pub fn tell(&self) -> LogPos {
        LogPos::new(self.file_num, self.block_num, self.record_num)
    }

    /// Finalize, rename out of `temp/` if requested, and drop the lock
    /// file (spec §4.3 `Close`).
    pub async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.finish_current_file().await?;
        self.file = None;
        let lock_path = filename::lock_file(&self.log_dir, &self.file_base);
        let _ = fs::remove_file(&lock_path).await;
        Ok(())
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}/cmdline")).exists()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    false
}
