// ===============================
// src/recorder.rs
// ===============================
//
// Quote sink + JSONL recorder:
// - Tulis setiap Quote ke file .jsonl (append), satu baris per quote.
// - Bufer dengan BufWriter agar hemat syscall.
// - Flush tiap FLUSH_EVERY_N quote dan saat stream selesai.
// - Otomatis membuat parent directory jika belum ada.
// - Jika tulis gagal, coba reopen file sekali lalu lanjut.
//
// ENV: set `RECORD_FILE=/path/to/quotes.jsonl` agar aktif (lihat main.rs).
//
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{error, info};

use crate::domain::Quote;
use crate::error::Result;

const FLUSH_EVERY_N: u32 = 100;

/// Durable destination for received quotes.
#[async_trait]
pub trait QuoteSink: Send {
    async fn store(&mut self, quote: &Quote) -> Result<()>;

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: QuoteSink + ?Sized> QuoteSink for Box<S> {
    async fn store(&mut self, quote: &Quote) -> Result<()> {
        (**self).store(quote).await
    }

    async fn flush(&mut self) -> Result<()> {
        (**self).flush().await
    }
}

/// Keeps quotes in memory. Handy in tests and for short scripted runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub quotes: Vec<Quote>,
}

#[async_trait]
impl QuoteSink for MemorySink {
    async fn store(&mut self, quote: &Quote) -> Result<()> {
        self.quotes.push(quote.clone());
        Ok(())
    }
}

async fn open_writer(path: &Path) -> Result<BufWriter<File>> {
    // Pastikan parent directory ada (kalau ada)
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

/// Appends quotes as JSON lines.
pub struct JsonlRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    since_last_flush: u32,
}

impl JsonlRecorder {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let writer = open_writer(&path).await?;
        info!(path = %path.display(), "recorder: started");
        Ok(Self { path, writer, since_last_flush: 0 })
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(line).await?;
        self.writer.write_all(b"\n").await
    }
}

#[async_trait]
impl QuoteSink for JsonlRecorder {
    async fn store(&mut self, quote: &Quote) -> Result<()> {
        let line = serde_json::to_vec(quote)?;

        if let Err(e) = self.write_line(&line).await {
            error!(?e, path = %self.path.display(), "recorder: write failed, attempting reopen");
            self.writer = open_writer(&self.path).await?;
            // coba lagi sekali setelah reopen
            self.write_line(&line).await?;
        }

        self.since_last_flush += 1;
        if self.since_last_flush >= FLUSH_EVERY_N {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.since_last_flush = 0;
        Ok(())
    }
}
