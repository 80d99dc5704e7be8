use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::ids;

/// Filesystem home of uploaded media and JSON records.
#[derive(Debug, Clone)]
pub struct ReportStore {
    uploads_dir: PathBuf,
    reports_dir: PathBuf,
}

/// An upload that has been opened on disk under its generated name.
pub struct MediaWriter {
    filename: String,
    path: PathBuf,
    file: fs::File,
    written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

impl ReportStore {
    pub fn new(uploads_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.uploads_dir).await?;
        fs::create_dir_all(&self.reports_dir).await?;
        Ok(())
    }

    /// Opens a new media file named `<field>-<id><.ext>`, keeping the
    /// extension of `original_name`.
    pub async fn create_media(&self, field: &str, original_name: &str) -> std::io::Result<MediaWriter> {
        fs::create_dir_all(&self.uploads_dir).await?;
        let filename = ids::media_filename(field, original_name);
        let path = self.uploads_dir.join(&filename);
        let file = create_new(&path).await?;
        Ok(MediaWriter {
            filename,
            path,
            file,
            written: 0,
        })
    }

    pub async fn write_report<T: Serialize>(&self, report: &T) -> Result<PathBuf, StoreError> {
        self.write_record(&ids::report_filename(), report).await
    }

    pub async fn write_sos<T: Serialize>(&self, alert: &T) -> Result<PathBuf, StoreError> {
        self.write_record(&ids::sos_filename(), alert).await
    }

    async fn write_record<T: Serialize>(&self, filename: &str, record: &T) -> Result<PathBuf, StoreError> {
        let body = serde_json::to_vec_pretty(record)?;
        fs::create_dir_all(&self.reports_dir).await?;
        let path = self.reports_dir.join(filename);
        let mut file = create_new(&path).await?;
        file.write_all(&body).await?;
        file.flush().await?;
        tracing::debug!("Wrote record {}", path.display());
        Ok(path)
    }
}

impl MediaWriter {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> std::io::Result<StoredMedia> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(StoredMedia {
            filename: self.filename,
            path: self.path,
            size: self.written,
        })
    }

    /// Drops the partially written file.
    pub async fn discard(self) -> std::io::Result<()> {
        let MediaWriter { path, file, .. } = self;
        drop(file);
        fs::remove_file(&path).await
    }
}

async fn create_new(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}
