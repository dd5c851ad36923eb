use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Local holding area for uploaded files before they are pushed to the
/// remote asset store.
///
/// Each file lands at `{dir}/{uuid}-{sanitized original name}` so concurrent
/// requests never collide. The directory is shared by all requests.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
    max_file_bytes: usize,
}

/// A file sitting in the staging directory.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
}

impl Staging {
    pub async fn new(dir: PathBuf, max_file_bytes: usize) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload staging directory: {}", dir.display());
        Ok(Self { dir, max_file_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Stream a multipart file field to disk. Files over the size limit are
    /// rejected and the partial file removed.
    pub async fn stage(&self, mut field: Field<'_>) -> Result<StagedFile, ApiError> {
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let path = self.dir.join(staged_name(&original_name));

        let mut file = fs::File::create(&path).await.map_err(|e| {
            warn!("Failed to create staged file {}: {}", path.display(), e);
            ApiError::internal("Failed to store uploaded file")
        })?;

        let mut size: usize = 0;
        let outcome = loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break Ok(()),
                Err(e) => break Err(multipart_error(e)),
            };
            size += chunk.len();
            if size > self.max_file_bytes {
                break Err(ApiError::PayloadTooLarge(format!(
                    "File exceeds the {} byte limit",
                    self.max_file_bytes
                )));
            }
            if let Err(e) = file.write_all(&chunk).await {
                warn!("Failed to write staged file {}: {}", path.display(), e);
                break Err(ApiError::internal("Failed to store uploaded file"));
            }
        };
        let outcome = match outcome {
            Ok(()) => file.flush().await.map_err(|e| {
                warn!("Failed to flush staged file {}: {}", path.display(), e);
                ApiError::internal("Failed to store uploaded file")
            }),
            Err(e) => Err(e),
        };
        drop(file);

        let staged = StagedFile {
            path,
            original_name,
            size: size as u64,
        };
        match outcome {
            Ok(()) => {
                debug!("Staged {} ({} bytes) at {}", staged.original_name, staged.size, staged.path.display());
                Ok(staged)
            }
            Err(e) => {
                self.discard(staged).await;
                Err(e)
            }
        }
    }

    /// Remove a staged file. Already-gone files are fine; other failures are
    /// logged and otherwise ignored.
    pub async fn discard(&self, file: StagedFile) {
        match fs::remove_file(&file.path).await {
            Ok(()) => debug!("Local file deleted: {}", file.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete local file {}: {}", file.path.display(), e),
        }
    }

    /// Delete staged files older than `max_age`. Returns how many went.
    pub async fn sweep(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age >= max_age {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Sweep could not remove {}: {}", entry.path().display(), e),
                }
            }
        }

        Ok(removed)
    }
}

/// Background task that clears staged files left behind by crashed or
/// aborted requests.
pub async fn run_sweep_loop(staging: Staging, interval_secs: u64, max_age: Duration) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match staging.sweep(max_age).await {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: removed {} stale staged files", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

/// `{uuid}-{name}` where `name` is the last path component of the client's
/// file name with anything outside `[A-Za-z0-9._-]` replaced.
pub fn staged_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut clean: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(100)
        .collect();
    if clean.trim_matches('.').is_empty() {
        clean = "upload".to_string();
    }
    format!("{}-{}", Uuid::new_v4(), clean)
}

pub(crate) fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}
