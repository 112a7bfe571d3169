use crate::models::SubmittedFile;
use chrono::Utc;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

/// URL prefix the stored files are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Submission files on local disk.
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub async fn prepare(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(UploadStore { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> io::Result<SubmittedFile> {
        let filename = stored_name(original_name);
        tokio::fs::write(self.dir.join(&filename), bytes).await?;
        debug!(%filename, size = bytes.len(), "stored submission file");
        Ok(SubmittedFile {
            url: format!("{UPLOADS_ROUTE}/{filename}"),
            filename,
        })
    }

    /// Removes files saved for a submission that did not go through.
    pub async fn discard(&self, files: &[SubmittedFile]) {
        for file in files {
            if let Err(err) = tokio::fs::remove_file(self.dir.join(&file.filename)).await {
                warn!(filename = %file.filename, error = %err, "could not remove orphaned upload");
            }
        }
    }
}

/// `<millis>-<random>-<name>`, unique per upload.
pub fn stored_name(original_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        &id[..8],
        sanitize(original_name)
    )
}

/// Last path component of the client's name, whitespace runs turned into `_`.
pub fn sanitize(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned = base.split_whitespace().collect::<Vec<_>>().join("_");
    match cleaned.as_str() {
        "" | "." | ".." => String::from("upload"),
        _ => cleaned,
    }
}
