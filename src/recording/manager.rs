//! Recording catalogue: lists and serves the video files written by the
//! automation side, and finds artifacts produced by a single run.

use crate::error::{Result, TaskpilotError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Extensions recognised as recordings (matched case-insensitively).
pub const RECORDING_EXTENSIONS: &[&str] = &["mp4", "webm"];

/// Extensions recognised as traces.
pub const TRACE_EXTENSIONS: &[&str] = &["zip"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingInfo {
    pub filename: String,
    /// Relative URL the file is served from
    pub url: String,
    pub size: u64,
    /// ISO 8601 creation time
    pub created_at: String,
}

/// Manages the recordings directory.
pub struct RecordingManager {
    dir: PathBuf,
}

impl RecordingManager {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List recordings, newest first. A missing directory yields an empty list.
    pub async fn list(&self) -> Result<Vec<RecordingInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found: Vec<(SystemTime, RecordingInfo)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_extension(&path, RECORDING_EXTENSIONS) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Failed to stat recording {:?}: {}", path, e);
                    continue;
                }
            };
            let filename = entry.file_name().to_string_lossy().to_string();
            let created = file_time(&meta);
            found.push((
                created,
                RecordingInfo {
                    url: format!("/recordings/{}", filename),
                    filename,
                    size: meta.len(),
                    created_at: chrono::DateTime::<chrono::Utc>::from(created).to_rfc3339(),
                },
            ));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.filename.cmp(&b.1.filename)));
        Ok(found.into_iter().map(|(_, info)| info).collect())
    }

    /// Read one recording. Names that could escape the directory are rejected.
    pub async fn open(&self, filename: &str) -> Result<(Vec<u8>, &'static str)> {
        validate_filename(filename)?;
        let path = self.dir.join(filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok((bytes, content_type_for(filename))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TaskpilotError::RecordingNotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A recording name must be a single plain path component.
pub fn validate_filename(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    // a backslash is a separator on Windows but a plain char elsewhere
    if !single_normal || filename.contains(['/', '\\', '\0']) {
        return Err(TaskpilotError::Validation(format!(
            "Invalid recording name: {}",
            filename
        )));
    }
    Ok(())
}

pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Files in `dir` with one of `extensions`. Missing dir → empty set.
pub async fn snapshot_files(dir: &Path, extensions: &[&str]) -> HashSet<PathBuf> {
    let mut files = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !has_extension(&path, extensions) {
            continue;
        }
        if matches!(entry.metadata().await, Ok(meta) if meta.is_file()) {
            files.insert(path);
        }
    }
    files
}

/// Newest file in `dir` with one of `extensions` that was not in `before`.
pub async fn newest_file_since(
    dir: &Path,
    before: &HashSet<PathBuf>,
    extensions: &[&str],
) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for path in snapshot_files(dir, extensions).await {
        if before.contains(&path) {
            continue;
        }
        let time = tokio::fs::metadata(&path)
            .await
            .map(|m| file_time(&m))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| time > *t) {
            newest = Some((time, path));
        }
    }
    newest.map(|(_, path)| path)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn file_time(meta: &std::fs::Metadata) -> SystemTime {
    meta.created()
        .or_else(|_| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let manager = RecordingManager::new(tmp.path().join("nope"));
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ignores_non_video_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.webm"), b"1234").unwrap();
        std::fs::write(tmp.path().join("B.MP4"), b"12").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("dir.mp4")).unwrap();

        let manager = RecordingManager::new(tmp.path().to_path_buf());
        let list = manager.list().await.unwrap();
        let mut names: Vec<_> = list.iter().map(|r| r.filename.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["B.MP4", "a.webm"]);

        let webm = list.iter().find(|r| r.filename == "a.webm").unwrap();
        assert_eq!(webm.url, "/recordings/a.webm");
        assert_eq!(webm.size, 4);
        assert!(chrono::DateTime::parse_from_rfc3339(&webm.created_at).is_ok());
    }

    #[tokio::test]
    async fn test_open_existing_and_missing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("run.mp4"), b"video").unwrap();
        let manager = RecordingManager::new(tmp.path().to_path_buf());

        let (bytes, content_type) = manager.open("run.mp4").await.unwrap();
        assert_eq!(bytes, b"video");
        assert_eq!(content_type, "video/mp4");

        let err = manager.open("other.mp4").await.unwrap_err();
        assert!(matches!(err, TaskpilotError::RecordingNotFound(_)));
    }

    #[tokio::test]
    async fn test_open_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let manager = RecordingManager::new(tmp.path().to_path_buf());
        for name in ["../secret.mp4", "..", ".", "", "a/b.mp4", "/etc/passwd", "a\\b.webm"] {
            let err = manager.open(name).await.unwrap_err();
            assert!(matches!(err, TaskpilotError::Validation(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_open_allows_dots_inside_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("run..1.webm"), b"clip").unwrap();
        let manager = RecordingManager::new(tmp.path().to_path_buf());

        assert!(validate_filename("run..1.webm").is_ok());
        assert!(validate_filename("..hidden.mp4").is_ok());
        let (bytes, _) = manager.open("run..1.webm").await.unwrap();
        assert_eq!(bytes, b"clip");
    }

    #[tokio::test]
    async fn test_newest_file_since_finds_new_artifact() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("old.webm"), b"old").unwrap();
        let before = snapshot_files(tmp.path(), RECORDING_EXTENSIONS).await;
        assert_eq!(before.len(), 1);

        assert!(newest_file_since(tmp.path(), &before, RECORDING_EXTENSIONS)
            .await
            .is_none());

        std::fs::write(tmp.path().join("new.webm"), b"new").unwrap();
        let found = newest_file_since(tmp.path(), &before, RECORDING_EXTENSIONS)
            .await
            .unwrap();
        assert_eq!(found.file_name().unwrap(), "new.webm");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("x.WEBM"), "video/webm");
        assert_eq!(content_type_for("trace.zip"), "application/zip");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
