//! Container metadata persistence.
//!
//! Each container keeps one JSON record at
//! `<containers dir>/<id>/config.json`; `ps` and `rm` work entirely off
//! these records. All functions take the containers directory as a
//! parameter so tests can run against temporary trees.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lumper_common::constants::INFO_FILENAME;
use lumper_common::error::{LumperError, Result};
use lumper_common::types::{ContainerId, ContainerStatus};

/// Persistent record of one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container identifier (also the directory name).
    pub id: ContainerId,
    /// Image the container was created from.
    pub image: String,
    /// The launched command line, space-joined.
    pub command: String,
    /// Local creation time, `YYYY-MM-DD HH:MM:SS`.
    pub create_time: String,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// PID recorded at launch.
    pub pid: i32,
}

/// Returns the metadata file path for a container.
#[must_use]
pub fn info_path(containers_dir: &Path, id: &str) -> PathBuf {
    containers_dir.join(id).join(INFO_FILENAME)
}

/// Writes a container's metadata record.
///
/// The container directory must already exist.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_info(containers_dir: &Path, info: &ContainerInfo) -> Result<()> {
    let path = info_path(containers_dir, info.id.as_str());
    let json = serde_json::to_string_pretty(info)?;
    std::fs::write(&path, json).map_err(|e| LumperError::Io { path, source: e })?;
    tracing::debug!(id = %info.id, status = %info.status, "container info saved");
    Ok(())
}

/// Loads a container's metadata record.
///
/// # Errors
///
/// Returns `NotFound` if the record does not exist, or an error if it
/// cannot be read or parsed.
pub fn load_info(containers_dir: &Path, id: &str) -> Result<ContainerInfo> {
    let path = info_path(containers_dir, id);
    if !path.exists() {
        return Err(LumperError::NotFound {
            kind: "container",
            id: id.to_owned(),
        });
    }
    let content =
        std::fs::read_to_string(&path).map_err(|e| LumperError::Io { path, source: e })?;
    Ok(serde_json::from_str(&content)?)
}

/// Lists all containers with a readable metadata record, ordered by
/// creation time.
///
/// Entries whose record is missing or corrupt are skipped with a log line.
///
/// # Errors
///
/// Returns an error if the containers directory exists but cannot be read.
pub fn list_infos(containers_dir: &Path) -> Result<Vec<ContainerInfo>> {
    if !containers_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(containers_dir).map_err(|e| LumperError::Io {
        path: containers_dir.to_path_buf(),
        source: e,
    })?;

    let mut infos = Vec::new();
    for entry in entries.flatten() {
        let id = entry.file_name();
        let id = id.to_string_lossy();
        match load_info(containers_dir, &id) {
            Ok(info) => infos.push(info),
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "skipping unreadable container record");
            }
        }
    }
    infos.sort_by(|a, b| {
        a.create_time
            .cmp(&b.create_time)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
    Ok(infos)
}

/// Removes a container's directory tree, returning whether it existed.
///
/// The record is deleted regardless of its recorded status.
///
/// # Errors
///
/// Returns an error if the tree exists but cannot be removed.
pub fn remove_container(containers_dir: &Path, id: &str) -> Result<bool> {
    let path = containers_dir.join(id);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&path).map_err(|e| LumperError::Io { path, source: e })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, status: ContainerStatus) -> ContainerInfo {
        ContainerInfo {
            id: ContainerId::new(id),
            image: "busybox".into(),
            command: "/bin/sh -c true".into(),
            create_time: "2026-08-01 10:00:00".into(),
            status,
            pid: 4321,
        }
    }

    fn make_container_dir(dir: &Path, id: &str) {
        std::fs::create_dir_all(dir.join(id)).expect("container dir");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        make_container_dir(dir.path(), "abc123");

        let info = sample("abc123", ContainerStatus::Running);
        save_info(dir.path(), &info).expect("save");

        let loaded = load_info(dir.path(), "abc123").expect("load");
        assert_eq!(loaded.id, info.id);
        assert_eq!(loaded.image, "busybox");
        assert_eq!(loaded.command, "/bin/sh -c true");
        assert_eq!(loaded.status, ContainerStatus::Running);
        assert_eq!(loaded.pid, 4321);
    }

    #[test]
    fn record_serializes_expected_field_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        make_container_dir(dir.path(), "abc123");
        save_info(dir.path(), &sample("abc123", ContainerStatus::Stopped)).expect("save");

        let raw = std::fs::read_to_string(info_path(dir.path(), "abc123")).expect("read");
        for field in ["\"id\"", "\"image\"", "\"command\"", "\"create_time\"", "\"status\"", "\"pid\""]
        {
            assert!(raw.contains(field), "missing {field} in {raw}");
        }
        assert!(raw.contains("\"stopped\""));
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_info(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, LumperError::NotFound { kind: "container", .. }));
    }

    #[test]
    fn list_missing_directory_is_empty() {
        let infos = list_infos(Path::new("/nonexistent/lumper-containers")).expect("list");
        assert!(infos.is_empty());
    }

    #[test]
    fn list_orders_by_create_time_and_skips_corrupt_records() {
        let dir = tempfile::tempdir().expect("tempdir");

        make_container_dir(dir.path(), "young");
        let mut younger = sample("young", ContainerStatus::Running);
        younger.create_time = "2026-08-01 12:00:00".into();
        save_info(dir.path(), &younger).expect("save");

        make_container_dir(dir.path(), "old");
        let mut older = sample("old", ContainerStatus::Stopped);
        older.create_time = "2026-08-01 08:00:00".into();
        save_info(dir.path(), &older).expect("save");

        // A container dir with corrupt metadata is skipped.
        make_container_dir(dir.path(), "broken");
        std::fs::write(info_path(dir.path(), "broken"), "not json").expect("write");

        let infos = list_infos(dir.path()).expect("list");
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].id.as_str(), "old");
        assert_eq!(infos[1].id.as_str(), "young");
    }

    #[test]
    fn remove_reports_found_and_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        make_container_dir(dir.path(), "gone");
        save_info(dir.path(), &sample("gone", ContainerStatus::Stopped)).expect("save");

        assert!(remove_container(dir.path(), "gone").expect("remove"));
        assert!(!dir.path().join("gone").exists());
        assert!(!remove_container(dir.path(), "gone").expect("second remove"));
    }
}
