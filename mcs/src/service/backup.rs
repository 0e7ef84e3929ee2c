//! Backup and retention engine
//!
//! Every backup lives in its own directory under the backups root:
//!
//! ```text
//! <root>/<id>/metadata.json
//! <root>/<id>/data/<source dir name>/...
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::backup::{backup_id, parse_backup_id, BackupInfo, BackupType};
use crate::error::{Error, Result};
use crate::service::naming::is_single_segment;

const METADATA_FILE: &str = "metadata.json";
const DATA_DIR: &str = "data";

/// Backup service for snapshotting and restoring directories
pub struct BackupService {
    root: PathBuf,
}

impl BackupService {
    /// Create a new backup service rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn backup_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Snapshot `source` into a new backup
    pub async fn create(
        &self,
        source: &Path,
        kind: BackupType,
        description: Option<String>,
    ) -> Result<BackupInfo> {
        if !source.exists() {
            return Err(Error::BackupSourceMissing(source.display().to_string()));
        }
        let source = fs::canonicalize(source).await?;
        let entry_name = source
            .file_name()
            .ok_or_else(|| Error::InvalidParameter(format!("cannot back up {:?}", source)))?
            .to_owned();

        fs::create_dir_all(&self.root).await?;
        let root = fs::canonicalize(&self.root).await?;
        if root.starts_with(&source) {
            return Err(Error::InvalidParameter(format!(
                "cannot back up {:?}: it contains the backup directory {:?}",
                source, root
            )));
        }

        let timestamp = Utc::now();
        let base_id = backup_id(kind, timestamp);
        let mut id = base_id.clone();
        let mut attempt = 1;
        while self.backup_dir(&id).exists() {
            attempt += 1;
            id = format!("{}-{}", base_id, attempt);
        }

        let dir = self.backup_dir(&id);
        let data_target = dir.join(DATA_DIR).join(&entry_name);
        info!("Backing up {:?} as {}", source, id);

        let copied = async {
            fs::create_dir_all(dir.join(DATA_DIR)).await?;
            copy_path(&source, &data_target).await
        }
        .await;
        if let Err(e) = copied {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(e);
        }

        let info = BackupInfo {
            id,
            kind,
            timestamp,
            source_path: source,
            size: tree_size(&dir.join(DATA_DIR)),
            description,
        };
        fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(&info)?).await?;

        debug!("Backup {} holds {} bytes", info.id, info.size);
        Ok(info)
    }

    /// All backups, newest first
    pub async fn list(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        if !self.root.exists() {
            return Ok(backups);
        }

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match read_metadata(&entry.path()).await {
                Ok(info) => backups.push(info),
                Err(e) => warn!("Skipping {:?}: {}", entry.path(), e),
            }
        }

        sort_newest_first(&mut backups);
        Ok(backups)
    }

    /// Look up a single backup
    pub async fn get(&self, id: &str) -> Result<BackupInfo> {
        let dir = self.backup_dir(id);
        if !is_single_segment(id) || !dir.join(METADATA_FILE).exists() {
            return Err(Error::BackupNotFound(id.to_string()));
        }
        read_metadata(&dir).await
    }

    /// Apply the keep-newest-`keep` retention rule
    ///
    /// Returns the backups that were deleted, or would be with `dry_run`.
    pub async fn cleanup_old(&self, keep: usize, dry_run: bool) -> Result<Vec<BackupInfo>> {
        let doomed = plan_cleanup(self.list().await?, keep);
        if dry_run {
            return Ok(doomed);
        }

        for backup in &doomed {
            self.delete(&backup.id).await?;
        }
        if !doomed.is_empty() {
            info!("Removed {} old backup(s), kept {}", doomed.len(), keep);
        }
        Ok(doomed)
    }

    /// Copy a backup back into place
    ///
    /// `target` defaults to the parent of the original source. Existing
    /// top-level entries block the restore unless `force` is set.
    pub async fn restore(&self, id: &str, target: Option<&Path>, force: bool) -> Result<PathBuf> {
        let info = self.get(id).await?;
        let target = match target {
            Some(t) => t.to_path_buf(),
            None => info
                .source_path
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| {
                    Error::InvalidBackupMetadata(format!("{} has no parent directory", id))
                })?,
        };

        let data = self.backup_dir(id).join(DATA_DIR);
        let mut top_level = Vec::new();
        let mut entries = fs::read_dir(&data).await?;
        while let Some(entry) = entries.next_entry().await? {
            top_level.push(entry.file_name());
        }

        let conflicts: Vec<String> = top_level
            .iter()
            .filter(|name| std::fs::symlink_metadata(target.join(name)).is_ok())
            .map(|name| name.to_string_lossy().to_string())
            .collect();
        if !conflicts.is_empty() && !force {
            return Err(Error::RestoreConflict(conflicts));
        }

        fs::create_dir_all(&target).await?;
        for name in &top_level {
            let dest = target.join(name);
            match fs::symlink_metadata(&dest).await {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&dest).await?,
                Ok(_) => fs::remove_file(&dest).await?,
                Err(_) => {}
            }
            copy_path(&data.join(name), &dest).await?;
        }

        info!("Restored backup {} into {:?}", id, target);
        Ok(target)
    }

    /// Remove a backup and its metadata
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.get(id).await?;
        fs::remove_dir_all(self.backup_dir(id)).await?;
        debug!("Backup {} deleted", id);
        Ok(())
    }
}

/// Backups beyond the `keep` newest, in newest-first order
pub fn plan_cleanup(mut backups: Vec<BackupInfo>, keep: usize) -> Vec<BackupInfo> {
    if backups.len() <= keep {
        return Vec::new();
    }
    sort_newest_first(&mut backups);
    backups.split_off(keep)
}

fn sort_newest_first(backups: &mut [BackupInfo]) {
    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

/// Read a backup's metadata; the id must match its directory and encode its type
async fn read_metadata(dir: &Path) -> Result<BackupInfo> {
    let raw = fs::read(dir.join(METADATA_FILE)).await?;
    let info: BackupInfo =
        serde_json::from_slice(&raw).map_err(|e| Error::InvalidBackupMetadata(e.to_string()))?;

    let dir_name = dir.file_name().map(|n| n.to_string_lossy());
    if dir_name.as_deref() != Some(info.id.as_str()) {
        return Err(Error::InvalidBackupMetadata(format!(
            "id {} does not match directory {:?}",
            info.id, dir
        )));
    }
    match parse_backup_id(&info.id) {
        Some((kind, _)) if kind == info.kind => Ok(info),
        _ => Err(Error::InvalidBackupMetadata(format!(
            "malformed id {} for a {} backup",
            info.id, info.kind
        ))),
    }
}

fn tree_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

/// Copy a file, directory tree or symlink
///
/// Symlinks are recreated as links and never followed, so dangling or
/// cyclic links copy like any other entry.
async fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if fs::symlink_metadata(src).await?.file_type().is_symlink() {
        return copy_symlink(src, dst).await;
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::Internal(format!("Failed to read entry: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .await
                .map_err(|e| Error::Internal(format!("Failed to create directory: {}", e)))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target).await?;
        } else {
            fs::copy(entry.path(), &target)
                .await
                .map_err(|e| Error::Internal(format!("Failed to copy file: {}", e)))?;
        }
    }

    Ok(())
}

async fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src).await?;
    #[cfg(unix)]
    {
        fs::symlink(&link, dst)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create symlink: {}", e)))?;
    }
    #[cfg(not(unix))]
    {
        warn!("Skipping symlink {:?} -> {:?}", src, link);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                (rel, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }

    /// Write a backup directory by hand with a fixed timestamp
    fn seed_backup(root: &Path, minutes: i64) -> BackupInfo {
        let timestamp =
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        let info = BackupInfo {
            id: backup_id(BackupType::Manual, timestamp),
            kind: BackupType::Manual,
            timestamp,
            source_path: PathBuf::from("/tmp/source"),
            size: 0,
            description: None,
        };
        let dir = root.join(&info.id);
        std::fs::create_dir_all(dir.join(DATA_DIR)).unwrap();
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_vec(&info).unwrap()).unwrap();
        info
    }

    #[tokio::test]
    async fn test_create_copies_tree_and_records_metadata() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("facebook-react");
        write_tree(&source, &[("src/index.js", "console.log(1)"), ("README.md", "hi")]);

        let service = BackupService::new(work.path().join("backups"));
        let info = service
            .create(&source, BackupType::Destroy, Some("before remove".into()))
            .await
            .unwrap();

        assert!(info.id.starts_with("destroy-"));
        assert_eq!(info.size, 16);
        assert_eq!(info.description.as_deref(), Some("before remove"));

        let copied = service.root().join(&info.id).join("data/facebook-react");
        assert_eq!(snapshot(&copied), snapshot(&source));
        assert_eq!(service.get(&info.id).await.unwrap(), info);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_copied_as_links() {
        use std::os::unix::fs::symlink;

        let work = TempDir::new().unwrap();
        let source = work.path().join("app");
        write_tree(&source, &[("src/main.rs", "fn main() {}")]);
        symlink("/nonexistent/target", source.join("dangling")).unwrap();
        symlink("..", source.join("src/up")).unwrap();
        symlink("src/main.rs", source.join("entry")).unwrap();

        let service = BackupService::new(work.path().join("backups"));
        let info = service.create(&source, BackupType::Manual, None).await.unwrap();
        assert_eq!(info.size, 12);

        let copied = service.root().join(&info.id).join("data/app");
        let link = |rel: &str| std::fs::read_link(copied.join(rel)).unwrap();
        assert_eq!(link("dangling"), PathBuf::from("/nonexistent/target"));
        assert_eq!(link("src/up"), PathBuf::from(".."));
        assert_eq!(link("entry"), PathBuf::from("src/main.rs"));

        std::fs::remove_dir_all(&source).unwrap();
        service.restore(&info.id, None, false).await.unwrap();
        assert_eq!(
            std::fs::read_link(source.join("dangling")).unwrap(),
            PathBuf::from("/nonexistent/target")
        );
        assert_eq!(
            std::fs::read_to_string(source.join("entry")).unwrap(),
            "fn main() {}"
        );
    }

    #[tokio::test]
    async fn test_create_rejects_source_containing_backups() {
        let work = TempDir::new().unwrap();
        let home = work.path().join("home");
        write_tree(&home, &[("codespaces/a/file.txt", "x")]);

        let service = BackupService::new(home.join("backups"));
        let result = service.create(&home, BackupType::Manual, None).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(service.list().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(home.join("backups")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_create_missing_source_fails() {
        let work = TempDir::new().unwrap();
        let service = BackupService::new(work.path().join("backups"));
        let result = service
            .create(&work.path().join("nope"), BackupType::Manual, None)
            .await;
        assert!(matches!(result, Err(Error::BackupSourceMissing(_))));
        assert!(!service.root().exists());
    }

    #[tokio::test]
    async fn test_back_to_back_backups_get_distinct_ids() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("proj");
        write_tree(&source, &[("a", "1")]);
        let service = BackupService::new(work.path().join("backups"));

        let first = service.create(&source, BackupType::Manual, None).await.unwrap();
        let second = service.create(&source, BackupType::Manual, None).await.unwrap();
        assert_ne!(first.id, second.id);

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest() {
        let work = TempDir::new().unwrap();
        let root = work.path().join("backups");
        // Seed out of order so listing has to sort
        let seeded: Vec<BackupInfo> = [3, 7, 0, 5, 1, 6, 2, 4]
            .into_iter()
            .map(|m| seed_backup(&root, m))
            .collect();
        let service = BackupService::new(&root);

        let mut oldest: Vec<String> = seeded
            .iter()
            .filter(|b| b.timestamp < Utc.with_ymd_and_hms(2026, 5, 1, 12, 3, 0).unwrap())
            .map(|b| b.id.clone())
            .collect();
        oldest.sort();

        let planned = service.cleanup_old(5, true).await.unwrap();
        let mut planned_ids: Vec<String> = planned.iter().map(|b| b.id.clone()).collect();
        planned_ids.sort();
        assert_eq!(planned_ids, oldest);
        assert_eq!(service.list().await.unwrap().len(), 8, "dry run must not delete");

        let deleted = service.cleanup_old(5, false).await.unwrap();
        let mut deleted_ids: Vec<String> = deleted.iter().map(|b| b.id.clone()).collect();
        deleted_ids.sort();
        assert_eq!(deleted_ids, oldest);

        let remaining = service.list().await.unwrap();
        assert_eq!(remaining.len(), 5);
        assert!(remaining.iter().all(|b| !oldest.contains(&b.id)));
    }

    #[tokio::test]
    async fn test_cleanup_noop_when_under_limit() {
        let work = TempDir::new().unwrap();
        let root = work.path().join("backups");
        seed_backup(&root, 0);
        seed_backup(&root, 1);
        let service = BackupService::new(&root);

        assert!(service.cleanup_old(2, false).await.unwrap().is_empty());
        assert!(service.cleanup_old(10, false).await.unwrap().is_empty());
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_refuses_existing_target() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("codespaces/app");
        write_tree(&source, &[("main.go", "package main")]);
        let service = BackupService::new(work.path().join("backups"));
        let info = service.create(&source, BackupType::Manual, None).await.unwrap();

        std::fs::write(source.join("main.go"), "package changed").unwrap();
        std::fs::write(source.join("new.txt"), "new").unwrap();
        let before = snapshot(&work.path().join("codespaces"));

        let result = service.restore(&info.id, None, false).await;
        assert!(matches!(
            result,
            Err(Error::RestoreConflict(ref c)) if c == &vec!["app".to_string()]
        ));
        assert_eq!(snapshot(&work.path().join("codespaces")), before);
    }

    #[tokio::test]
    async fn test_restore_force_overwrites() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("codespaces/app");
        write_tree(&source, &[("main.go", "package main")]);
        let service = BackupService::new(work.path().join("backups"));
        let info = service.create(&source, BackupType::Manual, None).await.unwrap();

        std::fs::write(source.join("main.go"), "package changed").unwrap();
        std::fs::write(source.join("stray.txt"), "x").unwrap();

        let target = service.restore(&info.id, None, true).await.unwrap();
        assert_eq!(target, fs::canonicalize(work.path().join("codespaces")).await.unwrap());
        assert_eq!(std::fs::read_to_string(source.join("main.go")).unwrap(), "package main");
        assert!(!source.join("stray.txt").exists());
    }

    #[tokio::test]
    async fn test_restore_into_explicit_target() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("app");
        write_tree(&source, &[("a/b.txt", "deep")]);
        let service = BackupService::new(work.path().join("backups"));
        let info = service.create(&source, BackupType::Install, None).await.unwrap();

        let target = work.path().join("elsewhere");
        service.restore(&info.id, Some(&target), false).await.unwrap();
        assert_eq!(std::fs::read_to_string(target.join("app/a/b.txt")).unwrap(), "deep");
    }

    #[tokio::test]
    async fn test_list_skips_mismatched_metadata() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("backups");
        let good = seed_backup(&root, 0);
        let moved = seed_backup(&root, 1);
        std::fs::rename(root.join(&moved.id), root.join("manual-copy")).unwrap();

        let service = BackupService::new(&root);
        let listed = service.list().await.unwrap();
        assert_eq!(listed, vec![good]);
        assert!(matches!(
            service.get("manual-copy").await,
            Err(Error::InvalidBackupMetadata(_))
        ));
    }

    #[tokio::test]
    async fn test_dot_ids_are_not_backups() {
        let work = TempDir::new().unwrap();
        let root = work.path().join("backups");
        let info = seed_backup(&root, 0);
        // Metadata files next to and above the root must never be picked up
        std::fs::write(root.join(METADATA_FILE), serde_json::to_vec(&info).unwrap()).unwrap();
        std::fs::write(work.path().join(METADATA_FILE), serde_json::to_vec(&info).unwrap())
            .unwrap();
        let service = BackupService::new(&root);

        for id in [".", "..", "", "/", "../backups"] {
            assert!(
                matches!(service.delete(id).await, Err(Error::BackupNotFound(_))),
                "delete {:?}",
                id
            );
        }
        assert!(root.join(&info.id).is_dir());
        assert_eq!(service.list().await.unwrap(), vec![info]);
    }

    #[tokio::test]
    async fn test_delete_unknown_backup_errors() {
        let work = TempDir::new().unwrap();
        let root = work.path().join("backups");
        let info = seed_backup(&root, 0);
        let service = BackupService::new(&root);

        assert!(matches!(
            service.delete("manual-19990101-000000000").await,
            Err(Error::BackupNotFound(_))
        ));
        service.delete(&info.id).await.unwrap();
        assert!(matches!(
            service.delete(&info.id).await,
            Err(Error::BackupNotFound(_))
        ));
    }

    #[test]
    fn test_plan_cleanup_is_pure() {
        let dir = TempDir::new().unwrap();
        let backups: Vec<BackupInfo> = (0..3).map(|m| seed_backup(dir.path(), m)).collect();
        let planned = plan_cleanup(backups, 1);
        assert_eq!(planned.len(), 2);
        assert!(planned[0].timestamp > planned[1].timestamp);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
