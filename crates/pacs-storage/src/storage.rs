//! 影像存储管理
//!
//! 所有文件系统操作集中在这里：幂等建目录、原样写入、整检查迁移和父目录清理。

use crate::layout::StoreLayout;
use pacs_core::{PacsError, Result, StudyKey, StudyState};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 迁移结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// 整个目录树一次重命名
    Moved,
    /// 目标已存在，逐文件合并
    Merged,
    /// 源目录不存在，无需迁移
    SourceMissing,
}

/// 父目录清理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    /// 仍有同一患者的其他检查
    NonEmpty,
    Missing,
}

/// 存储管理器
#[derive(Debug, Clone)]
pub struct StorageManager {
    layout: StoreLayout,
}

impl StorageManager {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// 创建三个阶段目录
    pub async fn ensure_stage_dirs(&self) -> Result<()> {
        for state in [StudyState::Receiving, StudyState::Queued, StudyState::Processed] {
            if let Some(dir) = self.layout.stage_root(state) {
                self.create_dir_all(&dir).await?;
            }
        }
        Ok(())
    }

    /// 创建目录（已存在不视为错误，并发创建同一路径安全）
    pub async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| PacsError::DestinationUnwritable {
                path: path.to_path_buf(),
                source,
            })
    }

    /// 存储DICOM文件
    pub async fn store_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// 将检查目录从一个阶段迁移到另一个阶段
    pub async fn move_study(
        &self,
        key: &StudyKey,
        from: StudyState,
        to: StudyState,
    ) -> Result<MoveOutcome> {
        let (source, target) = match (
            self.layout.study_dir(from, key),
            self.layout.study_dir(to, key),
        ) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(PacsError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
        };

        let migration_err = |source| PacsError::MigrationFailed {
            key: key.clone(),
            source,
        };

        // 只有确认不存在才算无需迁移，检查本身出错按迁移失败处理
        if !tokio::fs::try_exists(&source).await.map_err(migration_err)? {
            return Ok(MoveOutcome::SourceMissing);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(migration_err)?;
        }

        if tokio::fs::try_exists(&target).await.map_err(migration_err)? {
            merge_tree(&source, &target).await.map_err(migration_err)?;
            return Ok(MoveOutcome::Merged);
        }

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => Ok(MoveOutcome::Moved),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(MoveOutcome::SourceMissing),
            Err(e) => Err(migration_err(e)),
        }
    }

    /// 尝试删除某阶段下的患者目录，非空视为正常情况
    pub async fn cleanup_patient_dir(
        &self,
        state: StudyState,
        patient_id: &str,
    ) -> Result<CleanupOutcome> {
        let Some(dir) = self.layout.patient_dir(state, patient_id) else {
            return Ok(CleanupOutcome::Missing);
        };

        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => Ok(CleanupOutcome::Removed),
            Err(e) if is_not_empty(&e) => Ok(CleanupOutcome::NonEmpty),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CleanupOutcome::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// 列出某阶段下的所有检查
    pub async fn list_studies(&self, state: StudyState) -> Result<Vec<StudyKey>> {
        let Some(stage_root) = self.layout.stage_root(state) else {
            return Ok(Vec::new());
        };

        let mut studies = Vec::new();
        for (patient_id, patient_dir) in list_subdirs(&stage_root).await? {
            for (accession_number, _) in list_subdirs(&patient_dir).await? {
                studies.push(StudyKey::new(patient_id.clone(), accession_number));
            }
        }
        studies.sort();
        Ok(studies)
    }

    /// 检查目录下的全部文件（递归，按路径排序）
    pub async fn study_files(&self, state: StudyState, key: &StudyKey) -> Result<Vec<PathBuf>> {
        let Some(root) = self.layout.study_dir(state, key) else {
            return Ok(Vec::new());
        };

        let mut files = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_not_empty(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::DirectoryNotEmpty
}

/// 列出目录下的子目录（目录不存在时返回空）
async fn list_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut subdirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => subdirs.push((name, entry.path())),
            Err(name) => warn!(name = ?name, "Skipping directory with non UTF-8 name"),
        }
    }
    Ok(subdirs)
}

/// 把 `source` 合并进已存在的 `target`，同名文件被覆盖
async fn merge_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    let mut visited = Vec::new();
    let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];

    while let Some((src_dir, dst_dir)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&src_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let src = entry.path();
            let dst = dst_dir.join(entry.file_name());
            let is_dir = entry.file_type().await?.is_dir();

            if is_dir && tokio::fs::try_exists(&dst).await? {
                pending.push((src, dst));
            } else {
                tokio::fs::rename(&src, &dst).await?;
            }
        }
        visited.push(src_dir);
    }

    // 子目录在后，逆序删除；仍有新写入的目录保留
    for dir in visited.iter().rev() {
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            debug!(path = %dir.display(), error = %e, "Leaving source directory after merge");
        }
    }
    Ok(())
}
