//! 实例写入
//!
//! 按属性计算路径，持久化实例并更新检查活动时间。

use crate::layout::StoreLayout;
use crate::storage::StorageManager;
use crate::tracker::ActivityTracker;
use pacs_core::utils::instance_file_name;
use pacs_core::{Clock, Instance, PacsError, Result, StoreStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 实例写入器，可被多个连接并发共享
#[derive(Debug, Clone)]
pub struct InstanceWriter {
    storage: StorageManager,
    tracker: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
}

impl InstanceWriter {
    pub fn new(
        storage: StorageManager,
        tracker: Arc<ActivityTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            tracker,
            clock,
        }
    }

    /// 写入实例并返回 C-STORE 状态
    pub async fn write(&self, instance: &Instance) -> StoreStatus {
        let attributes = &instance.attributes;
        match self.try_write(instance).await {
            Ok(path) => {
                debug!(path = %path.display(), "Stored instance");
                StoreStatus::Success
            }
            Err(PacsError::InvalidInstance(reason)) => {
                warn!(reason = %reason, "Rejected instance");
                StoreStatus::CannotUnderstand
            }
            Err(e @ PacsError::DestinationUnwritable { .. }) => {
                error!(
                    patient_id = %attributes.patient_id,
                    accession_number = %attributes.accession_number,
                    error = %e,
                    "Unable to create destination directory"
                );
                StoreStatus::CannotCreateDestination
            }
            Err(e) => {
                error!(
                    sop_instance_uid = %attributes.sop_instance_uid,
                    error = %e,
                    "Failed to write instance"
                );
                StoreStatus::OutOfResources
            }
        }
    }

    /// 写入实例，返回文件路径
    ///
    /// 目录创建成功后才更新活动时间，目录创建失败时不写任何内容。
    pub async fn try_write(&self, instance: &Instance) -> Result<PathBuf> {
        let attributes = &instance.attributes;
        if attributes.sop_instance_uid.trim().is_empty() {
            return Err(PacsError::InvalidInstance(
                "missing SOP Instance UID".to_string(),
            ));
        }

        let dir = self.storage.layout().instance_dir(attributes);
        self.storage.create_dir_all(&dir).await?;

        self.tracker
            .touch(StoreLayout::study_key(attributes), self.clock.now())
            .await;

        let path = dir.join(instance_file_name(&attributes.sop_instance_uid));
        self.storage.store_file(&path, &instance.content).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacs_core::{InstanceAttributes, ManualClock, StudyKey};
    use tempfile::TempDir;

    fn instance(accession: &str, series: Option<(i32, &str)>, uid: &str) -> Instance {
        Instance {
            attributes: InstanceAttributes {
                patient_id: "P1".to_string(),
                accession_number: accession.to_string(),
                series_number: series.map(|(n, _)| n),
                series_description: series.map(|(_, d)| d.to_string()),
                sop_instance_uid: uid.to_string(),
            },
            content: uid.as_bytes().to_vec(),
        }
    }

    fn writer(dir: &TempDir) -> (InstanceWriter, Arc<ActivityTracker>, Arc<ManualClock>) {
        let tracker = Arc::new(ActivityTracker::new());
        let clock = Arc::new(ManualClock::default());
        let storage = StorageManager::new(StoreLayout::new(dir.path()));
        (
            InstanceWriter::new(storage, tracker.clone(), clock.clone()),
            tracker,
            clock,
        )
    }

    #[tokio::test]
    async fn test_write_instance_at_deterministic_path() {
        let dir = TempDir::new().unwrap();
        let (writer, tracker, clock) = writer(&dir);
        let started = clock.now();

        let status = writer
            .write(&instance("A1", Some((3, "Chest/Lateral")), "1.2.840.10"))
            .await;

        assert_eq!(status, StoreStatus::Success);
        let path = dir.path().join("received/P1/A1/03_Chest_Lateral/1.2.840.10.dcm");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"1.2.840.10");

        let touched = tracker.get(&StudyKey::new("P1", "A1")).await.unwrap();
        assert!(touched >= started);
    }

    #[tokio::test]
    async fn test_sibling_instances_do_not_disturb_each_other() {
        let dir = TempDir::new().unwrap();
        let (writer, tracker, _) = writer(&dir);

        let first = writer.write(&instance("A1", Some((1, "Axial")), "1.2.3.1")).await;
        let second = writer.write(&instance("A1", Some((1, "Axial")), "1.2.3.2")).await;
        let third = writer.write(&instance("A1", None, "1.2.3.3")).await;

        assert!(first.is_success() && second.is_success() && third.is_success());
        let series = dir.path().join("received/P1/A1/01_Axial");
        assert!(series.join("1.2.3.1.dcm").exists());
        assert!(series.join("1.2.3.2.dcm").exists());
        assert!(dir.path().join("received/P1/A1/1.2.3.3.dcm").exists());
        assert_eq!(tracker.len().await, 1);
    }

    #[tokio::test]
    async fn test_unwritable_destination_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (writer, tracker, _) = writer(&dir);
        // 患者目录位置上是普通文件，目录无法创建
        tokio::fs::create_dir_all(dir.path().join("received")).await.unwrap();
        tokio::fs::write(dir.path().join("received/P1"), b"blocker").await.unwrap();

        let status = writer.write(&instance("A1", None, "1.2.3")).await;

        assert_eq!(status, StoreStatus::CannotCreateDestination);
        assert_eq!(status.code(), 0xC001);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_instance_uid_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (writer, tracker, _) = writer(&dir);

        let status = writer.write(&instance("A1", None, "  ")).await;

        assert_eq!(status, StoreStatus::CannotUnderstand);
        assert!(tracker.is_empty().await);
        assert!(!dir.path().join("received").exists());
    }
}
