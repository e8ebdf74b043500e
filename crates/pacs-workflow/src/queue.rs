//! 队列处理
//!
//! 周期性检查 `queue/` 下的检查，交给处理扩展点；成功后迁移到 `processed/`，
//! 失败则留在队列区，下一轮重试（至少一次语义）。

use crate::scheduler::ScheduledJob;
use crate::state_machine::StudyStateMachine;
use async_trait::async_trait;
use pacs_core::{PacsError, Result, StudyKey, StudyState};
use pacs_storage::StorageManager;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 交给处理扩展点的检查快照
#[derive(Debug, Clone)]
pub struct StudySnapshot {
    pub key: StudyKey,
    /// 检查在队列区的根目录
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
}

/// 检查处理扩展点
#[async_trait]
pub trait StudyProcessor: Send + Sync {
    /// 处理一个检查，返回错误时检查留在队列区
    async fn process(&self, study: &StudySnapshot) -> Result<()>;
}

/// 默认处理器：只记录日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl StudyProcessor for LoggingProcessor {
    async fn process(&self, study: &StudySnapshot) -> Result<()> {
        info!(
            study = %study.key,
            files = study.files.len(),
            root = %study.root.display(),
            "Processing study"
        );
        Ok(())
    }
}

/// 一轮队列处理的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueReport {
    pub processed: Vec<StudyKey>,
    pub failed: Vec<StudyKey>,
}

/// 队列处理器
#[derive(Clone)]
pub struct QueueProcessor {
    storage: StorageManager,
    processor: Arc<dyn StudyProcessor>,
    state_machine: StudyStateMachine,
}

impl std::fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl QueueProcessor {
    pub fn new(storage: StorageManager, processor: Arc<dyn StudyProcessor>) -> Self {
        Self {
            storage,
            processor,
            state_machine: StudyStateMachine::new(),
        }
    }

    /// 处理队列区中的所有检查
    pub async fn process_queue(&self) -> Result<QueueReport> {
        let mut report = QueueReport::default();

        for key in self.storage.list_studies(StudyState::Queued).await? {
            match self.process_study(&key).await {
                Ok(()) => report.processed.push(key),
                Err(e) => {
                    warn!(study = %key, error = %e, "Study left in queue for retry");
                    report.failed.push(key);
                }
            }
        }

        Ok(report)
    }

    async fn process_study(&self, key: &StudyKey) -> Result<()> {
        let processing = self
            .state_machine
            .transition(StudyState::Queued, StudyState::Processing)?;

        let root = self
            .storage
            .layout()
            .study_dir(StudyState::Queued, key)
            .ok_or_else(|| PacsError::Config("queue area is not configured".to_string()))?;
        let snapshot = StudySnapshot {
            key: key.clone(),
            files: self.storage.study_files(StudyState::Queued, key).await?,
            root,
        };

        debug!(study = %key, state = %processing, "Dispatching study to processor");
        self.processor
            .process(&snapshot)
            .await
            .map_err(|e| match e {
                PacsError::ProcessingFailed { .. } => e,
                other => PacsError::ProcessingFailed {
                    key: key.clone(),
                    reason: other.to_string(),
                },
            })?;

        let processed = self
            .state_machine
            .transition(processing, StudyState::Processed)?;
        self.storage
            .move_study(key, StudyState::Queued, processed)
            .await?;
        info!(study = %key, "Study processed");

        match self
            .storage
            .cleanup_patient_dir(StudyState::Queued, &key.patient_id)
            .await
        {
            Ok(_) => {}
            Err(e) => warn!(
                patient_id = %key.patient_id,
                error = %e,
                "Failed to remove patient directory from queue"
            ),
        }

        Ok(())
    }
}

#[async_trait]
impl ScheduledJob for QueueProcessor {
    fn name(&self) -> &'static str {
        "queue-processor"
    }

    async fn run_once(&self) {
        match self.process_queue().await {
            Ok(report) if report.processed.is_empty() && report.failed.is_empty() => {
                debug!("Queue empty");
            }
            Ok(report) => info!(
                processed = report.processed.len(),
                failed = report.failed.len(),
                "Queue run completed"
            ),
            Err(e) => error!(error = %e, "Failed to read queue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacs_storage::StoreLayout;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 第一次调用失败，之后成功
    struct FlakyProcessor {
        calls: AtomicUsize,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl StudyProcessor for FlakyProcessor {
        async fn process(&self, study: &StudySnapshot) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(PacsError::ProcessingFailed {
                    key: study.key.clone(),
                    reason: "downstream unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    async fn write(path: &Path, data: &[u8]) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, data).await.unwrap();
    }

    #[tokio::test]
    async fn test_processed_study_moves_out_of_queue() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::new(StoreLayout::new(dir.path()));
        write(&dir.path().join("queue/P1/A1/03_Chest/1.2.3.dcm"), b"abc").await;

        let queue = QueueProcessor::new(storage, Arc::new(LoggingProcessor));
        let report = queue.process_queue().await.unwrap();

        assert_eq!(report.processed, vec![StudyKey::new("P1", "A1")]);
        assert!(!dir.path().join("queue/P1").exists());
        let data = tokio::fs::read(dir.path().join("processed/P1/A1/03_Chest/1.2.3.dcm"))
            .await
            .unwrap();
        assert_eq!(data, b"abc");
    }

    #[tokio::test]
    async fn test_failed_processing_is_retried() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::new(StoreLayout::new(dir.path()));
        write(&dir.path().join("queue/P1/A1/1.2.3.dcm"), b"abc").await;

        let processor = Arc::new(FlakyProcessor {
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(true),
        });
        let queue = QueueProcessor::new(storage, processor.clone());

        let first = queue.process_queue().await.unwrap();
        assert_eq!(first.failed, vec![StudyKey::new("P1", "A1")]);
        assert_eq!(
            tokio::fs::read(dir.path().join("queue/P1/A1/1.2.3.dcm")).await.unwrap(),
            b"abc"
        );
        assert!(!dir.path().join("processed/P1/A1").exists());

        let second = queue.process_queue().await.unwrap();
        assert_eq!(second.processed, vec![StudyKey::new("P1", "A1")]);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
        assert!(dir.path().join("processed/P1/A1/1.2.3.dcm").exists());
    }

    #[tokio::test]
    async fn test_snapshot_lists_all_files() {
        struct Capture(tokio::sync::Mutex<Vec<StudySnapshot>>);

        #[async_trait]
        impl StudyProcessor for Capture {
            async fn process(&self, study: &StudySnapshot) -> Result<()> {
                self.0.lock().await.push(study.clone());
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let storage = StorageManager::new(StoreLayout::new(dir.path()));
        write(&dir.path().join("queue/P1/A1/01/a.dcm"), b"a").await;
        write(&dir.path().join("queue/P1/A1/02/b.dcm"), b"b").await;

        let capture = Arc::new(Capture(tokio::sync::Mutex::new(Vec::new())));
        QueueProcessor::new(storage, capture.clone())
            .process_queue()
            .await
            .unwrap();

        let seen = capture.0.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].files.len(), 2);
        assert_eq!(seen[0].root, dir.path().join("queue/P1/A1"));
    }
}
