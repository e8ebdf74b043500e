//! 静默检查扫描
//!
//! 周期性找出超过静默期没有新实例的检查，把整个检查目录从 `received/`
//! 迁移到 `queue/`，并从活动跟踪器中移除。

use crate::scheduler::ScheduledJob;
use crate::state_machine::StudyStateMachine;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pacs_core::utils::sanitize_component;
use pacs_core::{Clock, Result, StudyKey, StudyState};
use pacs_storage::{ActivityTracker, CleanupOutcome, MoveOutcome, StorageManager};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 一轮扫描的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// 已迁移到队列区的检查
    pub queued: Vec<StudyKey>,
    /// 迁移失败，留待下一轮
    pub failed: Vec<StudyKey>,
    /// 跟踪器中有记录但接收区已无目录
    pub missing: Vec<StudyKey>,
}

/// 静默检查扫描器
#[derive(Debug, Clone)]
pub struct StalenessScanner {
    storage: StorageManager,
    tracker: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
    quiet_period: Duration,
    state_machine: StudyStateMachine,
}

impl StalenessScanner {
    pub fn new(
        storage: StorageManager,
        tracker: Arc<ActivityTracker>,
        clock: Arc<dyn Clock>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            storage,
            tracker,
            clock,
            quiet_period,
            state_machine: StudyStateMachine::new(),
        }
    }

    /// 将上次运行遗留在接收区的检查登记为当前时间
    ///
    /// 遗留检查因此至少再等待一个完整静默期才会被迁移。
    pub async fn seed_from_disk(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut seeded = 0;
        for key in self.storage.list_studies(StudyState::Receiving).await? {
            // 目录名无法映射回自身的检查不登记，否则会被当作目录缺失丢弃
            if sanitize_component(&key.patient_id) != key.patient_id
                || sanitize_component(&key.accession_number) != key.accession_number
            {
                warn!(study = %key, "Skipping leftover study with unusable directory name");
                continue;
            }
            self.tracker.touch(key, now).await;
            seeded += 1;
        }
        if seeded > 0 {
            info!(count = seeded, "Seeded leftover studies from received area");
        }
        Ok(seeded)
    }

    /// 执行一轮扫描，单个检查的失败不影响其他检查
    pub async fn scan(&self) -> ScanReport {
        let stale = self.stale_studies().await;
        self.queue_studies(stale).await
    }

    /// 跟踪器快照中超过静默期的检查
    async fn stale_studies(&self) -> Vec<(StudyKey, DateTime<Utc>)> {
        let now = self.clock.now();
        self.tracker
            .snapshot()
            .await
            .into_iter()
            .filter(|(_, last)| now - *last >= self.quiet_period)
            .collect()
    }

    async fn queue_studies(&self, stale: Vec<(StudyKey, DateTime<Utc>)>) -> ScanReport {
        let mut report = ScanReport::default();

        for (key, last) in stale {
            match self.migrate(&key, last).await {
                Ok(MoveOutcome::SourceMissing) => report.missing.push(key),
                Ok(_) => report.queued.push(key),
                Err(e) => {
                    error!(study = %key, error = %e, "Failed to queue study");
                    report.failed.push(key);
                }
            }
        }

        report
    }

    async fn migrate(&self, key: &StudyKey, last: DateTime<Utc>) -> Result<MoveOutcome> {
        self.state_machine
            .transition(StudyState::Receiving, StudyState::Queued)?;

        // 失败时保留跟踪条目，下一轮重试
        let outcome = self
            .storage
            .move_study(key, StudyState::Receiving, StudyState::Queued)
            .await?;

        self.tracker.remove_if_unchanged(key, last).await;

        match outcome {
            MoveOutcome::SourceMissing => {
                debug!(study = %key, "No received directory for tracked study");
                return Ok(outcome);
            }
            MoveOutcome::Moved => info!(study = %key, "Study queued"),
            MoveOutcome::Merged => {
                warn!(study = %key, "Study queued into existing queue directory")
            }
        }

        match self
            .storage
            .cleanup_patient_dir(StudyState::Receiving, &key.patient_id)
            .await
        {
            Ok(CleanupOutcome::NonEmpty) => {
                debug!(patient_id = %key.patient_id, "Patient directory still holds other studies")
            }
            Ok(_) => {}
            Err(e) => warn!(
                patient_id = %key.patient_id,
                error = %e,
                "Failed to remove patient directory"
            ),
        }

        Ok(outcome)
    }
}

#[async_trait]
impl ScheduledJob for StalenessScanner {
    fn name(&self) -> &'static str {
        "staleness-scanner"
    }

    async fn run_once(&self) {
        let report = self.scan().await;
        if report.queued.is_empty() && report.failed.is_empty() {
            debug!("Scan completed, no stale studies");
        } else {
            info!(
                queued = report.queued.len(),
                failed = report.failed.len(),
                "Scan completed"
            );
        }
    }
}
