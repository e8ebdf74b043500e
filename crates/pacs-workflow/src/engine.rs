//! 检查生命周期引擎
//!
//! 持有活动跟踪器、静默扫描和队列处理两个周期任务。跟踪器在进程启动时创建一次，
//! 显式共享给实例写入器和扫描器。

use crate::queue::{QueueProcessor, StudyProcessor};
use crate::scanner::StalenessScanner;
use crate::scheduler::PeriodicTask;
use pacs_core::{Clock, PacsError, Result};
use pacs_storage::{ActivityTracker, InstanceWriter, StorageManager, StoreLayout};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// 静默扫描周期
    pub scan_interval: Duration,
    /// 检查被视为接收完成的静默期
    pub quiet_period: Duration,
    /// 队列处理周期
    pub queue_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(20),
            quiet_period: Duration::from_secs(120),
            queue_interval: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval.is_zero() || self.queue_interval.is_zero() {
            return Err(PacsError::Config("task intervals must be positive".to_string()));
        }
        if self.quiet_period < self.scan_interval {
            return Err(PacsError::Config(format!(
                "quiet period ({:?}) is shorter than the scan interval ({:?})",
                self.quiet_period, self.scan_interval
            )));
        }
        Ok(())
    }
}

/// 检查生命周期引擎
#[derive(Debug, Clone)]
pub struct StudyEngine {
    storage: StorageManager,
    tracker: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    quiet_period: chrono::Duration,
}

impl StudyEngine {
    pub fn new(layout: StoreLayout, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let quiet_period = chrono::Duration::from_std(config.quiet_period)
            .map_err(|e| PacsError::Config(format!("invalid quiet period: {e}")))?;

        Ok(Self {
            storage: StorageManager::new(layout),
            tracker: Arc::new(ActivityTracker::new()),
            clock,
            config,
            quiet_period,
        })
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn tracker(&self) -> Arc<ActivityTracker> {
        self.tracker.clone()
    }

    /// 共享同一跟踪器的实例写入器
    pub fn writer(&self) -> InstanceWriter {
        InstanceWriter::new(self.storage.clone(), self.tracker.clone(), self.clock.clone())
    }

    pub fn scanner(&self) -> StalenessScanner {
        StalenessScanner::new(
            self.storage.clone(),
            self.tracker.clone(),
            self.clock.clone(),
            self.quiet_period,
        )
    }

    pub fn queue_processor(&self, processor: Arc<dyn StudyProcessor>) -> QueueProcessor {
        QueueProcessor::new(self.storage.clone(), processor)
    }

    /// 创建阶段目录，登记遗留检查并启动两个周期任务
    pub async fn start(&self, processor: Arc<dyn StudyProcessor>) -> Result<EngineHandle> {
        self.storage.ensure_stage_dirs().await?;

        let scanner = self.scanner();
        scanner.seed_from_disk().await?;

        let token = CancellationToken::new();
        let tasks = vec![
            PeriodicTask::new(self.config.scan_interval).spawn(Arc::new(scanner), token.clone()),
            PeriodicTask::new(self.config.queue_interval)
                .spawn(Arc::new(self.queue_processor(processor)), token.clone()),
        ];

        info!(
            root = %self.storage.layout().root().display(),
            scan_interval_secs = self.config.scan_interval.as_secs_f64(),
            quiet_period_secs = self.config.quiet_period.as_secs_f64(),
            queue_interval_secs = self.config.queue_interval.as_secs_f64(),
            "Study engine started"
        );

        Ok(EngineHandle { token, tasks })
    }
}

/// 运行中引擎的句柄
#[derive(Debug)]
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 停止周期任务并等待其结束
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Periodic task terminated abnormally");
            }
        }
        info!("Study engine stopped");
    }
}
