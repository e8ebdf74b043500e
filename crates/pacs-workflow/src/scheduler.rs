//! 周期任务调度
//!
//! 每个周期任务由引擎持有，可启动、取消并等待结束。任务本身的失败只记录日志，
//! 下一个周期照常执行。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 周期执行的作业
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// 执行一轮，错误由作业自身记录
    async fn run_once(&self);
}

/// 周期任务
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    period: Duration,
}

impl PeriodicTask {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// 启动任务，首轮在一个周期之后执行
    pub fn spawn(&self, job: Arc<dyn ScheduledJob>, token: CancellationToken) -> JoinHandle<()> {
        let period = self.period;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                task = job.name(),
                period_secs = period.as_secs_f64(),
                "Periodic task started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = ticker.tick() => {
                        debug!(task = job.name(), "Running periodic task");
                        job.run_once().await;
                    }
                }
            }

            info!(task = job.name(), "Periodic task stopped");
        })
    }
}
