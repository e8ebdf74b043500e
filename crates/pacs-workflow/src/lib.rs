//! # PACS工作流模块
//!
//! 检查生命周期管理：
//! - 检查状态机：Receiving → Queued → Processing → Processed，只能向前
//! - 静默扫描：静默期后把检查从接收区迁移到队列区
//! - 队列处理：把队列中的检查交给处理扩展点，成功后迁移到已处理区
//! - 引擎：持有周期任务，可启动、停止并等待

pub mod engine;
pub mod queue;
pub mod scanner;
pub mod scheduler;
pub mod state_machine;

// 重新导出主要类型
pub use engine::{EngineConfig, EngineHandle, StudyEngine};
pub use queue::{LoggingProcessor, QueueProcessor, QueueReport, StudyProcessor, StudySnapshot};
pub use scanner::{ScanReport, StalenessScanner};
pub use scheduler::{PeriodicTask, ScheduledJob};
pub use state_machine::StudyStateMachine;
