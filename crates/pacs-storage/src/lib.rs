//! # PACS存储模块
//!
//! 负责接收区、队列区、已处理区的目录布局，实例写入和检查活动跟踪。

pub mod layout;
pub mod storage;
pub mod tracker;
pub mod writer;

pub use layout::StoreLayout;
pub use storage::{CleanupOutcome, MoveOutcome, StorageManager};
pub use tracker::ActivityTracker;
pub use writer::InstanceWriter;
