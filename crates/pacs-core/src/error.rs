//! 错误定义模块

use crate::models::StudyKey;
use std::path::PathBuf;
use thiserror::Error;

/// PACS系统统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("DICOM解析错误: {0}")]
    DicomParseError(String),

    #[error("无效实例: {0}")]
    InvalidInstance(String),

    #[error("无法创建目标目录 {path:?}: {source}")]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("检查 {key} 迁移失败: {source}")]
    MigrationFailed {
        key: StudyKey,
        #[source]
        source: std::io::Error,
    },

    #[error("检查 {key} 处理失败: {reason}")]
    ProcessingFailed { key: StudyKey, reason: String },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// PACS系统统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
