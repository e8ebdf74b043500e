//! 核心数据模型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 检查标识：(患者ID, 检查号)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyKey {
    pub patient_id: String,
    pub accession_number: String,
}

impl StudyKey {
    pub fn new(patient_id: impl Into<String>, accession_number: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            accession_number: accession_number.into(),
        }
    }
}

impl fmt::Display for StudyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.patient_id, self.accession_number)
    }
}

/// 检查生命周期状态，只能向前转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyState {
    Receiving,  // 接收中
    Queued,     // 静默期已过，等待处理
    Processing, // 处理中
    Processed,  // 已处理（终态）
}

impl StudyState {
    /// 该状态对应的存储目录名，处理中状态没有独立目录
    pub fn stage_dir(&self) -> Option<&'static str> {
        match self {
            StudyState::Receiving => Some("received"),
            StudyState::Queued => Some("queue"),
            StudyState::Processing => None,
            StudyState::Processed => Some("processed"),
        }
    }
}

impl fmt::Display for StudyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 影像实例的标识属性，只用于计算存储路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAttributes {
    pub patient_id: String,
    pub accession_number: String,
    pub series_number: Option<i32>,
    pub series_description: Option<String>,
    pub sop_instance_uid: String,
}

impl InstanceAttributes {
    pub fn study_key(&self) -> StudyKey {
        StudyKey::new(self.patient_id.clone(), self.accession_number.clone())
    }
}

/// 接收到的影像实例，内容原样持久化
#[derive(Debug, Clone)]
pub struct Instance {
    pub attributes: InstanceAttributes,
    pub content: Vec<u8>,
}

/// C-STORE 返回状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Success,
    /// 缺少必要的标识属性
    CannotUnderstand,
    CannotCreateDestination,
    /// 目录已创建但文件写入失败
    OutOfResources,
}

impl StoreStatus {
    /// DIMSE 状态码
    pub fn code(&self) -> u16 {
        match self {
            StoreStatus::Success => 0x0000,
            StoreStatus::CannotUnderstand => 0xC000,
            StoreStatus::CannotCreateDestination => 0xC001,
            StoreStatus::OutOfResources => 0xA700,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StoreStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StoreStatus::Success.code(), 0x0000);
        assert_eq!(StoreStatus::CannotCreateDestination.code(), 0xC001);
        assert!(!StoreStatus::OutOfResources.is_success());
    }

    #[test]
    fn test_stage_dirs() {
        assert_eq!(StudyState::Receiving.stage_dir(), Some("received"));
        assert_eq!(StudyState::Queued.stage_dir(), Some("queue"));
        assert_eq!(StudyState::Processing.stage_dir(), None);
        assert_eq!(StudyState::Processed.stage_dir(), Some("processed"));
    }
}
