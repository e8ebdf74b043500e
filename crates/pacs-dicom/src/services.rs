//! DICOM服务实现
//!
//! 协议适配层把 C-STORE 和 C-ECHO 请求交给这里的服务，服务返回 DIMSE 状态码。

use crate::parser::DicomParser;
use async_trait::async_trait;
use pacs_core::{PacsError, Result, StoreStatus};
use pacs_storage::InstanceWriter;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Verification SOP Class
pub const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

/// DICOM服务特征
#[async_trait]
pub trait DicomService: Send + Sync {
    async fn handle_request(&self, request: DimseRequest) -> Result<DimseResponse>;
}

/// DICOM消息服务元素请求
#[derive(Debug, Clone)]
pub struct DimseRequest {
    pub command_field: CommandField,
    pub message_id: u16,
    pub affected_sop_class_uid: String,
    /// Part-10 编码的数据集（含文件元信息）
    pub dataset: Option<Vec<u8>>,
}

/// DICOM消息服务元素响应
#[derive(Debug, Clone)]
pub struct DimseResponse {
    pub command_field: CommandField,
    pub message_id_being_responded_to: u16,
    pub status: DimseStatus,
    pub affected_sop_class_uid: String,
}

impl DimseResponse {
    fn to(request: &DimseRequest, status: DimseStatus) -> Self {
        Self {
            command_field: request.command_field.clone(),
            message_id_being_responded_to: request.message_id,
            status,
            affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        }
    }
}

/// DICOM命令字段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandField {
    CStore,
    CEcho,
}

/// DIMSE状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    Success,
    Failure(u16),
}

impl DimseStatus {
    /// 不支持的操作
    pub const UNRECOGNIZED_OPERATION: u16 = 0x0211;
    /// 处理失败
    pub const PROCESSING_FAILURE: u16 = 0x0110;

    pub fn code(&self) -> u16 {
        match self {
            DimseStatus::Success => 0x0000,
            DimseStatus::Failure(code) => *code,
        }
    }
}

impl From<StoreStatus> for DimseStatus {
    fn from(status: StoreStatus) -> Self {
        match status {
            StoreStatus::Success => DimseStatus::Success,
            other => DimseStatus::Failure(other.code()),
        }
    }
}

/// C-ECHO服务：无条件确认
#[derive(Debug, Default, Clone, Copy)]
pub struct CEchoService;

#[async_trait]
impl DicomService for CEchoService {
    async fn handle_request(&self, request: DimseRequest) -> Result<DimseResponse> {
        debug!("处理C-ECHO请求");
        Ok(DimseResponse::to(&request, DimseStatus::Success))
    }
}

/// C-STORE服务
#[derive(Debug, Clone)]
pub struct CStoreService {
    writer: InstanceWriter,
}

impl CStoreService {
    pub fn new(writer: InstanceWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl DicomService for CStoreService {
    async fn handle_request(&self, request: DimseRequest) -> Result<DimseResponse> {
        let Some(dataset) = request.dataset.clone() else {
            warn!("C-STORE请求缺少数据集");
            return Ok(DimseResponse::to(
                &request,
                StoreStatus::CannotUnderstand.into(),
            ));
        };

        let status = match DicomParser::parse_bytes(dataset) {
            Ok(instance) => self.writer.write(&instance).await,
            Err(e @ (PacsError::DicomParseError(_) | PacsError::InvalidInstance(_))) => {
                warn!(error = %e, "Rejected C-STORE dataset");
                StoreStatus::CannotUnderstand
            }
            Err(e) => return Err(e),
        };

        Ok(DimseResponse::to(&request, status.into()))
    }
}

/// DICOM服务管理器
pub struct ServiceManager {
    services: HashMap<CommandField, Box<dyn DicomService>>,
}

impl ServiceManager {
    /// 创建只包含 C-ECHO 的服务管理器
    pub fn new() -> Self {
        let mut services = HashMap::new();
        services.insert(
            CommandField::CEcho,
            Box::new(CEchoService) as Box<dyn DicomService>,
        );
        Self { services }
    }

    /// 创建包含 C-ECHO 和 C-STORE 的服务管理器
    pub fn with_store(writer: InstanceWriter) -> Self {
        let mut manager = Self::new();
        manager.register_service(CommandField::CStore, Box::new(CStoreService::new(writer)));
        manager
    }

    pub fn register_service(&mut self, command: CommandField, service: Box<dyn DicomService>) {
        self.services.insert(command, service);
    }

    /// 分发请求，服务内部错误转换为失败状态
    pub async fn handle_request(&self, request: DimseRequest) -> DimseResponse {
        match self.services.get(&request.command_field) {
            Some(service) => match service.handle_request(request.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(command = ?request.command_field, error = %e, "DIMSE service failed");
                    DimseResponse::to(&request, DimseStatus::Failure(DimseStatus::PROCESSING_FAILURE))
                }
            },
            None => {
                warn!("不支持的命令: {:?}", request.command_field);
                DimseResponse::to(
                    &request,
                    DimseStatus::Failure(DimseStatus::UNRECOGNIZED_OPERATION),
                )
            }
        }
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("commands", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::encode_instance;
    use pacs_core::{ManualClock, StudyKey};
    use pacs_storage::{ActivityTracker, StorageManager, StoreLayout};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_request(dataset: Option<Vec<u8>>) -> DimseRequest {
        DimseRequest {
            command_field: CommandField::CStore,
            message_id: 7,
            affected_sop_class_uid: "1.2.840.10008.5.1.4.1.1.2".to_string(),
            dataset,
        }
    }

    fn manager(dir: &TempDir) -> (ServiceManager, Arc<ActivityTracker>) {
        let tracker = Arc::new(ActivityTracker::new());
        let writer = InstanceWriter::new(
            StorageManager::new(StoreLayout::new(dir.path())),
            tracker.clone(),
            Arc::new(ManualClock::default()),
        );
        (ServiceManager::with_store(writer), tracker)
    }

    #[tokio::test]
    async fn test_echo_always_succeeds() {
        let response = ServiceManager::new()
            .handle_request(DimseRequest {
                command_field: CommandField::CEcho,
                message_id: 1,
                affected_sop_class_uid: VERIFICATION_SOP_CLASS.to_string(),
                dataset: None,
            })
            .await;
        assert_eq!(response.status, DimseStatus::Success);
        assert_eq!(response.message_id_being_responded_to, 1);
    }

    #[tokio::test]
    async fn test_store_writes_instance() {
        let dir = TempDir::new().unwrap();
        let (manager, tracker) = manager(&dir);
        let data = encode_instance("P1", "A1", Some(("3", "Chest/Lateral")), "1.2.840.10");

        let response = manager.handle_request(store_request(Some(data.clone()))).await;

        assert_eq!(response.status.code(), 0x0000);
        let stored = tokio::fs::read(
            dir.path().join("received/P1/A1/03_Chest_Lateral/1.2.840.10.dcm"),
        )
        .await
        .unwrap();
        assert_eq!(stored, data);
        assert!(tracker.get(&StudyKey::new("P1", "A1")).await.is_some());
    }

    #[tokio::test]
    async fn test_store_without_dataset_fails() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let response = manager.handle_request(store_request(None)).await;
        assert_eq!(response.status.code(), 0xC000);
    }

    #[tokio::test]
    async fn test_store_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let (manager, tracker) = manager(&dir);
        tokio::fs::create_dir_all(dir.path().join("received")).await.unwrap();
        tokio::fs::write(dir.path().join("received/P1"), b"blocker").await.unwrap();

        let data = encode_instance("P1", "A1", None, "1.2.3");
        let response = manager.handle_request(store_request(Some(data))).await;

        assert_eq!(response.status, DimseStatus::Failure(0xC001));
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_unsupported_command() {
        let response = ServiceManager::new().handle_request(store_request(None)).await;
        assert_eq!(
            response.status,
            DimseStatus::Failure(DimseStatus::UNRECOGNIZED_OPERATION)
        );
    }
}
