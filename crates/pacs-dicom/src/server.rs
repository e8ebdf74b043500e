//! DICOM服务端
//!
//! 网络传输、关联协商由外部协议适配层负责。适配层把每个 C-STORE / C-ECHO
//! 事件通过通道交给 [`DicomServer::serve`]，每个事件一个任务，并发数受
//! `max_associations` 限制。本进程不监听端口，`port` 与 `ae_title` 只供适配层使用。

use crate::parser::DicomParser;
use crate::services::{CommandField, DimseRequest, DimseResponse, DimseStatus, ServiceManager};
use pacs_core::Result;
use pacs_storage::InstanceWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// DICOM服务器配置
#[derive(Debug, Clone)]
pub struct DicomServerConfig {
    pub ae_title: String,      // 应用实体标题
    pub port: u16,             // 监听端口（由协议适配层使用）
    pub max_associations: u32, // 最大并发事件数
}

impl Default for DicomServerConfig {
    fn default() -> Self {
        Self {
            ae_title: "PACS_SERVER".to_string(),
            port: 11112,
            max_associations: 100,
        }
    }
}

/// 协议适配层投递的事件
#[derive(Debug)]
pub struct AdapterEvent {
    pub request: DimseRequest,
    pub reply: oneshot::Sender<DimseResponse>,
}

/// 导入结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub stored: usize,
    pub failed: usize,
}

/// DICOM服务器
#[derive(Debug, Clone)]
pub struct DicomServer {
    config: DicomServerConfig,
    services: Arc<ServiceManager>,
    limiter: Arc<Semaphore>,
}

impl DicomServer {
    /// 创建新的DICOM服务器
    pub fn new(config: DicomServerConfig, writer: InstanceWriter) -> Self {
        let permits = config.max_associations.max(1) as usize;
        Self {
            config,
            services: Arc::new(ServiceManager::with_store(writer)),
            limiter: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn config(&self) -> &DicomServerConfig {
        &self.config
    }

    /// 处理单个请求
    pub async fn handle(&self, request: DimseRequest) -> DimseResponse {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return DimseResponse {
                    command_field: request.command_field,
                    message_id_being_responded_to: request.message_id,
                    status: DimseStatus::Failure(DimseStatus::PROCESSING_FAILURE),
                    affected_sop_class_uid: request.affected_sop_class_uid,
                }
            }
        };
        self.services.handle_request(request).await
    }

    /// 接收适配层事件直到通道关闭或收到取消信号
    ///
    /// 返回前等待所有已接收的事件处理完毕。
    pub async fn serve(&self, mut events: mpsc::Receiver<AdapterEvent>, token: CancellationToken) {
        info!(
            ae_title = %self.config.ae_title,
            port = self.config.port,
            max_associations = self.config.max_associations,
            "DICOM event intake started"
        );

        let mut tasks = JoinSet::new();

        loop {
            // 回收已完成的任务
            while let Some(res) = tasks.try_join_next() {
                log_join_error(res);
            }

            let event = tokio::select! {
                biased;

                _ = token.cancelled() => break,

                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let server = self.clone();
            tasks.spawn(async move {
                let response = server.handle(event.request).await;
                if event.reply.send(response).is_err() {
                    debug!("Adapter dropped reply channel");
                }
            });
        }

        if !tasks.is_empty() {
            info!(pending = tasks.len(), "Waiting for in-flight DICOM events");
        }
        while let Some(res) = tasks.join_next().await {
            log_join_error(res);
        }

        info!("DICOM event intake stopped");
    }

    /// 把目录中的 Part-10 文件按 C-STORE 流程导入
    pub async fn import_dir(&self, dir: &Path) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        for path in collect_files(dir).await? {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read file");
                    summary.failed += 1;
                    continue;
                }
            };

            // 非 DICOM 文件直接跳过，不计入失败
            if !DicomParser::has_part10_magic(&data) {
                debug!(path = %path.display(), "Skipping non-DICOM file");
                continue;
            }

            let response = self
                .handle(DimseRequest {
                    command_field: CommandField::CStore,
                    message_id: 0,
                    affected_sop_class_uid: String::new(),
                    dataset: Some(data),
                })
                .await;

            if response.status == DimseStatus::Success {
                summary.stored += 1;
            } else {
                error!(
                    path = %path.display(),
                    status = response.status.code(),
                    "Failed to import file"
                );
                summary.failed += 1;
            }
        }

        info!(stored = summary.stored, failed = summary.failed, "Import completed");
        Ok(summary)
    }
}

fn log_join_error(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        error!(error = %e, "DICOM event task failed");
    }
}

/// 递归列出目录下的文件
async fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
