//! PACS服务器主程序
//!
//! 启动检查生命周期引擎，接入 DICOM 事件，收到 Ctrl-C 后停止周期任务。

mod config;

use crate::config::ServerSettings;
use anyhow::{Context, Result};
use clap::Parser;
use pacs_core::SystemClock;
use pacs_dicom::DicomServer;
use pacs_storage::StoreLayout;
use pacs_workflow::{LoggingProcessor, StudyEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// PACS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "pacs-server")]
#[command(about = "DICOM 接收服务：按检查归档实例，静默期后移入处理队列")]
struct Args {
    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// AE标题 (Application Entity Title)
    #[arg(short, long, env = "AE_TITLE")]
    ae_title: Option<String>,

    /// DICOM文件存储根目录
    #[arg(short, long)]
    storage_dir: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// 启动后导入该目录中的 DICOM 文件
    #[arg(short, long)]
    import: Option<PathBuf>,
}

impl Args {
    fn apply(&self, settings: &mut ServerSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ae_title) = &self.ae_title {
            settings.server.ae_title = ae_title.clone();
        }
        if let Some(storage_dir) = &self.storage_dir {
            settings.storage.root = storage_dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动PACS服务器...");

    let mut settings = ServerSettings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    settings.validate()?;

    info!("PACS服务器配置:");
    info!("  AE标题: {}", settings.server.ae_title);
    info!("  监听端口: {}", settings.server.port);
    info!("  存储目录: {}", settings.storage.root);

    let engine = StudyEngine::new(
        StoreLayout::new(&settings.storage.root),
        settings.engine_config(),
        Arc::new(SystemClock),
    )?;
    let handle = engine
        .start(Arc::new(LoggingProcessor))
        .await
        .context("Failed to start study engine")?;

    let server = DicomServer::new(settings.dicom_config(), engine.writer());
    if let Some(dir) = &args.import {
        server
            .import_dir(dir)
            .await
            .with_context(|| format!("Failed to import {}", dir.display()))?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    handle.shutdown().await;
    Ok(())
}
