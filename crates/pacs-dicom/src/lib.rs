//! # DICOM服务模块
//!
//! 协议适配层与存储核心之间的边界：标识属性提取、C-STORE / C-ECHO 服务和事件接入。

pub mod parser;
pub mod server;
pub mod services;

pub use parser::DicomParser;
pub use server::{AdapterEvent, DicomServer, DicomServerConfig, ImportSummary};
pub use services::*;
