//! DICOM数据解析器
//!
//! 只提取计算存储路径所需的标识属性，实例内容原样保留。

use dicom::dictionary_std::tags;
use dicom::object::{from_reader, open_file, InMemDicomObject};
use pacs_core::{Instance, InstanceAttributes, PacsError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Part-10 文件前导区长度
const PREAMBLE_LEN: usize = 128;

/// DICOM数据解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomParser;

impl DicomParser {
    /// 解析 Part-10 字节流（可带或不带 128 字节前导区），返回原样内容的实例
    pub fn parse_bytes(data: Vec<u8>) -> Result<Instance> {
        let start = if Self::has_part10_magic(&data) { PREAMBLE_LEN } else { 0 };

        let obj = from_reader(&data[start..])
            .map_err(|e| PacsError::DicomParseError(format!("无法解析DICOM数据: {}", e)))?;
        let attributes = Self::extract_attributes(&obj)?;

        debug!(
            sop_instance_uid = %attributes.sop_instance_uid,
            size = data.len(),
            "Parsed DICOM instance"
        );
        Ok(Instance {
            attributes,
            content: data,
        })
    }

    /// 是否为带前导区的 Part-10 文件
    pub fn has_part10_magic(data: &[u8]) -> bool {
        data.get(PREAMBLE_LEN..PREAMBLE_LEN + 4) == Some(b"DICM".as_slice())
    }

    /// 解析DICOM文件
    pub async fn parse_file(file_path: &Path) -> Result<Instance> {
        let path = file_path.to_path_buf();
        let attributes = tokio::task::spawn_blocking(move || {
            let obj = open_file(&path).map_err(|e| {
                PacsError::DicomParseError(format!("无法解析DICOM文件 {}: {}", path.display(), e))
            })?;
            Self::extract_attributes(&obj)
        })
        .await
        .map_err(|e| PacsError::DicomParseError(format!("解析任务失败: {}", e)))??;

        let content = tokio::fs::read(file_path).await?;
        Ok(Instance {
            attributes,
            content,
        })
    }

    /// 提取标识属性
    ///
    /// 患者ID和检查号允许为空（存储时使用占位目录名），缺少 SOP Instance UID 视为无效实例。
    pub fn extract_attributes(obj: &InMemDicomObject) -> Result<InstanceAttributes> {
        let sop_instance_uid = Self::get_string_element(obj, tags::SOP_INSTANCE_UID)
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| PacsError::InvalidInstance("missing SOP Instance UID".to_string()))?;

        let patient_id = Self::get_string_element(obj, tags::PATIENT_ID).unwrap_or_else(|| {
            warn!(sop_instance_uid = %sop_instance_uid, "Instance has no Patient ID");
            String::new()
        });
        let accession_number =
            Self::get_string_element(obj, tags::ACCESSION_NUMBER).unwrap_or_default();

        let series_number = obj
            .element(tags::SERIES_NUMBER)
            .ok()
            .and_then(|element| element.to_int::<i32>().ok());
        let series_description = Self::get_string_element(obj, tags::SERIES_DESCRIPTION)
            .filter(|desc| !desc.is_empty());

        Ok(InstanceAttributes {
            patient_id,
            accession_number,
            series_number,
            series_description,
            sop_instance_uid,
        })
    }

    /// 获取字符串类型元素的值（去除填充）
    fn get_string_element(obj: &InMemDicomObject, tag: dicom::core::Tag) -> Option<String> {
        let element = obj.element(tag).ok()?;
        match element.to_str() {
            Ok(value) => Some(value.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string()),
            Err(e) => {
                debug!("标签 {:?} 不是字符串类型: {}", tag, e);
                None
            }
        }
    }
}
