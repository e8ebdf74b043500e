//! 存储目录布局
//!
//! ```text
//! dcmstore/
//!   received/{patient}/{accession}/[{seriesNum:02}_{seriesDesc}/]{instanceUID}.dcm
//!   queue/{patient}/{accession}/...
//!   processed/{patient}/{accession}/...
//! ```

use pacs_core::utils::{instance_file_name, sanitize_component, series_dir_name};
use pacs_core::{InstanceAttributes, StudyKey, StudyState};
use std::path::{Path, PathBuf};

/// 存储根目录及三个生命周期阶段目录
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 阶段根目录，`Processing` 没有对应目录
    pub fn stage_root(&self, state: StudyState) -> Option<PathBuf> {
        state.stage_dir().map(|dir| self.root.join(dir))
    }

    pub fn patient_dir(&self, state: StudyState, patient_id: &str) -> Option<PathBuf> {
        self.stage_root(state)
            .map(|stage| stage.join(sanitize_component(patient_id)))
    }

    pub fn study_dir(&self, state: StudyState, key: &StudyKey) -> Option<PathBuf> {
        self.patient_dir(state, &key.patient_id)
            .map(|patient| patient.join(sanitize_component(&key.accession_number)))
    }

    /// 由实例属性得到的检查标识，各组件已做路径清理
    pub fn study_key(attributes: &InstanceAttributes) -> StudyKey {
        StudyKey::new(
            sanitize_component(&attributes.patient_id),
            sanitize_component(&attributes.accession_number),
        )
    }

    /// 实例所在目录（接收区）
    pub fn instance_dir(&self, attributes: &InstanceAttributes) -> PathBuf {
        let mut dir = self
            .root
            .join(StudyState::Receiving.stage_dir().unwrap_or("received"))
            .join(sanitize_component(&attributes.patient_id))
            .join(sanitize_component(&attributes.accession_number));

        if let Some(series_number) = attributes.series_number {
            dir = dir.join(series_dir_name(
                series_number,
                attributes.series_description.as_deref(),
            ));
        }
        dir
    }

    pub fn instance_path(&self, attributes: &InstanceAttributes) -> PathBuf {
        self.instance_dir(attributes)
            .join(instance_file_name(&attributes.sop_instance_uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(series_number: Option<i32>, description: Option<&str>) -> InstanceAttributes {
        InstanceAttributes {
            patient_id: "P1".to_string(),
            accession_number: "A1".to_string(),
            series_number,
            series_description: description.map(str::to_string),
            sop_instance_uid: "1.2.840.10".to_string(),
        }
    }

    #[test]
    fn test_instance_path_with_series() {
        let layout = StoreLayout::new("dcmstore");
        let path = layout.instance_path(&attributes(Some(3), Some("Chest/Lateral")));
        assert_eq!(
            path,
            PathBuf::from("dcmstore/received/P1/A1/03_Chest_Lateral/1.2.840.10.dcm")
        );
    }

    #[test]
    fn test_instance_path_without_series() {
        let layout = StoreLayout::new("dcmstore");
        let path = layout.instance_path(&attributes(None, Some("ignored")));
        assert_eq!(path, PathBuf::from("dcmstore/received/P1/A1/1.2.840.10.dcm"));
    }

    #[test]
    fn test_study_dirs_per_stage() {
        let layout = StoreLayout::new("dcmstore");
        let key = StudyKey::new("P1", "A1");
        assert_eq!(
            layout.study_dir(StudyState::Queued, &key),
            Some(PathBuf::from("dcmstore/queue/P1/A1"))
        );
        assert_eq!(layout.study_dir(StudyState::Processing, &key), None);
    }
}
