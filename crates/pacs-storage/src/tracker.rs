//! 检查活动跟踪
//!
//! 记录每个检查最后一次写入实例的时间。实例写入方并发调用 `touch`，
//! 静默扫描任务读取快照并移除已迁移的检查。

use chrono::{DateTime, Utc};
use pacs_core::StudyKey;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// 检查活动跟踪器
#[derive(Debug, Default)]
pub struct ActivityTracker {
    entries: Mutex<HashMap<StudyKey, DateTime<Utc>>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或更新检查的最后活动时间
    ///
    /// 时间只会前进：较旧的并发更新不会覆盖较新的时间。
    pub async fn touch(&self, key: StudyKey, at: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        let last = entries.entry(key).or_insert(at);
        if *last < at {
            *last = at;
        }
    }

    /// 当前所有条目的快照，按检查标识排序
    pub async fn snapshot(&self) -> Vec<(StudyKey, DateTime<Utc>)> {
        let entries = self.entries.lock().await;
        let mut snapshot: Vec<_> = entries
            .iter()
            .map(|(key, at)| (key.clone(), *at))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    pub async fn get(&self, key: &StudyKey) -> Option<DateTime<Utc>> {
        self.entries.lock().await.get(key).copied()
    }

    pub async fn remove(&self, key: &StudyKey) -> Option<DateTime<Utc>> {
        self.entries.lock().await.remove(key)
    }

    /// 仅当条目自 `seen` 之后未被更新时移除
    ///
    /// 返回 `false` 表示快照之后又有新实例到达，条目保留。
    pub async fn remove_if_unchanged(&self, key: &StudyKey, seen: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(last) if *last > seen => {
                debug!(study = %key, "Study touched after snapshot, keeping tracker entry");
                false
            }
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
