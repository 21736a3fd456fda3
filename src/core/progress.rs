use std::collections::BTreeMap;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use super::session::UploadSession;
use super::types::{ItemStatus, SessionStatus, UploadItem};

/// 百分比（四舍五入），总量为 0 时返回 0
pub fn percent(uploaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (uploaded.min(total) as f64 / total as f64 * 100.0).round();
    value as u8
}

/// 平均速度（字节/秒）
pub fn throughput(uploaded: u64, elapsed: TimeDelta) -> f64 {
    let secs = elapsed.num_milliseconds() as f64 / 1000.0;
    if secs > 0.0 {
        uploaded as f64 / secs
    } else {
        0.0
    }
}

/// 预计剩余秒数，速度为 0 时无法估算
pub fn eta_seconds(total: u64, uploaded: u64, speed: f64) -> Option<u64> {
    if speed <= 0.0 {
        return None;
    }
    let remaining = total.saturating_sub(uploaded);
    Some((remaining as f64 / speed).round() as u64)
}

/// 会话的只读统计视图
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub overall_progress: u8,
    /// 字节/秒，只在上传中计算
    pub speed: f64,
    pub eta: Option<u64>,
    pub total_files: usize,
    pub pending: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
}

impl SessionStats {
    pub fn from_session(session: &UploadSession, now: DateTime<Utc>) -> Self {
        let speed = match (session.status(), session.started_at()) {
            (SessionStatus::Uploading, Some(started_at)) => {
                throughput(session.uploaded_bytes(), now - started_at)
            }
            _ => 0.0,
        };

        Self {
            overall_progress: percent(session.uploaded_bytes(), session.total_bytes()),
            speed,
            eta: eta_seconds(session.total_bytes(), session.uploaded_bytes(), speed),
            total_files: session.total_files(),
            pending: session.count(ItemStatus::Pending),
            uploading: session.count(ItemStatus::Uploading),
            completed: session.count(ItemStatus::Completed),
            failed: session.count(ItemStatus::Failed),
            paused: session.count(ItemStatus::Paused),
        }
    }
}

/// 按父目录分组，单独的文件归入空字符串
pub fn folder_groups(items: &[UploadItem]) -> BTreeMap<String, Vec<&UploadItem>> {
    let mut groups: BTreeMap<String, Vec<&UploadItem>> = BTreeMap::new();
    for item in items {
        let folder = item.folder().unwrap_or_default().to_string();
        groups.entry(folder).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::core::types::FileSource;

    fn item(path: &str) -> UploadItem {
        UploadItem::new(path, 10, FileSource::Bytes(Bytes::new()))
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(5, 3), 100);
    }

    #[test]
    fn test_throughput_and_eta() {
        let speed = throughput(1000, TimeDelta::seconds(2));
        assert_eq!(speed, 500.0);
        assert_eq!(eta_seconds(2000, 1000, speed), Some(2));
        assert_eq!(eta_seconds(2000, 1000, 0.0), None);
        assert_eq!(throughput(1000, TimeDelta::zero()), 0.0);
    }

    #[test]
    fn test_stats_on_idle_session() {
        let mut session = UploadSession::new();
        session.append(vec![item("a.txt"), item("b.txt")]);

        let stats = SessionStats::from_session(&session, Utc::now());
        assert_eq!(stats.overall_progress, 0);
        assert_eq!(stats.speed, 0.0);
        assert_eq!(stats.eta, None);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.total_files, 2);
    }

    #[test]
    fn test_folder_groups() {
        let items = vec![item("a/b/1.txt"), item("a/b/2.txt"), item("loose.txt")];
        let groups = folder_groups(&items);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a/b"].len(), 2);
        assert_eq!(groups[""][0].relative_path, "loose.txt");
    }
}
