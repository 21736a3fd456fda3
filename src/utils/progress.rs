use std::time::Duration;
use crate::core::SessionStats;

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// 格式化速度
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second.max(0.0) as u64))
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// 剩余时间，无法估算时显示 "--"
pub fn format_eta(eta_seconds: Option<u64>) -> String {
    match eta_seconds {
        Some(secs) => format_duration(Duration::from_secs(secs)),
        None => "--".to_string(),
    }
}

/// 单行进度摘要，例如 `42% 3/10 files, 1 failed, 1.00 MB/s, eta 5s`
pub fn format_stats(stats: &SessionStats) -> String {
    let mut line = format!(
        "{}% {}/{} files",
        stats.overall_progress, stats.completed, stats.total_files
    );
    if stats.failed > 0 {
        line.push_str(&format!(", {} failed", stats.failed));
    }
    if stats.paused > 0 {
        line.push_str(&format!(", {} paused", stats.paused));
    }
    line.push_str(&format!(", {}, eta {}", format_speed(stats.speed), format_eta(stats.eta)));
    line
}
