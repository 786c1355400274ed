//! 標準出力向けのテキスト整形。

use crate::{
    events::{StopReason, TrackerEvent},
    jobs::{ImportJob, JobPage, JobStatus},
};

/// 一覧表示用の短い状態名。
pub fn status_str(s: &JobStatus) -> String {
    match s {
        JobStatus::Pending => "Pending".into(),
        JobStatus::Processing => "Processing".into(),
        JobStatus::Completed => "Done".into(),
        JobStatus::Failed => "Failed".into(),
        JobStatus::PartialSuccess => "Partial".into(),
        JobStatus::Cancelled => "Cancelled".into(),
        JobStatus::Unknown(raw) => format!("?{raw}"),
    }
}

/// ジョブ1件を1行にまとめる。
pub fn job_line(job: &ImportJob) -> String {
    // 進捗は総数が分かるときだけ出す。
    let progress = match (job.progress_percent(), job.total_records) {
        (Some(pct), Some(total)) => format!(
            " {pct:>3}% ok={} err={} of {total}",
            job.success_count.unwrap_or(0),
            job.error_count.unwrap_or(0)
        ),
        _ => String::new(),
    };
    let created = job
        .created_at
        .map(|t| format!(" {}", t.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    let mut line = format!("#{} [{}]{}{}", job.id, status_str(&job.status), progress, created);
    if let Some(first) = job.error_entries().first() {
        line.push_str(" | ");
        line.push_str(first);
    }
    line
}

/// ページ見出し（件数と位置）。
pub fn page_summary(page: &JobPage) -> String {
    let running = page
        .content
        .iter()
        .filter(|j| !j.status.is_terminal())
        .count();
    format!(
        "Jobs: page {}/{}, {} total, {} running",
        page.number.saturating_add(1),
        page.total_pages.max(1),
        page.total_elements,
        running
    )
}

/// イベントを1行に変換する。一覧更新は呼び出し側で展開する。
pub fn event_line(ev: &TrackerEvent) -> Option<String> {
    match ev {
        TrackerEvent::ActiveJobUpdated(job) => Some(format!("upload {}", job_line(job))),
        TrackerEvent::JobTerminal(job) => Some(format!("finished {}", job_line(job))),
        TrackerEvent::PollStopped { job_id, reason } => Some(match reason {
            StopReason::Cancelled => format!("stopped watching #{job_id}"),
            StopReason::GaveUp(e) => format!("gave up on #{job_id}: {e}"),
        }),
        // 通常の更新は量が多いので出さない。
        TrackerEvent::JobUpdated(_) | TrackerEvent::ListRefreshed(_) => None,
    }
}
