//! トラッカーが購読者へ通知するイベント。

use crate::jobs::{ImportJob, JobId, JobPage};

/// ポーリングループが止まった理由。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// ハンドルまたはトラッカー破棄による停止。
    Cancelled,
    /// 取得失敗で打ち切った（ジョブ自体の失敗ではない）。
    GaveUp(String),
}

/// UI層など任意の購読者へ流すイベント。
#[derive(Clone, Debug)]
pub enum TrackerEvent {
    /// ポーリングで最新状態を取得した。
    JobUpdated(ImportJob),
    /// 進捗表示対象（アップロード直後）のジョブが更新された。
    ActiveJobUpdated(ImportJob),
    /// ジョブが終端状態に達した。
    JobTerminal(ImportJob),
    /// 一覧ページを取得し反映した（サイドテーブルとマージ済み）。
    ListRefreshed(JobPage),
    /// 終端以外の理由でポーリングが止まった。
    PollStopped { job_id: JobId, reason: StopReason },
}
