//! インポートジョブと一覧ページのモデル。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// サーバーが払い出すジョブID（数値・文字列どちらでも受け付ける）。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// 文字列からIDを作る。
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// URL等に埋め込むための文字列表現。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // 数値IDを返すバックエンドもあるため両方を受ける。
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Num(u64),
            Str(String),
        }
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Num(n) => Self::from(n),
            RawId::Str(s) => Self(s),
        })
    }
}

/// サーバー側の処理進行に応じたジョブ状態。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// 処理待ち。
    Pending,
    /// 処理中。
    Processing,
    /// 全件成功。
    Completed,
    /// 失敗。
    Failed,
    /// 一部の行のみ成功。
    PartialSuccess,
    /// キャンセル済み。
    Cancelled,
    /// 未知の値（終端ではないものとして扱う）。
    Unknown(String),
}

impl JobStatus {
    /// 終端状態ならtrue。終端のジョブは再ポーリングしない。
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::PartialSuccess | Self::Cancelled
        )
    }

    /// キャンセル要求を出せる状態か。
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// 状態機械上の段階（前進のみの比較に使う）。
    pub fn stage(&self) -> u8 {
        match self {
            Self::Pending | Self::Unknown(_) => 0,
            Self::Processing => 1,
            _ => 2,
        }
    }

    /// 通信上の文字列表現。
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::PartialSuccess => "PARTIAL_SUCCESS",
            Self::Cancelled => "CANCELLED",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING" => Self::Pending,
            "PROCESSING" => Self::Processing,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "PARTIAL_SUCCESS" => Self::PartialSuccess,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一括インポート1件。クライアントからは読み取り専用。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    /// サーバーが払い出した不変ID。
    pub id: JobId,
    /// 現在の状態。
    pub status: JobStatus,
    /// 総レコード数（処理開始前は未定）。
    #[serde(default)]
    pub total_records: Option<u64>,
    /// 成功件数。
    #[serde(default)]
    pub success_count: Option<u64>,
    /// 失敗件数。
    #[serde(default)]
    pub error_count: Option<u64>,
    /// 診断メッセージ（改行区切りで行単位のエラーを含むことがある）。
    #[serde(default)]
    pub message: Option<String>,
    /// 詳細レポートのURL。
    #[serde(default)]
    pub error_log_url: Option<String>,
    /// 作成日時。
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// 完了日時（未完了の間は無し）。
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// 取り込み元ファイル。
    #[serde(default)]
    pub file_url: Option<String>,
    /// ジョブ種別。
    #[serde(default, rename = "type")]
    pub job_type: Option<String>,
}

impl ImportJob {
    /// 指定状態で最小限のジョブを作る。
    pub fn new(id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            total_records: None,
            success_count: None,
            error_count: None,
            message: None,
            error_log_url: None,
            created_at: None,
            completed_at: None,
            file_url: None,
            job_type: None,
        }
    }

    /// 処理済み件数の割合（0..=100）。総数が未定/0ならNone。
    pub fn progress_percent(&self) -> Option<u8> {
        let total = self.total_records.filter(|t| *t > 0)?;
        // 成功と失敗の合計を処理済みとみなす。
        let done = self.success_count.unwrap_or(0) + self.error_count.unwrap_or(0);
        let pct = done.saturating_mul(100) / total;
        Some(pct.min(100) as u8)
    }

    /// messageを行ごとのエラーに分解する。
    pub fn error_entries(&self) -> Vec<&str> {
        self.message
            .as_deref()
            .map(|m| m.lines().map(str::trim).filter(|l| !l.is_empty()).collect())
            .unwrap_or_default()
    }

    /// キャンセル可能か（PENDING/PROCESSINGのみ）。
    pub fn can_cancel(&self) -> bool {
        self.status.is_cancellable()
    }
}

/// 並び替えの対象項目。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    CompletedAt,
    Status,
    TotalRecords,
}

impl SortField {
    fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "createdAt",
            Self::CompletedAt => "completedAt",
            Self::Status => "status",
            Self::TotalRecords => "totalRecords",
        }
    }
}

/// 並び順。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// 一覧のソート指定（通信上は `field,direction`）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sort {
    pub field: SortField,
    pub direction: Direction,
}

impl Sort {
    /// 新しい順（既定）。
    pub const NEWEST_FIRST: Sort = Sort {
        field: SortField::CreatedAt,
        direction: Direction::Desc,
    };

    /// クエリパラメータ表現。
    pub fn as_param(&self) -> String {
        let dir = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        format!("{},{}", self.field.as_str(), dir)
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::NEWEST_FIRST
    }
}

impl TryFrom<String> for Sort {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        // 方向が省略されたら昇順とみなす。
        let (field, dir) = raw.split_once(',').unwrap_or((raw.as_str(), "asc"));
        let field = match field.trim() {
            "createdAt" => SortField::CreatedAt,
            "completedAt" => SortField::CompletedAt,
            "status" => SortField::Status,
            "totalRecords" => SortField::TotalRecords,
            other => return Err(format!("unknown sort field: {other}")),
        };
        let direction = match dir.trim().to_ascii_lowercase().as_str() {
            "asc" => Direction::Asc,
            "desc" => Direction::Desc,
            other => return Err(format!("unknown sort direction: {other}")),
        };
        Ok(Self { field, direction })
    }
}

impl From<Sort> for String {
    fn from(sort: Sort) -> Self {
        sort.as_param()
    }
}

/// 一覧取得のパラメータ。
#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    /// 0始まりのページ番号。
    pub page: u32,
    /// 1ページの件数。
    pub size: u32,
    /// 並び順。
    pub sort: Sort,
    /// 状態フィルタ（任意）。
    pub status: Option<JobStatus>,
}

impl ListQuery {
    /// 先頭ページのクエリ。
    pub fn first_page(size: u32, sort: Sort) -> Self {
        Self {
            page: 0,
            size,
            sort,
            status: None,
        }
    }

    /// 状態フィルタを付ける。
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// ページング済みのジョブ一覧。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub content: Vec<ImportJob>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub first: bool,
    pub last: bool,
}

impl JobPage {
    /// ページメタデータとフィルタ条件の整合性を検証し、最初の違反を返す。
    pub fn consistency_issue(&self, query: &ListQuery) -> Option<String> {
        // フィルタ指定時は全件がその状態であること。
        if let Some(filter) = &query.status
            && let Some(job) = self.content.iter().find(|j| &j.status != filter)
        {
            return Some(format!(
                "job {} has status {} but filter is {}",
                job.id, job.status, filter
            ));
        }
        if self.size > 0 {
            if self.content.len() as u64 > u64::from(self.size) {
                return Some(format!(
                    "page holds {} jobs but size is {}",
                    self.content.len(),
                    self.size
                ));
            }
            // 総ページ数は総件数から決まる。
            let expected = self.total_elements.div_ceil(u64::from(self.size));
            if u64::from(self.total_pages) != expected {
                return Some(format!(
                    "totalPages {} does not match {} elements at size {}",
                    self.total_pages, self.total_elements, self.size
                ));
            }
        }
        if self.first != (self.number == 0) {
            return Some(format!("first={} on page {}", self.first, self.number));
        }
        // 不正なページ番号でもパニックさせない。
        if self.last != (self.number.saturating_add(1) >= self.total_pages) {
            return Some(format!(
                "last={} on page {} of {}",
                self.last, self.number, self.total_pages
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(content: Vec<ImportJob>, number: u32, size: u32, total: u64) -> JobPage {
        let total_pages = total.div_ceil(u64::from(size)) as u32;
        JobPage {
            content,
            number,
            size,
            total_elements: total,
            total_pages,
            first: number == 0,
            last: number + 1 >= total_pages,
        }
    }

    #[test]
    fn test_status_terminal_set() {
        // 終端状態の判定を検証する。
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::PartialSuccess.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Unknown("QUEUED_REMOTE".into()).is_terminal());
    }

    #[test]
    fn test_unknown_status_decodes_without_error() {
        // 未知の状態値でもデコードが失敗しないこと。
        let job: ImportJob =
            serde_json::from_str(r#"{"id": 7, "status": "ARCHIVING"}"#).unwrap();
        assert_eq!(job.id, JobId::from(7));
        assert_eq!(job.status, JobStatus::Unknown("ARCHIVING".into()));
        assert_eq!(job.status.stage(), 0);
    }

    #[test]
    fn test_job_decodes_camel_case_fields() {
        // バックエンドのcamelCase表現を読めること。
        let raw = r#"{
            "id": "a-1",
            "status": "PARTIAL_SUCCESS",
            "totalRecords": 100,
            "successCount": 95,
            "errorCount": 5,
            "message": "row 3: bad sku\n\nrow 9: price missing\n",
            "errorLogUrl": "https://example.test/log/a-1",
            "createdAt": "2026-01-02T03:04:05Z",
            "type": "PRODUCT"
        }"#;
        let job: ImportJob = serde_json::from_str(raw).unwrap();
        assert_eq!(job.status, JobStatus::PartialSuccess);
        assert_eq!(job.progress_percent(), Some(100));
        assert_eq!(job.error_entries(), vec!["row 3: bad sku", "row 9: price missing"]);
        assert_eq!(job.job_type.as_deref(), Some("PRODUCT"));
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_progress_unknown_until_total_known() {
        let mut job = ImportJob::new("1", JobStatus::Processing);
        assert_eq!(job.progress_percent(), None);
        job.total_records = Some(0);
        assert_eq!(job.progress_percent(), None);
        job.total_records = Some(100);
        job.success_count = Some(10);
        assert_eq!(job.progress_percent(), Some(10));
    }

    #[test]
    fn test_can_cancel_only_in_flight() {
        assert!(ImportJob::new("1", JobStatus::Pending).can_cancel());
        assert!(ImportJob::new("1", JobStatus::Processing).can_cancel());
        assert!(!ImportJob::new("1", JobStatus::Completed).can_cancel());
        assert!(!ImportJob::new("1", JobStatus::Unknown("X".into())).can_cancel());
    }

    #[test]
    fn test_sort_param_parsing() {
        // ソート指定の文字列表現を検証する。
        let sort = Sort::try_from("completedAt,ASC".to_string()).unwrap();
        assert_eq!(sort.field, SortField::CompletedAt);
        assert_eq!(sort.direction, Direction::Asc);
        assert_eq!(Sort::default().as_param(), "createdAt,desc");
        assert!(Sort::try_from("price,desc".to_string()).is_err());
    }

    #[test]
    fn test_consistent_page_has_no_issue() {
        let jobs = vec![
            ImportJob::new("1", JobStatus::Failed),
            ImportJob::new("2", JobStatus::Failed),
        ];
        let query = ListQuery::first_page(2, Sort::default()).with_status(JobStatus::Failed);
        assert_eq!(page(jobs, 0, 2, 5).consistency_issue(&query), None);
    }

    #[test]
    fn test_filter_mismatch_reported() {
        let jobs = vec![
            ImportJob::new("1", JobStatus::Failed),
            ImportJob::new("2", JobStatus::Completed),
        ];
        let query = ListQuery::first_page(10, Sort::default()).with_status(JobStatus::Failed);
        let issue = page(jobs, 0, 10, 2).consistency_issue(&query).unwrap();
        assert!(issue.contains("job 2"));
    }

    #[test]
    fn test_bad_total_pages_reported() {
        let mut p = page(vec![], 0, 10, 25);
        p.total_pages = 2;
        let query = ListQuery::first_page(10, Sort::default());
        assert!(p.consistency_issue(&query).unwrap().contains("totalPages"));
    }

    #[test]
    fn test_empty_page_is_consistent() {
        let query = ListQuery::first_page(10, Sort::default());
        assert_eq!(page(vec![], 0, 10, 0).consistency_issue(&query), None);
    }

    #[test]
    fn test_max_page_number_reported_without_overflow() {
        // サーバーが壊れた番号を返しても検証は値を返すだけ。
        let p: JobPage = serde_json::from_str(
            r#"{"content":[],"number":4294967295,"size":10,"totalElements":0,"totalPages":0,"first":false,"last":false}"#,
        )
        .unwrap();
        let query = ListQuery::first_page(10, Sort::default());
        let issue = p.consistency_issue(&query).unwrap();
        assert!(issue.contains("last=false"));
    }
}
