//! ヘッドレス監視ツールのエントリポイントとランタイム初期化。

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing_appender::non_blocking::WorkerGuard;

use import_tracker::{
    Config, HttpImportApi, ImportFile, ImportTracker, TrackerEvent, TrackerSettings, display,
};

/// 設定ファイルのパス。
const CONFIG_PATH: &str = "import_tracker.toml";

/// 最後のジョブ終了後、一覧の再取得を待つ上限。
const REFRESH_GRACE: Duration = Duration::from_secs(10);

/// 終了判定のための監視状態。
#[derive(Debug, Default)]
struct WatchState {
    /// ジョブ終了後の一覧更新がまだ届いていない。
    awaiting_refresh: bool,
}

impl WatchState {
    /// イベントから再取得待ちかどうかを更新する。
    fn observe(&mut self, ev: &TrackerEvent) {
        match ev {
            TrackerEvent::JobTerminal(_) => self.awaiting_refresh = true,
            TrackerEvent::ListRefreshed(_) => self.awaiting_refresh = false,
            _ => {}
        }
    }

    /// 監視対象が無く、保留中の一覧更新も無ければ終了してよい。
    fn is_done(&self, idle: bool) -> bool {
        idle && !self.awaiting_refresh
    }
}

/// ファイルロギングを初期化し、非同期ガードを生存させる。
fn init_logging() -> Result<WorkerGuard> {
    // ログ出力先ファイル名を決める。
    let log_file = "import_tracker.log";
    // 標準出力はジョブ表示に使うため、ログはファイルへ書く。
    let file_appender = tracing_appender::rolling::never(".", log_file);
    // 非同期書き込み用のラッパーとガードを用意する。
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;
    tracing::info!("logging to {}", log_file);
    Ok(guard)
}

#[tokio::main]
/// エントリポイント：設定読込→（任意で）アップロード→一覧→進捗監視。
async fn main() -> Result<()> {
    // ロガーを初期化し、ガードを保持して書き込みを継続させる。
    let _log_guard = init_logging()?;
    tracing::info!("app starting");

    // 設定を読み込む（無ければ既定値で作成）。
    let cfg = Config::load_or_default(Path::new(CONFIG_PATH))
        .with_context(|| format!("failed to load {CONFIG_PATH}"))?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")?;
    let api = Arc::new(HttpImportApi::new(http, &cfg.api));
    let tracker = ImportTracker::spawn(api, TrackerSettings::from(&cfg));
    // 取りこぼさないよう、操作前に購読しておく。
    let mut events = tracker.subscribe();

    let res = run(&tracker, &cfg, &mut events).await;
    // ループを必ず止めてから終了する。
    tracker.shutdown().await;
    if let Err(ref e) = res {
        tracing::error!("app error: {e:#}");
    }
    tracing::info!("app exiting");
    res
}

/// 引数のファイルを投入し、監視対象が無くなるまでイベントを表示する。
async fn run(
    tracker: &ImportTracker,
    cfg: &Config,
    events: &mut tokio::sync::broadcast::Receiver<TrackerEvent>,
) -> Result<()> {
    // 第1引数があればアップロードする。
    if let Some(path) = std::env::args().nth(1) {
        let file = ImportFile::read(Path::new(&path)).await?;
        let job_id = tracker.submit_import(file).await?;
        println!("submitted {path} as job #{job_id}");
    }

    // 最初のページを表示する（未完了ジョブはここで監視対象になる）。
    let page = tracker.list_jobs(cfg.listing.first_page()).await?;
    println!("{}", display::page_summary(&page));
    for job in &page.content {
        println!("  {}", display::job_line(job));
    }

    let mut watch = WatchState::default();
    loop {
        // 監視中のジョブが無く、未読イベントも最後の一覧更新待ちも無ければ終了する。
        let idle = tracker.polling_ids().await?.is_empty();
        if watch.is_done(idle) && events.is_empty() {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted");
                break;
            }
            // 更新が失敗して届かない場合に備えて待ち時間を区切る。
            _ = tokio::time::sleep(REFRESH_GRACE), if idle => {
                tracing::warn!("no list refresh after the last job finished");
                break;
            }
            ev = events.recv() => match ev {
                Ok(ev) => {
                    watch.observe(&ev);
                    if let TrackerEvent::ListRefreshed(page) = &ev {
                        println!("{}", display::page_summary(page));
                    } else if let Some(line) = display::event_line(&ev) {
                        println!("{line}");
                    }
                }
                // 表示が追いつかないだけなので続行する。
                Err(RecvError::Lagged(n)) => tracing::warn!("skipped {n} events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use import_tracker::{ImportJob, JobPage, JobStatus};

    fn empty_page() -> JobPage {
        JobPage {
            content: vec![],
            number: 0,
            size: 10,
            total_elements: 0,
            total_pages: 0,
            first: true,
            last: true,
        }
    }

    #[test]
    fn test_waits_for_refresh_after_last_job_finishes() {
        let mut watch = WatchState::default();
        assert!(watch.is_done(true));

        // 終了直後はまだ一覧が更新されていない。
        watch.observe(&TrackerEvent::JobTerminal(ImportJob::new(42, JobStatus::Completed)));
        assert!(!watch.is_done(true));

        watch.observe(&TrackerEvent::ListRefreshed(empty_page()));
        assert!(watch.is_done(true));
        assert!(!watch.is_done(false));
    }
}
