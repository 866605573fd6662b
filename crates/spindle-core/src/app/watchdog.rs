//! Watchdog - 実行中タスクの定期監視
//!
//! # フロー
//! 1. `watchdog_interval` ごとに実行中タスクのスナップショットを取る
//! 2. レーンのタイムアウトを超えたタスクに `TaskTimeout` を emit（通知のみ、停止はしない）
//! 3. タイムアウト前でも進捗が `stall_threshold` 以上止まっていれば warn ログ
//! 4. 何か動いていれば占有状況を info ログ
//!
//! タスクやプールの状態は一切変更しない。

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::QueueConfig;
use crate::domain::{Lane, QueueEvent};
use crate::queue::{RunningSample, TaskQueue};

/// Watchdog handle.
/// - `request_shutdown()` か handle の drop でループが止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct Watchdog {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Watchdog {
    /// キューの Runtime 上で監視ループを開始
    pub fn spawn(queue: TaskQueue) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runtime = queue.runtime().clone();
        let join = runtime.spawn(watchdog_loop(queue, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // receiver が既に終わっていても問題ない
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn watchdog_loop(queue: TaskQueue, mut shutdown_rx: watch::Receiver<bool>) {
    let period = queue.config().watchdog_interval;
    // 初回 tick は即時に来るので、1 周期後から始める
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(?period, "watchdog started");
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                check(&queue);
            }
        }
    }
    tracing::debug!("watchdog stopped");
}

/// 1 回分の判定結果
#[derive(Debug, Default)]
pub(crate) struct ScanReport {
    pub timed_out: Vec<RunningSample>,
    pub stalled: Vec<RunningSample>,
}

/// 判定だけを行う純粋関数
pub(crate) fn scan(samples: &[RunningSample], config: &QueueConfig) -> ScanReport {
    let mut report = ScanReport::default();
    for sample in samples {
        let timeout = config.lane(sample.lane).timeout;
        if sample.runtime > timeout {
            report.timed_out.push(sample.clone());
        } else if sample.runtime < timeout && sample.since_progress > config.stall_threshold {
            report.stalled.push(sample.clone());
        }
    }
    report
}

/// スキャンして event / ログを出す
pub(crate) fn check(queue: &TaskQueue) -> ScanReport {
    let samples = queue.running_samples();
    let report = scan(&samples, queue.config());

    for s in &report.timed_out {
        tracing::warn!(
            task_id = %s.task_id,
            lane = %s.lane,
            name = %s.name,
            runtime = ?s.runtime,
            "task exceeded lane timeout"
        );
        queue.emit(QueueEvent::TaskTimeout {
            task_id: s.task_id.clone(),
            lane: s.lane,
            runtime: s.runtime,
        });
    }
    for s in &report.stalled {
        tracing::warn!(
            task_id = %s.task_id,
            lane = %s.lane,
            name = %s.name,
            idle = ?s.since_progress,
            "task stalled: no progress reported"
        );
    }

    let status = queue.status();
    if !status.is_idle() {
        let occupancy = |lane: Lane| status.lane(lane).map(|l| (l.running, l.pending, l.limit));
        tracing::info!(
            main = ?occupancy(Lane::Main),
            ai = ?occupancy(Lane::Ai),
            "queue occupancy (running, pending, limit)"
        );
    }

    report
}
