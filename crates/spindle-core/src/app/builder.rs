//! QueueBuilder - キューの構築とワイヤリング
//!
//! # ポイント
//! - Builder パターンで設定・Clock・Runtime を差し込む
//! - 起動時検証（Fail-fast 設計）: 壊れた設定では TaskQueue を作らない

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::QueueConfig;
use crate::domain::Lane;
use crate::ports::{Clock, SystemClock};
use crate::queue::TaskQueue;

/// BuildError はキュー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("lane '{0}' must allow at least one concurrent task")]
    ZeroConcurrency(Lane),

    #[error("watchdog interval must be greater than zero")]
    ZeroWatchdogInterval,

    #[error(
        "stall threshold ({stall:?}) must be below the '{lane}' lane timeout ({timeout:?})"
    )]
    StallNotBelowTimeout {
        lane: Lane,
        stall: Duration,
        timeout: Duration,
    },

    #[error("no tokio runtime available; build inside a runtime or pass a handle")]
    NoRuntime,
}

/// QueueBuilder は TaskQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new()
///     .config(QueueConfig::from_toml_file("spindle.toml")?)
///     .lane_limit(Lane::Ai, 2)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 同時実行数 0 のレーンは拒否（そのレーンのタスクが永久に pending になるため）
/// - watchdog 間隔 0 は拒否
/// - stall 閾値がレーンのタイムアウト以上なら拒否（stall 警告が出なくなるため）
pub struct QueueBuilder {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl QueueBuilder {
    /// デフォルト設定（main 5 / ai 1）で QueueBuilder を作成
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            runtime: None,
        }
    }

    /// 設定をまとめて差し替え
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lane_limit(mut self, lane: Lane, max_concurrent: usize) -> Self {
        self.config.lane_mut(lane).max_concurrent = max_concurrent;
        self
    }

    pub fn lane_timeout(mut self, lane: Lane, timeout: Duration) -> Self {
        self.config.lane_mut(lane).timeout = timeout;
        self
    }

    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.config.watchdog_interval = interval;
        self
    }

    pub fn stall_threshold(mut self, threshold: Duration) -> Self {
        self.config.stall_threshold = threshold;
        self
    }

    /// 壁時計を差し替え（テストでは FixedClock）
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// タスクを spawn する Runtime を指定
    ///
    /// 省略時は `build()` を呼んだ時点の Runtime を使う。
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// 設定を検証して TaskQueue を生成
    pub fn build(self) -> Result<TaskQueue, BuildError> {
        validate(&self.config)?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        tracing::debug!(
            main = self.config.main.max_concurrent,
            ai = self.config.ai.max_concurrent,
            "task queue built"
        );
        Ok(TaskQueue::new(self.config, self.clock, runtime))
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(config: &QueueConfig) -> Result<(), BuildError> {
    for lane in Lane::ALL {
        if config.lane(lane).max_concurrent == 0 {
            return Err(BuildError::ZeroConcurrency(lane));
        }
    }
    if config.watchdog_interval.is_zero() {
        return Err(BuildError::ZeroWatchdogInterval);
    }
    for lane in Lane::ALL {
        let timeout = config.lane(lane).timeout;
        if config.stall_threshold >= timeout {
            return Err(BuildError::StallNotBelowTimeout {
                lane,
                stall: config.stall_threshold,
                timeout,
            });
        }
    }
    Ok(())
}
