//! spindle-core
//!
//! Bounded two-lane task queue with a watchdog.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, lane, state, events, task）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator）
//! - **queue**: TaskQueue 本体（レーン、スケジューリング、キャンセル、イベント）
//! - **app**: 組み立てと常駐処理（QueueBuilder, Watchdog）
//! - **process**: メタデータ生成スクリプトの実行（MetadataJob）
//! - **config**: 設定ファイルと環境変数
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod process;
pub mod queue;

pub use app::{BuildError, QueueBuilder, Watchdog};
pub use config::{ConfigError, LaneConfig, QueueConfig};
pub use domain::{Lane, QueueEvent, Task, TaskAction, TaskId, TaskStatus};
pub use error::{QueueError, TaskError};
pub use queue::{EventSubscription, QueueStatus, TaskContext, TaskQueue};
