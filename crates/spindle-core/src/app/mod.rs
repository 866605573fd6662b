//! App - アプリケーション層
//!
//! queue と ports を組み合わせて、起動できる形にまとめます。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: TaskQueue の構築と起動時検証
//! - **Watchdog**: 実行中タスクのタイムアウト・stall 監視

pub mod builder;
pub mod watchdog;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, QueueBuilder};
pub use self::watchdog::Watchdog;
