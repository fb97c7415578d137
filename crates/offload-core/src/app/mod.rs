//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **Manager**: 外部向けファサード（submit / status / dispose）
//! - **ManagerBuilder**: executor の登録と起動時検証
//! - **Dispatcher** + **DispatchLoop**: 優先度キューからワーカーへの配送
//! - **WorkerPool** + **WorkerLoop**: 専用ワーカーと汎用プール
//! - **CompletionRegistry** / **TaskHandle**: 完了の一意な突き合わせ

pub mod builder;
pub mod config;
mod dispatch_loop;
mod dispatcher;
pub mod handle;
pub mod manager;
mod pool;
pub mod queue;
pub mod registry;
pub mod status;
mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, ManagerBuilder};
pub use self::config::ManagerConfig;
pub use self::handle::TaskHandle;
pub use self::manager::Manager;
pub use self::queue::PriorityQueue;
pub use self::registry::{CompletionHandle, CompletionRegistry, TaskOutcome};
pub use self::status::SchedulerStatus;
