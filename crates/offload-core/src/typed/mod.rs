//! Typed - 型付き Task API
//!
//! # 二層構造
//! - **表層（Typed）**: `CategoryTask`, `Handler<T>` - 型安全
//! - **内部（Dyn）**: `DynExecutor` - object-safe, type erasure

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynExecutor, Handler, HandlerError, TypedExecutor};
pub use self::registry::{ExecutorRegistry, RegistryError};
pub use self::task::CategoryTask;
