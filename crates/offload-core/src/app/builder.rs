//! ManagerBuilder - Manager の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use super::config::ManagerConfig;
use super::manager::Manager;
use crate::domain::TaskCategory;
use crate::impls::register_defaults;
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::typed::{CategoryTask, ExecutorRegistry, Handler, RegistryError};

/// ManagerBuilder は Manager を構築
///
/// # 使用例
/// ```ignore
/// let manager = ManagerBuilder::new(ManagerConfig::default())
///     .register::<MathRequest, _, _>(|| MyMathHandler::default())?
///     .with_default_executors()
///     .expect_categories(&TaskCategory::ALL)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - `expect_categories()` declares which categories must have an executor
/// - `build()` checks expected ⊆ registered and returns `BuildError` otherwise
pub struct ManagerBuilder {
    config: ManagerConfig,
    executors: ExecutorRegistry,
    with_defaults: bool,
    expected: Option<Vec<TaskCategory>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing executors for categories: {0:?}. These categories were expected but not registered.")]
    MissingExecutors(Vec<TaskCategory>),
}

impl ManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            executors: ExecutorRegistry::new(),
            with_defaults: false,
            expected: None,
            ids: None,
        }
    }

    /// Plug a handler factory for `T::CATEGORY`. Each worker serving the
    /// category calls `factory` once.
    pub fn register<T, H, F>(mut self, factory: F) -> Result<Self, RegistryError>
    where
        T: CategoryTask,
        H: Handler<T> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.executors.register::<T, H, F>(factory)?;
        Ok(self)
    }

    /// Fill every category left unregistered at `build()` with the built-in
    /// executor.
    pub fn with_default_executors(mut self) -> Self {
        self.with_defaults = true;
        self
    }

    pub fn expect_categories(mut self, categories: &[TaskCategory]) -> Self {
        self.expected = Some(categories.to_vec());
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(mut self) -> Result<Manager, BuildError> {
        if self.with_defaults {
            register_defaults(&mut self.executors, &self.config);
        }
        if let Some(expected) = &self.expected {
            let missing: Vec<TaskCategory> = expected
                .iter()
                .copied()
                .filter(|c| !self.executors.contains(*c))
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingExecutors(missing));
            }
        }
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        Ok(Manager::from_parts(self.config, self.executors, ids))
    }
}
