//! ExecutorRegistry - category ごとの executor factory を管理
//!
//! Workers never share an executor: each worker asks the registry for a fresh
//! instance at pool initialization. The registry therefore stores factories,
//! not handlers.

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynExecutor, Handler, TypedExecutor};
use super::task::CategoryTask;
use crate::domain::TaskCategory;

type ExecutorFactory = Arc<dyn Fn() -> Box<dyn DynExecutor> + Send + Sync>;

#[derive(Default)]
pub struct ExecutorRegistry {
    factories: HashMap<TaskCategory, ExecutorFactory>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("an executor for category '{0}' is already registered")]
    AlreadyRegistered(TaskCategory),
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` as the executor source for `T::CATEGORY`.
    pub fn register<T, H, F>(&mut self, factory: F) -> Result<(), RegistryError>
    where
        T: CategoryTask,
        H: Handler<T> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let category = T::CATEGORY;
        if self.factories.contains_key(&category) {
            return Err(RegistryError::AlreadyRegistered(category));
        }
        let erased: ExecutorFactory =
            Arc::new(move || Box::new(TypedExecutor::<T, H>::new(factory())) as Box<dyn DynExecutor>);
        self.factories.insert(category, erased);
        Ok(())
    }

    pub fn contains(&self, category: TaskCategory) -> bool {
        self.factories.contains_key(&category)
    }

    /// Build a fresh executor for `category`.
    pub fn instantiate(&self, category: TaskCategory) -> Option<Box<dyn DynExecutor>> {
        self.factories.get(&category).map(|factory| factory())
    }

    /// Registered categories in declaration order.
    pub fn registered_categories(&self) -> Vec<TaskCategory> {
        TaskCategory::ALL
            .into_iter()
            .filter(|c| self.factories.contains_key(c))
            .collect()
    }
}
