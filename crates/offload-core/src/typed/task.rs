//! CategoryTask - 型付き Task の定義
//!
//! Binds an input type to the category that executes it and to the output
//! type its worker produces. Both sides cross the worker boundary as JSON.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::TaskCategory;

/// A typed task input.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Resample { data: Vec<f64> }
///
/// impl CategoryTask for Resample {
///     const CATEGORY: TaskCategory = TaskCategory::SpectrumAnalysis;
///     type Output = Vec<f64>;
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize + DeserializeOwned`: the payload is opaque JSON on the wire
/// - `Send + Sync + 'static`: moved into worker tasks
pub trait CategoryTask: Serialize + DeserializeOwned + Send + Sync + 'static {
    const CATEGORY: TaskCategory;

    type Output: Serialize + DeserializeOwned + Send + 'static;
}
