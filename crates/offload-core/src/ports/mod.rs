//! Ports - 抽象化レイヤー
//!
//! Seams the scheduler depends on but does not own: time and id generation.

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
