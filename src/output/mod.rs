//! 结果落盘。

pub mod writer;

pub use writer::{OutputWriter, PersistenceError};
