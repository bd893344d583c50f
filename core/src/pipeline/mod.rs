//! Page scaling and read-ahead scheduling.

pub mod queue;
pub mod resize;

pub type Result<T> = crate::Result<T>;
