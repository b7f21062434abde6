//! Hardware abstraction: kernels, their registry and the dispatcher running them.

pub mod cpu;
pub mod dispatch;
pub mod ops;
pub mod registry;
