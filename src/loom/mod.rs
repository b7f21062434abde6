//! The `loom` module provides the foundational types every operator invocation is built from.
//! It knows nothing about concrete operators; it describes where work happens and on what data.
//!
//! ## Key Components
//! 1. **Iteration Spaces**:
//!    - Coordinates and per-dimension `[start, end):step` ranges (`IterationSpace`).
//!    - Restriction, shifting and collapsing of spaces, and coordinate iteration.
//!
//! 2. **Valid Regions and Borders**:
//!    - `ValidRegion` marks the meaningful part of a padded tensor.
//!    - `classify` splits a space into an interior and edges needing border handling.
//!
//! 3. **Partitioning**:
//!    - `partition` cuts a space into balanced, disjoint `WorkSlice`s, one per worker.
//!
//! 4. **Tensors and Devices**:
//!    - Tensor descriptors (`TensorInfo`), host tensors and the borrowed views kernels receive.
//!    - Host capability detection and the worker pool of the `Cpu` device.

pub mod device;
pub mod num;
pub mod ops;
pub mod region;
pub mod slice;
pub mod space;
pub mod tensor;
