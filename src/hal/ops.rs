use derive_more::{Deref, Display, From};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loom::{
    ops::TensorPack,
    region::BorderPolicy,
    space::{Coordinate, IterationSpace},
    tensor::TensorError,
};

/// Names an operation; kernels for the same operation share one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deref, Display, From)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OpId(pub &'static str);

impl OpId {
    /// Element-wise sum of two inputs.
    pub const ADD: OpId = OpId("add");
    /// Window copy of one input, cropping or padding through the border policy.
    pub const COPY: OpId = OpId("copy");
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("kernel expects input {index}, but only {count} are given")]
    MissingInput { index: usize, count: usize },
    #[error("kernel failed: {0}")]
    Failed(String),
}

/// Identifies the worker running an interior slice.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{thread_id}/{num_threads}")]
pub struct ThreadInfo {
    pub thread_id: usize,
    pub num_threads: usize,
}

/// Everything one kernel call sees.
///
/// `window` is expressed in source coordinates: the output element written for a coordinate
/// `c` of the window is `c - origin`.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub pack: &'a TensorPack<'a>,
    pub window: &'a IterationSpace,
    pub origin: Coordinate,
    pub border: BorderPolicy,
    pub thread: ThreadInfo,
}

impl Invocation<'_> {
    #[inline]
    pub fn output_coordinate(&self, coord: &Coordinate) -> Coordinate {
        *coord - self.origin
    }

    #[inline]
    pub fn input_count(&self) -> usize {
        self.pack.inputs().len()
    }

    /// Fails unless the pack holds at least `count` inputs.
    pub fn check_inputs(&self, count: usize) -> Result<(), KernelError> {
        match self.input_count() {
            x if x >= count => Ok(()),
            x => Err(KernelError::MissingInput {
                index: count - 1,
                count: x,
            }),
        }
    }
}

/// A concrete implementation of an operation for one data type and layout.
///
/// The interior routine is only called on windows lying inside the reference valid region and
/// may read its inputs without bounds handling. The border routine covers the rest and resolves
/// out-of-region reads through [`Invocation::border`].
pub trait Kernel: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<(), KernelError>;

    fn run_border(&self, invocation: &Invocation) -> Result<(), KernelError>;

    /// Smallest number of coordinates along the split dimension worth a thread of its own.
    fn min_workload(&self) -> usize {
        1
    }
}
