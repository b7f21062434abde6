use std::sync::Arc;

use derive_more::Display;
use thiserror::Error;

use super::{
    ops::{Invocation, KernelError, OpId, ThreadInfo},
    registry::{KernelHandle, Registry, RegistryError},
};
use crate::loom::{
    device::Cpu,
    num::DataType,
    ops::TensorPack,
    region::{BorderPolicy, BorderSize, RegionError, classify},
    slice::{PartitionError, partition},
    space::{Coordinate, IterationSpace, SpaceError},
    tensor::DataLayout,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("output shape {output:?} mismatches the configured shape {expected:?}")]
    OutputShape {
        output: Vec<usize>,
        expected: Vec<usize>,
    },
    #[error("output data type {output} mismatches the configured data type {expected}")]
    OutputType { output: DataType, expected: DataType },
    #[error("output layout {output} mismatches the configured layout {expected}")]
    OutputLayout {
        output: DataLayout,
        expected: DataLayout,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("no implementation: {0}")]
    NoImplementation(#[source] RegistryError),
    #[error("kernel {kernel} failed: {source}")]
    Execution {
        kernel: &'static str,
        #[source]
        source: KernelError,
    },
}

/// Steps of one invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Stage {
    Configured,
    Resolving,
    Partitioning,
    Executing,
    Joined,
}

/// Static metadata of an operator, fixed at configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDesc {
    pub op: OpId,
    pub data_type: DataType,
    pub layout: DataLayout,
    pub border: BorderPolicy,
    pub border_size: BorderSize,
    /// Shape of the output tensor; the iteration space covers it.
    pub shape: Vec<usize>,
    /// Source coordinate of output element zero.
    pub origin: Option<Coordinate>,
}

impl OperatorDesc {
    pub fn new(
        op: OpId,
        data_type: DataType,
        layout: DataLayout,
        shape: impl Into<Vec<usize>>,
    ) -> Self {
        Self {
            op,
            data_type,
            layout,
            border: BorderPolicy::default(),
            border_size: BorderSize::default(),
            shape: shape.into(),
            origin: None,
        }
    }

    pub fn with_border(self, border: BorderPolicy, border_size: BorderSize) -> Self {
        Self {
            border,
            border_size,
            ..self
        }
    }

    pub fn with_origin(self, origin: impl Into<Coordinate>) -> Self {
        let origin = Some(origin.into());
        Self { origin, ..self }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorId;

/// A configured operator: the resolved kernel plus the space it iterates.
#[derive(Debug, Clone, Display)]
#[display("{op}:{data_type}:{layout} [{name}] over {space}")]
pub struct OperatorHandle {
    id: uid::Id<OperatorId>,
    op: OpId,
    data_type: DataType,
    layout: DataLayout,
    kernel: KernelHandle,
    name: &'static str,
    shape: Vec<usize>,
    /// The iteration space in source coordinates.
    space: IterationSpace,
    origin: Coordinate,
    border: BorderPolicy,
    border_size: BorderSize,
}

impl OperatorHandle {
    #[inline]
    pub fn id(&self) -> uid::Id<OperatorId> {
        self.id
    }

    #[inline]
    pub fn op(&self) -> OpId {
        self.op
    }

    /// Name of the resolved kernel variant.
    #[inline]
    pub fn kernel_name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kernel(&self) -> KernelHandle {
        self.kernel
    }

    #[inline]
    pub fn space(&self) -> &IterationSpace {
        &self.space
    }

    #[inline]
    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    #[inline]
    pub fn border(&self) -> BorderPolicy {
        self.border
    }

    #[inline]
    pub fn border_size(&self) -> BorderSize {
        self.border_size
    }
}

/// Resolves operators against a device and runs them on its worker pool.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    device: Cpu,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(device: Cpu, registry: impl Into<Arc<Registry>>) -> Self {
        let registry = registry.into();
        Self { device, registry }
    }

    #[inline]
    pub fn device(&self) -> &Cpu {
        &self.device
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolves the kernel for `desc` once. No work is dispatched.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(op = %desc.op)))]
    pub fn configure(&self, desc: &OperatorDesc) -> Result<OperatorHandle, DispatchError> {
        let space = IterationSpace::from_shape(&desc.shape).map_err(ConfigurationError::from)?;
        let origin = match desc.origin {
            Some(origin) => origin,
            None => Coordinate::zeros(space.rank()).map_err(ConfigurationError::from)?,
        };
        let space = space.shift(&origin).map_err(ConfigurationError::from)?;
        log::trace!("[{}] {} over {space}", Stage::Configured, desc.op);

        let capabilities = self.device.capabilities();
        log::trace!("[{}] {} with {capabilities}", Stage::Resolving, desc.op);
        let kernel = self
            .registry
            .resolve(desc.op, desc.data_type, desc.layout, capabilities)
            .map_err(DispatchError::NoImplementation)?;
        let name = self
            .registry
            .entry(kernel)
            .map(|entry| entry.name)
            .unwrap_or_default();

        let id = uid::Id::new();
        log::debug!(
            "operator {} ({}, {}, {}) resolved to {name} on capabilities {capabilities}",
            id.get(),
            desc.op,
            desc.data_type,
            desc.layout
        );
        Ok(OperatorHandle {
            id,
            op: desc.op,
            data_type: desc.data_type,
            layout: desc.layout,
            kernel,
            name,
            shape: desc.shape.clone(),
            space,
            origin,
            border: desc.border,
            border_size: desc.border_size,
        })
    }

    /// Runs one invocation of `handle` on `pack` and blocks until every slice has finished.
    ///
    /// Interior slices run in parallel; edges run in sequence on one worker. The first kernel
    /// failure is reported, and the output is then left in an unspecified state.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(op = %handle.op)))]
    pub fn run(&self, handle: &OperatorHandle, pack: &TensorPack) -> Result<(), DispatchError> {
        let output = pack.output().info();
        if output.data_type() != handle.data_type {
            let output = output.data_type();
            let expected = handle.data_type;
            return Err(ConfigurationError::OutputType { output, expected }.into());
        }
        if output.layout() != handle.layout {
            let output = output.layout();
            let expected = handle.layout;
            return Err(ConfigurationError::OutputLayout { output, expected }.into());
        }
        if output.shape() != handle.shape {
            let output = output.shape().to_vec();
            let expected = handle.shape.clone();
            return Err(ConfigurationError::OutputShape { output, expected }.into());
        }

        let kernel = self
            .registry
            .kernel(handle.kernel)
            .ok_or_else(|| {
                DispatchError::NoImplementation(RegistryError::NoImplementation {
                    op: handle.op,
                    data_type: handle.data_type,
                    layout: handle.layout,
                    detected: self.device.capabilities(),
                })
            })?
            .clone();
        if handle.space.is_empty() {
            log::trace!("[{}] {} has nothing to do", Stage::Joined, handle);
            return Ok(());
        }

        let time = instant::Instant::now();
        let region = pack
            .reference_region()
            .map_err(ConfigurationError::from)?;
        let classification = classify(&handle.space, &region, handle.border_size)
            .map_err(ConfigurationError::from)?;
        let slices = match classification.interior() {
            Some(interior) => partition(
                interior,
                self.device.num_threads(),
                kernel.min_workload().max(1),
            )
            .map_err(ConfigurationError::from)?,
            None => vec![],
        };
        let edges = classification.edges();
        log::trace!(
            "[{}] {}: {} slices, {} edges, within border: {}",
            Stage::Partitioning,
            handle,
            slices.len(),
            edges.len(),
            classification.within_border()
        );

        log::trace!("[{}] {}", Stage::Executing, handle);
        let (sender, receiver) = flume::unbounded();
        let num_threads = slices.len();
        let (origin, border) = (handle.origin, handle.border);
        self.device.pool().scope(|scope| {
            for slice in &slices {
                let sender = sender.clone();
                let kernel = &kernel;
                scope.spawn(move |_| {
                    let invocation = Invocation {
                        pack,
                        window: slice.space(),
                        origin,
                        border,
                        thread: ThreadInfo {
                            thread_id: slice.index(),
                            num_threads,
                        },
                    };
                    if let Err(err) = kernel.run(&invocation) {
                        _ = sender.send(err);
                    }
                });
            }
            if !edges.is_empty() {
                let sender = sender.clone();
                let kernel = &kernel;
                scope.spawn(move |_| {
                    for edge in edges {
                        let invocation = Invocation {
                            pack,
                            window: edge,
                            origin,
                            border,
                            thread: ThreadInfo {
                                thread_id: 0,
                                num_threads: 1,
                            },
                        };
                        if let Err(err) = kernel.run_border(&invocation) {
                            _ = sender.send(err);
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        if let Some(source) = receiver.try_iter().next() {
            log::error!("{handle} failed: {source}");
            return Err(DispatchError::Execution {
                kernel: handle.name,
                source,
            });
        }
        log::trace!(
            "[{}] {} in {:?}",
            Stage::Joined,
            handle,
            time.elapsed()
        );
        Ok(())
    }
}
