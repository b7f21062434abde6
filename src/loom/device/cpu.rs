use std::sync::Arc;

use super::{CapabilitySet, DeviceError, DeviceId, detect};

/// A host CPU executing kernels on a pool of worker threads.
#[derive(Debug, Clone)]
pub struct Cpu {
    /// The unique identifier of the device.
    id: uid::Id<DeviceId>,
    /// Instruction-set features kernels may rely on.
    capabilities: CapabilitySet,
    /// Workers that run slices of an invocation.
    pool: Arc<rayon::ThreadPool>,
}

impl Cpu {
    #[inline]
    pub fn id(&self) -> uid::Id<DeviceId> {
        self.id
    }

    #[inline]
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    #[inline]
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }
}

#[derive(Debug, Default, Clone)]
pub struct CpuBuilder {
    num_threads: Option<usize>,
    capabilities: Option<CapabilitySet>,
}

impl CpuBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads. Defaults to the number of logical cores.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Overrides the detected capabilities, e.g. to pin kernel selection in tests.
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn build(self) -> Result<Cpu, DeviceError> {
        if self.num_threads == Some(0) {
            return Err(DeviceError::NoThreads);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads.unwrap_or_default())
            .thread_name(|index| format!("weave-worker-{index}"))
            .build()?;
        let pool = Arc::new(pool);
        let capabilities = self.capabilities.unwrap_or_else(detect);
        let id = uid::Id::new();

        log::info!(
            "cpu device {} with {} threads, capabilities {capabilities}",
            id.get(),
            pool.current_num_threads()
        );
        Ok(Cpu {
            id,
            capabilities,
            pool,
        })
    }
}
