use std::sync::Arc;

use itertools::Itertools;
use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

use super::ops::{Kernel, OpId};
use crate::loom::{
    device::CapabilitySet,
    num::DataType,
    tensor::DataLayout,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate kernel entry {name}: ({op}, {data_type}, {layout}, {requires}) is already registered")]
    Duplicate {
        name: &'static str,
        op: OpId,
        data_type: DataType,
        layout: DataLayout,
        requires: CapabilitySet,
    },
    #[error("no fallback kernel for ({op}, {data_type}, {layout}): every entry requires capabilities")]
    MissingFallback {
        op: OpId,
        data_type: DataType,
        layout: DataLayout,
    },
    #[error("no kernel for ({op}, {data_type}, {layout}) runs with capabilities {detected}")]
    NoImplementation {
        op: OpId,
        data_type: DataType,
        layout: DataLayout,
        detected: CapabilitySet,
    },
}

/// Refers to a registered kernel of a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelHandle(usize);

/// One implementation variant of an operation.
#[derive(Clone)]
pub struct KernelEntry {
    pub op: OpId,
    pub data_type: DataType,
    pub layout: DataLayout,
    /// Capabilities the host must have for the kernel to run.
    pub requires: CapabilitySet,
    pub priority: i32,
    pub name: &'static str,
    pub kernel: Arc<dyn Kernel>,
}

impl std::fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelEntry")
            .field("op", &self.op)
            .field("data_type", &self.data_type)
            .field("layout", &self.layout)
            .field("requires", &self.requires)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl KernelEntry {
    /// A fallback entry: no required capabilities, priority 0.
    pub fn new(
        name: &'static str,
        op: OpId,
        data_type: DataType,
        layout: DataLayout,
        kernel: impl Kernel + 'static,
    ) -> Self {
        Self {
            op,
            data_type,
            layout,
            requires: CapabilitySet::empty(),
            priority: 0,
            name,
            kernel: Arc::new(kernel),
        }
    }

    pub fn requires(self, requires: impl Into<CapabilitySet>) -> Self {
        let requires = requires.into();
        Self { requires, ..self }
    }

    pub fn priority(self, priority: i32) -> Self {
        Self { priority, ..self }
    }

    #[inline]
    fn key(&self) -> EntryKey {
        (self.op, self.data_type, self.layout)
    }
}

type EntryKey = (OpId, DataType, DataLayout);

#[derive(Debug, Default, Clone)]
pub struct RegistryBuilder {
    entries: Vec<KernelEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entry`, rejecting a second entry with the same operation, type, layout and
    /// required capabilities.
    pub fn register(mut self, entry: KernelEntry) -> Result<Self, RegistryError> {
        let duplicate = self
            .entries
            .iter()
            .any(|other| other.key() == entry.key() && other.requires == entry.requires);
        if duplicate {
            log::warn!("rejected duplicate kernel entry {}", entry.name);
            return Err(RegistryError::Duplicate {
                name: entry.name,
                op: entry.op,
                data_type: entry.data_type,
                layout: entry.layout,
                requires: entry.requires,
            });
        }
        self.entries.push(entry);
        Ok(self)
    }

    /// Freezes the table, checking that every combination has a fallback.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut index: HashMap<EntryKey, Vec<usize>> = HashMap::default();
        for (id, entry) in self.entries.iter().enumerate() {
            index.entry(entry.key()).or_default().push(id);
        }

        let missing = index
            .iter()
            .filter(|(_, ids)| ids.iter().all(|&id| !self.entries[id].requires.is_empty()))
            .map(|(key, _)| *key)
            .sorted()
            .next();
        if let Some((op, data_type, layout)) = missing {
            log::warn!("kernel registry lacks a fallback for ({op}, {data_type}, {layout})");
            return Err(RegistryError::MissingFallback {
                op,
                data_type,
                layout,
            });
        }

        log::debug!(
            "kernel registry built with {} entries for {} combinations",
            self.entries.len(),
            index.len()
        );
        let entries = self.entries;
        Ok(Registry { entries, index })
    }
}

/// The immutable table of kernel variants.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<KernelEntry>,
    /// Entry ids per combination, in registration order.
    index: HashMap<EntryKey, Vec<usize>>,
}

impl Registry {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Picks the highest-priority entry whose requirements `detected` satisfies.
    ///
    /// Ties go to the entry registered first. An entry requiring a capability missing from
    /// `detected` is never picked.
    pub fn resolve(
        &self,
        op: OpId,
        data_type: DataType,
        layout: DataLayout,
        detected: CapabilitySet,
    ) -> Result<KernelHandle, RegistryError> {
        self.index
            .get(&(op, data_type, layout))
            .into_iter()
            .flatten()
            .copied()
            .filter(|&id| self.entries[id].requires.is_subset(&detected))
            .fold(None, |best: Option<usize>, id| match best {
                Some(x) if self.entries[x].priority >= self.entries[id].priority => Some(x),
                _ => Some(id),
            })
            .map(KernelHandle)
            .ok_or(RegistryError::NoImplementation {
                op,
                data_type,
                layout,
                detected,
            })
    }

    #[inline]
    pub fn entry(&self, handle: KernelHandle) -> Option<&KernelEntry> {
        self.entries.get(handle.0)
    }

    #[inline]
    pub fn kernel(&self, handle: KernelHandle) -> Option<&Arc<dyn Kernel>> {
        self.entry(handle).map(|entry| &entry.kernel)
    }

    pub fn entries(&self) -> impl Iterator<Item = (KernelHandle, &KernelEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(id, entry)| (KernelHandle(id), entry))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{KernelEntry, RegistryBuilder, RegistryError};
    use crate::{
        hal::ops::{Invocation, Kernel, KernelError, OpId},
        loom::{
            device::{Capability, CapabilitySet},
            num::DataType,
            tensor::DataLayout,
        },
    };

    struct PhonyKernel;

    impl Kernel for PhonyKernel {
        fn run(&self, _invocation: &Invocation) -> Result<(), KernelError> {
            Ok(())
        }

        fn run_border(&self, _invocation: &Invocation) -> Result<(), KernelError> {
            Ok(())
        }
    }

    const OP: OpId = OpId("phony");
    const LAYOUT: DataLayout = DataLayout::Nchw;

    fn entry(name: &'static str, data_type: DataType) -> KernelEntry {
        KernelEntry::new(name, OP, data_type, LAYOUT, PhonyKernel)
    }

    #[test]
    fn test_capability_safety() -> Result<(), Box<dyn Error>> {
        let registry = RegistryBuilder::new()
            .register(entry("v1", DataType::F32))?
            .register(
                entry("v2", DataType::F16)
                    .requires([Capability::Fp16])
                    .priority(10),
            )?
            .register(entry("v3", DataType::F16))?
            .build()?;

        let handle = registry.resolve(OP, DataType::F16, LAYOUT, CapabilitySet::empty())?;
        assert_eq!(registry.entry(handle).map(|entry| entry.name), Some("v3"));

        let fp16 = CapabilitySet::from([Capability::Fp16, Capability::Neon]);
        let handle = registry.resolve(OP, DataType::F16, LAYOUT, fp16)?;
        assert_eq!(registry.entry(handle).map(|entry| entry.name), Some("v2"));

        let handle = registry.resolve(OP, DataType::F32, LAYOUT, fp16)?;
        assert_eq!(registry.entry(handle).map(|entry| entry.name), Some("v1"));
        Ok(())
    }

    #[test]
    fn test_tie_breaks_by_registration_order() -> Result<(), Box<dyn Error>> {
        let registry = RegistryBuilder::new()
            .register(entry("fallback", DataType::I32))?
            .register(entry("first", DataType::I32).requires([Capability::Avx2]).priority(5))?
            .register(entry("second", DataType::I32).requires([Capability::Fma]).priority(5))?
            .build()?;

        let detected = CapabilitySet::from([Capability::Avx2, Capability::Fma]);
        let handle = registry.resolve(OP, DataType::I32, LAYOUT, detected)?;
        assert_eq!(registry.entry(handle).map(|entry| entry.name), Some("first"));

        let detected = CapabilitySet::from([Capability::Fma]);
        let handle = registry.resolve(OP, DataType::I32, LAYOUT, detected)?;
        assert_eq!(registry.entry(handle).map(|entry| entry.name), Some("second"));
        Ok(())
    }

    #[test]
    fn test_registration_errors() -> Result<(), Box<dyn Error>> {
        let builder = RegistryBuilder::new().register(entry("a", DataType::U8))?;
        assert!(matches!(
            builder.clone().register(entry("b", DataType::U8)),
            Err(RegistryError::Duplicate { name: "b", .. })
        ));

        let builder = builder.register(entry("c", DataType::U8).requires([Capability::Sve]))?;
        assert!(builder.build().is_ok());

        let result = RegistryBuilder::new()
            .register(entry("d", DataType::U16).requires([Capability::Sve2]))?
            .build();
        assert!(matches!(
            result,
            Err(RegistryError::MissingFallback {
                data_type: DataType::U16,
                ..
            })
        ));

        let registry = RegistryBuilder::new().build()?;
        assert!(matches!(
            registry.resolve(OP, DataType::F32, LAYOUT, CapabilitySet::empty()),
            Err(RegistryError::NoImplementation { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_random_capability_safety() -> Result<(), Box<dyn Error>> {
        let mut rng = fastrand::Rng::with_seed(42);
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        for _ in 0..100 {
            let mut builder = RegistryBuilder::new().register(entry("fallback", DataType::F32))?;
            for name in names {
                let requires: CapabilitySet = Capability::ALL
                    .into_iter()
                    .filter(|_| rng.u8(..4) == 0)
                    .collect();
                let variant = entry(name, DataType::F32)
                    .requires(requires)
                    .priority(rng.i32(-5..5));
                // duplicates of an earlier requirement set are allowed to fail
                builder = match builder.clone().register(variant) {
                    Ok(builder) => builder,
                    Err(_) => builder,
                };
            }
            let registry = builder.build()?;

            let detected: CapabilitySet = Capability::ALL
                .into_iter()
                .filter(|_| rng.bool())
                .collect();
            let handle = registry.resolve(OP, DataType::F32, LAYOUT, detected)?;
            let chosen = registry.entry(handle).ok_or("dangling handle")?;
            assert!(chosen.requires.is_subset(&detected));

            let best = registry
                .entries()
                .filter(|(_, entry)| entry.requires.is_subset(&detected))
                .map(|(_, entry)| entry.priority)
                .max();
            assert_eq!(Some(chosen.priority), best);

            let handle = registry.resolve(OP, DataType::F32, LAYOUT, CapabilitySet::empty())?;
            assert!(registry.entry(handle).is_some_and(|entry| entry.requires.is_empty()));
        }
        Ok(())
    }
}
