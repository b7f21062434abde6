use std::sync::OnceLock;

use derive_more::Display;
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cpu::{Cpu, CpuBuilder};

pub mod cpu;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("a device needs at least one worker thread")]
    NoThreads,
}

/// An instruction-set feature a kernel variant may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Capability {
    #[display("neon")]
    Neon,
    #[display("fp16")]
    Fp16,
    #[display("dotprod")]
    DotProd,
    #[display("i8mm")]
    I8mm,
    #[display("bf16")]
    Bf16,
    #[display("sve")]
    Sve,
    #[display("sve2")]
    Sve2,
    #[display("sse4.1")]
    Sse41,
    #[display("avx2")]
    Avx2,
    #[display("fma")]
    Fma,
    #[display("avx512f")]
    Avx512f,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Neon,
        Capability::Fp16,
        Capability::DotProd,
        Capability::I8mm,
        Capability::Bf16,
        Capability::Sve,
        Capability::Sve2,
        Capability::Sse41,
        Capability::Avx2,
        Capability::Fma,
        Capability::Avx512f,
    ];

    #[inline]
    const fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// A set of [`Capability`] flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CapabilitySet(u32);

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().format(", "))
    }
}

impl CapabilitySet {
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    #[inline]
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    #[inline]
    pub const fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns `true` if every capability in `self` is also in `other`.
    #[inline]
    pub const fn is_subset(&self, other: &CapabilitySet) -> bool {
        self.0 & !other.0 == 0
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .into_iter()
            .filter(|&capability| self.contains(capability))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(value: [Capability; N]) -> Self {
        value.into_iter().collect()
    }
}

/// Queries the host processor once and returns its capabilities.
pub fn detect() -> CapabilitySet {
    static CAPABILITIES: OnceLock<CapabilitySet> = OnceLock::new();
    *CAPABILITIES.get_or_init(|| {
        let capabilities = probe();
        log::info!("detected cpu capabilities: {capabilities}");
        capabilities
    })
}

#[cfg(target_arch = "x86_64")]
fn probe() -> CapabilitySet {
    let mut capabilities = CapabilitySet::empty();
    if std::arch::is_x86_feature_detected!("sse4.1") {
        capabilities.insert(Capability::Sse41);
    }
    if std::arch::is_x86_feature_detected!("avx2") {
        capabilities.insert(Capability::Avx2);
    }
    if std::arch::is_x86_feature_detected!("fma") {
        capabilities.insert(Capability::Fma);
    }
    if std::arch::is_x86_feature_detected!("avx512f") {
        capabilities.insert(Capability::Avx512f);
    }
    capabilities
}

#[cfg(target_arch = "aarch64")]
fn probe() -> CapabilitySet {
    let mut capabilities = CapabilitySet::empty();
    if std::arch::is_aarch64_feature_detected!("neon") {
        capabilities.insert(Capability::Neon);
    }
    if std::arch::is_aarch64_feature_detected!("fp16") {
        capabilities.insert(Capability::Fp16);
    }
    if std::arch::is_aarch64_feature_detected!("dotprod") {
        capabilities.insert(Capability::DotProd);
    }
    if std::arch::is_aarch64_feature_detected!("i8mm") {
        capabilities.insert(Capability::I8mm);
    }
    if std::arch::is_aarch64_feature_detected!("bf16") {
        capabilities.insert(Capability::Bf16);
    }
    if std::arch::is_aarch64_feature_detected!("sve") {
        capabilities.insert(Capability::Sve);
    }
    if std::arch::is_aarch64_feature_detected!("sve2") {
        capabilities.insert(Capability::Sve2);
    }
    capabilities
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn probe() -> CapabilitySet {
    CapabilitySet::empty()
}

#[cfg(test)]
mod tests {
    use super::{Capability, CapabilitySet, detect};

    #[test]
    fn test_capability_set() {
        let set = CapabilitySet::from([Capability::Sve, Capability::Fp16]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Capability::Fp16));
        assert!(!set.contains(Capability::Neon));
        assert_eq!(set.to_string(), "{fp16, sve}");

        let superset = set.with(Capability::Neon);
        assert!(set.is_subset(&superset));
        assert!(!superset.is_subset(&set));
        assert!(CapabilitySet::empty().is_subset(&set));
        assert!(CapabilitySet::empty().is_empty());
        assert_eq!(superset.iter().count(), 3);
    }

    #[test]
    fn test_detect_is_stable() {
        assert_eq!(detect(), detect());
    }
}
