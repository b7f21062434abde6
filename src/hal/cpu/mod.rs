//! Built-in kernels for host CPUs.

use std::borrow::Cow;

use half::f16;

use super::{
    ops::OpId,
    registry::{KernelEntry, RegistryBuilder, RegistryError},
};
use crate::loom::{
    device::{Capability, CapabilitySet},
    num::{DataType, Scalar},
    ops::{TensorMut, TensorRef},
    space::{Coordinate, IterationSpace},
    tensor::{DataLayout, TensorError},
};

pub use add::{AddKernel, WideAddKernel};
pub use copy::CopyKernel;

pub mod add;
pub mod copy;

/// A line of a window along dimension 0.
#[derive(Debug, Clone, Copy)]
pub struct Row {
    pub start: Coordinate,
    pub len: usize,
    pub step: i64,
}

impl Row {
    pub fn coords(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (0..self.len).map(|index| {
            let mut coord = self.start;
            coord.set(0, self.start.get(0) + index as i64 * self.step);
            coord
        })
    }

    /// Reads the row from `input`, borrowing when it is contiguous.
    pub fn read<'a, T: Scalar>(&self, input: &TensorRef<'a>) -> Result<Cow<'a, [T]>, TensorError> {
        match self.step {
            1 => input.read_row(&self.start, self.len).map(Cow::Borrowed),
            _ => self
                .coords()
                .map(|coord| input.read::<T>(&coord))
                .collect::<Result<Vec<_>, _>>()
                .map(Cow::Owned),
        }
    }

    /// Writes `values` at the output coordinates of the row.
    ///
    /// # Safety
    /// No other thread may access the written elements concurrently.
    pub unsafe fn write<T: Scalar>(
        &self,
        output: &TensorMut,
        origin: Coordinate,
        values: &[T],
    ) -> Result<(), TensorError> {
        let start = self.start - origin;
        match self.step {
            // SAFETY: forwarded to the caller.
            1 => unsafe { output.write_row(&start, values) },
            _ => {
                for (coord, &value) in self.coords().zip(values) {
                    // SAFETY: forwarded to the caller.
                    unsafe { output.write(&(coord - origin), value)? };
                }
                Ok(())
            }
        }
    }
}

/// Splits `window` into its rows along dimension 0.
pub fn rows(window: &IterationSpace) -> impl Iterator<Item = Row> + use<> {
    let dimension = window.dim(0);
    let len = dimension.num_iterations();
    let step = dimension.step;
    window
        .collapse(0)
        .iter()
        .map(move |start| Row { start, len, step })
}

macro_rules! register_for_types {
    ($builder:expr, $layout:expr, $op:expr, $kernel:ident, [$(($ty:ty, $name:literal)),+ $(,)?]) => {{
        let mut builder = $builder;
        $(
            builder = builder.register(KernelEntry::new(
                $name,
                $op,
                <$ty as Scalar>::DATA_TYPE,
                $layout,
                $kernel::<$ty>::default(),
            ))?;
        )+
        builder
    }};
}

impl RegistryBuilder {
    /// Registers the built-in kernels for every layout.
    pub fn add_default_kernels(self) -> Result<Self, RegistryError> {
        let mut builder = self;
        for layout in DataLayout::ALL {
            builder = builder.add_default_kernels_for(layout)?;
        }
        Ok(builder)
    }

    fn add_default_kernels_for(self, layout: DataLayout) -> Result<Self, RegistryError> {
        let builder = register_for_types!(
            self,
            layout,
            OpId::COPY,
            CopyKernel,
            [
                (f32, "fp32_copy"),
                (f16, "fp16_copy"),
                (u8, "u8_copy"),
                (u16, "u16_copy"),
                (u32, "u32_copy"),
                (i8, "s8_copy"),
                (i16, "s16_copy"),
                (i32, "s32_copy"),
            ]
        );
        let builder = register_for_types!(
            builder,
            layout,
            OpId::ADD,
            AddKernel,
            [
                (f32, "fp32_add"),
                (f16, "fp16_add"),
                (u8, "u8_add"),
                (u16, "u16_add"),
                (u32, "u32_add"),
                (i8, "s8_add"),
                (i16, "s16_add"),
                (i32, "s32_add"),
            ]
        );

        let wide = |name, data_type, requires: CapabilitySet| {
            KernelEntry::new(name, OpId::ADD, data_type, layout, WideAddKernel)
                .requires(requires)
                .priority(10)
        };
        let avx2 = CapabilitySet::from([Capability::Avx2]);
        let neon = CapabilitySet::from([Capability::Neon]);
        let neon_fp16 = neon.with(Capability::Fp16);
        builder
            .register(wide("avx2_fp32_add", DataType::F32, avx2))?
            .register(wide("neon_fp32_add", DataType::F32, neon))?
            .register(wide("neon_fp16_add", DataType::F16, neon_fp16))
    }
}
