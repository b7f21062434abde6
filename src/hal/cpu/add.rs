use std::marker::PhantomData;

use half::{f16, slice::HalfFloatSliceExt};
use itertools::Itertools;
use wide::f32x8;

use super::rows;
use crate::{
    hal::ops::{Invocation, Kernel, KernelError},
    loom::{
        num::{DataType, Scalar},
        tensor::TensorError,
    },
};

/// Scalar addition as the add kernels define it: floats add, integers wrap.
pub trait Addend: Scalar {
    fn plus(self, rhs: Self) -> Self;
}

impl Addend for f32 {
    #[inline]
    fn plus(self, rhs: Self) -> Self {
        self + rhs
    }
}

impl Addend for f16 {
    #[inline]
    fn plus(self, rhs: Self) -> Self {
        self + rhs
    }
}

macro_rules! impl_addend_wrapping {
    ($($ty:ty),+) => {
        $(
            impl Addend for $ty {
                #[inline]
                fn plus(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }
            }
        )+
    };
}

impl_addend_wrapping!(u8, u16, u32, i8, i16, i32);

/// Element-wise sum of two inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddKernel<T>(PhantomData<T>);

impl<T: Addend> Kernel for AddKernel<T> {
    fn run(&self, invocation: &Invocation) -> Result<(), KernelError> {
        invocation.check_inputs(2)?;
        let [x, y] = [0, 1].map(|index| &invocation.pack.inputs()[index]);
        let output = invocation.pack.output();
        let mut z = vec![];
        for row in rows(invocation.window) {
            let (x, y) = (row.read::<T>(x)?, row.read::<T>(y)?);
            z.clear();
            z.extend(x.iter().zip_eq(y.iter()).map(|(&x, &y)| x.plus(y)));
            // SAFETY: windows of one invocation are disjoint.
            unsafe { row.write(output, invocation.origin, &z)? };
        }
        Ok(())
    }

    fn run_border(&self, invocation: &Invocation) -> Result<(), KernelError> {
        add_border::<T>(invocation)
    }
}

/// Adds border coordinates one by one; a coordinate is skipped if either operand is undefined.
fn add_border<T: Addend>(invocation: &Invocation) -> Result<(), KernelError> {
    invocation.check_inputs(2)?;
    let [x, y] = [0, 1].map(|index| &invocation.pack.inputs()[index]);
    let output = invocation.pack.output();
    for coord in invocation.window {
        let x = x.resolve::<T>(&coord, invocation.border)?;
        let y = y.resolve::<T>(&coord, invocation.border)?;
        let (Some(x), Some(y)) = (x, y) else {
            continue;
        };
        let coord = invocation.output_coordinate(&coord);
        // SAFETY: windows of one invocation are disjoint.
        unsafe { output.write(&coord, x.plus(y))? };
    }
    Ok(())
}

const LANES: usize = 8;

fn add_wide(x: &[f32], y: &[f32], z: &mut [f32]) {
    let body = z.len() / LANES * LANES;
    let (x_body, x_tail) = x.split_at(body);
    let (y_body, y_tail) = y.split_at(body);
    let (z_body, z_tail) = z.split_at_mut(body);

    for ((x, y), z) in x_body
        .chunks_exact(LANES)
        .zip(y_body.chunks_exact(LANES))
        .zip(z_body.chunks_exact_mut(LANES))
    {
        let (mut a, mut b) = ([0.0; LANES], [0.0; LANES]);
        a.copy_from_slice(x);
        b.copy_from_slice(y);
        let c = f32x8::new(a) + f32x8::new(b);
        z.copy_from_slice(&c.to_array());
    }
    for ((x, y), z) in x_tail.iter().zip(y_tail).zip(z_tail) {
        *z = x + y;
    }
}

/// Vectorized add for `f32`, and for `f16` through `f32` lanes.
#[derive(Debug, Default, Clone, Copy)]
pub struct WideAddKernel;

impl WideAddKernel {
    fn run_f32(&self, invocation: &Invocation) -> Result<(), KernelError> {
        let [x, y] = [0, 1].map(|index| &invocation.pack.inputs()[index]);
        let output = invocation.pack.output();
        let mut z = vec![];
        for row in rows(invocation.window) {
            let (x, y) = (row.read::<f32>(x)?, row.read::<f32>(y)?);
            z.resize(row.len, 0.0);
            add_wide(&x, &y, &mut z);
            // SAFETY: windows of one invocation are disjoint.
            unsafe { row.write(output, invocation.origin, &z)? };
        }
        Ok(())
    }

    fn run_f16(&self, invocation: &Invocation) -> Result<(), KernelError> {
        let [x, y] = [0, 1].map(|index| &invocation.pack.inputs()[index]);
        let output = invocation.pack.output();
        let (mut a, mut b, mut c) = (vec![], vec![], vec![]);
        let mut z = vec![];
        for row in rows(invocation.window) {
            let (x, y) = (row.read::<f16>(x)?, row.read::<f16>(y)?);
            for buffer in [&mut a, &mut b, &mut c] {
                buffer.resize(row.len, 0.0);
            }
            z.resize(row.len, f16::ZERO);
            x.convert_to_f32_slice(&mut a);
            y.convert_to_f32_slice(&mut b);
            add_wide(&a, &b, &mut c);
            z.convert_from_f32_slice(&c);
            // SAFETY: windows of one invocation are disjoint.
            unsafe { row.write(output, invocation.origin, &z)? };
        }
        Ok(())
    }
}

impl Kernel for WideAddKernel {
    fn run(&self, invocation: &Invocation) -> Result<(), KernelError> {
        invocation.check_inputs(2)?;
        match invocation.pack.output().info().data_type() {
            DataType::F32 => self.run_f32(invocation),
            DataType::F16 => self.run_f16(invocation),
            data_type => Err(TensorError::Type(data_type, DataType::F32).into()),
        }
    }

    fn run_border(&self, invocation: &Invocation) -> Result<(), KernelError> {
        match invocation.pack.output().info().data_type() {
            DataType::F32 => add_border::<f32>(invocation),
            DataType::F16 => add_border::<f16>(invocation),
            data_type => Err(TensorError::Type(data_type, DataType::F32).into()),
        }
    }

    fn min_workload(&self) -> usize {
        LANES
    }
}
