use std::marker::PhantomData;

use super::rows;
use crate::{
    hal::ops::{Invocation, Kernel, KernelError},
    loom::num::Scalar,
};

/// Copies a window of the source into the output, cropping or padding it.
///
/// Output element `c - origin` receives source element `c`. Source coordinates outside the
/// source's valid region resolve through the border policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyKernel<T>(PhantomData<T>);

impl<T: Scalar> Kernel for CopyKernel<T> {
    fn run(&self, invocation: &Invocation) -> Result<(), KernelError> {
        invocation.check_inputs(1)?;
        let input = &invocation.pack.inputs()[0];
        let output = invocation.pack.output();
        for row in rows(invocation.window) {
            let values = row.read::<T>(input)?;
            // SAFETY: windows of one invocation are disjoint.
            unsafe { row.write(output, invocation.origin, &values)? };
        }
        Ok(())
    }

    fn run_border(&self, invocation: &Invocation) -> Result<(), KernelError> {
        invocation.check_inputs(1)?;
        let input = &invocation.pack.inputs()[0];
        let output = invocation.pack.output();
        for coord in invocation.window {
            let Some(value) = input.resolve::<T>(&coord, invocation.border)? else {
                continue;
            };
            let coord = invocation.output_coordinate(&coord);
            // SAFETY: windows of one invocation are disjoint.
            unsafe { output.write(&coord, value)? };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use itertools::Itertools;

    use crate::{
        hal::{
            dispatch::{Dispatcher, OperatorDesc},
            ops::OpId,
            registry::RegistryBuilder,
        },
        loom::{
            device::CpuBuilder,
            num::DataType,
            ops::TensorPack,
            region::{BorderPolicy, BorderSize, ValidRegion},
            tensor::{DataLayout, Tensor},
        },
    };

    fn dispatcher(num_threads: usize) -> Result<Dispatcher, Box<dyn Error>> {
        let registry = RegistryBuilder::new().add_default_kernels()?.build()?;
        let cpu = CpuBuilder::new().num_threads(num_threads).build()?;
        Ok(Dispatcher::new(cpu, registry))
    }

    #[test]
    fn test_constant_border() -> Result<(), Box<dyn Error>> {
        let dispatcher = dispatcher(4)?;

        // source rows [-1, 12) of a 10x10 tensor
        let data = (0..100).map(|x| x as f32).collect_vec();
        let input = Tensor::create([10, 10], data)?;
        let mut output = Tensor::<f32>::zeros([10, 13])?;

        let desc = OperatorDesc::new(OpId::COPY, DataType::F32, DataLayout::Nchw, [10, 13])
            .with_origin([0, -1])
            .with_border(BorderPolicy::Constant(7.0), BorderSize::new(2, 0, 2, 0));
        let handle = dispatcher.configure(&desc)?;
        assert_eq!(handle.kernel_name(), "fp32_copy");

        let pack = TensorPack::new([input.view()], output.view_mut());
        dispatcher.run(&handle, &pack)?;
        drop(pack);

        for (y, x) in itertools::iproduct!(0..13i64, 0..10i64) {
            let value = output.get([x, y]).ok_or("missing element")?;
            match y {
                0 | 11 | 12 => assert_eq!(value, 7.0, "edge ({x}, {y})"),
                _ => assert_eq!(value, ((y - 1) * 10 + x) as f32, "interior ({x}, {y})"),
            }
        }
        Ok(())
    }

    #[test]
    fn test_replicate_border() -> Result<(), Box<dyn Error>> {
        let dispatcher = dispatcher(3)?;

        let data = (0..16).map(|x| x as i32).collect_vec();
        let region = ValidRegion::new([1, 1], &[2, 2])?;
        let input = Tensor::create([4, 4], data)?.with_valid_region(region)?;
        let mut output = Tensor::<i32>::zeros([4, 4])?.with_layout(DataLayout::Nhwc);

        let desc = OperatorDesc::new(OpId::COPY, DataType::I32, DataLayout::Nhwc, [4, 4])
            .with_border(BorderPolicy::Replicate, BorderSize::uniform(1));
        let handle = dispatcher.configure(&desc)?;
        let pack = TensorPack::new([input.view()], output.view_mut());
        dispatcher.run(&handle, &pack)?;
        drop(pack);

        #[rustfmt::skip]
        let expected = [
            5, 5, 6, 6,
            5, 5, 6, 6,
            9, 9, 10, 10,
            9, 9, 10, 10,
        ];
        assert_eq!(output.data(), &expected);
        Ok(())
    }

    #[test]
    fn test_undefined_border() -> Result<(), Box<dyn Error>> {
        let dispatcher = dispatcher(2)?;

        let data = (1..=6).map(|x| x as u8).collect_vec();
        let input = Tensor::create([6], data)?;
        let mut output = Tensor::create([8], vec![0xffu8; 8])?;

        // crop [-1, 7) out of [0, 6)
        let desc = OperatorDesc::new(OpId::COPY, DataType::U8, DataLayout::Nchw, [8])
            .with_origin([-1]);
        let handle = dispatcher.configure(&desc)?;
        let pack = TensorPack::new([input.view()], output.view_mut());
        dispatcher.run(&handle, &pack)?;
        drop(pack);

        assert_eq!(output.data(), &[0xff, 1, 2, 3, 4, 5, 6, 0xff]);
        Ok(())
    }

    #[test]
    fn test_crop() -> Result<(), Box<dyn Error>> {
        let dispatcher = dispatcher(4)?;

        let data = (0..64).map(|x| x as u16).collect_vec();
        let input = Tensor::create([8, 8], data)?;
        let mut output = Tensor::<u16>::zeros([3, 2])?;

        let desc = OperatorDesc::new(OpId::COPY, DataType::U16, DataLayout::Nchw, [3, 2])
            .with_origin([4, 5]);
        let handle = dispatcher.configure(&desc)?;
        let pack = TensorPack::new([input.view()], output.view_mut());
        dispatcher.run(&handle, &pack)?;
        drop(pack);

        assert_eq!(output.data(), &[44, 45, 46, 52, 53, 54]);
        Ok(())
    }
}
