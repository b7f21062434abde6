//! `weave` is the execution substrate of CPU tensor operators.
//!
//! An operator is configured once against a kernel [`hal::registry::Registry`], which picks the
//! best kernel variant the host processor can run. Each run then classifies the operator's
//! iteration space into an interior and border edges, partitions the interior across the
//! worker pool, and joins before returning.
//!
//! ```
//! use weave::{
//!     hal::{
//!         dispatch::{Dispatcher, OperatorDesc},
//!         ops::OpId,
//!         registry::RegistryBuilder,
//!     },
//!     loom::{device::CpuBuilder, num::DataType, ops::TensorPack, tensor::{DataLayout, Tensor}},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = RegistryBuilder::new().add_default_kernels()?.build()?;
//! let dispatcher = Dispatcher::new(CpuBuilder::new().build()?, registry);
//!
//! let x = Tensor::create([4], vec![1.0f32, 2.0, 3.0, 4.0])?;
//! let y = Tensor::create([4], vec![4.0f32, 3.0, 2.0, 1.0])?;
//! let mut z = Tensor::<f32>::zeros([4])?;
//!
//! let desc = OperatorDesc::new(OpId::ADD, DataType::F32, DataLayout::Nchw, [4]);
//! let handle = dispatcher.configure(&desc)?;
//! dispatcher.run(&handle, &TensorPack::new([x.view(), y.view()], z.view_mut()))?;
//! assert_eq!(z.data(), &[5.0; 4]);
//! # Ok(())
//! # }
//! ```

pub mod hal;
pub mod loom;
