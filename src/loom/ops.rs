use std::{marker::PhantomData, ptr::NonNull};

use super::{
    num::Scalar,
    region::{BorderPolicy, RegionError, ValidRegion},
    space::Coordinate,
    tensor::{TensorError, TensorInfo},
};

/// A read-only, type-erased borrow of a tensor's contents.
#[derive(Debug, Clone, Copy)]
pub struct TensorRef<'a> {
    info: &'a TensorInfo,
    data: &'a [u8],
}

impl<'a> TensorRef<'a> {
    #[inline]
    pub(crate) fn new(info: &'a TensorInfo, data: &'a [u8]) -> Self {
        Self { info, data }
    }

    #[inline]
    pub fn info(&self) -> &'a TensorInfo {
        self.info
    }

    /// Reinterprets the contents as elements of `T`, checking the data type.
    pub fn read_slice<T: Scalar>(&self) -> Result<&'a [T], TensorError> {
        self.info.check_type::<T>()?;
        Ok(bytemuck::cast_slice(self.data))
    }

    /// Reads the element at `coord`, which must lie within the tensor's shape.
    pub fn read<T: Scalar>(&self, coord: &Coordinate) -> Result<T, TensorError> {
        let data = self.read_slice::<T>()?;
        self.info
            .offset(coord)
            .and_then(|offset| data.get(offset))
            .copied()
            .ok_or_else(|| self.info.index_error(coord))
    }

    /// Borrows `len` elements contiguous along dimension 0, starting at `coord`.
    pub fn read_row<T: Scalar>(&self, coord: &Coordinate, len: usize) -> Result<&'a [T], TensorError> {
        let data = self.read_slice::<T>()?;
        let Some(last) = len.checked_sub(1) else {
            return Ok(&[]);
        };
        let mut end = *coord;
        end.set(0, coord.get(0) + last as i64);
        let offset = self
            .info
            .offset(coord)
            .filter(|_| self.info.offset(&end).is_some())
            .ok_or_else(|| self.info.index_error(&end))?;
        data.get(offset..offset + len)
            .ok_or_else(|| self.info.index_error(&end))
    }

    /// Reads `coord`, resolving coordinates outside the valid region through `policy`.
    ///
    /// Returns `None` when the coordinate is outside and the policy is [`BorderPolicy::Undefined`].
    pub fn resolve<T: Scalar>(
        &self,
        coord: &Coordinate,
        policy: BorderPolicy,
    ) -> Result<Option<T>, TensorError> {
        let region = self.info.valid_region();
        if region.contains_coordinate(coord) {
            return self.read(coord).map(Some);
        }
        match policy {
            BorderPolicy::Undefined => Ok(None),
            BorderPolicy::Constant(value) => Ok(Some(T::from_f64(value))),
            BorderPolicy::Replicate => region
                .clamp(coord)
                .ok_or(TensorError::Degenerate(region))
                .and_then(|coord| self.read(&coord))
                .map(Some),
        }
    }
}

/// A shared handle to an output tensor that many workers write concurrently.
///
/// Workers of one invocation receive disjoint slices of the iteration space, so their writes
/// never alias. The handle keeps the tensor mutably borrowed for its whole lifetime.
#[derive(Debug)]
pub struct TensorMut<'a> {
    info: &'a TensorInfo,
    ptr: NonNull<u8>,
    len: usize,
    phantom: PhantomData<&'a mut [u8]>,
}

// SAFETY: the handle is created from an exclusive borrow and only hands out element writes,
// whose disjointness is the caller's obligation on `write`.
unsafe impl Send for TensorMut<'_> {}
// SAFETY: see above.
unsafe impl Sync for TensorMut<'_> {}

impl<'a> TensorMut<'a> {
    #[inline]
    pub(crate) fn new(info: &'a TensorInfo, data: &'a mut [u8]) -> Self {
        let len = data.len();
        let ptr = NonNull::from(data).cast();
        Self {
            info,
            ptr,
            len,
            phantom: PhantomData,
        }
    }

    #[inline]
    pub fn info(&self) -> &'a TensorInfo {
        self.info
    }

    #[inline]
    pub fn valid_region(&self) -> ValidRegion {
        self.info.valid_region()
    }

    fn element<T: Scalar>(&self, coord: &Coordinate) -> Result<NonNull<T>, TensorError> {
        self.info.check_type::<T>()?;
        let offset = self
            .info
            .offset(coord)
            .filter(|&offset| (offset + 1) * size_of::<T>() <= self.len)
            .ok_or_else(|| self.info.index_error(coord))?;
        // SAFETY: `offset` is within the buffer as checked above.
        Ok(unsafe { self.ptr.cast::<T>().add(offset) })
    }

    /// Writes `value` at `coord`.
    ///
    /// # Safety
    /// No other thread may read or write the same element concurrently.
    pub unsafe fn write<T: Scalar>(&self, coord: &Coordinate, value: T) -> Result<(), TensorError> {
        let ptr = self.element::<T>(coord)?;
        // SAFETY: the pointer is in bounds and the caller guarantees exclusive access.
        unsafe { ptr.write_unaligned(value) };
        Ok(())
    }

    /// Writes `values` contiguously along dimension 0, starting at `coord`.
    ///
    /// # Safety
    /// No other thread may read or write any of the written elements concurrently.
    pub unsafe fn write_row<T: Scalar>(
        &self,
        coord: &Coordinate,
        values: &[T],
    ) -> Result<(), TensorError> {
        let Some(last) = values.len().checked_sub(1) else {
            return Ok(());
        };
        let mut end = *coord;
        end.set(0, coord.get(0) + last as i64);
        // both ends in bounds along the contiguous dimension
        self.element::<T>(&end)?;
        let ptr = self.element::<T>(coord)?;
        // SAFETY: the whole row lies in bounds and the caller guarantees exclusive access.
        unsafe {
            let dst = std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<u8>(), size_of_val(values));
            dst.copy_from_slice(bytemuck::cast_slice(values));
        }
        Ok(())
    }
}

/// The tensors an invocation operates on: any number of inputs and one output.
#[derive(Debug)]
pub struct TensorPack<'a> {
    inputs: Vec<TensorRef<'a>>,
    output: TensorMut<'a>,
}

impl<'a> TensorPack<'a> {
    pub fn new(inputs: impl IntoIterator<Item = TensorRef<'a>>, output: TensorMut<'a>) -> Self {
        let inputs = inputs.into_iter().collect();
        Self { inputs, output }
    }

    #[inline]
    pub fn inputs(&self) -> &[TensorRef<'a>] {
        &self.inputs
    }

    #[inline]
    pub fn input(&self, index: usize) -> Option<&TensorRef<'a>> {
        self.inputs.get(index)
    }

    #[inline]
    pub fn output(&self) -> &TensorMut<'a> {
        &self.output
    }

    /// The region border handling is measured against.
    ///
    /// This is the intersection of the inputs' valid regions, so that a coordinate inside it is
    /// valid for every input; without inputs it is the output's.
    pub fn reference_region(&self) -> Result<ValidRegion, RegionError> {
        let mut regions = self.inputs.iter().map(|input| input.info().valid_region());
        match regions.next() {
            Some(first) => regions.try_fold(first, |region, other| region.intersect(&other)),
            None => Ok(self.output.valid_region()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::TensorPack;
    use crate::loom::{
        region::{BorderPolicy, RegionError, ValidRegion},
        space::Coordinate,
        tensor::{Tensor, TensorError},
    };

    #[test]
    fn test_resolve() -> Result<(), Box<dyn Error>> {
        let data = (0..16).map(|x| x as f32).collect::<Vec<_>>();
        let region = ValidRegion::new([1, 1], &[2, 2])?;
        let tensor = Tensor::create([4, 4], data)?.with_valid_region(region)?;
        let view = tensor.view();

        let inside = Coordinate::from([2, 1]);
        assert_eq!(view.resolve::<f32>(&inside, BorderPolicy::Undefined)?, Some(6.0));

        let outside = Coordinate::from([0, 0]);
        assert_eq!(view.resolve::<f32>(&outside, BorderPolicy::Undefined)?, None);
        assert_eq!(
            view.resolve::<f32>(&outside, BorderPolicy::Constant(7.0))?,
            Some(7.0)
        );
        assert_eq!(view.resolve::<f32>(&outside, BorderPolicy::Replicate)?, Some(5.0));

        let far = Coordinate::from([-5, 9]);
        assert_eq!(view.resolve::<f32>(&far, BorderPolicy::Replicate)?, Some(9.0));
        assert_eq!(view.read_row::<f32>(&Coordinate::from([1, 2]), 3)?, &[9.0, 10.0, 11.0]);

        let empty = ValidRegion::new([1, 1], &[0, 2])?;
        let tensor = Tensor::<f32>::zeros([4, 4])?.with_valid_region(empty)?;
        assert_eq!(
            tensor.view().resolve::<f32>(&outside, BorderPolicy::Replicate),
            Err(TensorError::Degenerate(empty))
        );
        assert!(view.read_row::<f32>(&Coordinate::from([2, 2]), 3).is_err());
        assert!(matches!(
            view.resolve::<i32>(&inside, BorderPolicy::Undefined),
            Err(TensorError::Type(..))
        ));
        Ok(())
    }

    #[test]
    fn test_write() -> Result<(), Box<dyn Error>> {
        let mut tensor = Tensor::<u16>::zeros([4, 2])?;
        {
            let view = tensor.view_mut();
            unsafe {
                view.write(&Coordinate::from([3, 0]), 9u16)?;
                view.write_row(&Coordinate::from([1, 1]), &[1u16, 2, 3])?;
                assert!(view.write_row(&Coordinate::from([2, 1]), &[1u16, 2, 3]).is_err());
                assert!(view.write(&Coordinate::from([4, 0]), 1u16).is_err());
                assert!(view.write(&Coordinate::from([0, 0]), 1u8).is_err());
            }
        }
        assert_eq!(tensor.data(), &[0, 0, 0, 9, 0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_reference_region() -> Result<(), Box<dyn Error>> {
        let region = ValidRegion::new([0, 1], &[3, 2])?;
        let input = Tensor::<f32>::zeros([3, 3])?.with_valid_region(region)?;
        let mut output = Tensor::<f32>::zeros([3, 3])?;

        let pack = TensorPack::new([input.view()], output.view_mut());
        assert_eq!(pack.reference_region()?, region);
        assert!(pack.input(1).is_none());
        drop(pack);

        let pack = TensorPack::new([], output.view_mut());
        assert_eq!(pack.reference_region()?, ValidRegion::from_shape(&[3, 3])?);
        drop(pack);

        // every input narrows the region, whatever the order
        let other = ValidRegion::new([1, 0], &[2, 3])?;
        let narrow = Tensor::<f32>::zeros([3, 3])?.with_valid_region(other)?;
        let full = Tensor::<f32>::zeros([3, 3])?;
        let expected = ValidRegion::new([1, 1], &[2, 2])?;
        for inputs in [
            [full.view(), input.view(), narrow.view()],
            [narrow.view(), full.view(), input.view()],
        ] {
            let pack = TensorPack::new(inputs, output.view_mut());
            assert_eq!(pack.reference_region()?, expected);
        }

        let empty = ValidRegion::new([0, 0], &[3, 0])?;
        let empty = Tensor::<f32>::zeros([3, 3])?.with_valid_region(empty)?;
        let pack = TensorPack::new([full.view(), empty.view()], output.view_mut());
        assert!(matches!(
            pack.reference_region(),
            Err(RegionError::Degenerate(_))
        ));
        Ok(())
    }
}
