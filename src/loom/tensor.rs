use derive_more::Display;
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    num::{DataType, Scalar},
    ops::{TensorMut, TensorRef},
    region::ValidRegion,
    space::{Coordinate, MAX_DIMS},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("tensor type error: data type {0} mismatches {1}")]
    Type(DataType, DataType),
    #[error("tensor creation error: shape {0:?}'s size not match data len {1}")]
    Create(Vec<usize>, usize),
    #[error("tensor rank error: rank {0} exceeds the maximum of {MAX_DIMS}")]
    Rank(usize),
    #[error("tensor region error: valid region {0} exceeds shape {1:?}")]
    Region(ValidRegion, Vec<usize>),
    #[error("tensor region error: valid region {0} is degenerate")]
    Degenerate(ValidRegion),
    #[error("tensor index error: coordinate {0} is out of bounds for shape {1:?}")]
    Index(Coordinate, Vec<usize>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataLayout {
    #[default]
    #[display("NCHW")]
    Nchw,
    #[display("NHWC")]
    Nhwc,
    #[display("NCDHW")]
    Ncdhw,
    #[display("NDHWC")]
    Ndhwc,
}

impl DataLayout {
    pub const ALL: [DataLayout; 4] = [
        DataLayout::Nchw,
        DataLayout::Nhwc,
        DataLayout::Ncdhw,
        DataLayout::Ndhwc,
    ];
}

/// Describes a dense tensor: shape, valid region, element type and memory layout.
///
/// Dimension 0 is the innermost one; elements are stored contiguously along it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
    shape: Vec<usize>,
    strides: Vec<usize>,
    valid_region: ValidRegion,
    r#type: DataType,
    layout: DataLayout,
}

impl TensorInfo {
    pub fn new(shape: impl Into<Vec<usize>>, r#type: DataType) -> Result<Self, TensorError> {
        let shape: Vec<usize> = shape.into();
        if shape.len() > MAX_DIMS {
            return Err(TensorError::Rank(shape.len()));
        }
        let strides = shape
            .iter()
            .scan(1, |stride, &extent| {
                let current = *stride;
                *stride *= extent;
                Some(current)
            })
            .collect();
        let valid_region =
            ValidRegion::from_shape(&shape).map_err(|_| TensorError::Rank(shape.len()))?;
        let layout = DataLayout::default();
        Ok(Self {
            shape,
            strides,
            valid_region,
            r#type,
            layout,
        })
    }

    #[inline]
    pub fn with_layout(self, layout: DataLayout) -> Self {
        Self { layout, ..self }
    }

    /// Narrows the meaningful data down to `region`, which must lie within the shape.
    pub fn with_valid_region(self, region: ValidRegion) -> Result<Self, TensorError> {
        let fits = region.rank() <= self.rank()
            && (0..region.rank()).all(|dim| {
                region.start(dim) >= 0 && region.end(dim) <= self.shape[dim] as i64
            });
        if !fits {
            return Err(TensorError::Region(region, self.shape));
        }
        Ok(Self {
            valid_region: region,
            ..self
        })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn valid_region(&self) -> ValidRegion {
        self.valid_region
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    #[inline]
    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    #[inline]
    pub fn data_size(&self) -> usize {
        self.size() * self.r#type.size()
    }

    /// Returns the element offset of `coord`, or `None` if it lies outside the shape.
    pub fn offset(&self, coord: &Coordinate) -> Option<usize> {
        if coord.rank() > self.rank() && coord[self.rank()..].iter().any(|&x| x != 0) {
            return None;
        }
        let mut offset = 0;
        for (dim, (&extent, &stride)) in self.shape.iter().zip_eq(&self.strides).enumerate() {
            let value = coord.get(dim);
            if value < 0 || value as usize >= extent {
                return None;
            }
            offset += value as usize * stride;
        }
        Some(offset)
    }

    #[inline]
    pub(crate) fn check_type<T: Scalar>(&self) -> Result<(), TensorError> {
        match self.r#type == T::DATA_TYPE {
            true => Ok(()),
            false => Err(TensorError::Type(self.r#type, T::DATA_TYPE)),
        }
    }

    #[inline]
    pub(crate) fn index_error(&self, coord: &Coordinate) -> TensorError {
        TensorError::Index(*coord, self.shape.clone())
    }
}

/// A statically typed host tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    info: TensorInfo,
    data: Vec<T>,
}

impl<T: Scalar> Tensor<T> {
    /// Create a tensor of zeros.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Result<Self, TensorError> {
        let info = TensorInfo::new(shape, T::DATA_TYPE)?;
        let data = vec![T::zero(); info.size()];
        Ok(Self { info, data })
    }

    /// Create a new tensor with the given shape and contents.
    pub fn create(shape: impl Into<Vec<usize>>, data: impl Into<Vec<T>>) -> Result<Self, TensorError> {
        let info = TensorInfo::new(shape, T::DATA_TYPE)?;
        let data: Vec<T> = data.into();
        if data.len() != info.size() {
            return Err(TensorError::Create(info.shape, data.len()));
        }
        Ok(Self { info, data })
    }

    #[inline]
    pub fn with_layout(self, layout: DataLayout) -> Self {
        let info = self.info.with_layout(layout);
        Self { info, ..self }
    }

    #[inline]
    pub fn with_valid_region(self, region: ValidRegion) -> Result<Self, TensorError> {
        let info = self.info.with_valid_region(region)?;
        Ok(Self { info, ..self })
    }

    #[inline]
    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn get(&self, coord: impl Into<Coordinate>) -> Option<T> {
        let offset = self.info.offset(&coord.into())?;
        self.data.get(offset).copied()
    }

    /// Borrows the tensor as a read-only input of an invocation.
    #[inline]
    pub fn view(&self) -> TensorRef<'_> {
        TensorRef::new(&self.info, bytemuck::cast_slice(&self.data))
    }

    /// Borrows the tensor as the output of an invocation.
    #[inline]
    pub fn view_mut(&mut self) -> TensorMut<'_> {
        TensorMut::new(&self.info, bytemuck::cast_slice_mut(&mut self.data))
    }
}
