use derive_more::Display;
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::space::{Coordinate, Dimension, IterationSpace, MAX_DIMS, SpaceError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("region error: valid region {0} is degenerate")]
    Degenerate(ValidRegion),
    #[error("region error: anchor rank {anchor} mismatches shape rank {shape}")]
    Rank { anchor: usize, shape: usize },
    #[error("region error: valid regions {0} and {1} do not overlap")]
    Disjoint(ValidRegion, ValidRegion),
    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// The sub-range of a (possibly padded) tensor holding meaningful data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValidRegion {
    anchor: Coordinate,
    shape: [usize; MAX_DIMS],
}

impl std::fmt::Display for ValidRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{anchor: {}, shape: [{}]}}",
            self.anchor,
            self.shape().iter().format(", ")
        )
    }
}

impl ValidRegion {
    pub fn new(anchor: impl Into<Coordinate>, shape: &[usize]) -> Result<Self, RegionError> {
        let anchor = anchor.into();
        if anchor.rank() != shape.len() {
            return Err(RegionError::Rank {
                anchor: anchor.rank(),
                shape: shape.len(),
            });
        }
        let mut region = Self {
            anchor,
            ..Default::default()
        };
        region.shape[..shape.len()].copy_from_slice(shape);
        Ok(region)
    }

    /// The region covering a whole tensor of `shape`.
    pub fn from_shape(shape: &[usize]) -> Result<Self, RegionError> {
        let anchor = Coordinate::zeros(shape.len())?;
        Self::new(anchor, shape)
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.anchor.rank()
    }

    #[inline]
    pub fn anchor(&self) -> Coordinate {
        self.anchor
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape[..self.rank()]
    }

    #[inline]
    pub fn start(&self, dim: usize) -> i64 {
        self.anchor.get(dim)
    }

    #[inline]
    pub fn end(&self, dim: usize) -> i64 {
        self.anchor.get(dim) + self.shape.get(dim).copied().unwrap_or(0) as i64
    }

    /// Returns `true` if any declared extent is zero.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.shape().contains(&0)
    }

    pub fn contains_coordinate(&self, coord: &Coordinate) -> bool {
        (0..self.rank()).all(|dim| {
            let value = coord.get(dim);
            value >= self.start(dim) && value < self.end(dim)
        })
    }

    /// Returns `true` if every coordinate visited by `space` lies in the region.
    /// Dimensions beyond the region's rank are unconstrained.
    pub fn contains(&self, space: &IterationSpace) -> bool {
        if space.is_empty() {
            return true;
        }
        (0..self.rank()).all(|dim| {
            let (first, last) = visited_bounds(space.dim(dim));
            first >= self.start(dim) && last < self.end(dim)
        })
    }

    /// Moves every side inwards by the border margins.
    pub fn shrink(&self, border: BorderSize) -> Self {
        let mut region = *self;
        for dim in 0..self.rank().min(2) {
            let leading = border.leading(dim) as usize;
            let trailing = border.trailing(dim) as usize;
            let shape = self.shape[dim].saturating_sub(leading + trailing);
            region.anchor.set(dim, self.start(dim) + leading as i64);
            region.shape[dim] = shape;
        }
        region
    }

    /// Moves every side outwards by the border margins.
    pub fn extend(&self, border: BorderSize) -> Self {
        let mut region = *self;
        for dim in 0..self.rank().min(2) {
            let leading = border.leading(dim) as usize;
            let trailing = border.trailing(dim) as usize;
            region.anchor.set(dim, self.start(dim) - leading as i64);
            region.shape[dim] = self.shape[dim] + leading + trailing;
        }
        region
    }

    /// Returns the coordinate of the region nearest to `coord`, or `None` if the region is
    /// degenerate.
    pub fn clamp(&self, coord: &Coordinate) -> Option<Coordinate> {
        if self.is_degenerate() {
            return None;
        }
        let mut output = *coord;
        for dim in 0..self.rank() {
            let value = coord.get(dim).clamp(self.start(dim), self.end(dim) - 1);
            output.set(dim, value);
        }
        Some(output)
    }

    /// Returns the region valid in both `self` and `other`.
    ///
    /// Dimensions beyond a region's rank are unconstrained by it.
    pub fn intersect(&self, other: &ValidRegion) -> Result<Self, RegionError> {
        if let Some(region) = [self, other].into_iter().find(|region| region.is_degenerate()) {
            return Err(RegionError::Degenerate(*region));
        }
        let (wide, narrow) = match self.rank() >= other.rank() {
            true => (self, other),
            false => (other, self),
        };
        let mut region = *wide;
        for dim in 0..narrow.rank() {
            let start = wide.start(dim).max(narrow.start(dim));
            let end = wide.end(dim).min(narrow.end(dim));
            if end <= start {
                return Err(RegionError::Disjoint(*self, *other));
            }
            region.anchor.set(dim, start);
            region.shape[dim] = (end - start) as usize;
        }
        Ok(region)
    }
}

/// Margins around a valid region, one per spatial side.
///
/// Dimension 0 maps to `left`/`right`, dimension 1 to `top`/`bottom`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("{{top: {top}, right: {right}, bottom: {bottom}, left: {left}}}")]
pub struct BorderSize {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl BorderSize {
    #[inline]
    pub const fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    #[inline]
    pub const fn uniform(size: u32) -> Self {
        Self::new(size, size, size, size)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.top == 0 && self.right == 0 && self.bottom == 0 && self.left == 0
    }

    /// The margin before the start of `dim`.
    #[inline]
    pub const fn leading(&self, dim: usize) -> u32 {
        match dim {
            0 => self.left,
            1 => self.top,
            _ => 0,
        }
    }

    /// The margin after the end of `dim`.
    #[inline]
    pub const fn trailing(&self, dim: usize) -> u32 {
        match dim {
            0 => self.right,
            1 => self.bottom,
            _ => 0,
        }
    }
}

/// What a coordinate outside the valid region resolves to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BorderPolicy {
    /// Border coordinates are left untouched.
    #[default]
    Undefined,
    /// Border coordinates read as the constant.
    #[display("Constant({_0})")]
    Constant(f64),
    /// Border coordinates read as the nearest valid coordinate.
    Replicate,
}

/// Numbers of visited coordinates before and after the valid region along one dimension.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutOfBounds {
    pub leading: usize,
    pub trailing: usize,
}

/// The split of an iteration space into an interior and border-handling edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    interior: Option<IterationSpace>,
    edges: Vec<IterationSpace>,
    out_of_bounds: [OutOfBounds; MAX_DIMS],
    within_border: bool,
}

impl Classification {
    /// The part of the space inside the valid region, if any.
    #[inline]
    pub fn interior(&self) -> Option<&IterationSpace> {
        self.interior.as_ref()
    }

    #[inline]
    pub fn edges(&self) -> &[IterationSpace] {
        &self.edges
    }

    #[inline]
    pub fn is_interior_only(&self) -> bool {
        self.edges.is_empty()
    }

    #[inline]
    pub fn out_of_bounds(&self, dim: usize) -> OutOfBounds {
        self.out_of_bounds.get(dim).copied().unwrap_or_default()
    }

    /// Returns `true` if no coordinate lies further outside the valid region than the border.
    #[inline]
    pub fn within_border(&self) -> bool {
        self.within_border
    }
}

fn visited_bounds(dimension: Dimension) -> (i64, i64) {
    let count = dimension.num_iterations().max(1) as i64;
    let first = dimension.start;
    let last = first + (count - 1) * dimension.step;
    (first, last)
}

/// Splits `space` into the sub-space lying inside `region` and edge sub-spaces covering the rest.
///
/// Edges are cut dimension by dimension, dimension 0 first: the leading slab then the trailing
/// slab of the box that remains. Every visited coordinate lands in exactly one part.
pub fn classify(
    space: &IterationSpace,
    region: &ValidRegion,
    border: BorderSize,
) -> Result<Classification, RegionError> {
    if region.is_degenerate() {
        return Err(RegionError::Degenerate(*region));
    }

    if border.is_zero() && region.contains(space) {
        return Ok(Classification {
            interior: (!space.is_empty()).then_some(*space),
            edges: vec![],
            out_of_bounds: Default::default(),
            within_border: true,
        });
    }

    let mut out_of_bounds = [OutOfBounds::default(); MAX_DIMS];
    let mut within_border = true;
    if !space.is_empty() {
        for dim in 0..region.rank() {
            let dimension = space.dim(dim);
            let (start, end) = (region.start(dim), region.end(dim));
            let lo = dimension.align(start);
            let hi = dimension.align(end).max(lo);
            out_of_bounds[dim] = OutOfBounds {
                leading: Dimension { end: lo, ..dimension }.num_iterations(),
                trailing: Dimension { start: hi, ..dimension }.num_iterations(),
            };

            let (first, last) = visited_bounds(dimension);
            let leading = (start - first).max(0);
            let trailing = (last + 1 - end).max(0);
            within_border &= leading <= border.leading(dim) as i64;
            within_border &= trailing <= border.trailing(dim) as i64;
        }
    }

    if space.is_empty() {
        return Ok(Classification {
            interior: None,
            edges: vec![],
            out_of_bounds,
            within_border,
        });
    }

    let mut edges = vec![];
    let mut rest = Some(*space);
    for dim in 0..region.rank() {
        let Some(current) = rest else {
            break;
        };
        let (start, end) = (region.start(dim), region.end(dim));

        if dim >= current.rank() {
            // the single coordinate 0 of a degenerate dimension
            if start > 0 || end <= 0 {
                edges.push(current);
                rest = None;
            }
            continue;
        }

        let dimension = current.dim(dim);
        let lo = dimension.align(start);
        let hi = dimension.align(end).max(lo);
        if lo > dimension.start {
            edges.push(current.with_range(dim, dimension.start, lo));
        }
        if dimension.end > hi {
            edges.push(current.with_range(dim, hi, dimension.end));
        }
        rest = (hi > lo).then(|| current.with_range(dim, lo, hi));
    }

    Ok(Classification {
        interior: rest,
        edges,
        out_of_bounds,
        within_border,
    })
}
