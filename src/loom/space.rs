use std::ops::{Add, Deref, Sub};

use casey::snake;
use derive_more::Display;
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of dimensions of a coordinate, a shape or an iteration space.
pub const MAX_DIMS: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpaceError {
    #[error("rank {0} exceeds the maximum of {MAX_DIMS}")]
    Rank(usize),
    #[error("dimension {dim} is out of rank {rank}")]
    Dimension { dim: usize, rank: usize },
    #[error("dimension {dim}: end {end} is before start {start}")]
    Bounds { dim: usize, start: i64, end: i64 },
    #[error("dimension {dim}: step {step} must be positive")]
    Step { dim: usize, step: i64 },
    #[error("dimension {dim}: range [{start}, {end}) is not within [{outer_start}, {outer_end})")]
    Range {
        dim: usize,
        start: i64,
        end: i64,
        outer_start: i64,
        outer_end: i64,
    },
}

/// A point of an N-dimensional space. Dimension 0 is the innermost one.
///
/// Components beyond the rank are zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    values: [i64; MAX_DIMS],
    rank: usize,
}

impl Coordinate {
    #[inline]
    const fn with_rank(rank: usize) -> Self {
        Self {
            values: [0; MAX_DIMS],
            rank,
        }
    }

    /// A coordinate of `rank` zeros.
    #[inline]
    pub fn zeros(rank: usize) -> Result<Self, SpaceError> {
        if rank > MAX_DIMS {
            return Err(SpaceError::Rank(rank));
        }
        Ok(Self::with_rank(rank))
    }

    pub fn from_slice(values: &[i64]) -> Result<Self, SpaceError> {
        let mut coord = Self::zeros(values.len())?;
        coord.values[..values.len()].copy_from_slice(values);
        Ok(coord)
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the component along `dim`, which is zero beyond the rank.
    #[inline]
    pub fn get(&self, dim: usize) -> i64 {
        self.values.get(dim).copied().unwrap_or(0)
    }

    /// Sets the component along `dim`, growing the rank if needed. `dim` is below [`MAX_DIMS`].
    #[inline]
    pub(crate) fn set(&mut self, dim: usize, value: i64) {
        self.values[dim] = value;
        self.rank = self.rank.max(dim + 1);
    }
}

impl Deref for Coordinate {
    type Target = [i64];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.values[..self.rank]
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.iter().format(", "))
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Self::Output {
        let mut output = Coordinate::with_rank(self.rank.max(rhs.rank));
        for dim in 0..output.rank {
            output.values[dim] = self.get(dim) + rhs.get(dim);
        }
        output
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Self::Output {
        let mut output = Coordinate::with_rank(self.rank.max(rhs.rank));
        for dim in 0..output.rank {
            output.values[dim] = self.get(dim) - rhs.get(dim);
        }
        output
    }
}

macro_rules! impl_coordinate_from_array {
    ($($n:literal),+) => {
        $(
            impl From<[i64; $n]> for Coordinate {
                #[inline]
                fn from(value: [i64; $n]) -> Self {
                    let mut coord = Self::with_rank($n);
                    coord.values[..$n].copy_from_slice(&value);
                    coord
                }
            }
        )+
    };
}

impl_coordinate_from_array!(0, 1, 2, 3, 4, 5, 6);

macro_rules! impl_coordinate_from_tuple {
    ($($t:ident),+) => {
        impl<$($t),+> From<($($t,)+)> for Coordinate
        where
            $($t: Into<i64>),+
        {
            #[inline]
            fn from(($(snake!($t),)+): ($($t,)+)) -> Self {
                Self::from([$(snake!($t).into()),+])
            }
        }
    };
}

impl_coordinate_from_tuple!(T0);
impl_coordinate_from_tuple!(T0, T1);
impl_coordinate_from_tuple!(T0, T1, T2);
impl_coordinate_from_tuple!(T0, T1, T2, T3);
impl_coordinate_from_tuple!(T0, T1, T2, T3, T4);
impl_coordinate_from_tuple!(T0, T1, T2, T3, T4, T5);

/// The range `[start, end)` visited with `step` along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("[{start}, {end}):{step}")]
pub struct Dimension {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl Default for Dimension {
    fn default() -> Self {
        Self::DEGENERATE
    }
}

impl Dimension {
    /// The single coordinate `0`, used for dimensions beyond the rank.
    pub const DEGENERATE: Dimension = Dimension {
        start: 0,
        end: 1,
        step: 1,
    };

    #[inline]
    pub const fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            step: 1,
        }
    }

    #[inline]
    pub const fn with_step(self, step: i64) -> Self {
        Self { step, ..self }
    }

    #[inline]
    pub fn extent(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    /// Number of coordinates visited along this dimension.
    #[inline]
    pub fn num_iterations(&self) -> usize {
        self.extent().div_ceil(self.step as usize)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn contains(&self, value: i64) -> bool {
        value >= self.start && value < self.end && (value - self.start) % self.step == 0
    }

    /// Returns the first visited coordinate not below `value`, clamped to `[start, end]`.
    #[inline]
    pub fn align(&self, value: i64) -> i64 {
        if value <= self.start {
            return self.start;
        }
        if value >= self.end {
            return self.end;
        }
        let steps = (value - self.start + self.step - 1) / self.step;
        (self.start + steps * self.step).min(self.end)
    }

    fn check(&self, dim: usize) -> Result<(), SpaceError> {
        let Dimension { start, end, step } = *self;
        if end < start {
            return Err(SpaceError::Bounds { dim, start, end });
        }
        if step <= 0 {
            return Err(SpaceError::Step { dim, step });
        }
        Ok(())
    }
}

/// An immutable N-dimensional rectangular range of coordinates with a step per dimension.
///
/// Dimensions beyond the rank are fixed at [`Dimension::DEGENERATE`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IterationSpace {
    dims: [Dimension; MAX_DIMS],
    rank: usize,
}

impl std::fmt::Display for IterationSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.dimensions().iter().format(" x "))
    }
}

impl IterationSpace {
    pub fn new(dims: impl IntoIterator<Item = Dimension>) -> Result<Self, SpaceError> {
        let mut space = Self::default();
        for (dim, dimension) in dims.into_iter().enumerate() {
            if dim >= MAX_DIMS {
                return Err(SpaceError::Rank(dim + 1));
            }
            dimension.check(dim)?;
            space.dims[dim] = dimension;
            space.rank = dim + 1;
        }
        Ok(space)
    }

    /// Creates the space visiting every element of a tensor of `shape` with unit steps.
    pub fn from_shape(shape: &[usize]) -> Result<Self, SpaceError> {
        Self::new(shape.iter().map(|&extent| Dimension::new(0, extent as i64)))
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The declared dimensions.
    #[inline]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims[..self.rank]
    }

    /// Returns the range along `dim`; degenerate beyond the rank.
    #[inline]
    pub fn dim(&self, dim: usize) -> Dimension {
        self.dims.get(dim).copied().unwrap_or(Dimension::DEGENERATE)
    }

    /// Returns `end - start` along `dim`.
    #[inline]
    pub fn extent(&self, dim: usize) -> usize {
        self.dim(dim).extent()
    }

    #[inline]
    pub fn num_iterations(&self, dim: usize) -> usize {
        self.dim(dim).num_iterations()
    }

    /// Product of all extents.
    #[inline]
    pub fn total_elements(&self) -> usize {
        self.dimensions().iter().map(Dimension::extent).product()
    }

    /// Number of coordinates the space visits.
    #[inline]
    pub fn num_iterations_total(&self) -> usize {
        self.dimensions()
            .iter()
            .map(Dimension::num_iterations)
            .product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dimensions().iter().any(Dimension::is_empty)
    }

    /// The first coordinate of the space.
    pub fn start(&self) -> Coordinate {
        let mut coord = Coordinate::with_rank(self.rank);
        for (dim, dimension) in self.dimensions().iter().enumerate() {
            coord.set(dim, dimension.start);
        }
        coord
    }

    /// The exclusive upper corner of the space.
    pub fn end(&self) -> Coordinate {
        let mut coord = Coordinate::with_rank(self.rank);
        for (dim, dimension) in self.dimensions().iter().enumerate() {
            coord.set(dim, dimension.end);
        }
        coord
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        (0..MAX_DIMS).all(|dim| self.dim(dim).contains(coord.get(dim)))
    }

    /// Returns a new space narrowed to `[new_start, new_end)` along `dim`.
    pub fn restrict(&self, dim: usize, new_start: i64, new_end: i64) -> Result<Self, SpaceError> {
        if dim >= self.rank {
            let rank = self.rank;
            return Err(SpaceError::Dimension { dim, rank });
        }
        let outer = self.dims[dim];
        if new_start < outer.start || new_end > outer.end || new_end < new_start {
            return Err(SpaceError::Range {
                dim,
                start: new_start,
                end: new_end,
                outer_start: outer.start,
                outer_end: outer.end,
            });
        }
        let mut space = *self;
        space.dims[dim] = Dimension {
            start: new_start,
            end: new_end,
            ..outer
        };
        Ok(space)
    }

    /// Narrows `dim` down to its first coordinate, so that iterating visits one point per line.
    pub fn collapse(&self, dim: usize) -> Self {
        let mut space = *self;
        if dim < self.rank {
            let Dimension { start, end, .. } = self.dims[dim];
            space.dims[dim] = Dimension::new(start, end.min(start + 1));
        }
        space
    }

    /// Translates the space by `offset`.
    pub fn shift(&self, offset: &Coordinate) -> Result<Self, SpaceError> {
        if offset.rank() > self.rank {
            return Err(SpaceError::Rank(offset.rank()));
        }
        let mut space = *self;
        for (dim, dimension) in space.dims[..self.rank].iter_mut().enumerate() {
            dimension.start += offset.get(dim);
            dimension.end += offset.get(dim);
        }
        Ok(space)
    }

    /// Replaces the range along a declared dimension, keeping its step.
    pub(crate) fn with_range(&self, dim: usize, start: i64, end: i64) -> Self {
        let mut space = *self;
        space.dims[dim].start = start;
        space.dims[dim].end = end;
        space
    }

    /// Iterates over the visited coordinates, dimension 0 fastest.
    #[inline]
    pub fn iter(&self) -> Coordinates {
        let next = (!self.is_empty()).then(|| self.start());
        Coordinates { space: *self, next }
    }
}

impl IntoIterator for &IterationSpace {
    type Item = Coordinate;
    type IntoIter = Coordinates;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Coordinates {
    space: IterationSpace,
    next: Option<Coordinate>,
}

impl Iterator for Coordinates {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let mut coord = current;
        self.next = None;
        for (dim, dimension) in self.space.dimensions().iter().enumerate() {
            let value = coord[dim] + dimension.step;
            if value < dimension.end {
                coord.set(dim, value);
                self.next = Some(coord);
                break;
            }
            coord.set(dim, dimension.start);
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use itertools::Itertools;

    use super::{Coordinate, Dimension, IterationSpace, SpaceError};

    #[test]
    fn test_coordinate_from() {
        let coord = Coordinate::from((3, -1i32, 2u8));
        assert_eq!(&coord[..], &[3, -1, 2]);
        assert_eq!(coord.rank(), 3);
        assert_eq!(coord.get(5), 0);
        assert_eq!(format!("{coord}"), "(3, -1, 2)");

        let offset = Coordinate::from([1, 1]);
        assert_eq!(&(coord - offset)[..], &[2, -2, 2]);
        assert_eq!(&(coord + offset)[..], &[4, 0, 2]);
        assert!(Coordinate::from_slice(&[0; 7]).is_err());
    }

    #[test]
    fn test_coordinate_rank() {
        assert_eq!(Coordinate::zeros(6).map(|coord| coord.rank()), Ok(6));
        assert_eq!(Coordinate::zeros(7), Err(SpaceError::Rank(7)));
        assert_eq!(Coordinate::zeros(0), Ok(Coordinate::default()));
    }

    #[test]
    fn test_space_queries() -> Result<(), Box<dyn Error>> {
        let space = IterationSpace::new([
            Dimension::new(0, 10).with_step(4),
            Dimension::new(-2, 3),
        ])?;
        assert_eq!(space.rank(), 2);
        assert_eq!(space.extent(0), 10);
        assert_eq!(space.num_iterations(0), 3);
        assert_eq!(space.extent(1), 5);
        assert_eq!(space.dim(4), Dimension::DEGENERATE);
        assert_eq!(space.total_elements(), 50);
        assert_eq!(space.num_iterations_total(), 15);
        assert_eq!(space.iter().count(), 15);
        assert!(space.contains(&Coordinate::from([8, -2])));
        assert!(!space.contains(&Coordinate::from([6, -2])));
        assert!(!space.contains(&Coordinate::from([0, 3])));
        Ok(())
    }

    #[test]
    fn test_space_rejects_bad_bounds() {
        assert_eq!(
            IterationSpace::new([Dimension::new(4, 2)]),
            Err(SpaceError::Bounds {
                dim: 0,
                start: 4,
                end: 2
            })
        );
        assert_eq!(
            IterationSpace::new([Dimension::new(0, 2).with_step(0)]),
            Err(SpaceError::Step { dim: 0, step: 0 })
        );
        assert_eq!(
            IterationSpace::from_shape(&[1; 7]),
            Err(SpaceError::Rank(7))
        );
    }

    #[test]
    fn test_restrict() -> Result<(), Box<dyn Error>> {
        let space = IterationSpace::from_shape(&[8, 6])?;
        let narrow = space.restrict(1, 2, 5)?;
        assert_eq!(narrow.dim(1), Dimension::new(2, 5));
        assert_eq!(narrow.dim(0), space.dim(0));
        assert_eq!(space.dim(1), Dimension::new(0, 6));

        assert!(matches!(
            space.restrict(1, -1, 5),
            Err(SpaceError::Range { dim: 1, .. })
        ));
        assert!(matches!(
            space.restrict(0, 0, 9),
            Err(SpaceError::Range { dim: 0, .. })
        ));
        assert!(matches!(
            space.restrict(2, 0, 1),
            Err(SpaceError::Dimension { dim: 2, rank: 2 })
        ));
        Ok(())
    }

    #[test]
    fn test_iteration_order() -> Result<(), Box<dyn Error>> {
        let space = IterationSpace::new([Dimension::new(0, 3).with_step(2), Dimension::new(5, 7)])?;
        let coords = space.iter().map(|coord| (coord[0], coord[1])).collect_vec();
        assert_eq!(coords, vec![(0, 5), (2, 5), (0, 6), (2, 6)]);

        let empty = IterationSpace::new([Dimension::new(0, 0), Dimension::new(0, 3)])?;
        assert!(empty.is_empty());
        assert_eq!(empty.iter().count(), 0);

        let scalar = IterationSpace::from_shape(&[])?;
        assert_eq!(scalar.iter().count(), 1);
        Ok(())
    }

    #[test]
    fn test_align_and_collapse() -> Result<(), Box<dyn Error>> {
        let dimension = Dimension::new(1, 12).with_step(3);
        assert_eq!(dimension.align(-5), 1);
        assert_eq!(dimension.align(2), 4);
        assert_eq!(dimension.align(4), 4);
        assert_eq!(dimension.align(11), 12);
        assert_eq!(dimension.align(20), 12);

        let space = IterationSpace::from_shape(&[4, 3])?;
        let rows = space.collapse(0);
        assert_eq!(rows.iter().count(), 3);

        let shifted = space.shift(&Coordinate::from([-1, 2]))?;
        assert_eq!(shifted.dim(0), Dimension::new(-1, 3));
        assert_eq!(shifted.dim(1), Dimension::new(2, 5));
        Ok(())
    }
}
