use derive_more::{Deref, Display};
use thiserror::Error;

use super::space::{Coordinate, IterationSpace};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    #[error("partition error: worker count must be at least 1")]
    Workers,
    #[error("partition error: minimum granularity must be at least 1")]
    Granularity,
}

/// One worker's contiguous share of an iteration space, cut along [`WorkSlice::split_dim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deref, Display)]
#[display("{index}: {space} along {dim}")]
pub struct WorkSlice {
    #[deref]
    space: IterationSpace,
    dim: usize,
    index: usize,
}

impl WorkSlice {
    #[inline]
    pub fn space(&self) -> &IterationSpace {
        &self.space
    }

    /// The dimension that was split.
    #[inline]
    pub fn split_dim(&self) -> usize {
        self.dim
    }

    /// Position of the slice among its siblings.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn begin(&self) -> Coordinate {
        self.space.start()
    }

    #[inline]
    pub fn end(&self) -> Coordinate {
        self.space.end()
    }
}

/// Picks the dimension to split and the number of slices to cut.
fn split_plan(space: &IterationSpace, workers: usize, granularity: usize) -> (usize, usize) {
    let rank = space.rank();
    let qualified = (0..rank)
        .rev()
        .find(|&dim| space.num_iterations(dim) >= workers.saturating_mul(granularity));
    if let Some(dim) = qualified {
        return (dim, workers);
    }

    // outermost among the largest dimensions
    let dim = (0..rank)
        .rev()
        .reduce(|x, y| match space.num_iterations(y) > space.num_iterations(x) {
            true => y,
            false => x,
        });
    match dim {
        Some(dim) => {
            let count = (space.num_iterations(dim) / granularity).clamp(1, workers);
            (dim, count)
        }
        None => (0, 1),
    }
}

/// Splits `space` into at most `workers` disjoint slices along one dimension.
///
/// The outermost dimension with at least `workers * granularity` coordinates is split. When no
/// dimension qualifies, the largest one is split into as many slices of `granularity`
/// coordinates as it holds, and at least one. Slice sizes differ by at most one coordinate,
/// larger slices first.
pub fn partition(
    space: &IterationSpace,
    workers: usize,
    granularity: usize,
) -> Result<Vec<WorkSlice>, PartitionError> {
    if workers == 0 {
        return Err(PartitionError::Workers);
    }
    if granularity == 0 {
        return Err(PartitionError::Granularity);
    }

    let (dim, count) = split_plan(space, workers, granularity);
    if count == 1 || space.is_empty() {
        let space = *space;
        return Ok(vec![WorkSlice {
            space,
            dim,
            index: 0,
        }]);
    }

    let dimension = space.dim(dim);
    let total = dimension.num_iterations();
    let (base, remainder) = (total / count, total % count);

    let mut slices = Vec::with_capacity(count);
    let mut offset = 0;
    for index in 0..count {
        let size = base + usize::from(index < remainder);
        let start = dimension.start + (offset * dimension.step as usize) as i64;
        offset += size;
        let end = match index + 1 == count {
            true => dimension.end,
            false => dimension.start + (offset * dimension.step as usize) as i64,
        };
        let space = space.with_range(dim, start, end);
        slices.push(WorkSlice { space, dim, index });
    }
    Ok(slices)
}
