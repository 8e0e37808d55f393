//! Uniform cell grid used for neighbor queries.
//!
//! The grid is a derived index over particle positions. It is rebuilt after every sub-step and
//! read concurrently by the pressure and projection stages in between.

use glam::{IVec2, UVec2, Vec2};
use ndarray::ArrayView1;
use smallvec::SmallVec;

use crate::params::{GridStrategy, PcisphParams, Schedule};

pub mod bucket;
pub mod cell_list;

pub use bucket::BucketGrid;
pub use cell_list::CellListGrid;

/// The 3x3 block of cells around (and including) a cell.
pub const NEIGHBOR_OFFSETS: [IVec2; 9] = [
    IVec2::new(-1, -1),
    IVec2::new(0, -1),
    IVec2::new(1, -1),
    IVec2::new(-1, 0),
    IVec2::new(0, 0),
    IVec2::new(1, 0),
    IVec2::new(-1, 1),
    IVec2::new(0, 1),
    IVec2::new(1, 1),
];

/// Cell geometry over the domain `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    cell_size: f32,
    dims: UVec2,
    capacity: usize,
}

impl GridLayout {
    pub fn new(width: f32, height: f32, cell_size: f32, capacity: usize) -> Self {
        let dims = Self::dims_for(width, height, cell_size);

        Self {
            cell_size,
            dims,
            capacity,
        }
    }

    pub fn from_params(params: &PcisphParams) -> Self {
        Self::new(params.width, params.height, params.cell_size, params.cell_capacity)
    }

    /// Cells along each axis for a domain. Saturates at `u32::MAX` per axis.
    pub fn dims_for(width: f32, height: f32, cell_size: f32) -> UVec2 {
        (Vec2::new(width, height) / cell_size).ceil().as_uvec2().max(UVec2::ONE)
    }

    /// Total cells of a grid with `dims`, or `None` if the grid cannot be indexed.
    ///
    /// Cell indices are stored as `u32` with `u32::MAX` reserved, which bounds the count.
    pub fn checked_num_cells(dims: UVec2) -> Option<usize> {
        let cells = (dims.x as u64).checked_mul(dims.y as u64)?;
        if cells >= u32::MAX as u64 {
            return None;
        }
        usize::try_from(cells).ok()
    }

    /// Number of cells along each axis.
    #[inline(always)]
    pub fn dims(&self) -> UVec2 {
        self.dims
    }

    #[inline(always)]
    pub fn num_cells(&self) -> usize {
        self.dims.x as usize * self.dims.y as usize
    }

    /// Maximum particles listed per cell.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The cell containing `p`. Positions outside the domain map to the nearest edge cell.
    #[inline]
    pub fn cell_of(&self, p: Vec2) -> UVec2 {
        (p / self.cell_size)
            .floor()
            .as_ivec2()
            .clamp(IVec2::ZERO, self.dims.as_ivec2() - 1)
            .as_uvec2()
    }

    #[inline(always)]
    pub fn cell_index(&self, cell: UVec2) -> usize {
        cell.x as usize + cell.y as usize * self.dims.x as usize
    }

    /// Flat indices of the in-range cells of the 3x3 block around `cell`.
    pub fn neighborhood(&self, cell: UVec2) -> SmallVec<[usize; 9]> {
        let dims = self.dims.as_ivec2();

        NEIGHBOR_OFFSETS
            .iter()
            .map(|&offset| cell.as_ivec2() + offset)
            .filter(|c| c.cmpge(IVec2::ZERO).all() && c.cmplt(dims).all())
            .map(|c| self.cell_index(c.as_uvec2()))
            .collect()
    }
}

/// Occupancy figures of one rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Largest number of particles that fell into a single cell, including dropped ones.
    pub max_occupancy: usize,
    /// Particles left out of their cell because it was full.
    pub dropped: usize,
}

impl GridStats {
    /// Combines the stats of two rebuilds, keeping the worst of each figure.
    pub fn worst(self, other: GridStats) -> GridStats {
        GridStats {
            max_occupancy: self.max_occupancy.max(other.max_occupancy),
            dropped: self.dropped.max(other.dropped),
        }
    }
}

/// Bounded per-cell buckets of particle indices.
///
/// Readers may query buckets from many threads at once. Rebuilding takes `&mut self`, so it can
/// never overlap a read.
pub trait CellBuckets: Send + Sync {
    fn layout(&self) -> &GridLayout;

    /// Clears every bucket and lists each particle in the cell of its position, up to capacity.
    fn rebuild(&mut self, positions: ArrayView1<Vec2>, schedule: Schedule) -> GridStats;

    /// Number of particles listed in a cell. Never exceeds the layout's capacity.
    fn occupancy(&self, cell: usize) -> usize;

    /// The particle in `slot` of a cell, for `slot < occupancy(cell)`.
    fn entry(&self, cell: usize, slot: usize) -> usize;

    /// Copies out the bucket of one cell.
    fn bucket(&self, cell: UVec2) -> Vec<usize> {
        let cell = self.layout().cell_index(cell);
        (0..self.occupancy(cell)).map(|slot| self.entry(cell, slot)).collect()
    }
}

impl<'g> dyn CellBuckets + 'g {
    /// Particles listed in `cell` and its eight surrounding cells.
    pub fn neighbors(&self, cell: UVec2) -> Neighbors<'_> {
        Neighbors::new(self, cell)
    }
}

/// Builds the grid selected by `params.grid`, sized for the params' domain.
pub fn build_grid(params: &PcisphParams) -> Box<dyn CellBuckets> {
    let layout = GridLayout::from_params(params);

    match params.grid {
        GridStrategy::CountingSort => Box::new(BucketGrid::new(layout)),
        GridStrategy::CellLists => Box::new(CellListGrid::new(layout)),
    }
}

/// Iterator over the particle indices of a 3x3 cell block.
pub struct Neighbors<'a> {
    grid: &'a dyn CellBuckets,
    cells: SmallVec<[usize; 9]>,
    cell: usize,
    slot: usize,
}

impl<'a> Neighbors<'a> {
    pub fn new(grid: &'a dyn CellBuckets, cell: UVec2) -> Self {
        Self {
            cells: grid.layout().neighborhood(cell),
            grid,
            cell: 0,
            slot: 0,
        }
    }
}

impl Iterator for Neighbors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while let Some(&cell) = self.cells.get(self.cell) {
            if self.slot < self.grid.occupancy(cell) {
                let i = self.grid.entry(cell, self.slot);
                self.slot += 1;
                return Some(i);
            }

            self.cell += 1;
            self.slot = 0;
        }

        None
    }
}
