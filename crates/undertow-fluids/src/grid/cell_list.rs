use glam::Vec2;
use ndarray::ArrayView1;
use smallvec::SmallVec;

use crate::params::Schedule;

use super::{CellBuckets, GridLayout, GridStats};

/// Marks a particle that is not listed in any cell.
const UNLISTED: u32 = u32::MAX;

/// Grid of mutable per-cell lists.
///
/// Particles that change cell are swap-removed from their old list and appended to the new one,
/// so a rebuild only touches particles that moved. The lists are mutated in place, so the
/// rebuild always runs on the calling thread regardless of the schedule.
#[derive(Debug, Clone)]
pub struct CellListGrid {
    layout: GridLayout,
    cells: Vec<SmallVec<[u32; 8]>>,
    /// Cell each particle is listed in, or `UNLISTED`.
    home: Vec<u32>,
    /// Particles that fell into each cell this rebuild, including dropped ones.
    demand: Vec<u32>,
}

impl CellListGrid {
    pub fn new(layout: GridLayout) -> Self {
        let cells = layout.num_cells();

        Self {
            layout,
            cells: vec![SmallVec::new(); cells],
            home: Vec::new(),
            demand: vec![0; cells],
        }
    }

    fn reset(&mut self, n: usize) {
        self.cells.iter_mut().for_each(SmallVec::clear);
        self.home.clear();
        self.home.resize(n, UNLISTED);
    }
}

impl CellBuckets for CellListGrid {
    fn layout(&self) -> &GridLayout {
        &self.layout
    }

    fn rebuild(&mut self, positions: ArrayView1<Vec2>, _schedule: Schedule) -> GridStats {
        if self.home.len() != positions.len() {
            self.reset(positions.len());
        }

        self.demand.fill(0);

        // Leave cells first so that arrivals see every slot freed this rebuild.
        for (i, &p) in positions.iter().enumerate() {
            let cell = self.layout.cell_index(self.layout.cell_of(p));
            self.demand[cell] += 1;

            let home = self.home[i];
            if home == cell as u32 || home == UNLISTED {
                continue;
            }

            let list = &mut self.cells[home as usize];
            if let Some(k) = list.iter().position(|&j| j == i as u32) {
                list.swap_remove(k);
            }
            self.home[i] = UNLISTED;
        }

        let capacity = self.layout.capacity();
        let mut dropped = 0;

        for (i, &p) in positions.iter().enumerate() {
            if self.home[i] != UNLISTED {
                continue;
            }

            let cell = self.layout.cell_index(self.layout.cell_of(p));
            let list = &mut self.cells[cell];

            if list.len() < capacity {
                list.push(i as u32);
                self.home[i] = cell as u32;
            } else {
                dropped += 1;
            }
        }

        GridStats {
            max_occupancy: self.demand.iter().copied().max().unwrap_or(0) as usize,
            dropped,
        }
    }

    #[inline]
    fn occupancy(&self, cell: usize) -> usize {
        self.cells[cell].len()
    }

    #[inline]
    fn entry(&self, cell: usize, slot: usize) -> usize {
        self.cells[cell][slot] as usize
    }
}
