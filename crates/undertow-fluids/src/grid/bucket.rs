use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec2;
use ndarray::{ArrayView1, Zip};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::params::Schedule;

use super::{CellBuckets, GridLayout, GridStats};

/// Grid built by a two-pass counting sort into one flat lookup array.
///
/// Both passes only touch per-cell atomic counters and claim each lookup slot exactly once, so
/// they run across any number of workers. After the scatter every bucket is sorted by particle
/// index, so the contents of a cell that did not overflow are independent of worker order. Which
/// particles a full cell keeps is only fixed under the sequential schedule.
#[derive(Debug)]
pub struct BucketGrid {
    layout: GridLayout,
    /// Particles that fell into each cell this rebuild, including dropped ones.
    cell_particle_count: Vec<AtomicU32>,
    /// Next free lookup slot of each cell during the scatter pass.
    cell_cursor: Vec<AtomicU32>,
    /// Start of each cell's slice of `cell_particle_indices`, plus the total at the end.
    first_cell_particle: Vec<u32>,
    cell_particle_indices: Vec<AtomicU32>,
}

impl BucketGrid {
    pub fn new(layout: GridLayout) -> Self {
        let cells = layout.num_cells();

        Self {
            layout,
            cell_particle_count: atomics(cells),
            cell_cursor: atomics(cells),
            first_cell_particle: vec![0; cells + 1],
            cell_particle_indices: Vec::new(),
        }
    }

    fn count(&mut self, positions: ArrayView1<Vec2>, schedule: Schedule) {
        self.cell_particle_count.iter_mut().for_each(|c| *c.get_mut() = 0);

        let layout = &self.layout;
        let counts = &self.cell_particle_count;

        run_pass!(schedule, Zip::from(positions), |&p: &Vec2| {
            let cell = layout.cell_index(layout.cell_of(p));
            counts[cell].fetch_add(1, Ordering::Relaxed);
        });
    }

    /// Exclusive prefix sum of the capacity-clamped counts. Returns the number of listed
    /// particles and the largest raw count.
    fn allocate(&mut self) -> (usize, usize) {
        let capacity = u32::try_from(self.layout.capacity()).unwrap_or(u32::MAX);
        let mut first = 0;
        let mut max = 0;

        for ((count, start), cursor) in self.cell_particle_count.iter_mut()
            .zip(self.first_cell_particle.iter_mut())
            .zip(self.cell_cursor.iter_mut())
        {
            let count = *count.get_mut();
            max = max.max(count);

            *start = first;
            *cursor.get_mut() = first;
            first += count.min(capacity);
        }

        self.first_cell_particle[self.layout.num_cells()] = first;

        (first as usize, max as usize)
    }

    fn scatter(&mut self, positions: ArrayView1<Vec2>, schedule: Schedule) {
        let layout = &self.layout;
        let cursors = &self.cell_cursor;
        let first = &self.first_cell_particle;
        let indices = &self.cell_particle_indices;

        run_pass!(schedule, Zip::indexed(positions), |i: usize, &p: &Vec2| {
            let cell = layout.cell_index(layout.cell_of(p));
            let slot = cursors[cell].fetch_add(1, Ordering::Relaxed);

            if slot < first[cell + 1] {
                indices[slot as usize].store(i as u32, Ordering::Relaxed);
            }
        });
    }

    fn seal(&mut self, schedule: Schedule) {
        let mut rest = self.cell_particle_indices.as_mut_slice();
        let mut buckets = Vec::with_capacity(self.layout.num_cells());

        for bounds in self.first_cell_particle.windows(2) {
            let (bucket, tail) = std::mem::take(&mut rest).split_at_mut((bounds[1] - bounds[0]) as usize);
            if bucket.len() > 1 {
                buckets.push(bucket);
            }
            rest = tail;
        }

        match schedule {
            Schedule::Sequential => buckets.into_iter().for_each(sort_bucket),
            Schedule::Parallel => buckets.into_par_iter().for_each(sort_bucket),
        }
    }
}

impl CellBuckets for BucketGrid {
    fn layout(&self) -> &GridLayout {
        &self.layout
    }

    fn rebuild(&mut self, positions: ArrayView1<Vec2>, schedule: Schedule) -> GridStats {
        if self.cell_particle_indices.len() != positions.len() {
            self.cell_particle_indices = atomics(positions.len());
        }

        self.count(positions, schedule);
        let (listed, max_occupancy) = self.allocate();
        self.scatter(positions, schedule);
        self.seal(schedule);

        GridStats {
            max_occupancy,
            dropped: positions.len() - listed,
        }
    }

    #[inline]
    fn occupancy(&self, cell: usize) -> usize {
        (self.first_cell_particle[cell + 1] - self.first_cell_particle[cell]) as usize
    }

    #[inline]
    fn entry(&self, cell: usize, slot: usize) -> usize {
        let first = self.first_cell_particle[cell] as usize;
        self.cell_particle_indices[first + slot].load(Ordering::Relaxed) as usize
    }
}

fn atomics(n: usize) -> Vec<AtomicU32> {
    (0..n).map(|_| AtomicU32::new(0)).collect()
}

fn sort_bucket(bucket: &mut [AtomicU32]) {
    let mut ids: SmallVec<[u32; 32]> = bucket.iter_mut().map(|i| *i.get_mut()).collect();
    ids.sort_unstable();

    for (slot, id) in bucket.iter_mut().zip(ids) {
        *slot.get_mut() = id;
    }
}
