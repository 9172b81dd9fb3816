//! Immutable generation snapshots.

use crate::grid::{Cell, CellGrid, Occupant, PermanentDisturbanceMap, Position};
use crate::stats::GenerationStats;
use serde::{Deserialize, Serialize};

/// One time step: the full grid plus its aggregates.
///
/// A generation is never modified after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    grid: CellGrid,
    stats: GenerationStats,
}

impl Generation {
    /// Wrap a grid, computing its aggregates
    pub fn new(index: u64, grid: CellGrid, species_count: usize) -> Self {
        let stats = GenerationStats::from_grid(index, &grid, species_count);
        Self { grid, stats }
    }

    pub(crate) fn with_stats(grid: CellGrid, stats: GenerationStats) -> Self {
        Self { grid, stats }
    }

    #[inline]
    pub fn index(&self) -> u64 {
        self.stats.generation
    }

    #[inline]
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    #[inline]
    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    #[inline]
    pub fn cell(&self, x: usize, z: usize) -> &Cell {
        self.grid.get(x, z)
    }

    /// Every cell with its position, z outer and x inner
    pub fn cells(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        self.grid.iter()
    }

    /// Check the per-cell invariants against the run's permanent map and
    /// species count, returning the first violation found
    pub fn verify(&self, permanent: &PermanentDisturbanceMap, species_count: usize) -> Result<(), String> {
        if permanent.dimensions() != (self.grid.x_cells(), self.grid.z_cells()) {
            return Err("grid and permanent map dimensions differ".to_string());
        }
        for (pos, cell) in self.cells() {
            let pinned = permanent.is_disturbed(pos.x, pos.z);
            match cell.occupant {
                Occupant::PermanentGap if !pinned => {
                    return Err(format!("({}, {}) is a permanent gap outside the permanent map", pos.x, pos.z));
                }
                Occupant::Gap | Occupant::Species(_) if pinned => {
                    return Err(format!("({}, {}) is permanently disturbed but holds {:?}", pos.x, pos.z, cell.occupant));
                }
                Occupant::Gap if cell.age != 0 || cell.biomass != 0.0 => {
                    return Err(format!("gap at ({}, {}) carries age or biomass", pos.x, pos.z));
                }
                Occupant::Species(s) if s == 0 || s as usize > species_count => {
                    return Err(format!("({}, {}) holds unknown species {}", pos.x, pos.z, s));
                }
                _ => {}
            }
        }
        if self.stats.total_cells() != self.grid.len() {
            return Err(format!(
                "species counts sum to {} for {} cells",
                self.stats.total_cells(),
                self.grid.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_aggregates() {
        let mut grid = CellGrid::new(2, 2);
        grid.set(1, 1, Cell::established(1, 2.0));
        let generation = Generation::new(3, grid, 1);

        assert_eq!(generation.index(), 3);
        assert_eq!(generation.stats().counts_by_species, vec![3, 1]);
        assert_eq!(generation.cells().count(), 4);
        assert_eq!(generation.cell(1, 1).species_id(), 1);
    }

    #[test]
    fn test_verify_catches_violations() {
        let mut permanent = PermanentDisturbanceMap::empty(2, 2);
        permanent.mark(0, 0);

        let mut grid = CellGrid::new(2, 2);
        grid.set(0, 0, Cell::PERMANENT_GAP);
        assert!(Generation::new(0, grid.clone(), 1).verify(&permanent, 1).is_ok());

        let mut unpinned = grid.clone();
        unpinned.set(0, 0, Cell::GAP);
        assert!(Generation::new(0, unpinned, 1).verify(&permanent, 1).is_err());

        let mut dirty_gap = grid.clone();
        dirty_gap.set(1, 0, Cell { occupant: Occupant::Gap, age: 2, biomass: 0.0 });
        assert!(Generation::new(0, dirty_gap, 1).verify(&permanent, 1).is_err());

        let mut unknown = grid;
        unknown.set(1, 1, Cell::established(4, 1.0));
        assert!(Generation::new(0, unknown, 4).verify(&permanent, 1).is_err());
    }
}
