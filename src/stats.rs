//! Per-generation aggregate statistics.

use crate::grid::{CellGrid, Occupant};
use crate::species::SpeciesId;
use serde::{Deserialize, Serialize};

/// Aggregates for one generation, indexed by species id (slot 0 = gaps,
/// permanent gaps included, so the counts always sum to the grid size)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation index
    pub generation: u64,
    /// Cells held per species
    pub counts_by_species: Vec<u32>,
    /// Mean age of each species' plants (0 when absent)
    pub average_age_by_species: Vec<f32>,
    /// Summed biomass per species
    pub total_biomass_by_species: Vec<f32>,
    /// Permanently barren cells (also counted in slot 0)
    pub permanent_gaps: u32,
    /// Cells cleared by disturbance in the step that produced this generation
    pub disturbed: u32,
    /// Selection draws whose cumulative probability was clamped to 1
    pub clamped_selections: u32,
}

impl GenerationStats {
    /// Aggregate a grid over `species_count` live species
    pub fn from_grid(generation: u64, grid: &CellGrid, species_count: usize) -> Self {
        let slots = species_count + 1;
        let mut counts = vec![0u32; slots];
        let mut age_sums = vec![0u64; slots];
        let mut biomass = vec![0.0f32; slots];
        let mut permanent_gaps = 0;

        for cell in grid.cells() {
            let i = cell.occupant.stats_index();
            counts[i] += 1;
            if cell.occupant.is_live() {
                age_sums[i] += cell.age as u64;
                biomass[i] += cell.biomass;
            } else if cell.occupant == Occupant::PermanentGap {
                permanent_gaps += 1;
            }
        }

        let average_age_by_species = counts
            .iter()
            .zip(&age_sums)
            .map(|(&n, &sum)| if n == 0 { 0.0 } else { sum as f32 / n as f32 })
            .collect();

        Self {
            generation,
            counts_by_species: counts,
            average_age_by_species,
            total_biomass_by_species: biomass,
            permanent_gaps,
            disturbed: 0,
            clamped_selections: 0,
        }
    }

    /// Aggregates carrying only counts
    #[cfg(test)]
    pub(crate) fn from_counts(counts: Vec<u32>) -> Self {
        let slots = counts.len();
        Self {
            counts_by_species: counts,
            average_age_by_species: vec![0.0; slots],
            total_biomass_by_species: vec![0.0; slots],
            ..Self::default()
        }
    }

    /// Cells held by `species`; 0 for gaps
    #[inline]
    pub fn count(&self, species: SpeciesId) -> u32 {
        self.counts_by_species.get(species as usize).copied().unwrap_or(0)
    }

    /// Number of cells in the grid
    pub fn total_cells(&self) -> usize {
        self.counts_by_species.iter().map(|&c| c as usize).sum()
    }

    /// Number of live species slots (N)
    pub fn species_count(&self) -> usize {
        self.counts_by_species.len().saturating_sub(1)
    }

    /// Cells occupied by any live plant
    pub fn occupied(&self) -> u32 {
        self.counts_by_species.iter().skip(1).sum()
    }

    /// Gap cells, excluding permanent gaps
    pub fn open_gaps(&self) -> u32 {
        self.counts_by_species.first().copied().unwrap_or(0) - self.permanent_gaps
    }

    /// Species with the most cells, if any plant is alive
    pub fn dominant_species(&self) -> Option<(SpeciesId, u32)> {
        self.counts_by_species
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, &c)| c > 0)
            .max_by_key(|(_, &c)| c)
            .map(|(s, &c)| (s as SpeciesId, c))
    }

    /// Species with at least one plant
    pub fn richness(&self) -> usize {
        self.counts_by_species.iter().skip(1).filter(|&&c| c > 0).count()
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        let total = self.total_cells().max(1) as f32;
        let cover = 100.0 * self.occupied() as f32 / total;
        let biomass: f32 = self.total_biomass_by_species.iter().sum();
        let dominant = match self.dominant_species() {
            Some((s, c)) => format!("{} ({:.1}%)", s, 100.0 * c as f32 / total),
            None => "-".to_string(),
        };
        format!(
            "G:{:5} | Cover:{:5.1}% | Species:{:2} | Dominant:{} | Biomass:{:.0} | Disturbed:{}",
            self.generation,
            cover,
            self.richness(),
            dominant,
            biomass,
            self.disturbed,
        )
    }
}

/// Ordered series of generation statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    pub snapshots: Vec<GenerationStats>,
}

impl StatsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stats snapshot
    pub fn record(&mut self, stats: GenerationStats) {
        self.snapshots.push(stats);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Cell count of `species` per generation (0 = gaps)
    pub fn count_series(&self, species: usize) -> Vec<(u64, u32)> {
        self.snapshots
            .iter()
            .map(|s| (s.generation, s.counts_by_species.get(species).copied().unwrap_or(0)))
            .collect()
    }

    /// Mean age of `species` per generation
    pub fn average_age_series(&self, species: usize) -> Vec<(u64, f32)> {
        self.snapshots
            .iter()
            .map(|s| (s.generation, s.average_age_by_species.get(species).copied().unwrap_or(0.0)))
            .collect()
    }

    /// Total biomass of `species` per generation
    pub fn biomass_series(&self, species: usize) -> Vec<(u64, f32)> {
        self.snapshots
            .iter()
            .map(|s| (s.generation, s.total_biomass_by_species.get(species).copied().unwrap_or(0.0)))
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;

    #[test]
    fn test_stats_from_grid() {
        let mut grid = CellGrid::new(3, 2);
        grid.set(0, 0, Cell { occupant: Occupant::Species(1), age: 2, biomass: 3.0 });
        grid.set(1, 0, Cell { occupant: Occupant::Species(1), age: 4, biomass: 5.0 });
        grid.set(2, 0, Cell { occupant: Occupant::Species(2), age: 1, biomass: 1.5 });
        grid.set(0, 1, Cell::PERMANENT_GAP);

        let stats = GenerationStats::from_grid(7, &grid, 3);

        assert_eq!(stats.generation, 7);
        assert_eq!(stats.counts_by_species, vec![3, 2, 1, 0]);
        assert_eq!(stats.total_cells(), 6);
        assert_eq!(stats.average_age_by_species, vec![0.0, 3.0, 1.0, 0.0]);
        assert_eq!(stats.total_biomass_by_species, vec![0.0, 8.0, 1.5, 0.0]);
        assert_eq!(stats.permanent_gaps, 1);
        assert_eq!(stats.open_gaps(), 2);
        assert_eq!(stats.dominant_species(), Some((1, 2)));
        assert_eq!(stats.richness(), 2);
    }

    #[test]
    fn test_empty_grid_has_no_dominant() {
        let stats = GenerationStats::from_grid(0, &CellGrid::new(2, 2), 2);
        assert_eq!(stats.dominant_species(), None);
        assert!(stats.summary().contains("Dominant:-"));
    }

    #[test]
    fn test_stats_history_series() {
        let mut history = StatsHistory::new();
        for g in 0..5u64 {
            let mut stats = GenerationStats::from_counts(vec![10 - g as u32, g as u32]);
            stats.generation = g;
            history.record(stats);
        }

        let series = history.count_series(1);
        assert_eq!(series.len(), 5);
        assert_eq!(series[0], (0, 0));
        assert_eq!(series[4], (4, 4));
        assert_eq!(history.count_series(9)[2], (2, 0));
    }

    #[test]
    fn test_age_and_biomass_series() {
        let mut history = StatsHistory::new();
        for g in 0..3u32 {
            let mut grid = CellGrid::new(2, 1);
            grid.set(0, 0, Cell { occupant: Occupant::Species(1), age: g, biomass: 1.0 + g as f32 });
            grid.set(1, 0, Cell { occupant: Occupant::Species(1), age: g + 2, biomass: 2.0 });
            history.record(GenerationStats::from_grid(g as u64, &grid, 2));
        }

        assert_eq!(history.average_age_series(1), vec![(0, 1.0), (1, 2.0), (2, 3.0)]);
        assert_eq!(history.biomass_series(1), vec![(0, 3.0), (1, 4.0), (2, 5.0)]);
        assert_eq!(history.average_age_series(2), vec![(0, 0.0), (1, 0.0), (2, 0.0)]);
        assert_eq!(history.biomass_series(0)[1], (1, 0.0));
        assert_eq!(history.average_age_series(9)[2], (2, 0.0));
    }
}
