//! Colonisation and replacement: who takes a cell next generation.
//!
//! Three additive dispersal sources feed a candidate's probability: local
//! seed rain from the Moore neighbourhood, distant dispersal proportional to
//! the candidate's share of the whole grid, and a constant immigration
//! background. The sum is scaled by how well the candidate would do as a
//! seedling on that cell.

use crate::config::ConfigError;
use crate::environment::HealthModel;
use crate::grid::Occupant;
use crate::species::{AffinityMatrix, SpeciesId};
use crate::stats::GenerationStats;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum number of Moore neighbours
const NEIGHBORHOOD: f32 = 8.0;

/// Relative weights of the three dispersal sources; they sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispersalWeights {
    pub local: f32,
    pub distant: f32,
    pub immigration: f32,
}

impl Default for DispersalWeights {
    fn default() -> Self {
        Self {
            local: 0.7,
            distant: 0.29,
            immigration: 0.01,
        }
    }
}

impl DispersalWeights {
    const TOLERANCE: f32 = 1e-3;

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.local + self.distant + self.immigration;
        let negative = self.local < 0.0 || self.distant < 0.0 || self.immigration < 0.0;
        if negative || !((sum - 1.0).abs() <= Self::TOLERANCE) {
            return Err(ConfigError::DispersalWeights { sum });
        }
        Ok(())
    }
}

/// Outcome of one selection draw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Chosen species, or `None` when the incumbent (or gap) stays
    pub species: Option<SpeciesId>,
    /// The cumulative probability had to be clamped to 1
    pub clamped: bool,
}

/// Computes replacement probability vectors and draws from them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplacementModel {
    weights: DispersalWeights,
    affinity: AffinityMatrix,
}

impl ReplacementModel {
    pub fn new(weights: DispersalWeights, affinity: AffinityMatrix) -> Self {
        Self { weights, affinity }
    }

    pub fn weights(&self) -> &DispersalWeights {
        &self.weights
    }

    pub fn affinity(&self) -> &AffinityMatrix {
        &self.affinity
    }

    /// Fill `out[s]` with the probability that species `s` takes a cell
    /// currently held by `occupant`.
    ///
    /// `neighbor_counts` and `out` are indexed by species id and hold N+1
    /// slots; `out[0]` is set to zero. `previous` supplies the global counts
    /// of the generation being replaced.
    pub fn probabilities_into(
        &self,
        occupant: Occupant,
        neighbor_counts: &[u32],
        previous: &GenerationStats,
        health: &HealthModel,
        elevation: f32,
        out: &mut [f32],
    ) {
        let column = match occupant {
            Occupant::Species(s) => s,
            Occupant::Gap | Occupant::PermanentGap => 0,
        };
        let total_cells = previous.total_cells().max(1) as f32;
        let w = &self.weights;

        out[0] = 0.0;
        for s in 1..=self.affinity.species_count() as SpeciesId {
            let affinity = self.affinity.get(s, column);
            let local = neighbor_counts[s as usize] as f32 / NEIGHBORHOOD;
            let distant = previous.count(s) as f32 / total_cells;
            let pressure = affinity * local * w.local + affinity * distant * w.distant + w.immigration;
            out[s as usize] = pressure * health.overall_health(s, 0, elevation);
        }
    }

    /// Allocating form of [`probabilities_into`](Self::probabilities_into)
    pub fn probabilities(
        &self,
        occupant: Occupant,
        neighbor_counts: &[u32],
        previous: &GenerationStats,
        health: &HealthModel,
        elevation: f32,
    ) -> Vec<f32> {
        let mut out = vec![0.0; self.affinity.species_count() + 1];
        self.probabilities_into(occupant, neighbor_counts, previous, health, elevation, &mut out);
        out
    }
}

/// Draw the next species from a probability vector indexed by species id.
///
/// Species are walked in index order and the first whose cumulative total
/// reaches the uniform draw wins. Species with zero probability are never
/// chosen. The running total is capped at 1 so an over-full vector cannot
/// give the lower indices extra mass beyond certainty.
pub fn select_next_species<R: Rng + ?Sized>(probabilities: &[f32], rng: &mut R) -> Selection {
    let r: f32 = rng.gen();
    let mut cumulative = 0.0f32;
    let mut clamped = false;

    for (s, &p) in probabilities.iter().enumerate().skip(1) {
        if p <= 0.0 {
            continue;
        }
        cumulative += p;
        if cumulative > 1.0 {
            cumulative = 1.0;
            clamped = true;
        }
        if cumulative >= r {
            return Selection {
                species: Some(s as SpeciesId),
                clamped,
            };
        }
    }

    Selection {
        species: None,
        clamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentParameters, HealthConfig};
    use crate::species::{FactorResponse, SpeciesProfile, SpeciesTable};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tolerant_model(n: usize) -> (ReplacementModel, HealthModel) {
        let table = SpeciesTable::new(
            (0..n).map(|i| SpeciesProfile::tolerant(&format!("s{}", i), 20)).collect(),
        )
        .unwrap();
        let health = HealthModel::new(&table, &EnvironmentParameters::default(), HealthConfig::default());
        let model = ReplacementModel::new(DispersalWeights::default(), AffinityMatrix::uniform(n, 0.4, 0.1));
        (model, health)
    }

    #[test]
    fn test_probability_formula() {
        let (model, health) = tolerant_model(2);
        let previous = GenerationStats::from_counts(vec![50, 30, 20]);
        let neighbors = [0, 4, 0];

        let p = model.probabilities(Occupant::Gap, &neighbors, &previous, &health, 35.0);

        let expected_1 = 0.4 * 0.5 * 0.7 + 0.4 * 0.3 * 0.29 + 0.01;
        let expected_2 = 0.4 * 0.0 * 0.7 + 0.4 * 0.2 * 0.29 + 0.01;
        assert_eq!(p[0], 0.0);
        assert!((p[1] - expected_1).abs() < 1e-6);
        assert!((p[2] - expected_2).abs() < 1e-6);
    }

    #[test]
    fn test_replacement_uses_occupant_column() {
        let (model, health) = tolerant_model(2);
        let previous = GenerationStats::from_counts(vec![0, 100, 0]);
        let neighbors = [0, 8, 0];

        let gap = model.probabilities(Occupant::Gap, &neighbors, &previous, &health, 0.0);
        let occupied = model.probabilities(Occupant::Species(2), &neighbors, &previous, &health, 0.0);
        assert!(gap[1] > occupied[1]);
        assert!((occupied[1] - (0.1 * 0.7 + 0.1 * 0.29 + 0.01)).abs() < 1e-6);
    }

    #[test]
    fn test_health_suppresses_ill_adapted() {
        let mut lowland = SpeciesProfile::tolerant("lowland", 20);
        lowland.elevation = FactorResponse::new(0.0, 2.0);
        let table = SpeciesTable::new(vec![lowland]).unwrap();
        let health = HealthModel::new(&table, &EnvironmentParameters::default(), HealthConfig::default());
        let model = ReplacementModel::new(DispersalWeights::default(), AffinityMatrix::uniform(1, 0.4, 0.1));
        let previous = GenerationStats::from_counts(vec![0, 9]);

        let p = model.probabilities(Occupant::Gap, &[0, 8], &previous, &health, 100.0);
        assert_eq!(p[1], 0.0);
    }

    #[test]
    fn test_select_none_when_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let sel = select_next_species(&[0.0, 0.0, 0.0], &mut rng);
            assert_eq!(sel.species, None);
            assert!(!sel.clamped);
        }
    }

    #[test]
    fn test_select_certain() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..100 {
            let sel = select_next_species(&[0.0, 0.0, 1.0], &mut rng);
            assert_eq!(sel.species, Some(2));
        }
    }

    #[test]
    fn test_select_frequencies() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let probabilities = [0.0, 0.2, 0.3];
        let mut counts = [0usize; 3];
        let trials = 20_000;
        for _ in 0..trials {
            match select_next_species(&probabilities, &mut rng).species {
                Some(s) => counts[s as usize] += 1,
                None => counts[0] += 1,
            }
        }
        let share = |c: usize| c as f32 / trials as f32;
        assert!((share(counts[1]) - 0.2).abs() < 0.02);
        assert!((share(counts[2]) - 0.3).abs() < 0.02);
        assert!((share(counts[0]) - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_select_clamps_overfull_vector() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut clamped = 0;
        for _ in 0..1000 {
            let sel = select_next_species(&[0.0, 0.7, 0.7, 0.7], &mut rng);
            assert!(matches!(sel.species, Some(1) | Some(2)));
            if sel.clamped {
                clamped += 1;
                assert_eq!(sel.species, Some(2));
            }
        }
        assert!(clamped > 0);
    }

    #[test]
    fn test_weights_validation() {
        assert!(DispersalWeights::default().validate().is_ok());
        let bad = DispersalWeights {
            local: 0.5,
            distant: 0.5,
            immigration: 0.5,
        };
        assert!(bad.validate().is_err());
        let negative = DispersalWeights {
            local: 1.5,
            distant: -0.5,
            immigration: 0.0,
        };
        assert!(negative.validate().is_err());
    }
}
