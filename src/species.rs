//! Static per-species biology and the replacement affinity matrix.
//!
//! A [`SpeciesCatalog`] is the library of plant prototypes a community can
//! be drawn from. A run selects N of them into a [`SpeciesTable`], where
//! they are addressed by species id `1..=N` (id 0 is reserved for gaps).

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Species id of a live plant within a run (`1..=N`).
pub type SpeciesId = u16;

/// Optimum and falloff shape for one environmental factor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactorResponse {
    /// Value of the factor at which the species is healthiest
    pub optimum: f32,
    /// Health lost per unit of mismatch; `<= 0` disables the factor
    pub effect: f32,
}

impl FactorResponse {
    pub const fn new(optimum: f32, effect: f32) -> Self {
        Self { optimum, effect }
    }

    /// A response that never reduces health
    pub const fn neutral() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Biological parameters of one plant species
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesProfile {
    pub name: String,
    /// Maximum age in generations
    pub lifespan: u32,
    /// Biomass of a freshly established individual
    pub base_biomass: f32,
    /// Biomass gained per generation at full health
    pub biomass_increase_rate: f32,
    /// Elevation response (optimum in elevation units)
    pub elevation: FactorResponse,
    pub water: FactorResponse,
    pub light: FactorResponse,
    pub temperature: FactorResponse,
}

impl SpeciesProfile {
    /// A species that is indifferent to its environment
    pub fn tolerant(name: &str, lifespan: u32) -> Self {
        Self {
            name: name.to_string(),
            lifespan,
            base_biomass: 1.0,
            biomass_increase_rate: 0.5,
            elevation: FactorResponse::neutral(),
            water: FactorResponse::neutral(),
            light: FactorResponse::neutral(),
            temperature: FactorResponse::neutral(),
        }
    }
}

/// Rendering scale of each built-in prototype, reused as its seedling biomass
const PROTOTYPE_SCALES: [f32; 20] = [
    0.5, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5, 0.5, 1.0, 0.5, 0.5, 0.5,
];

/// Built-in prototype: lifespan 25, elevation optimum 35, every factor
/// disabled. Species differ only through the affinity matrix.
fn prototype(catalog_id: usize, scale: f32) -> SpeciesProfile {
    let level = FactorResponse::new(0.5, 0.0);
    SpeciesProfile {
        name: format!("Prototype {:02}", catalog_id),
        lifespan: 25,
        base_biomass: scale,
        biomass_increase_rate: 0.1,
        elevation: FactorResponse::new(35.0, 0.0),
        water: level,
        light: level,
        temperature: level,
    }
}

/// Library of plant prototypes, addressed by catalog id
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesCatalog {
    profiles: Vec<SpeciesProfile>,
}

impl Default for SpeciesCatalog {
    fn default() -> Self {
        Self {
            profiles: PROTOTYPE_SCALES
                .iter()
                .enumerate()
                .map(|(id, &scale)| prototype(id, scale))
                .collect(),
        }
    }
}

impl SpeciesCatalog {
    pub fn new(profiles: Vec<SpeciesProfile>) -> Self {
        Self { profiles }
    }

    /// Load a catalog from a YAML list of profiles
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let profiles: Vec<SpeciesProfile> = serde_yaml::from_str(&contents)?;
        Ok(Self { profiles })
    }

    pub fn get(&self, catalog_id: usize) -> Option<&SpeciesProfile> {
        self.profiles.get(catalog_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Select the community members, in order, into a species table
    pub fn select(&self, catalog_ids: &[usize]) -> Result<SpeciesTable, ConfigError> {
        let profiles = catalog_ids
            .iter()
            .map(|&id| {
                self.get(id).cloned().ok_or(ConfigError::UnknownSpecies {
                    id,
                    catalog_size: self.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        SpeciesTable::new(profiles)
    }
}

/// The N species taking part in one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeciesTable {
    profiles: Vec<SpeciesProfile>,
}

impl SpeciesTable {
    pub fn new(profiles: Vec<SpeciesProfile>) -> Result<Self, ConfigError> {
        if profiles.is_empty() {
            return Err(ConfigError::Invalid("community must contain at least one species".to_string()));
        }
        if profiles.len() > SpeciesId::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "community of {} species exceeds the supported maximum",
                profiles.len()
            )));
        }
        if let Some(p) = profiles.iter().find(|p| p.lifespan == 0) {
            return Err(ConfigError::Invalid(format!("species '{}' has a lifespan of 0", p.name)));
        }
        Ok(Self { profiles })
    }

    /// Number of species (N)
    #[inline]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Always false: construction rejects empty communities
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profile of a live species.
    ///
    /// # Panics
    ///
    /// Panics if `species` is outside `1..=N`; such an id can only come from
    /// a decoding bug upstream.
    #[inline]
    pub fn profile(&self, species: SpeciesId) -> &SpeciesProfile {
        assert!(
            species >= 1 && (species as usize) <= self.profiles.len(),
            "species id {} outside 1..={}",
            species,
            self.profiles.len()
        );
        &self.profiles[species as usize - 1]
    }

    /// All live species ids, in index order
    pub fn ids(&self) -> impl Iterator<Item = SpeciesId> {
        1..=self.profiles.len() as SpeciesId
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}

/// (N+1)×(N+1) baseline propensities of a row species to colonise or
/// replace a column occupant. Index 0 stands for "gap" on both axes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffinityMatrix {
    size: usize,
    values: Vec<f32>,
}

impl AffinityMatrix {
    /// Colonisation affinity of the built-in default matrix
    pub const DEFAULT_COLONIZATION: f32 = 0.4;
    /// Replacement affinity of the built-in default matrix
    pub const DEFAULT_REPLACEMENT: f32 = 0.1;

    /// Matrix where every species colonises gaps with `colonization` and
    /// replaces any living plant with `replacement`
    pub fn uniform(species_count: usize, colonization: f32, replacement: f32) -> Self {
        let size = species_count + 1;
        let mut values = vec![0.0; size * size];
        for row in 1..size {
            values[row * size] = colonization;
            for col in 1..size {
                values[row * size + col] = replacement;
            }
        }
        Self { size, values }
    }

    /// Build from explicit rows. Row 0 (gap) must be all zero.
    pub fn from_rows(species_count: usize, rows: &[Vec<f32>]) -> Result<Self, ConfigError> {
        let size = species_count + 1;
        if rows.len() != size || rows.iter().any(|r| r.len() != size) {
            return Err(ConfigError::AffinityShape {
                expected: size,
                rows: rows.len(),
                cols: rows.iter().map(Vec::len).find(|&len| len != size).unwrap_or(size),
            });
        }
        if rows[0].iter().any(|&v| v != 0.0) {
            return Err(ConfigError::Invalid(
                "affinity row 0 must be all zero: gaps never replace plants".to_string(),
            ));
        }
        if let Some(v) = rows.iter().flatten().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(ConfigError::Invalid(format!("affinity value {} outside [0, 1]", v)));
        }
        Ok(Self {
            size,
            values: rows.iter().flatten().copied().collect(),
        })
    }

    /// Affinity of `candidate` for a cell held by `occupant` (0 = gap)
    #[inline]
    pub fn get(&self, candidate: SpeciesId, occupant: SpeciesId) -> f32 {
        let (row, col) = (candidate as usize, occupant as usize);
        assert!(
            row >= 1 && row < self.size && col < self.size,
            "affinity lookup ({}, {}) outside matrix of size {}",
            row,
            col,
            self.size
        );
        self.values[row * self.size + col]
    }

    /// Number of live species covered (N)
    pub fn species_count(&self) -> usize {
        self.size - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_neutral() {
        let catalog = SpeciesCatalog::default();
        assert_eq!(catalog.len(), 20);

        let table = catalog.select(&[11, 1, 5, 16, 17]).unwrap();
        for id in table.ids() {
            let profile = table.profile(id);
            assert_eq!(profile.lifespan, 25);
            assert_eq!(profile.elevation, FactorResponse::new(35.0, 0.0));
            for factor in [profile.water, profile.light, profile.temperature] {
                assert_eq!(factor.effect, 0.0);
            }
        }
        assert_eq!(table.profile(1).name, "Prototype 11");
        assert_eq!(table.profile(2).base_biomass, 0.5);
        assert_eq!(table.profile(3).base_biomass, 1.0);
    }

    #[test]
    fn test_prototype_file_catalog() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/prototypes.yaml");
        let catalog = SpeciesCatalog::from_file(path).unwrap();
        assert_eq!(catalog.len(), 20);
        assert!(catalog.profiles.iter().all(|p| p.lifespan > 0));

        let table = catalog.select(&[11, 1, 5]).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.profile(1).name, "Fir");
        assert_eq!(table.profile(1).lifespan, 85);
        assert_eq!(table.profile(2).water, FactorResponse::new(0.9, 1.0));
        assert_eq!(table.profile(3).name, "Willow");
        assert_eq!(table.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_select_unknown_species() {
        let err = SpeciesCatalog::default().select(&[1, 42]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSpecies { id: 42, .. }));
    }

    #[test]
    #[should_panic(expected = "outside 1..=2")]
    fn test_profile_out_of_range_panics() {
        let table = SpeciesTable::new(vec![
            SpeciesProfile::tolerant("a", 10),
            SpeciesProfile::tolerant("b", 10),
        ])
        .unwrap();
        table.profile(3);
    }

    #[test]
    #[should_panic]
    fn test_profile_gap_panics() {
        let table = SpeciesTable::new(vec![SpeciesProfile::tolerant("a", 10)]).unwrap();
        table.profile(0);
    }

    #[test]
    fn test_zero_lifespan_rejected() {
        assert!(SpeciesTable::new(vec![SpeciesProfile::tolerant("a", 0)]).is_err());
    }

    #[test]
    fn test_uniform_affinity() {
        let m = AffinityMatrix::uniform(2, 0.4, 0.1);
        assert_eq!(m.species_count(), 2);
        assert_eq!(m.get(1, 0), 0.4);
        assert_eq!(m.get(2, 1), 0.1);
    }

    #[test]
    fn test_affinity_from_rows() {
        let rows = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.5, 0.2, 0.1],
            vec![0.3, 0.0, 0.2],
        ];
        let m = AffinityMatrix::from_rows(2, &rows).unwrap();
        assert_eq!(m.get(1, 0), 0.5);
        assert_eq!(m.get(2, 2), 0.2);

        let bad_shape = AffinityMatrix::from_rows(3, &rows).unwrap_err();
        assert!(matches!(bad_shape, ConfigError::AffinityShape { expected: 4, .. }));

        let mut gap_row = rows.clone();
        gap_row[0][1] = 0.1;
        assert!(AffinityMatrix::from_rows(2, &gap_row).is_err());
    }
}
