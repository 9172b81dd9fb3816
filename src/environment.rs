//! Environmental suitability: maps factor mismatches and age to health.
//!
//! Health is a score in [0, 1] used both as a survival probability and as
//! a colonisation-desirability multiplier.

use crate::config::ConfigError;
use crate::species::{FactorResponse, SpeciesId, SpeciesTable};
use serde::{Deserialize, Serialize};

/// Level codes 0-4 to water/light/temperature levels
pub const LEVEL_TABLE: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Level codes 0-4 to per-cell, per-generation disturbance probability
pub const DISTURBANCE_TABLE: [f32; 5] = [0.0, 0.01, 0.02, 0.05, 0.1];

/// Health from the distance between an actual value and the optimum.
///
/// `1 - |actual - optimum| * shape`, clamped to [0, 1]. A non-positive
/// shape disables the factor.
#[inline]
pub fn health(actual: f32, optimum: f32, shape: f32) -> f32 {
    if shape <= 0.0 || actual == optimum {
        return 1.0;
    }
    let h = 1.0 - (actual - optimum).abs() * shape;
    if h.is_nan() {
        0.0
    } else {
        h.clamp(0.0, 1.0)
    }
}

/// Age falloff: `1 - (age / max_age)^exponent`, reaching 0 at `max_age`
#[inline]
pub fn age_health(age: u32, max_age: u32, exponent: f32) -> f32 {
    if age == 0 {
        return 1.0;
    }
    if age >= max_age {
        return 0.0;
    }
    let fraction = age as f32 / max_age as f32;
    (1.0 - fraction.powf(exponent)).clamp(0.0, 1.0)
}

/// Elevation falloff; `scale` elevation units count as one unit of mismatch
#[inline]
pub fn elevation_health(actual: f32, optimum: f32, shape: f32, scale: f32) -> f32 {
    health(actual / scale, optimum / scale, shape)
}

/// Environment section of the configuration, as level codes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub water: u8,
    pub light: u8,
    pub temperature: u8,
    /// Ongoing disturbance level
    pub disturbance: u8,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            water: 2,
            light: 2,
            temperature: 2,
            disturbance: 1,
        }
    }
}

fn decode(table: &[f32; 5], key: &'static str, code: u8) -> Result<f32, ConfigError> {
    table
        .get(code as usize)
        .copied()
        .ok_or(ConfigError::UnknownLevel {
            key,
            code,
            max: table.len() - 1,
        })
}

impl EnvironmentConfig {
    /// Decode the level codes
    pub fn parameters(&self) -> Result<EnvironmentParameters, ConfigError> {
        Ok(EnvironmentParameters {
            water: decode(&LEVEL_TABLE, "water", self.water)?,
            light: decode(&LEVEL_TABLE, "light", self.light)?,
            temperature: decode(&LEVEL_TABLE, "temperature", self.temperature)?,
            ongoing_disturbance_rate: decode(&DISTURBANCE_TABLE, "disturbance", self.disturbance)?,
        })
    }
}

/// Grid-wide environmental levels for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentParameters {
    pub water: f32,
    pub light: f32,
    pub temperature: f32,
    /// Probability that a cell is disturbed in a given generation
    pub ongoing_disturbance_rate: f32,
}

impl Default for EnvironmentParameters {
    fn default() -> Self {
        Self {
            water: 0.5,
            light: 0.5,
            temperature: 0.5,
            ongoing_disturbance_rate: 0.0,
        }
    }
}

/// Health section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Exponent k of the age falloff (k >= 1)
    pub age_exponent: f32,
    /// Elevation units per unit of mismatch
    pub elevation_scale: f32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            age_exponent: 3.0,
            elevation_scale: 100.0,
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.age_exponent >= 1.0) {
            return Err(ConfigError::Invalid("age_exponent must be >= 1".to_string()));
        }
        if !(self.elevation_scale > 0.0) {
            return Err(ConfigError::Invalid("elevation_scale must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpeciesHealth {
    lifespan: u32,
    elevation: FactorResponse,
    /// Product of the water, light and temperature terms
    fixed: f32,
}

/// Per-run health evaluator with the cell-independent terms cached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthModel {
    config: HealthConfig,
    species: Vec<SpeciesHealth>,
}

impl HealthModel {
    pub fn new(table: &SpeciesTable, environment: &EnvironmentParameters, config: HealthConfig) -> Self {
        let species = table
            .ids()
            .map(|id| {
                let profile = table.profile(id);
                let fixed = health(environment.water, profile.water.optimum, profile.water.effect)
                    * health(environment.light, profile.light.optimum, profile.light.effect)
                    * health(
                        environment.temperature,
                        profile.temperature.optimum,
                        profile.temperature.effect,
                    );
                SpeciesHealth {
                    lifespan: profile.lifespan,
                    elevation: profile.elevation,
                    fixed,
                }
            })
            .collect();

        Self { config, species }
    }

    #[inline]
    fn entry(&self, species: SpeciesId) -> &SpeciesHealth {
        assert!(
            species >= 1 && (species as usize) <= self.species.len(),
            "species id {} outside 1..={}",
            species,
            self.species.len()
        );
        &self.species[species as usize - 1]
    }

    /// Water x light x temperature health, fixed for the run
    #[inline]
    pub fn fixed_health(&self, species: SpeciesId) -> f32 {
        self.entry(species).fixed
    }

    #[inline]
    pub fn age_health(&self, species: SpeciesId, age: u32) -> f32 {
        age_health(age, self.entry(species).lifespan, self.config.age_exponent)
    }

    #[inline]
    pub fn elevation_health(&self, species: SpeciesId, elevation: f32) -> f32 {
        let response = self.entry(species).elevation;
        elevation_health(
            elevation,
            response.optimum,
            response.effect,
            self.config.elevation_scale,
        )
    }

    /// Combined survival/vigour score of `species` at `age` on a cell at `elevation`
    #[inline]
    pub fn overall_health(&self, species: SpeciesId, age: u32, elevation: f32) -> f32 {
        self.age_health(species, age) * self.elevation_health(species, elevation) * self.fixed_health(species)
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }
}
