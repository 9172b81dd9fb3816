//! Per-cell elevation for the simulation grid.
//!
//! Relief is fractal Brownian motion over 2D simplex noise (the skewed
//! triangular lattice with hashed corner gradients), seeded from the run
//! seed so a given run always produces the same landscape.

use crate::grid::PermanentDisturbanceMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const SQRT_3: f64 = 1.732_050_807_568_877_2;
/// Input skew onto the triangular lattice
const SKEW: f64 = (SQRT_3 - 1.0) / 2.0;
/// Lattice back to input space
const UNSKEW: f64 = (3.0 - SQRT_3) / 6.0;
/// Brings the summed corner contributions back to about [-1, 1]
const OUTPUT_SCALE: f64 = 70.0;

/// Corner gradients: the four diagonals and the four axis directions
const GRADIENTS: [(f64, f64); 8] = [
    (1.0, 1.0),
    (-1.0, 1.0),
    (1.0, -1.0),
    (-1.0, -1.0),
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
];

/// Seeded 2D simplex noise
pub struct ReliefNoise {
    /// Shuffled 0..=255, stored twice so lookups never wrap
    hash: Vec<u8>,
}

impl ReliefNoise {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table: Vec<u8> = (0..=255).collect();
        table.shuffle(&mut rng);
        table.extend_from_within(..);
        Self { hash: table }
    }

    fn gradient(&self, i: i64, j: i64) -> (f64, f64) {
        let i = (i & 255) as usize;
        let j = (j & 255) as usize;
        let h = self.hash[i + self.hash[j] as usize];
        GRADIENTS[h as usize % GRADIENTS.len()]
    }

    /// Noise at (x, y), in [-1, 1]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * SKEW;
        let (i, j) = ((x + skew).floor() as i64, (y + skew).floor() as i64);
        let unskew = (i + j) as f64 * UNSKEW;
        let (dx, dy) = (x - (i as f64 - unskew), y - (j as f64 - unskew));

        // Lower or upper triangle of the lattice cell
        let (si, sj) = if dx > dy { (1, 0) } else { (0, 1) };
        let corners = [
            (0, 0, dx, dy),
            (si, sj, dx - si as f64 + UNSKEW, dy - sj as f64 + UNSKEW),
            (1, 1, dx - 1.0 + 2.0 * UNSKEW, dy - 1.0 + 2.0 * UNSKEW),
        ];

        let sum: f64 = corners
            .iter()
            .map(|&(ci, cj, cx, cy)| {
                let falloff = 0.5 - cx * cx - cy * cy;
                if falloff <= 0.0 {
                    return 0.0;
                }
                let (gx, gy) = self.gradient(i + ci, j + cj);
                falloff.powi(4) * (gx * cx + gy * cy)
            })
            .sum();

        (OUTPUT_SCALE * sum).clamp(-1.0, 1.0)
    }

    /// Sum of `octaves` layers, normalised back to [-1, 1]
    pub fn fbm(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let (value, norm, _, _) = (0..octaves).fold(
            (0.0, 0.0, 1.0, 1.0),
            |(value, norm, amplitude, frequency), _| {
                (
                    value + amplitude * self.sample(x * frequency, y * frequency),
                    norm + amplitude,
                    amplitude * persistence,
                    frequency * lacunarity,
                )
            },
        );
        if norm > 0.0 {
            value / norm
        } else {
            0.0
        }
    }
}

// ============================================================================
// ELEVATION MAP
// ============================================================================

/// Elevation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElevationConfig {
    /// Mean elevation
    pub base: f32,
    /// Maximum deviation from `base`; 0 gives a flat landscape
    pub relief: f32,
    /// Noise frequency per cell (smaller = broader hills)
    pub scale: f64,
    pub octaves: u32,
    pub persistence: f64,
    pub lacunarity: f64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            base: 35.0,
            relief: 30.0,
            scale: 0.02,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Elevation of every cell, row-major over (z, x)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationMap {
    x_cells: usize,
    z_cells: usize,
    heights: Vec<f32>,
}

impl ElevationMap {
    /// Same elevation everywhere
    pub fn flat(x_cells: usize, z_cells: usize, height: f32) -> Self {
        Self {
            x_cells,
            z_cells,
            heights: vec![height; x_cells * z_cells],
        }
    }

    /// Noise-generated relief around `config.base`
    pub fn generate(x_cells: usize, z_cells: usize, config: &ElevationConfig, seed: u64) -> Self {
        if config.relief == 0.0 {
            return Self::flat(x_cells, z_cells, config.base);
        }

        let noise = ReliefNoise::new(seed);
        let mut heights = Vec::with_capacity(x_cells * z_cells);
        for z in 0..z_cells {
            for x in 0..x_cells {
                let n = noise.fbm(
                    x as f64 * config.scale,
                    z as f64 * config.scale,
                    config.octaves,
                    config.persistence,
                    config.lacunarity,
                );
                heights.push(config.base + config.relief * n as f32);
            }
        }

        Self {
            x_cells,
            z_cells,
            heights,
        }
    }

    /// Elevation at (x, z). Out-of-range positions are a caller bug.
    #[inline]
    pub fn get(&self, x: usize, z: usize) -> f32 {
        debug_assert!(x < self.x_cells && z < self.z_cells);
        self.heights[z * self.x_cells + x]
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.x_cells, self.z_cells)
    }

    /// (min, max) elevation
    pub fn range(&self) -> (f32, f32) {
        self.heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }
}

// ============================================================================
// LANDSCAPE
// ============================================================================

/// Static physical properties of the grid for a whole run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landscape {
    pub elevation: ElevationMap,
    pub permanent: PermanentDisturbanceMap,
}

impl Landscape {
    /// # Panics
    ///
    /// Panics if the two maps have different dimensions.
    pub fn new(elevation: ElevationMap, permanent: PermanentDisturbanceMap) -> Self {
        assert_eq!(
            elevation.dimensions(),
            permanent.dimensions(),
            "elevation and permanent disturbance maps differ in size"
        );
        Self { elevation, permanent }
    }

    /// Flat ground without permanent gaps
    pub fn flat(x_cells: usize, z_cells: usize, height: f32) -> Self {
        Self::new(
            ElevationMap::flat(x_cells, z_cells, height),
            PermanentDisturbanceMap::empty(x_cells, z_cells),
        )
    }

    /// (x_cells, z_cells)
    pub fn dimensions(&self) -> (usize, usize) {
        self.elevation.dimensions()
    }
}
