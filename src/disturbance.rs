//! Per-generation disturbance: which cells are cleared to gaps this step.

use crate::grid::PermanentDisturbanceMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cells disturbed in one generation, row-major over (z, x)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisturbanceMask {
    x_cells: usize,
    cells: Vec<bool>,
}

impl DisturbanceMask {
    #[inline]
    pub fn get(&self, x: usize, z: usize) -> bool {
        self.cells[z * self.x_cells + x]
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&d| d).count()
    }
}

/// Permanent map plus an independent random draw at a fixed rate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceModel {
    rate: f32,
}

impl DisturbanceModel {
    pub fn new(ongoing_disturbance_rate: f32) -> Self {
        Self {
            rate: ongoing_disturbance_rate.clamp(0.0, 1.0),
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Decide one cell. Permanently disturbed cells consume no draw.
    #[inline]
    pub fn is_disturbed<R: Rng + ?Sized>(&self, permanent: bool, rng: &mut R) -> bool {
        permanent || rng.gen::<f32>() < self.rate
    }

    /// Whole-grid mask, drawn z outer and x inner so stream consumption is
    /// reproducible for a given seed
    pub fn mask<R: Rng + ?Sized>(&self, permanent: &PermanentDisturbanceMap, rng: &mut R) -> DisturbanceMask {
        let (x_cells, z_cells) = permanent.dimensions();
        let mut cells = Vec::with_capacity(x_cells * z_cells);
        for z in 0..z_cells {
            for x in 0..x_cells {
                cells.push(self.is_disturbed(permanent.is_disturbed(x, z), rng));
            }
        }
        DisturbanceMask { x_cells, cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_zero_rate_only_permanent() {
        let mut permanent = PermanentDisturbanceMap::empty(5, 5);
        permanent.mark(2, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mask = DisturbanceModel::new(0.0).mask(&permanent, &mut rng);
        assert_eq!(mask.count(), 1);
        assert!(mask.get(2, 3));
    }

    #[test]
    fn test_full_rate_disturbs_everything() {
        let permanent = PermanentDisturbanceMap::empty(6, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mask = DisturbanceModel::new(1.0).mask(&permanent, &mut rng);
        assert_eq!(mask.count(), 24);
    }

    #[test]
    fn test_rate_is_roughly_respected() {
        let permanent = PermanentDisturbanceMap::empty(100, 100);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let count = DisturbanceModel::new(0.1).mask(&permanent, &mut rng).count();
        assert!((800..1200).contains(&count), "disturbed {} of 10000", count);
    }

    #[test]
    fn test_permanent_cells_skip_draw() {
        let mut permanent = PermanentDisturbanceMap::empty(2, 1);
        permanent.mark(0, 0);

        let mut a = ChaCha8Rng::seed_from_u64(9);
        let mut b = ChaCha8Rng::seed_from_u64(9);
        DisturbanceModel::new(0.5).mask(&permanent, &mut a);
        let _: f32 = b.gen();
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn test_same_seed_same_mask() {
        let permanent = PermanentDisturbanceMap::empty(20, 20);
        let model = DisturbanceModel::new(0.3);
        let m1 = model.mask(&permanent, &mut ChaCha8Rng::seed_from_u64(5));
        let m2 = model.mask(&permanent, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(m1, m2);
    }
}
