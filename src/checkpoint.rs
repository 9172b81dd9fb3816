//! Checkpoint system for saving and resuming runs.
//!
//! A checkpoint stores the engine, every generation so far and the exact
//! random stream position, so a resumed run produces the same generations
//! the uninterrupted run would have.

use crate::config::SimulationConfig;
use crate::generation::Generation;
use crate::succession::SuccessionEngine;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"VPCS";

/// Complete run state for checkpointing
#[derive(Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Version for compatibility checking
    pub version: u32,
    /// Configuration the run was started from
    pub config: SimulationConfig,
    /// Engine, including the landscape
    pub engine: SuccessionEngine,
    /// Generations 0..=latest
    pub history: Vec<Generation>,
    /// Random stream at the latest generation
    pub rng: ChaCha8Rng,
    /// Random seed (for reproducibility)
    pub random_seed: u64,
}

impl Checkpoint {
    /// Current checkpoint version
    pub const VERSION: u32 = 1;

    pub fn new(
        config: SimulationConfig,
        engine: SuccessionEngine,
        history: Vec<Generation>,
        rng: ChaCha8Rng,
        random_seed: u64,
    ) -> Self {
        Self {
            version: Self::VERSION,
            config,
            engine,
            history,
            rng,
            random_seed,
        }
    }

    /// Index of the latest stored generation
    pub fn generation(&self) -> u64 {
        self.history.last().map_or(0, |g| g.index())
    }

    /// Save checkpoint to binary file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        let encoded = bincode::serialize(self)?;
        writer.write_all(&encoded)?;
        writer.flush()?;

        Ok(())
    }

    /// Load checkpoint from binary file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CheckpointError::InvalidFormat("Invalid magic bytes".to_string()));
        }

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        let checkpoint: Checkpoint = bincode::deserialize(&buffer)?;

        if checkpoint.version != Self::VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: Self::VERSION,
                found: checkpoint.version,
            });
        }

        Ok(checkpoint)
    }

    /// Get approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }
}

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Writes checkpoints every `interval` generations, keeping the newest
/// `max_checkpoints`
pub struct CheckpointManager {
    pub base_dir: PathBuf,
    pub interval: u64,
    pub max_checkpoints: usize,
    last_checkpoint: u64,
}

impl CheckpointManager {
    pub fn new<P: Into<PathBuf>>(base_dir: P, interval: u64, max_checkpoints: usize) -> Result<Self, CheckpointError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            interval,
            max_checkpoints,
            last_checkpoint: 0,
        })
    }

    /// Whether generation `generation` is due for a checkpoint
    pub fn should_save(&self, generation: u64) -> bool {
        self.interval > 0
            && generation > 0
            && generation % self.interval == 0
            && generation != self.last_checkpoint
    }

    pub fn checkpoint_path(&self, generation: u64) -> PathBuf {
        self.base_dir.join(format!("checkpoint_{:08}.bin", generation))
    }

    /// Save checkpoint and drop the oldest beyond the limit
    pub fn save(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        let generation = checkpoint.generation();
        let path = self.checkpoint_path(generation);
        checkpoint.save(&path)?;
        self.last_checkpoint = generation;
        log::info!("Checkpoint saved: {}", path.display());

        self.cleanup()?;

        Ok(path)
    }

    /// Rotated checkpoints with the generation parsed from their names
    fn checkpoint_files(&self) -> Result<Vec<(u64, PathBuf)>, CheckpointError> {
        Ok(std::fs::read_dir(&self.base_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let generation = rotated_generation(&entry.file_name().to_string_lossy())?;
                Some((generation, entry.path()))
            })
            .collect())
    }

    fn cleanup(&self) -> Result<(), CheckpointError> {
        let mut checkpoints = self.checkpoint_files()?;

        if checkpoints.len() > self.max_checkpoints {
            checkpoints.sort_by_key(|(generation, _)| *generation);

            let to_remove = checkpoints.len() - self.max_checkpoints;
            for (_, path) in checkpoints.into_iter().take(to_remove) {
                std::fs::remove_file(path)?;
            }
        }

        Ok(())
    }

    /// Find the rotated checkpoint with the highest generation
    pub fn find_latest(&self) -> Option<PathBuf> {
        self.checkpoint_files()
            .ok()?
            .into_iter()
            .max_by_key(|(generation, _)| *generation)
            .map(|(_, path)| path)
    }
}

/// Generation encoded in a `checkpoint_<digits>.bin` name
fn rotated_generation(file_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix("checkpoint_")?.strip_suffix(".bin")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
