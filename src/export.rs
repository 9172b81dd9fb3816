//! Data export for analysis in external tools.

use crate::generation::Generation;
use crate::species::SpeciesTable;
use crate::stats::StatsHistory;
use std::fs::File;
use std::io::{BufWriter, Result, Write};
use std::path::Path;

/// Export system for saving run data
pub struct ExportSystem;

impl ExportSystem {
    /// One row per generation and species slot (slot 0 = gaps)
    pub fn write_history_csv<W: Write>(history: &StatsHistory, species: &SpeciesTable, out: &mut W) -> Result<()> {
        writeln!(out, "generation,species_id,species,cells,average_age,total_biomass")?;

        for stats in &history.snapshots {
            for (slot, &cells) in stats.counts_by_species.iter().enumerate() {
                let name = if slot == 0 {
                    "gap"
                } else {
                    species.profile(slot as u16).name.as_str()
                };
                writeln!(
                    out,
                    "{},{},{},{},{:.3},{:.3}",
                    stats.generation,
                    slot,
                    name,
                    cells,
                    stats.average_age_by_species.get(slot).copied().unwrap_or(0.0),
                    stats.total_biomass_by_species.get(slot).copied().unwrap_or(0.0),
                )?;
            }
        }

        Ok(())
    }

    /// One row per cell, z outer and x inner. Species id -1 marks a
    /// permanent gap and 0 an open gap.
    pub fn write_generation_csv<W: Write>(generation: &Generation, out: &mut W) -> Result<()> {
        writeln!(out, "x,z,species_id,age,biomass")?;

        for (pos, cell) in generation.cells() {
            writeln!(
                out,
                "{},{},{},{},{:.3}",
                pos.x,
                pos.z,
                cell.species_id(),
                cell.age,
                cell.biomass
            )?;
        }

        Ok(())
    }

    /// Export per-generation aggregates to CSV
    pub fn export_history_csv<P: AsRef<Path>>(history: &StatsHistory, species: &SpeciesTable, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        Self::write_history_csv(history, species, &mut file)?;
        file.flush()
    }

    /// Export one generation's cells to CSV
    pub fn export_generation_csv<P: AsRef<Path>>(generation: &Generation, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        Self::write_generation_csv(generation, &mut file)?;
        file.flush()
    }

    /// Export the stats history to pretty-printed JSON
    pub fn export_history_json<P: AsRef<Path>>(history: &StatsHistory, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(history)?;
        std::fs::write(path, json)
    }
}
