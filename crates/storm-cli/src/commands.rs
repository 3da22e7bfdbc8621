//! Subcommand implementations.
//!
//! Every command writes its primary output to the supplied writer so the
//! binary can hand in stdout and tests can capture it.

use crate::config::{CliConfig, Command};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use storm_archive::{Archive, ArchiveConfig};
use tracing::info;

/// Header and table summary printed by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Absolute offset of the archive header
    pub archive_offset: u64,
    /// Format version (1-4)
    pub format_version: u16,
    /// Sector size in bytes
    pub sector_size: usize,
    /// Declared archive size
    pub archive_size: u64,
    /// Hash table slots
    pub hash_table_entries: u32,
    /// Block table entries
    pub block_table_entries: u32,
    /// Blocks describing stored files
    pub files: usize,
}

impl ArchiveSummary {
    /// Collect the summary of an open archive.
    pub fn from_archive(archive: &Archive) -> Result<Self> {
        let header = archive.header()?;
        Ok(Self {
            archive_offset: archive.archive_offset()?,
            format_version: header.format_version.as_raw() + 1,
            sector_size: header.sector_size(),
            archive_size: header.effective_archive_size(),
            hash_table_entries: header.hash_table_entries,
            block_table_entries: header.block_table_entries,
            files: archive.block_table()?.existing().count(),
        })
    }
}

/// Run the configured subcommand.
pub fn run<W: Write>(config: &CliConfig, out: &mut W) -> Result<()> {
    let archive_config = config.archive_config();
    match &config.command {
        Command::Info { archive, json } => info_command(archive, archive_config, *json, out),
        Command::List { archive, json } => list_command(archive, archive_config, *json, out),
        Command::Read {
            archive,
            name,
            output,
        } => {
            let archive = open(archive, archive_config)?;
            match output {
                Some(path) => extract(&archive, name, path),
                None => {
                    let data = archive
                        .read(name)
                        .with_context(|| format!("Failed to read '{name}'"))?;
                    out.write_all(&data)?;
                    Ok(())
                }
            }
        }
        Command::Extract {
            archive,
            name,
            dest,
        } => {
            let archive = open(archive, archive_config)?;
            extract(&archive, name, dest)
        }
    }
}

fn open(path: &Path, config: ArchiveConfig) -> Result<Archive> {
    Archive::open_with_config(path, config)
        .with_context(|| format!("Failed to open archive {}", path.display()))
}

fn extract(archive: &Archive, name: &str, dest: &Path) -> Result<()> {
    let written = archive
        .extract_to(name, dest)
        .with_context(|| format!("Failed to extract '{name}' to {}", dest.display()))?;
    info!("Wrote {written} bytes to {}", dest.display());
    Ok(())
}

fn info_command<W: Write>(
    path: &Path,
    config: ArchiveConfig,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let archive = open(path, config)?;
    let summary = ArchiveSummary::from_archive(&archive)?;

    if json {
        serde_json::to_writer_pretty(&mut *out, &summary)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Archive:        {}", path.display())?;
    writeln!(out, "Header offset:  {}", summary.archive_offset)?;
    writeln!(out, "Format version: {}", summary.format_version)?;
    writeln!(out, "Archive size:   {}", summary.archive_size)?;
    writeln!(out, "Sector size:    {}", summary.sector_size)?;
    writeln!(out, "Hash entries:   {}", summary.hash_table_entries)?;
    writeln!(out, "Block entries:  {}", summary.block_table_entries)?;
    writeln!(out, "Files:          {}", summary.files)?;
    Ok(())
}

fn list_command<W: Write>(
    path: &Path,
    config: ArchiveConfig,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let archive = open(path, config)?;
    let files = archive
        .list()
        .with_context(|| format!("Failed to list {}", path.display()))?;

    if json {
        serde_json::to_writer_pretty(&mut *out, &files)?;
        writeln!(out)?;
    } else {
        for file in &files {
            writeln!(out, "{:>12}  {}", file.size, file.name)?;
        }
    }
    Ok(())
}
