//! Command-line configuration.
//!
//! Global options can also be set through the environment:
//! - `STORM_LOCALE`: locale id used for lookups
//! - `STORM_MAX_SCAN_OFFSET`: header scan window in bytes
//! - `STORM_NO_MMAP`: read archives into memory instead of mapping them

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storm_archive::ArchiveConfig;
use storm_archive::config::DEFAULT_MAX_SCAN_OFFSET;

/// Inspect and extract MPQ archives.
#[derive(Debug, Clone, Parser)]
#[command(name = "storm", about = "Read-only MPQ archive tool", version)]
pub struct CliConfig {
    /// Locale id for lookups (0 = neutral, 1031 = deDE, ...)
    #[arg(long, global = true, env = "STORM_LOCALE", default_value_t = 0)]
    pub locale: u16,

    /// Stop searching for the archive header after this many bytes
    #[arg(
        long,
        global = true,
        env = "STORM_MAX_SCAN_OFFSET",
        default_value_t = DEFAULT_MAX_SCAN_OFFSET
    )]
    pub max_scan_offset: u64,

    /// Read the archive into memory instead of memory-mapping it
    #[arg(long, global = true, env = "STORM_NO_MMAP")]
    pub no_mmap: bool,

    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show the archive header and table sizes
    Info {
        /// Archive path
        archive: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List every stored file, named through the (listfile)
    List {
        /// Archive path
        archive: PathBuf,

        /// Print a JSON array of {name, size, basename}
        #[arg(long)]
        json: bool,
    },

    /// Write one file's content to stdout or a file
    Read {
        /// Archive path
        archive: PathBuf,

        /// Name inside the archive
        name: String,

        /// Output file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract one file to a destination path
    Extract {
        /// Archive path
        archive: PathBuf,

        /// Name inside the archive
        name: String,

        /// Destination path
        dest: PathBuf,
    },
}

impl CliConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Archive options derived from the global flags.
    #[must_use]
    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig::new()
            .with_locale(self.locale)
            .with_max_scan_offset(self.max_scan_offset)
            .with_mmap(!self.no_mmap)
    }
}
