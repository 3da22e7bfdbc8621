//! Command-line front end for `storm-archive`.
//!
//! The binary is a thin wrapper: it parses [`CliConfig`], installs logging
//! and calls [`run`] with stdout. Keeping the commands in a library lets them
//! be driven with any writer.
//!
//! # Example
//!
//! ```no_run
//! use storm_cli::{CliConfig, run};
//!
//! let config = CliConfig::from_args();
//! run(&config, &mut std::io::stdout().lock())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod commands;
pub mod config;

pub use commands::{ArchiveSummary, run};
pub use config::{CliConfig, Command};
