// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fm430")]
#[command(author, version, about = "Newland FM430 barcode scanner driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/fm430/driver.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable transport monitoring (prints all frames and reports)
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump alongside decoded output
    #[arg(long, global = true)]
    pub hex: bool,

    /// Monitor filter (all, out, in)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected scanners
    #[command(visible_alias = "ls")]
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show all known settings and their accepted values
    #[command(visible_alias = "opts")]
    Options,

    /// Start (or stop) scanning
    #[command(visible_alias = "t")]
    Trigger {
        /// Stop instead of start
        #[arg(long)]
        stop: bool,
        /// Use the three-byte trigger frame instead of the SCNTRG command
        #[arg(long)]
        minimal: bool,
    },

    /// Print scanned barcodes until interrupted
    #[command(visible_alias = "scan")]
    Listen {
        /// Exit after the first barcode
        #[arg(long, conflicts_with = "count")]
        once: bool,
        /// Exit after this many barcodes
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Read a setting
    Get {
        /// Setting name (e.g. scan-mode) or 6-character code (e.g. SCNMOD)
        option: String,
    },

    /// Write a setting
    Set {
        /// Setting name (e.g. scan-mode) or 6-character code (e.g. SCNMOD)
        option: String,
        /// New value; omitted for actions such as factory-defaults
        value: Option<String>,
        /// Save to flash instead of volatile memory
        #[arg(short, long)]
        permanent: bool,
    },

    /// Send a raw tag/subtag command
    Raw {
        /// 6-character tag+subtag code (e.g. SCNMOD)
        code: String,
        /// ASCII payload appended after the subtag
        payload: Option<String>,
        /// Save to flash instead of volatile memory
        #[arg(short, long)]
        permanent: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}
