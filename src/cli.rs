// src/cli.rs
//! CLI definitions for gamestage
//!
//! Command implementations live in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gamestage")]
#[command(author, version)]
#[command(about = "Install emulated games: provision, download, unpack and create launchers", long_about = None)]
pub struct Cli {
    /// Settings file (default: $GAMESTAGE_CONFIG, then the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install content from a magnet link, .torrent file or URL
    Install {
        /// Content id, also the install directory name
        id: String,

        /// Magnet link, .torrent path or http(s) URL
        source: String,

        /// Target platform id (aliases such as PSX are accepted)
        #[arg(short, long)]
        platform: String,

        /// Emulator id (default: the platform's launch profile)
        #[arg(short, long)]
        emulator: Option<String>,

        /// Display title (default: the content id)
        #[arg(short, long)]
        title: Option<String>,

        /// Content-type tag selecting a launch template override
        #[arg(long)]
        content_type: Option<String>,

        /// Log progress instead of drawing progress bars
        #[arg(long)]
        no_progress: bool,

        /// Log the configuration that would be applied without writing it
        #[arg(long)]
        dry_run_config: bool,
    },

    /// Remove installed content, its launcher and its ledger entry
    Uninstall {
        id: String,
    },

    /// List installed content
    List {
        /// Print the ledger entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run an installed entry's launcher
    Launch {
        id: String,
    },

    /// Show the known platforms
    Platforms,

    /// Show how files would be treated by the archive resolver
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}
