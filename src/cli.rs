use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vamphost", about = "Host for Vamp audio feature-extraction plugins")]
pub struct Cli {
    /// Configuration file (.toml) with extra plugin paths
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the directories searched for plugin libraries
    Paths,
    /// List plugin libraries or plugins
    #[command(subcommand)]
    Enumerate(EnumerateTarget),
    /// Describe a plugin (parameters, programs, outputs)
    Describe {
        /// Plugin key (library:identifier) or bare identifier
        plugin: String,

        /// Sample rate to instantiate the plugin at
        #[arg(long, default_value = "44100")]
        samplerate: f32,
    },
    /// Run the plugins of a session over its input and print features as CSV
    Run {
        /// Path to session file (.toml)
        session: PathBuf,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum EnumerateTarget {
    /// List loadable plugin libraries
    Libraries,
    /// List plugin keys
    Plugins,
}
