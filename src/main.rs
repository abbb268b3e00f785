mod cli;
mod config;
mod enumerate;
mod session;

use std::io::Write;
use std::path::Path;

use clap::Parser;
use cli::{Cli, Command, EnumerateTarget};
use config::Config;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let loader = config.loader();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Paths => enumerate::paths(&mut out, loader.paths())?,
        Command::Enumerate(EnumerateTarget::Libraries) => enumerate::libraries(&mut out, &loader)?,
        Command::Enumerate(EnumerateTarget::Plugins) => enumerate::plugins(&mut out, &loader)?,
        Command::Describe { plugin, samplerate } => {
            let metadata = loader.plugin_metadata(&plugin, samplerate)?;
            enumerate::describe(&mut out, &metadata)?;
        }
        Command::Run { session: path } => {
            let session = session::load(&path)?;
            let session_dir = path.parent().unwrap_or_else(|| Path::new("."));
            session.run(session_dir, loader, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}
