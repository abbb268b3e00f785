use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use vamphost::{FeatureComputation, FeatureStream, PluginLoader};

/// A feature computation described in TOML:
///
/// ```toml
/// samplerate = 44100
/// blocksize = 2048
/// stepsize = 512
/// input = "signal.f32"
///
/// [[plugin]]
/// plugin = "builtin:spectralrolloff"
/// params = { rolloff = 0.85 }
/// ```
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub samplerate: f32,
    /// Defaults to the first plugin's preferred block size, then 1024.
    pub blocksize: Option<usize>,
    /// Defaults to the first plugin's preferred step size, then `blocksize`.
    pub stepsize: Option<usize>,
    /// Raw little-endian `f32` mono samples.
    pub input: PathBuf,
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Debug, Deserialize)]
pub struct PluginConfig {
    pub plugin: String,
    pub program: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

pub fn load(path: &Path) -> anyhow::Result<SessionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading session {}", path.display()))?;
    Ok(toml::from_str(&content)?)
}

/// Resolve a path relative to the session file's directory.
pub fn resolve_path(path: &Path, session_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    session_dir.join(path)
}

pub fn read_samples(path: &Path) -> anyhow::Result<Vec<f32>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading input {}", path.display()))?;
    anyhow::ensure!(
        bytes.len() % 4 == 0,
        "{}: length {} is not a whole number of f32 samples",
        path.display(),
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Select a program on a bound plugin, warning instead of failing when the
/// plugin does not have it.
fn apply_program(computation: &mut FeatureComputation, key: &str, program: &str) {
    match computation.select_program(key, program) {
        Ok(()) => log::info!("Selected program '{program}' on {key}"),
        Err(e) => {
            let available = computation
                .plugin(key)
                .map(|p| p.programs().join(", "))
                .unwrap_or_default();
            log::warn!("{e} (available: {available})");
        }
    }
}

impl SessionConfig {
    /// Bind every plugin of the session and initialise the computation.
    pub fn build(&self, loader: PluginLoader) -> anyhow::Result<FeatureComputation> {
        anyhow::ensure!(!self.plugins.is_empty(), "session has no [[plugin]] entries");

        let mut computation = FeatureComputation::with_loader(self.samplerate, loader);
        for entry in &self.plugins {
            let key = computation
                .add_plugin(&entry.plugin, &[])
                .with_context(|| format!("adding plugin {}", entry.plugin))?;

            // Programs may overwrite parameters, so they go first.
            if let Some(program) = &entry.program {
                apply_program(&mut computation, key.as_str(), program);
            }
            for (name, &value) in &entry.params {
                let applied = computation.set_parameter(key.as_str(), name, value)?;
                log::info!("Set {key} '{name}' = {applied}");
            }
        }

        let config = computation.default_configuration(self.blocksize, self.stepsize);
        log::info!(
            "Using blocksize {}, stepsize {}",
            config.block_size,
            config.step_size
        );
        computation.initialise(config.block_size, config.step_size)?;
        Ok(computation)
    }

    /// Run the session and write every feature as a CSV row
    /// `key,output,timestamp,values...`.
    pub fn run(
        &self,
        session_dir: &Path,
        loader: PluginLoader,
        out: &mut impl Write,
    ) -> anyhow::Result<()> {
        let mut computation = self.build(loader)?;
        let samples = read_samples(&resolve_path(&self.input, session_dir))?;
        log::info!(
            "Processing {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f64 / f64::from(self.samplerate)
        );

        computation.process_signal(&samples, Duration::ZERO)?;
        computation.finish()?;
        write_csv(out, &computation.outputs())
    }
}

pub fn write_csv(
    out: &mut impl Write,
    outputs: &BTreeMap<&str, &[FeatureStream]>,
) -> anyhow::Result<()> {
    for (key, streams) in outputs {
        for stream in streams.iter() {
            for feature in &stream.features {
                let timestamp = feature.timestamp.unwrap_or_default().as_secs_f64();
                write!(out, "{key},{},{timestamp:.9}", stream.output)?;
                for value in &feature.values {
                    write!(out, ",{value}")?;
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vamphost::plugin::builtin;

    fn loader() -> PluginLoader {
        PluginLoader::new(Vec::new()).with_library(builtin::library())
    }

    fn write_samples(path: &Path, samples: &[f32]) {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        std::fs::write(path, bytes).unwrap();
    }

    const SESSION: &str = r#"
        samplerate = 8
        blocksize = 4
        input = "signal.f32"

        [[plugin]]
        plugin = "rms"

        [[plugin]]
        plugin = "builtin:spectralrolloff"
        params = { rolloff = 1.5 }
    "#;

    #[test]
    fn parse_session() {
        let session: SessionConfig = toml::from_str(SESSION).unwrap();
        assert_eq!(session.samplerate, 8.0);
        assert_eq!(session.blocksize, Some(4));
        assert_eq!(session.stepsize, None);
        assert_eq!(session.plugins.len(), 2);
        assert_eq!(session.plugins[1].params["rolloff"], 1.5);
        assert!(session.plugins[0].program.is_none());
    }

    #[test]
    fn build_applies_parameters() {
        let session: SessionConfig = toml::from_str(SESSION).unwrap();
        let computation = session.build(loader()).unwrap();
        assert_eq!(
            computation
                .get_parameter("builtin:spectralrolloff", "rolloff")
                .unwrap(),
            1.0
        );
        let config = computation.configuration().unwrap();
        assert_eq!((config.block_size, config.step_size), (4, 4));
    }

    #[test]
    fn sizes_default_without_preferences() {
        let session: SessionConfig = toml::from_str(
            r#"
            samplerate = 8
            stepsize = 256
            input = "x"
            [[plugin]]
            plugin = "zerocrossings"
            "#,
        )
        .unwrap();
        assert_eq!(session.blocksize, None);
        let config = session.build(loader()).unwrap().configuration().unwrap();
        assert_eq!((config.block_size, config.step_size), (1024, 256));

        let session: SessionConfig = toml::from_str(
            r#"
            samplerate = 8
            input = "x"
            [[plugin]]
            plugin = "rms"
            "#,
        )
        .unwrap();
        let config = session.build(loader()).unwrap().configuration().unwrap();
        assert_eq!((config.block_size, config.step_size), (1024, 1024));
    }

    #[test]
    fn unknown_parameter_fails() {
        let session: SessionConfig = toml::from_str(
            r#"
            samplerate = 8
            blocksize = 4
            input = "x"
            [[plugin]]
            plugin = "rms"
            params = { nosuch = 1.0 }
            "#,
        )
        .unwrap();
        assert!(session.build(loader()).is_err());
    }

    #[test]
    fn unknown_program_only_warns() {
        let session: SessionConfig = toml::from_str(
            r#"
            samplerate = 8
            blocksize = 4
            input = "x"
            [[plugin]]
            plugin = "rms"
            program = "nosuch"
            "#,
        )
        .unwrap();
        assert!(session.build(loader()).is_ok());
    }

    #[test]
    fn run_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_samples(&dir.path().join("signal.f32"), &[1.0, -1.0, 1.0, -1.0, 0.5, 0.5]);
        let path = dir.path().join("session.toml");
        std::fs::write(&path, SESSION).unwrap();

        let session = load(&path).unwrap();
        let mut out = Vec::new();
        session.run(dir.path(), loader(), &mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();
        let rows: Vec<&str> = csv.lines().collect();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], "builtin:rms,rms,0.000000000,1");
        assert_eq!(rows[1], "builtin:rms,rms,0.500000000,0.35355338");
        assert!(rows[2].starts_with("builtin:spectralrolloff,frequency,0.000000000,"));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.f32");
        std::fs::write(&path, [0u8; 6]).unwrap();
        assert!(read_samples(&path).is_err());
    }

    #[test]
    fn relative_paths() {
        let dir = Path::new("/sessions");
        assert_eq!(
            resolve_path(Path::new("a.f32"), dir),
            PathBuf::from("/sessions/a.f32")
        );
        assert_eq!(
            resolve_path(Path::new("/data/a.f32"), dir),
            PathBuf::from("/data/a.f32")
        );
    }
}
