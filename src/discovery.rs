//! Locating plugin libraries on disk and resolving plugin identifications.

use std::collections::BTreeSet;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::computation::{FeatureComputation, FeatureStream};
use crate::error::{Error, Result};
use crate::plugin::library::supported_descriptors;
use crate::plugin::{Plugin, PluginKey, PluginLibrary, PluginMetadata, VampPlugin, builtin, ffi};

/// Search paths from `VAMP_PATH` followed by the platform defaults.
pub fn get_vamp_paths() -> Vec<PathBuf> {
    vamp_paths(
        env::var_os("VAMP_PATH"),
        env::var_os("HOME").map(PathBuf::from),
    )
}

/// [`get_vamp_paths`] with the environment passed in.
pub fn vamp_paths(custom: Option<OsString>, home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = custom
        .map(|value| {
            env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default();

    #[cfg(target_os = "linux")]
    {
        if let Some(home) = &home {
            paths.push(home.join("vamp"));
            paths.push(home.join(".vamp"));
        }
        paths.push(PathBuf::from("/usr/lib/vamp"));
        paths.push(PathBuf::from("/usr/lib/x86_64-linux-gnu/vamp"));
        paths.push(PathBuf::from("/usr/local/lib/vamp"));
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = &home {
            paths.push(home.join("Library/Audio/Plug-Ins/Vamp"));
        }
        paths.push(PathBuf::from("/Library/Audio/Plug-Ins/Vamp"));
    }

    #[cfg(target_os = "windows")]
    {
        let _ = &home;
        paths.push(PathBuf::from(r"C:\Program Files\Vamp Plugins"));
    }

    paths
}

/// File extension of loadable libraries on this platform.
pub fn plugin_extension() -> &'static str {
    env::consts::DLL_EXTENSION
}

fn has_plugin_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(plugin_extension()))
}

/// Whether `path` is a loadable library exporting the Vamp entry point with
/// at least one plugin of a supported API version, or none at all.
pub fn is_vamp_library(path: &Path) -> bool {
    if !path.is_file() || !has_plugin_extension(path) {
        return false;
    }
    let library = match unsafe { libloading::Library::new(path) } {
        Ok(library) => library,
        Err(e) => {
            log::debug!("Skipping {}: {e}", path.display());
            return false;
        }
    };
    let entry: ffi::VampGetPluginDescriptorFunction =
        match unsafe { library.get::<ffi::VampGetPluginDescriptorFunction>(ffi::ENTRY_POINT) } {
            Ok(symbol) => *symbol,
            Err(_) => {
                log::debug!("Skipping {}: no Vamp entry point", path.display());
                return false;
            }
        };
    let name = path.display().to_string();
    // SAFETY: `library` stays loaded until the descriptors have been read.
    match unsafe { supported_descriptors(&name, entry) } {
        Ok(_) => true,
        Err(reason) => {
            log::debug!("Skipping {name}: {reason}");
            false
        }
    }
}

fn libraries_in(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_vamp_library(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot scan {}: {e}", path.display());
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| is_vamp_library(p))
        .collect()
}

/// Sorted, deduplicated Vamp libraries found in `paths`. Each path may be a
/// directory (scanned non-recursively) or a library file.
pub fn list_libraries(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .flat_map(|p| libraries_in(p))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted, deduplicated keys of every plugin found in `paths`.
pub fn list_plugins(paths: &[PathBuf]) -> Vec<PluginKey> {
    list_libraries(paths)
        .iter()
        .filter_map(|path| match PluginLibrary::load(path) {
            Ok(library) => Some(library.plugin_keys()),
            Err(e) => {
                log::debug!("{e}");
                None
            }
        })
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn load_library(path: &Path) -> Result<PluginLibrary> {
    PluginLibrary::load(path)
}

/// Instantiate the plugin `key` from the library in `paths` whose file stem
/// matches the key's library name.
pub fn load_plugin(key: &PluginKey, input_sample_rate: f32, paths: &[PathBuf]) -> Result<VampPlugin> {
    let path = find_library_file(key.library(), paths)
        .ok_or_else(|| Error::NotFound(key.to_string()))?;
    PluginLibrary::load(&path)?.load_plugin(key.as_str(), input_sample_rate)
}

/// Keep the first of several files with the same stem, skipping stems
/// already in `taken`.
fn unique_by_stem(paths: Vec<PathBuf>, mut taken: BTreeSet<String>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|path| {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                return false;
            };
            let fresh = taken.insert(stem.to_string());
            if !fresh {
                log::debug!("{} is shadowed by another library called {stem}", path.display());
            }
            fresh
        })
        .collect()
}

fn find_library_file(name: &str, paths: &[PathBuf]) -> Option<PathBuf> {
    list_libraries(paths)
        .into_iter()
        .find(|p| p.file_stem().is_some_and(|stem| stem == name))
}

/// Resolves plugin identifications against explicit search paths and a set
/// of in-process libraries.
///
/// In-process libraries shadow files with the same library name.
#[derive(Debug, Clone)]
pub struct PluginLoader {
    paths: Vec<PathBuf>,
    libraries: Vec<PluginLibrary>,
}

impl Default for PluginLoader {
    /// The environment's search paths plus the builtin plugins.
    fn default() -> Self {
        Self::new(get_vamp_paths()).with_library(builtin::library())
    }
}

impl PluginLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            libraries: Vec::new(),
        }
    }

    pub fn with_library(mut self, library: PluginLibrary) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// In-process libraries followed by every library file that loads, one
    /// per library name.
    pub fn libraries(&self) -> Vec<PluginLibrary> {
        let mut libraries = self.libraries.clone();
        let taken = self.libraries.iter().map(|l| l.name().to_string()).collect();
        for path in unique_by_stem(list_libraries(&self.paths), taken) {
            match PluginLibrary::load(&path) {
                Ok(library) => libraries.push(library),
                Err(e) => log::debug!("{e}"),
            }
        }
        libraries
    }

    /// Sorted keys of every plugin this loader can resolve.
    pub fn list_plugins(&self) -> Vec<PluginKey> {
        self.libraries()
            .iter()
            .flat_map(PluginLibrary::plugin_keys)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The library called `name`, in-process first, then by file stem.
    pub fn find_library(&self, name: &str) -> Result<PluginLibrary> {
        if let Some(library) = self.libraries.iter().find(|l| l.name() == name) {
            return Ok(library.clone());
        }
        let path = find_library_file(name, &self.paths)
            .ok_or_else(|| Error::NotFound(format!("library {name}")))?;
        PluginLibrary::load(&path)
    }

    /// Resolve `library:identifier` or a bare identifier to the library
    /// holding the plugin and its key.
    pub fn resolve(&self, identification: &str) -> Result<(PluginLibrary, PluginKey)> {
        if identification.contains(':') {
            let key = PluginKey::parse(identification)?;
            let library = self
                .find_library(key.library())
                .map_err(|_| Error::NotFound(key.to_string()))?;
            if !library.contains(key.identifier()) {
                return Err(Error::NotFound(key.to_string()));
            }
            return Ok((library, key));
        }

        let mut matches: Vec<(PluginLibrary, PluginKey)> = self
            .libraries()
            .into_iter()
            .filter(|l| l.contains(identification))
            .filter_map(|l| {
                let key = PluginKey::new(l.name(), identification).ok()?;
                Some((l, key))
            })
            .collect();
        matches.sort_by(|a, b| a.1.cmp(&b.1));

        match matches.len() {
            0 => Err(Error::NotFound(identification.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::AmbiguousIdentifier {
                identifier: identification.to_string(),
                candidates: matches.iter().map(|(_, k)| k.to_string()).collect(),
            }),
        }
    }

    pub fn load_plugin(&self, identification: &str, input_sample_rate: f32) -> Result<VampPlugin> {
        let (library, key) = self.resolve(identification)?;
        library.load_plugin(key.as_str(), input_sample_rate)
    }

    /// Instantiate a plugin just long enough to read its full metadata.
    pub fn plugin_metadata(&self, identification: &str, input_sample_rate: f32) -> Result<PluginMetadata> {
        Ok(self.load_plugin(identification, input_sample_rate)?.metadata())
    }

    /// Run one plugin over a whole signal and return one stream per output,
    /// including the features it emits at end of stream.
    ///
    /// Missing sizes default to the plugin's preferred sizes, then to a block
    /// of [`DEFAULT_BLOCK_SIZE`](crate::computation::DEFAULT_BLOCK_SIZE)
    /// stepped by one block.
    pub fn compute_features(
        &self,
        identification: &str,
        timedata: &[f32],
        samplerate: f32,
        blocksize: Option<usize>,
        stepsize: Option<usize>,
    ) -> Result<Vec<FeatureStream>> {
        let mut computation = FeatureComputation::with_loader(samplerate, self.clone());
        let key = computation.add_plugin(identification, &[])?;
        let config = computation.default_configuration(blocksize, stepsize);
        computation.initialise(config.block_size, config.step_size)?;
        computation.process_signal(timedata, Duration::ZERO)?;
        computation.finish()?;
        Ok(computation
            .outputs()
            .get(key.as_str())
            .map(|streams| streams.to_vec())
            .unwrap_or_default())
    }
}

/// Metadata of a plugin resolved through the default loader.
pub fn get_plugin_metadata(identification: &str, input_sample_rate: f32) -> Result<PluginMetadata> {
    PluginLoader::default().plugin_metadata(identification, input_sample_rate)
}

/// Run one plugin, resolved through the default loader, over a whole signal
/// and return one stream per output.
pub fn compute_features(
    identification: &str,
    timedata: &[f32],
    samplerate: f32,
    blocksize: usize,
    stepsize: usize,
) -> Result<Vec<FeatureStream>> {
    PluginLoader::default().compute_features(
        identification,
        timedata,
        samplerate,
        Some(blocksize),
        Some(stepsize),
    )
}
