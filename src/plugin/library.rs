use std::ffi::c_uint;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::descriptor::PluginDescriptor;
use super::ffi;
use super::host::VampPlugin;
use super::key::PluginKey;
use crate::error::{Error, Result};

/// Descriptor table of one loaded library. Plugin instances hold an `Arc` to
/// it, so the code they point into stays mapped until the last one is gone.
pub(crate) struct LibraryHandle {
    name: String,
    path: Option<PathBuf>,
    descriptors: Vec<*const ffi::VampPluginDescriptor>,
    // Must be dropped after `descriptors` is no longer used.
    _library: Option<libloading::Library>,
}

// SAFETY: descriptors are immutable static tables inside the library and the
// library handle itself is thread-safe.
unsafe impl Send for LibraryHandle {}
unsafe impl Sync for LibraryHandle {}

impl LibraryHandle {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// A loaded Vamp plugin library.
///
/// Cheap to clone. Instances created through [`PluginLibrary::load_plugin`]
/// keep the library loaded even after every `PluginLibrary` value is dropped.
#[derive(Clone)]
pub struct PluginLibrary {
    handle: Arc<LibraryHandle>,
}

impl std::fmt::Debug for PluginLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLibrary")
            .field("name", &self.handle.name)
            .field("path", &self.handle.path)
            .field("plugins", &self.handle.descriptors.len())
            .finish()
    }
}

/// Query `entry` until it returns null, keeping the descriptors this host
/// understands. Returns the kept descriptors and whether any were returned.
///
/// # Safety
/// `entry` must be a valid Vamp entry point whose library stays loaded.
unsafe fn collect_descriptors(
    name: &str,
    entry: ffi::VampGetPluginDescriptorFunction,
) -> (Vec<*const ffi::VampPluginDescriptor>, bool) {
    let mut descriptors = Vec::new();
    let mut seen_any = false;
    for index in 0..c_uint::MAX {
        let raw = unsafe { entry(ffi::VAMP_API_VERSION, index) };
        if raw.is_null() {
            break;
        }
        seen_any = true;
        let version = unsafe { (*raw).vampApiVersion };
        if !(1..=ffi::VAMP_API_VERSION).contains(&version) {
            log::warn!(
                "{name}: skipping plugin {index} with unsupported API version {version}"
            );
            continue;
        }
        descriptors.push(raw);
    }
    (descriptors, seen_any)
}

/// The descriptors behind `entry` this host can use. A library that returns
/// descriptors, none of them with a supported API version, is rejected.
///
/// # Safety
/// Same as [`collect_descriptors`].
pub(crate) unsafe fn supported_descriptors(
    name: &str,
    entry: ffi::VampGetPluginDescriptorFunction,
) -> std::result::Result<Vec<*const ffi::VampPluginDescriptor>, String> {
    let (descriptors, seen_any) = unsafe { collect_descriptors(name, entry) };
    if seen_any && descriptors.is_empty() {
        return Err("no plugins with a supported API version".into());
    }
    Ok(descriptors)
}

impl PluginLibrary {
    /// Load the plugin library at `path`. The library name is the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let load_error = |reason: String| Error::Load {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(load_error("not a file".into()));
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .ok_or_else(|| load_error("file name is not a valid library name".into()))?
            .to_string();

        log::debug!("Loading plugin library {}", path.display());
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| load_error(format!("failed to open: {e}")))?;

        let entry: ffi::VampGetPluginDescriptorFunction = unsafe {
            let symbol = library
                .get::<ffi::VampGetPluginDescriptorFunction>(ffi::ENTRY_POINT)
                .map_err(|e| load_error(format!("not a Vamp plugin library: {e}")))?;
            *symbol
        };

        let descriptors = unsafe { supported_descriptors(&name, entry) }.map_err(load_error)?;

        log::info!(
            "Loaded {} ({} plugins) from {}",
            name,
            descriptors.len(),
            path.display()
        );
        Ok(Self {
            handle: Arc::new(LibraryHandle {
                name,
                path: Some(path.to_path_buf()),
                descriptors,
                _library: Some(library),
            }),
        })
    }

    /// Wrap an entry point linked into this process.
    ///
    /// # Safety
    /// `entry` must behave like `vampGetPluginDescriptor` and the descriptors
    /// it returns must live for the rest of the program.
    pub unsafe fn from_entry_point(name: &str, entry: ffi::VampGetPluginDescriptorFunction) -> Self {
        let (descriptors, _) = unsafe { collect_descriptors(name, entry) };
        Self {
            handle: Arc::new(LibraryHandle {
                name: name.to_string(),
                path: None,
                descriptors,
                _library: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// File the library was loaded from; `None` for in-process libraries.
    pub fn path(&self) -> Option<&Path> {
        self.handle.path()
    }

    pub fn plugin_count(&self) -> usize {
        self.handle.descriptors.len()
    }

    /// Static descriptors of every plugin in the library.
    pub fn list_plugins(&self) -> Vec<PluginDescriptor> {
        self.handle
            .descriptors
            .iter()
            .map(|&raw| unsafe { PluginDescriptor::from_raw(&*raw) })
            .collect()
    }

    pub fn plugin_keys(&self) -> Vec<PluginKey> {
        self.list_plugins()
            .iter()
            .filter_map(|d| PluginKey::new(self.name(), &d.identifier).ok())
            .collect()
    }

    /// Whether the library contains a plugin with this identifier.
    pub fn contains(&self, identifier: &str) -> bool {
        self.find(identifier).is_some()
    }

    fn find(&self, identifier: &str) -> Option<*const ffi::VampPluginDescriptor> {
        self.handle.descriptors.iter().copied().find(|&raw| {
            // SAFETY: see `LibraryHandle`.
            let id = unsafe { ffi::string_from((*raw).identifier) };
            id == identifier
        })
    }

    /// Instantiate a plugin by bare identifier or by full key.
    pub fn load_plugin(&self, plugin: &str, input_sample_rate: f32) -> Result<VampPlugin> {
        let identifier = match PluginKey::parse(plugin) {
            Ok(key) if key.library() == self.name() => key.identifier().to_string(),
            Ok(_) => {
                return Err(Error::NotFound(format!(
                    "{plugin} (not in library {})",
                    self.name()
                )));
            }
            Err(_) => plugin.to_string(),
        };

        let raw = self.find(&identifier).ok_or_else(|| {
            Error::NotFound(format!("{}:{identifier}", self.name()))
        })?;
        VampPlugin::new(Arc::clone(&self.handle), raw, input_sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;
    use crate::plugin::builtin::{self, testing};

    #[test]
    fn missing_file() {
        let err = PluginLibrary::load(Path::new("/nonexistent/library.so")).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn not_a_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.so");
        std::fs::write(&path, b"not a shared object").unwrap();
        assert!(matches!(
            PluginLibrary::load(&path),
            Err(Error::Load { .. })
        ));
    }

    #[test]
    fn list_and_load_round_trip() {
        let library = builtin::library();
        assert_eq!(library.name(), "builtin");
        assert!(library.path().is_none());

        let descriptors = library.list_plugins();
        assert_eq!(descriptors.len(), library.plugin_count());
        for descriptor in descriptors {
            let plugin = library.load_plugin(&descriptor.identifier, 44100.0).unwrap();
            assert_eq!(plugin.descriptor(), &descriptor);
            assert_eq!(plugin.key().library(), "builtin");
        }
    }

    #[test]
    fn keys_use_library_name() {
        let keys: Vec<String> = testing::library("mylib")
            .plugin_keys()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert!(keys.contains(&"mylib:gain".to_string()));
    }

    #[test]
    fn load_by_key() {
        let library = testing::library("mylib");
        let plugin = library.load_plugin("mylib:gain", 44100.0).unwrap();
        assert_eq!(plugin.key().as_str(), "mylib:gain");

        assert!(matches!(
            library.load_plugin("otherlib:gain", 44100.0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            library.load_plugin("nosuchplugin", 44100.0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn unsupported_versions_are_skipped() {
        // The test table also holds a descriptor claiming API version 3.
        let library = testing::library("mylib");
        assert!(!library.contains("future"));
        assert!(library.contains("gain"));
    }

    #[test]
    fn only_unsupported_versions_is_rejected() {
        let mixed = unsafe { supported_descriptors("mixed", testing::entry_point) }.unwrap();
        assert_eq!(mixed.len(), testing::library("mixed").plugin_count());

        let future = unsafe { supported_descriptors("future", testing::future_entry_point) };
        assert!(future.is_err());

        let empty = unsafe { supported_descriptors("empty", testing::empty_entry_point) };
        assert_eq!(empty.map(|d| d.len()), Ok(0));
    }

    #[test]
    #[ignore = "needs a Vamp plugin library on the search path (VAMP_PATH)"]
    fn load_installed_library() {
        let paths = crate::discovery::get_vamp_paths();
        let libraries = crate::discovery::list_libraries(&paths);
        assert!(!libraries.is_empty(), "no Vamp library found in {paths:?}");

        for path in libraries {
            let library = PluginLibrary::load(&path).unwrap();
            assert_eq!(library.path(), Some(path.as_path()));
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap();
            assert_eq!(library.name(), stem);
            for descriptor in library.list_plugins() {
                let plugin = library.load_plugin(&descriptor.identifier, 44100.0).unwrap();
                assert_eq!(plugin.key().library(), stem);
                assert_eq!(plugin.library_path(), Some(path.as_path()));
            }
        }
    }
}
