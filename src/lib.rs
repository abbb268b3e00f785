//! Host for Vamp audio feature-extraction plugins.
//!
//! Plugin libraries are discovered on the Vamp search path, bound through
//! the Vamp C ABI and driven block by block over mono audio:
//!
//! ```no_run
//! let streams = vamphost::compute_features("builtin:rms", &[0.0; 4096], 44100.0, 1024, 512)?;
//! for feature in &streams[0].features {
//!     println!("{:?} {:?}", feature.timestamp, feature.values);
//! }
//! # Ok::<(), vamphost::Error>(())
//! ```

pub mod computation;
pub mod discovery;
pub mod error;
pub mod plugin;

pub use computation::{FeatureComputation, FeatureStream};
pub use discovery::{
    PluginLoader, compute_features, get_plugin_metadata, get_vamp_paths, is_vamp_library,
    list_libraries, list_plugins, load_library, load_plugin,
};
pub use error::{Error, Result};
pub use plugin::{Plugin, PluginKey, PluginLibrary};
