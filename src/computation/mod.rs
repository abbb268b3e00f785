//! Block-wise feature computation over several plugins sharing one sample
//! rate.

mod frames;
mod spectrum;

use std::collections::BTreeMap;
use std::time::Duration;

pub use frames::{Frames, frame_count, frame_timestamp};
pub use spectrum::{Spectrum, hann};

use crate::discovery::PluginLoader;
use crate::error::{Error, Result};
use crate::plugin::{
    BlockConfig, Feature, FeatureSet, InputDomain, OutputDescriptor, Plugin, PluginKey,
    PluginLibrary,
};

const COMPUTATION: &str = "feature computation";

/// Block size used when neither the caller nor the first plugin has one.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Features accumulated for one plugin output.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStream {
    pub output: String,
    pub features: Vec<Feature>,
}

impl FeatureStream {
    fn empty(output: &OutputDescriptor) -> Self {
        Self {
            output: output.identifier.clone(),
            features: Vec::new(),
        }
    }

    /// The first bin of every feature, for single-valued outputs.
    pub fn values(&self) -> Vec<f32> {
        self.features
            .iter()
            .filter_map(|f| f.values.first().copied())
            .collect()
    }

    pub fn timestamps(&self) -> Vec<Duration> {
        self.features.iter().filter_map(|f| f.timestamp).collect()
    }
}

struct BoundPlugin {
    key: PluginKey,
    library: PluginLibrary,
    plugin: Box<dyn Plugin>,
    outputs: Vec<OutputDescriptor>,
    streams: Vec<FeatureStream>,
}

impl BoundPlugin {
    fn refresh_outputs(&mut self) {
        self.outputs = self.plugin.output_descriptors();
        self.streams = self.outputs.iter().map(FeatureStream::empty).collect();
    }

    /// Replace the instance with a fresh one carrying the same program and
    /// parameter values, initialised with `config` if given.
    fn reinstantiate(&mut self, sample_rate: f32, config: Option<BlockConfig>) -> Result<()> {
        let program = self.plugin.current_program();
        let values: Vec<(String, f32)> = self
            .plugin
            .parameters()
            .iter()
            .map(|p| {
                let value = self.plugin.get_parameter(&p.identifier)?;
                Ok((p.identifier.clone(), value))
            })
            .collect::<Result<_>>()?;

        let mut fresh = self.library.load_plugin(self.key.as_str(), sample_rate)?;
        if let Some(program) = program {
            fresh.select_program(&program)?;
        }
        for (identifier, value) in &values {
            fresh.set_parameter(identifier, *value)?;
        }
        if let Some(config) = config {
            fresh.initialise(config.block_size, config.step_size)?;
        }
        self.plugin = Box::new(fresh);
        Ok(())
    }
}

/// Drives a set of plugins over the same audio, block by block.
///
/// Plugins are added by identification, the set is initialised once with a
/// block and step size, and then fed either single blocks or whole signals.
/// Features are accumulated per plugin output until [`reset`](Self::reset)
/// or the next initialise.
pub struct FeatureComputation {
    sample_rate: f32,
    loader: PluginLoader,
    plugins: Vec<BoundPlugin>,
    config: Option<BlockConfig>,
    spectrum: Option<spectrum::Spectrum>,
    // Timestamp just past the last block processed.
    end_timestamp: Duration,
}

impl FeatureComputation {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_loader(sample_rate, PluginLoader::default())
    }

    pub fn with_loader(sample_rate: f32, loader: PluginLoader) -> Self {
        Self {
            sample_rate,
            loader,
            plugins: Vec::new(),
            config: None,
            spectrum: None,
            end_timestamp: Duration::ZERO,
        }
    }

    pub fn samplerate(&self) -> f32 {
        self.sample_rate
    }

    pub fn configuration(&self) -> Option<BlockConfig> {
        self.config
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// Fill in missing sizes from the first plugin's preferences. The block
    /// size falls back to [`DEFAULT_BLOCK_SIZE`] and the step size to the
    /// block size.
    pub fn default_configuration(
        &self,
        block_size: Option<usize>,
        step_size: Option<usize>,
    ) -> BlockConfig {
        let first = self.plugins.first().map(|p| p.plugin.as_ref());
        let block_size = block_size
            .or_else(|| first.and_then(|p| p.preferred_block_size()))
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        let step_size = step_size
            .or_else(|| first.and_then(|p| p.preferred_step_size()))
            .unwrap_or(block_size);
        BlockConfig {
            block_size,
            step_size,
        }
    }

    /// Bind a plugin by `library:identifier` key or bare identifier and set
    /// the given parameters. Returns the resolved key.
    ///
    /// On error the computation is unchanged. Adding a plugin to an
    /// initialised computation makes it uninitialised again.
    pub fn add_plugin(&mut self, identification: &str, parameters: &[(&str, f32)]) -> Result<PluginKey> {
        let (library, key) = self.loader.resolve(identification)?;
        if self.find(key.as_str()).is_some() {
            return Err(Error::DuplicatePlugin(key.to_string()));
        }

        let mut plugin = library.load_plugin(key.as_str(), self.sample_rate)?;
        for &(identifier, value) in parameters {
            plugin.set_parameter(identifier, value)?;
        }

        let mut bound = BoundPlugin {
            key: key.clone(),
            library,
            plugin: Box::new(plugin),
            outputs: Vec::new(),
            streams: Vec::new(),
        };
        bound.refresh_outputs();

        if self.config.take().is_some() {
            log::info!("Adding {key} invalidates the current configuration");
            self.spectrum = None;
        }
        log::info!("Added {key} at {} Hz", self.sample_rate);
        self.plugins.push(bound);
        Ok(key)
    }

    fn find(&self, key: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.key.as_str() == key)
    }

    fn bound_mut(&mut self, key: &str) -> Result<&mut BoundPlugin> {
        let index = self
            .find(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(&mut self.plugins[index])
    }

    pub fn select_program(&mut self, key: &str, program: &str) -> Result<()> {
        self.bound_mut(key)?.plugin.select_program(program)?;
        self.outputs_may_have_changed(key);
        Ok(())
    }

    pub fn set_parameter(&mut self, key: &str, identifier: &str, value: f32) -> Result<f32> {
        let applied = self.bound_mut(key)?.plugin.set_parameter(identifier, value)?;
        self.outputs_may_have_changed(key);
        Ok(applied)
    }

    /// Programs and parameters may change a plugin's outputs. When they do,
    /// its streams are rebuilt and the computation must be initialised again.
    fn outputs_may_have_changed(&mut self, key: &str) {
        let Some(index) = self.find(key) else {
            return;
        };
        let bound = &mut self.plugins[index];
        if bound.plugin.output_descriptors() == bound.outputs {
            return;
        }
        bound.refresh_outputs();
        if self.config.take().is_some() {
            log::info!("Outputs of {key} changed, the computation needs initialising again");
            self.spectrum = None;
        }
    }

    pub fn get_parameter(&self, key: &str, identifier: &str) -> Result<f32> {
        let index = self
            .find(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        self.plugins[index].plugin.get_parameter(identifier)
    }

    /// Initialise every bound plugin with the same block and step size.
    ///
    /// Either every plugin accepts the configuration or the computation is
    /// left exactly as it was: plugins touched before the failure are
    /// replaced by fresh instances with the previous configuration.
    /// Accumulated outputs are cleared on success.
    pub fn initialise(&mut self, block_size: usize, step_size: usize) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(Error::InvalidConfiguration {
                plugin: COMPUTATION.to_string(),
                reason: format!("samplerate ({}) must be positive", self.sample_rate),
            });
        }
        if block_size == 0 || step_size == 0 {
            return Err(Error::InvalidConfiguration {
                plugin: COMPUTATION.to_string(),
                reason: format!(
                    "blocksize ({block_size}) and stepsize ({step_size}) must be positive"
                ),
            });
        }

        let previous = self.config;
        for i in 0..self.plugins.len() {
            if let Err(err) = self.plugins[i].plugin.initialise(block_size, step_size) {
                log::warn!(
                    "{} rejected blocksize {block_size} / stepsize {step_size}, rolling back",
                    self.plugins[i].key
                );
                self.roll_back(i + 1, previous);
                return Err(err);
            }
        }

        for bound in &mut self.plugins {
            bound.refresh_outputs();
        }
        let needs_spectrum = self
            .plugins
            .iter()
            .any(|p| p.plugin.input_domain() == InputDomain::Frequency);
        self.spectrum = needs_spectrum.then(|| spectrum::Spectrum::new(block_size));
        self.config = Some(BlockConfig {
            block_size,
            step_size,
        });
        self.end_timestamp = Duration::ZERO;
        log::info!(
            "Initialised {} plugins with blocksize {block_size}, stepsize {step_size}",
            self.plugins.len()
        );
        Ok(())
    }

    fn roll_back(&mut self, touched: usize, previous: Option<BlockConfig>) {
        for bound in &mut self.plugins[..touched] {
            if let Err(err) = bound.reinstantiate(self.sample_rate, previous) {
                log::error!("Failed to restore {}: {err}", bound.key);
            }
        }
    }

    fn require_config(&self) -> Result<BlockConfig> {
        self.config
            .ok_or_else(|| Error::NotInitialised(COMPUTATION.to_string()))
    }

    /// Feed one block to every plugin. Features without a timestamp are
    /// stamped with `timestamp`. The results are also appended to the
    /// accumulated outputs.
    pub fn process_block(
        &mut self,
        block: &[f32],
        timestamp: Duration,
    ) -> Result<BTreeMap<PluginKey, FeatureSet>> {
        let config = self.require_config()?;
        if block.len() != config.block_size {
            return Err(Error::InvalidBlock {
                plugin: COMPUTATION.to_string(),
                expected: config.block_size,
                actual: block.len(),
            });
        }

        let spectrum = self.spectrum.as_mut().map(|s| s.transform(block));

        let mut results = Vec::with_capacity(self.plugins.len());
        for bound in &mut self.plugins {
            let input = match (bound.plugin.input_domain(), &spectrum) {
                (InputDomain::Frequency, Some(spectrum)) => spectrum.as_slice(),
                _ => block,
            };
            let mut set = bound.plugin.process(input, timestamp)?;
            stamp(&mut set, timestamp);
            results.push(set);
        }

        let step = Duration::from_secs_f64(config.step_size as f64 / f64::from(self.sample_rate));
        self.end_timestamp = timestamp + step;
        Ok(self.append(results))
    }

    fn append(&mut self, results: Vec<FeatureSet>) -> BTreeMap<PluginKey, FeatureSet> {
        let mut map = BTreeMap::new();
        for (bound, set) in self.plugins.iter_mut().zip(results) {
            for (stream, features) in bound.streams.iter_mut().zip(&set) {
                stream.features.extend(features.iter().cloned());
            }
            map.insert(bound.key.clone(), set);
        }
        map
    }

    /// Slice `signal` into blocks (zero-padding the tail) and process them
    /// in order, the first block starting at `start`. Returns the features
    /// produced by this call.
    pub fn process_signal(
        &mut self,
        signal: &[f32],
        start: Duration,
    ) -> Result<BTreeMap<PluginKey, Vec<FeatureStream>>> {
        let config = self.require_config()?;
        let mut streams: BTreeMap<PluginKey, Vec<FeatureStream>> = self
            .plugins
            .iter()
            .map(|p| (p.key.clone(), p.outputs.iter().map(FeatureStream::empty).collect()))
            .collect();

        let frames = Frames::new(signal, config.block_size, config.step_size);
        log::debug!("Processing {} samples in {} blocks", signal.len(), frames.len());
        for (index, frame) in frames.enumerate() {
            let timestamp = frame_timestamp(start, index, config.step_size, self.sample_rate);
            for (key, set) in self.process_block(&frame, timestamp)? {
                if let Some(target) = streams.get_mut(&key) {
                    for (stream, features) in target.iter_mut().zip(set) {
                        stream.features.extend(features);
                    }
                }
            }
        }
        Ok(streams)
    }

    /// Collect the features plugins hold back until the end of the stream.
    /// Untimed features are stamped with the end of the last block.
    pub fn finish(&mut self) -> Result<BTreeMap<PluginKey, FeatureSet>> {
        self.require_config()?;
        let timestamp = self.end_timestamp;
        let mut results = Vec::with_capacity(self.plugins.len());
        for bound in &mut self.plugins {
            let mut set = bound.plugin.remaining_features()?;
            stamp(&mut set, timestamp);
            results.push(set);
        }
        Ok(self.append(results))
    }

    /// Reset every plugin and clear the accumulated outputs, keeping
    /// configuration and parameters.
    pub fn reset(&mut self) {
        for bound in &mut self.plugins {
            bound.plugin.reset();
            for stream in &mut bound.streams {
                stream.features.clear();
            }
        }
        self.end_timestamp = Duration::ZERO;
    }

    /// Output descriptors of every bound plugin.
    pub fn plugins(&self) -> BTreeMap<&str, &[OutputDescriptor]> {
        self.plugins
            .iter()
            .map(|p| (p.key.as_str(), p.outputs.as_slice()))
            .collect()
    }

    /// Features accumulated so far, one stream per output.
    pub fn outputs(&self) -> BTreeMap<&str, &[FeatureStream]> {
        self.plugins
            .iter()
            .map(|p| (p.key.as_str(), p.streams.as_slice()))
            .collect()
    }

    /// The bound plugin instance for `key`.
    pub fn plugin(&self, key: &str) -> Option<&dyn Plugin> {
        self.find(key).map(|i| self.plugins[i].plugin.as_ref())
    }
}

fn stamp(set: &mut FeatureSet, timestamp: Duration) {
    for feature in set.iter_mut().flatten() {
        feature.timestamp.get_or_insert(timestamp);
    }
}
