use std::ffi::{c_int, c_uint};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::descriptor::{Feature, FeatureSet, OutputDescriptor, PluginDescriptor};
use super::ffi;
use super::library::LibraryHandle;
use super::{BlockConfig, ParameterDescriptor, Plugin, PluginKey};
use crate::error::{Error, Result};

/// Host-side adapter over one native Vamp plugin instance.
pub struct VampPlugin {
    key: PluginKey,
    descriptor: PluginDescriptor,
    raw: *const ffi::VampPluginDescriptor,
    handle: ffi::VampPluginHandle,
    input_sample_rate: f32,
    output_count: usize,
    config: Option<BlockConfig>,
    // Dropped after `Drop::drop` has released the instance.
    library: Arc<LibraryHandle>,
}

// SAFETY: Vamp instances carry no thread affinity; they only require that a
// single thread drives them at a time, which `&mut self` guarantees.
unsafe impl Send for VampPlugin {}

impl VampPlugin {
    pub(crate) fn new(
        library: Arc<LibraryHandle>,
        raw: *const ffi::VampPluginDescriptor,
        input_sample_rate: f32,
    ) -> Result<Self> {
        // SAFETY: `raw` comes from the descriptor table of `library`, which
        // stays loaded for as long as we hold the Arc.
        let descriptor = unsafe { PluginDescriptor::from_raw(&*raw) };
        let key = PluginKey::new(library.name(), &descriptor.identifier)?;

        if !(input_sample_rate.is_finite() && input_sample_rate > 0.0) {
            return Err(Error::InvalidConfiguration {
                plugin: key.to_string(),
                reason: format!("invalid sample rate {input_sample_rate}"),
            });
        }

        let handle = unsafe { ((*raw).instantiate)(raw, input_sample_rate) };
        if handle.is_null() {
            return Err(Error::InvalidConfiguration {
                plugin: key.to_string(),
                reason: format!("instantiation failed at {input_sample_rate} Hz"),
            });
        }

        // From here on `Drop` takes care of cleanup.
        let mut plugin = Self {
            key,
            descriptor,
            raw,
            handle,
            input_sample_rate,
            output_count: 0,
            config: None,
            library,
        };

        let min_channels = unsafe { (plugin.raw().getMinChannelCount)(plugin.handle) };
        if min_channels > 1 {
            return Err(Error::Unsupported {
                plugin: plugin.key.to_string(),
                reason: format!("requires {min_channels} input channels, only mono is supported"),
            });
        }

        plugin.output_count = plugin.output_count();
        log::debug!(
            "Instantiated {} at {} Hz ({} outputs)",
            plugin.key,
            input_sample_rate,
            plugin.output_count
        );
        Ok(plugin)
    }

    fn raw(&self) -> &ffi::VampPluginDescriptor {
        // SAFETY: see `new`.
        unsafe { &*self.raw }
    }

    fn find_parameter(&self, identifier: &str) -> Result<(usize, &ParameterDescriptor)> {
        self.descriptor
            .parameters
            .iter()
            .enumerate()
            .find(|(_, p)| p.identifier == identifier)
            .ok_or_else(|| Error::UnknownParameter {
                plugin: self.key.to_string(),
                parameter: identifier.to_string(),
            })
    }

    fn require_config(&self) -> Result<BlockConfig> {
        self.config
            .ok_or_else(|| Error::NotInitialised(self.key.to_string()))
    }

    /// Convert and release a feature list array returned by `process` or
    /// `getRemainingFeatures`.
    ///
    /// # Safety
    /// `lists` must be null or the pointer just returned by the plugin.
    unsafe fn take_features(&self, lists: *mut ffi::VampFeatureList) -> FeatureSet {
        if lists.is_null() {
            return vec![Vec::new(); self.output_count];
        }
        let api_version = self.descriptor.vamp_api_version;
        let features = (0..self.output_count)
            .map(|i| unsafe { read_feature_list(&*lists.add(i), api_version) })
            .collect();
        unsafe { (self.raw().releaseFeatureSet)(lists) };
        features
    }

    /// Name of the library this instance keeps loaded.
    pub fn library_name(&self) -> &str {
        self.library.name()
    }
}

impl Drop for VampPlugin {
    fn drop(&mut self) {
        unsafe { (self.raw().cleanup)(self.handle) };
    }
}

impl Plugin for VampPlugin {
    fn key(&self) -> &PluginKey {
        &self.key
    }

    fn library_path(&self) -> Option<&Path> {
        self.library.path()
    }

    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn input_sample_rate(&self) -> f32 {
        self.input_sample_rate
    }

    fn get_parameter(&self, identifier: &str) -> Result<f32> {
        let (index, _) = self.find_parameter(identifier)?;
        Ok(unsafe { (self.raw().getParameter)(self.handle, index as c_int) })
    }

    fn set_parameter(&mut self, identifier: &str, value: f32) -> Result<f32> {
        let (index, descriptor) = self.find_parameter(identifier)?;
        let applied = descriptor.clamp(value);
        if applied != value {
            log::warn!(
                "{}: parameter {identifier:?} value {value} out of range [{}, {}], clamped to {applied}",
                self.key,
                descriptor.min_value,
                descriptor.max_value,
            );
        }
        unsafe { (self.raw().setParameter)(self.handle, index as c_int, applied) };
        Ok(applied)
    }

    fn current_program(&self) -> Option<String> {
        if self.descriptor.programs.is_empty() {
            return None;
        }
        let index = unsafe { (self.raw().getCurrentProgram)(self.handle) };
        self.descriptor.programs.get(index as usize).cloned()
    }

    fn select_program(&mut self, name: &str) -> Result<()> {
        let index = self
            .descriptor
            .programs
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| Error::UnknownProgram {
                plugin: self.key.to_string(),
                program: name.to_string(),
            })?;
        unsafe { (self.raw().selectProgram)(self.handle, index as c_uint) };
        Ok(())
    }

    fn preferred_block_size(&self) -> Option<usize> {
        let size = unsafe { (self.raw().getPreferredBlockSize)(self.handle) };
        (size > 0).then_some(size as usize)
    }

    fn preferred_step_size(&self) -> Option<usize> {
        let size = unsafe { (self.raw().getPreferredStepSize)(self.handle) };
        (size > 0).then_some(size as usize)
    }

    fn output_count(&self) -> usize {
        unsafe { (self.raw().getOutputCount)(self.handle) as usize }
    }

    fn output_descriptors(&self) -> Vec<OutputDescriptor> {
        let api_version = self.descriptor.vamp_api_version;
        (0..self.output_count())
            .filter_map(|i| {
                let raw = unsafe { (self.raw().getOutputDescriptor)(self.handle, i as c_uint) };
                if raw.is_null() {
                    log::warn!("{}: no descriptor for output {i}", self.key);
                    return None;
                }
                let output = unsafe { OutputDescriptor::from_raw(&*raw, api_version) };
                unsafe { (self.raw().releaseOutputDescriptor)(raw) };
                Some(output)
            })
            .collect()
    }

    fn block_config(&self) -> Option<BlockConfig> {
        self.config
    }

    fn initialise(&mut self, block_size: usize, step_size: usize) -> Result<()> {
        let invalid = |reason: String| Error::InvalidConfiguration {
            plugin: self.key.to_string(),
            reason,
        };
        if block_size == 0 || step_size == 0 {
            return Err(invalid(format!(
                "blocksize ({block_size}) and stepsize ({step_size}) must be positive"
            )));
        }
        let (Ok(block), Ok(step)) = (c_uint::try_from(block_size), c_uint::try_from(step_size))
        else {
            return Err(invalid(format!(
                "blocksize ({block_size}) or stepsize ({step_size}) too large"
            )));
        };

        self.config = None;
        let accepted = unsafe { (self.raw().initialise)(self.handle, 1, step, block) };
        if accepted == 0 {
            let mut reason = format!("rejected blocksize {block_size} / stepsize {step_size}");
            if let (Some(b), Some(s)) = (self.preferred_block_size(), self.preferred_step_size()) {
                reason.push_str(&format!(" (preferred {b} / {s})"));
            }
            return Err(invalid(reason));
        }

        // Outputs may depend on the configuration.
        self.output_count = self.output_count();
        self.config = Some(BlockConfig {
            block_size,
            step_size,
        });
        log::debug!("Initialised {} with blocksize {block_size}, stepsize {step_size}", self.key);
        Ok(())
    }

    fn reset(&mut self) {
        if self.config.is_some() {
            unsafe { (self.raw().reset)(self.handle) };
        }
    }

    fn process(&mut self, input: &[f32], timestamp: Duration) -> Result<FeatureSet> {
        let config = self.require_config()?;
        let expected = config.input_len(self.descriptor.input_domain);
        if input.len() != expected {
            return Err(Error::InvalidBlock {
                plugin: self.key.to_string(),
                expected,
                actual: input.len(),
            });
        }

        let channels = [input.as_ptr()];
        let sec = c_int::try_from(timestamp.as_secs()).unwrap_or(c_int::MAX);
        let nsec = timestamp.subsec_nanos() as c_int;
        let lists = unsafe { (self.raw().process)(self.handle, channels.as_ptr(), sec, nsec) };
        Ok(unsafe { self.take_features(lists) })
    }

    fn remaining_features(&mut self) -> Result<FeatureSet> {
        self.require_config()?;
        let lists = unsafe { (self.raw().getRemainingFeatures)(self.handle) };
        Ok(unsafe { self.take_features(lists) })
    }
}

fn real_time(sec: c_int, nsec: c_int) -> Duration {
    if sec < 0 || nsec < 0 {
        return Duration::ZERO;
    }
    Duration::new(sec as u64, nsec as u32)
}

/// # Safety
/// `list` must point into a feature list array owned by a live plugin.
unsafe fn read_feature_list(list: &ffi::VampFeatureList, api_version: u32) -> Vec<Feature> {
    let count = list.featureCount as usize;
    if count == 0 || list.features.is_null() {
        return Vec::new();
    }

    (0..count)
        .map(|j| {
            let v1 = unsafe { (*list.features.add(j)).v1 };
            let values = if v1.values.is_null() {
                Vec::new()
            } else {
                unsafe { std::slice::from_raw_parts(v1.values, v1.valueCount as usize) }.to_vec()
            };
            let label = unsafe { ffi::string_from(v1.label) };

            let mut feature = Feature::new(values);
            if v1.hasTimestamp != 0 {
                feature.timestamp = Some(real_time(v1.sec, v1.nsec));
            }
            if !label.is_empty() {
                feature.label = Some(label);
            }
            if api_version >= 2 {
                let v2 = unsafe { (*list.features.add(count + j)).v2 };
                if v2.hasDuration != 0 {
                    feature.duration = Some(real_time(v2.durationSec, v2.durationNsec));
                }
            }
            feature
        })
        .collect()
}
