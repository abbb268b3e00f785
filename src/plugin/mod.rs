pub mod builtin;
pub mod descriptor;
pub mod ffi;
pub mod host;
pub mod key;
pub mod library;

use std::path::Path;
use std::time::Duration;

pub use descriptor::{
    Feature, FeatureSet, InputDomain, OutputDescriptor, ParameterDescriptor, PluginDescriptor,
    PluginMetadata, SampleType,
};
pub use host::VampPlugin;
pub use key::PluginKey;
pub use library::PluginLibrary;

use crate::error::Result;

/// Block and step size a plugin was initialised with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockConfig {
    pub block_size: usize,
    pub step_size: usize,
}

impl BlockConfig {
    /// Number of input values `process` expects for the given input domain.
    /// Frequency-domain input is `block_size / 2 + 1` interleaved re/im pairs.
    pub fn input_len(&self, domain: InputDomain) -> usize {
        match domain {
            InputDomain::Time => self.block_size,
            InputDomain::Frequency => (self.block_size / 2 + 1) * 2,
        }
    }
}

/// A bound plugin instance.
///
/// An instance must be driven by one thread at a time; separate instances,
/// even of the same plugin, are independent.
pub trait Plugin: Send {
    fn key(&self) -> &PluginKey;
    fn library_path(&self) -> Option<&Path>;
    fn descriptor(&self) -> &PluginDescriptor;
    fn input_sample_rate(&self) -> f32;

    fn input_domain(&self) -> InputDomain {
        self.descriptor().input_domain
    }

    fn vamp_api_version(&self) -> u32 {
        self.descriptor().vamp_api_version
    }

    fn parameters(&self) -> &[ParameterDescriptor] {
        &self.descriptor().parameters
    }

    fn get_parameter(&self, identifier: &str) -> Result<f32>;

    /// Set a parameter, clamping out-of-range values. Returns the value
    /// actually applied.
    fn set_parameter(&mut self, identifier: &str, value: f32) -> Result<f32>;

    fn programs(&self) -> &[String] {
        &self.descriptor().programs
    }

    fn current_program(&self) -> Option<String>;
    fn select_program(&mut self, name: &str) -> Result<()>;

    fn preferred_block_size(&self) -> Option<usize>;
    fn preferred_step_size(&self) -> Option<usize>;

    fn output_count(&self) -> usize;
    fn output_descriptors(&self) -> Vec<OutputDescriptor>;

    fn block_config(&self) -> Option<BlockConfig>;

    fn is_initialised(&self) -> bool {
        self.block_config().is_some()
    }

    fn initialise(&mut self, block_size: usize, step_size: usize) -> Result<()>;

    /// Clear processing state, keeping configuration and parameter values.
    fn reset(&mut self);

    fn process(&mut self, input: &[f32], timestamp: Duration) -> Result<FeatureSet>;

    /// Features a plugin holds back until the end of the stream.
    fn remaining_features(&mut self) -> Result<FeatureSet>;

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            key: self.key().clone(),
            descriptor: self.descriptor().clone(),
            outputs: self.output_descriptors(),
            preferred_block_size: self.preferred_block_size(),
            preferred_step_size: self.preferred_step_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_len_per_domain() {
        let config = BlockConfig {
            block_size: 1024,
            step_size: 512,
        };
        assert_eq!(config.input_len(InputDomain::Time), 1024);
        assert_eq!(config.input_len(InputDomain::Frequency), 1026);
    }
}
