use std::time::Duration;

use super::{BuiltinPlugin, OutputSpec};
use crate::plugin::{Feature, FeatureSet};

/// Root mean square of each block.
pub struct Rms;

impl BuiltinPlugin for Rms {
    const IDENTIFIER: &'static std::ffi::CStr = c"rms";
    const NAME: &'static std::ffi::CStr = c"Root mean square";
    const DESCRIPTION: &'static std::ffi::CStr = c"Root mean square of the input block";

    fn new(_input_sample_rate: f32) -> Self {
        Self
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::per_step(c"rms", c"RMS", c"Root mean square", c"")]
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, input: &[f32], _timestamp: Duration) -> FeatureSet {
        vec![vec![Feature::new(vec![rms(input)])]]
    }
}

pub(crate) fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
    (sum / block.len() as f64).sqrt() as f32
}
