use std::ffi::CStr;
use std::time::Duration;

use super::{BuiltinPlugin, OutputSpec, ParameterSpec};
use crate::plugin::{Feature, FeatureSet, InputDomain};

/// Frequency below which a given fraction of the spectral magnitude lies.
pub struct SpectralRolloff {
    input_sample_rate: f32,
    rolloff: f32,
    magnitude: Vec<f32>,
}

impl BuiltinPlugin for SpectralRolloff {
    const IDENTIFIER: &'static CStr = c"spectralrolloff";
    const NAME: &'static CStr = c"Spectral rolloff";
    const DESCRIPTION: &'static CStr =
        c"Frequency below which the given ratio of the spectral magnitude is concentrated";
    const INPUT_DOMAIN: InputDomain = InputDomain::Frequency;

    fn parameters() -> Vec<ParameterSpec> {
        vec![ParameterSpec {
            identifier: c"rolloff",
            name: c"Rolloff",
            description: c"Ratio of the total spectral magnitude",
            unit: c"",
            min_value: 0.0,
            max_value: 1.0,
            default_value: 0.9,
            quantize_step: None,
        }]
    }

    fn new(input_sample_rate: f32) -> Self {
        Self {
            input_sample_rate,
            rolloff: 0.9,
            magnitude: Vec::new(),
        }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::per_step(
            c"frequency",
            c"Rolloff frequency",
            c"Spectral rolloff frequency",
            c"Hz",
        )]
    }

    fn get_parameter(&self, index: usize) -> f32 {
        match index {
            0 => self.rolloff,
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.rolloff = value;
        }
    }

    fn initialise(&mut self, block_size: usize, _step_size: usize) -> bool {
        self.magnitude = vec![0.0; block_size / 2 + 1];
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, input: &[f32], _timestamp: Duration) -> FeatureSet {
        self.magnitude.clear();
        self.magnitude
            .extend(input.chunks_exact(2).map(|c| c[0].hypot(c[1])));

        let sum: f32 = self.magnitude.iter().sum();
        let index = rolloff_index(&self.magnitude, self.rolloff * sum);
        let frequency = bin_to_frequency(self.input_sample_rate, self.magnitude.len(), index);
        vec![vec![Feature::new(vec![frequency])]]
    }
}

/// First bin at which the cumulative magnitude exceeds `limit`, or the last
/// bin if it never does.
fn rolloff_index(magnitude: &[f32], limit: f32) -> usize {
    let mut sum = 0.0;
    for (i, &m) in magnitude.iter().enumerate() {
        sum += m;
        if sum > limit {
            return i;
        }
    }
    magnitude.len().saturating_sub(1)
}

fn bin_to_frequency(input_sample_rate: f32, bins: usize, index: usize) -> f32 {
    if bins < 2 {
        return 0.0;
    }
    0.5 * input_sample_rate * index as f32 / (bins - 1) as f32
}
