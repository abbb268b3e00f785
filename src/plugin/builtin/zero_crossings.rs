use std::ffi::CStr;
use std::time::Duration;

use super::{BuiltinPlugin, OutputSpec};
use crate::plugin::{Feature, FeatureSet, SampleType};

/// Counts sign changes in the signal and reports where they happen.
pub struct ZeroCrossings {
    input_sample_rate: f32,
    step_size: usize,
    previous: f32,
}

impl BuiltinPlugin for ZeroCrossings {
    const IDENTIFIER: &'static CStr = c"zerocrossings";
    const NAME: &'static CStr = c"Zero crossings";
    const DESCRIPTION: &'static CStr = c"Detect and count zero crossing points";

    fn new(input_sample_rate: f32) -> Self {
        Self {
            input_sample_rate,
            step_size: 0,
            previous: 0.0,
        }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![
            OutputSpec {
                quantize_step: Some(1.0),
                ..OutputSpec::per_step(
                    c"counts",
                    c"Zero crossing counts",
                    c"Number of zero crossings per processing step",
                    c"crossings",
                )
            },
            OutputSpec {
                identifier: c"zerocrossings",
                name: c"Zero crossings",
                description: c"Locations of zero crossings",
                unit: c"",
                bin_count: Some(0),
                extents: None,
                quantize_step: None,
                sample_type: SampleType::VariableSampleRate(self.input_sample_rate),
                has_duration: false,
            },
        ]
    }

    fn initialise(&mut self, _block_size: usize, step_size: usize) -> bool {
        self.step_size = step_size;
        self.previous = 0.0;
        true
    }

    fn reset(&mut self) {
        self.previous = 0.0;
    }

    fn process(&mut self, input: &[f32], timestamp: Duration) -> FeatureSet {
        let mut crossings = Vec::new();

        // Only the samples not revisited by the next block count.
        for (i, &sample) in input.iter().take(self.step_size).enumerate() {
            if (sample >= 0.0) != (self.previous >= 0.0) {
                let offset = (i as f64 * 1e9 / f64::from(self.input_sample_rate)) as u64;
                crossings.push(Feature {
                    timestamp: Some(timestamp + Duration::from_nanos(offset)),
                    ..Feature::new(Vec::new())
                });
            }
            self.previous = sample;
        }

        let count = Feature::new(vec![crossings.len() as f32]);
        vec![vec![count], crossings]
    }
}
