//! Plugins exercising corners of the host: parameters and programs, sparse
//! output, configuration constraints and timestamped features.

use std::ffi::{CStr, c_uint};
use std::sync::OnceLock;
use std::time::Duration;

use super::{BuiltinPlugin, DescriptorTable, OutputSpec, ParameterSpec};
use crate::plugin::ffi;
use crate::plugin::{Feature, FeatureSet, PluginLibrary, SampleType};

pub struct Gain {
    gain: f32,
    program: usize,
}

impl BuiltinPlugin for Gain {
    const IDENTIFIER: &'static CStr = c"gain";
    const NAME: &'static CStr = c"Gain";
    const DESCRIPTION: &'static CStr = c"Scaled sum and peak of each block";

    fn parameters() -> Vec<ParameterSpec> {
        vec![ParameterSpec {
            identifier: c"gain",
            name: c"Gain",
            description: c"Linear gain",
            unit: c"",
            min_value: 0.0,
            max_value: 2.0,
            default_value: 1.0,
            quantize_step: None,
        }]
    }

    fn programs() -> Vec<&'static CStr> {
        vec![c"unity", c"double"]
    }

    fn new(_input_sample_rate: f32) -> Self {
        Self {
            gain: 1.0,
            program: 0,
        }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![
            OutputSpec::per_step(c"sum", c"Sum", c"Scaled sum", c""),
            OutputSpec::per_step(c"peak", c"Peak", c"Scaled peak", c"V"),
        ]
    }

    fn get_parameter(&self, _index: usize) -> f32 {
        self.gain
    }

    fn set_parameter(&mut self, _index: usize, value: f32) {
        self.gain = value;
    }

    fn current_program(&self) -> usize {
        self.program
    }

    fn select_program(&mut self, index: usize) {
        self.program = index;
        self.gain = if index == 1 { 2.0 } else { 1.0 };
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, input: &[f32], _timestamp: Duration) -> FeatureSet {
        let sum: f32 = input.iter().sum();
        let peak = input.iter().fold(0.0f32, |p, x| p.max(x.abs()));
        vec![
            vec![Feature::new(vec![sum * self.gain])],
            vec![Feature::new(vec![peak * self.gain])],
        ]
    }
}

/// Emits on every second block, plus one trailing feature at the end.
pub struct EveryOther {
    calls: usize,
}

impl BuiltinPlugin for EveryOther {
    const IDENTIFIER: &'static CStr = c"everyother";
    const NAME: &'static CStr = c"Every other";
    const DESCRIPTION: &'static CStr = c"Emits a feature for every second block";

    fn new(_input_sample_rate: f32) -> Self {
        Self { calls: 0 }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::per_step(c"count", c"Count", c"Calls so far", c"")]
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        self.calls = 0;
        true
    }

    fn reset(&mut self) {
        self.calls = 0;
    }

    fn process(&mut self, input: &[f32], _timestamp: Duration) -> FeatureSet {
        self.calls += 1;
        if self.calls % 2 == 1 {
            return vec![Vec::new()];
        }
        let first = input.first().copied().unwrap_or_default();
        vec![vec![Feature::new(vec![self.calls as f32 + first])]]
    }

    fn remaining_features(&mut self) -> FeatureSet {
        vec![vec![Feature::new(vec![self.calls as f32])]]
    }
}

/// Only accepts block size equal to step size.
pub struct Picky;

impl BuiltinPlugin for Picky {
    const IDENTIFIER: &'static CStr = c"picky";
    const NAME: &'static CStr = c"Picky";
    const DESCRIPTION: &'static CStr = c"Requires non-overlapping blocks";

    fn new(_input_sample_rate: f32) -> Self {
        Self
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::per_step(c"mean", c"Mean", c"Block mean", c"")]
    }

    fn preferred_block_size(&self) -> usize {
        64
    }

    fn preferred_step_size(&self) -> usize {
        64
    }

    fn initialise(&mut self, block_size: usize, step_size: usize) -> bool {
        block_size == step_size
    }

    fn reset(&mut self) {}

    fn process(&mut self, input: &[f32], _timestamp: Duration) -> FeatureSet {
        let mean = input.iter().sum::<f32>() / input.len().max(1) as f32;
        vec![vec![Feature::new(vec![mean])]]
    }
}

pub struct Stereo;

impl BuiltinPlugin for Stereo {
    const IDENTIFIER: &'static CStr = c"stereo";
    const NAME: &'static CStr = c"Stereo";
    const DESCRIPTION: &'static CStr = c"Needs two input channels";
    const MIN_CHANNELS: usize = 2;

    fn new(_input_sample_rate: f32) -> Self {
        Self
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::per_step(c"mean", c"Mean", c"Block mean", c"")]
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, _input: &[f32], _timestamp: Duration) -> FeatureSet {
        vec![Vec::new()]
    }
}

/// Labels the first sample above 0.5 in each block.
pub struct Onsets {
    input_sample_rate: f32,
}

impl BuiltinPlugin for Onsets {
    const IDENTIFIER: &'static CStr = c"onsets";
    const NAME: &'static CStr = c"Onsets";
    const DESCRIPTION: &'static CStr = c"Timestamped, labelled features";

    fn new(input_sample_rate: f32) -> Self {
        Self { input_sample_rate }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec {
            identifier: c"onsets",
            name: c"Onsets",
            description: c"Onset locations",
            unit: c"",
            bin_count: Some(0),
            extents: None,
            quantize_step: None,
            sample_type: SampleType::VariableSampleRate(self.input_sample_rate),
            has_duration: true,
        }]
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, input: &[f32], timestamp: Duration) -> FeatureSet {
        let onsets = input
            .iter()
            .position(|&x| x > 0.5)
            .map(|i| {
                let offset = (i as f64 * 1e9 / f64::from(self.input_sample_rate)) as u64;
                Feature {
                    timestamp: Some(timestamp + Duration::from_nanos(offset)),
                    duration: Some(Duration::from_millis(1)),
                    values: Vec::new(),
                    label: Some("onset".into()),
                }
            })
            .into_iter()
            .collect();
        vec![onsets]
    }
}

/// One output per band; the band count is a parameter.
pub struct Bands {
    bands: usize,
}

const BAND_OUTPUTS: [&CStr; 3] = [c"band1", c"band2", c"band3"];

impl BuiltinPlugin for Bands {
    const IDENTIFIER: &'static CStr = c"bands";
    const NAME: &'static CStr = c"Bands";
    const DESCRIPTION: &'static CStr = c"Output count follows a parameter";

    fn parameters() -> Vec<ParameterSpec> {
        vec![ParameterSpec {
            identifier: c"bands",
            name: c"Bands",
            description: c"Number of outputs",
            unit: c"",
            min_value: 1.0,
            max_value: 3.0,
            default_value: 1.0,
            quantize_step: Some(1.0),
        }]
    }

    fn programs() -> Vec<&'static CStr> {
        vec![c"one", c"three"]
    }

    fn new(_input_sample_rate: f32) -> Self {
        Self { bands: 1 }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        BAND_OUTPUTS[..self.bands]
            .iter()
            .map(|&id| OutputSpec::per_step(id, id, c"Scaled block mean", c""))
            .collect()
    }

    fn get_parameter(&self, _index: usize) -> f32 {
        self.bands as f32
    }

    fn set_parameter(&mut self, _index: usize, value: f32) {
        self.bands = (value.round() as usize).clamp(1, BAND_OUTPUTS.len());
    }

    fn current_program(&self) -> usize {
        usize::from(self.bands == 3)
    }

    fn select_program(&mut self, index: usize) {
        self.bands = if index == 1 { 3 } else { 1 };
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, input: &[f32], _timestamp: Duration) -> FeatureSet {
        let mean = input.iter().sum::<f32>() / input.len().max(1) as f32;
        (1..=self.bands)
            .map(|band| vec![Feature::new(vec![mean * band as f32])])
            .collect()
    }
}

/// Claims an ABI version this host does not know.
pub struct Future;

impl BuiltinPlugin for Future {
    const IDENTIFIER: &'static CStr = c"future";
    const NAME: &'static CStr = c"Future";
    const DESCRIPTION: &'static CStr = c"Built against a newer API";
    const API_VERSION: u32 = 3;

    fn new(_input_sample_rate: f32) -> Self {
        Self
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        Vec::new()
    }

    fn initialise(&mut self, _block_size: usize, _step_size: usize) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn process(&mut self, _input: &[f32], _timestamp: Duration) -> FeatureSet {
        Vec::new()
    }
}

static TABLE: OnceLock<DescriptorTable> = OnceLock::new();
static FUTURE_TABLE: OnceLock<DescriptorTable> = OnceLock::new();

pub unsafe extern "C" fn entry_point(
    version: c_uint,
    index: c_uint,
) -> *const ffi::VampPluginDescriptor {
    TABLE
        .get_or_init(|| {
            DescriptorTable::new()
                .with::<Gain>()
                .with::<EveryOther>()
                .with::<Picky>()
                .with::<Stereo>()
                .with::<Onsets>()
                .with::<Bands>()
                .with::<Future>()
        })
        .get(version, index)
}

/// A library built only against an API version this host does not know.
pub unsafe extern "C" fn future_entry_point(
    version: c_uint,
    index: c_uint,
) -> *const ffi::VampPluginDescriptor {
    FUTURE_TABLE
        .get_or_init(|| DescriptorTable::new().with::<Future>())
        .get(version, index)
}

pub unsafe extern "C" fn empty_entry_point(
    _version: c_uint,
    _index: c_uint,
) -> *const ffi::VampPluginDescriptor {
    std::ptr::null()
}

/// The test plugins as an in-process library called `name`.
pub fn library(name: &str) -> PluginLibrary {
    unsafe { PluginLibrary::from_entry_point(name, entry_point) }
}
