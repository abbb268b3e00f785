//! Plugins compiled into the host.
//!
//! Builtin plugins implement [`BuiltinPlugin`] and are exported through the
//! same descriptor table a native library would expose, so the host drives
//! them through exactly the code path used for plugins loaded from disk.

mod rms;
mod rolloff;
#[cfg(test)]
pub(crate) mod testing;
mod zero_crossings;

use std::ffi::{CStr, CString, c_char, c_int, c_uint};
use std::ptr;
use std::sync::OnceLock;
use std::time::Duration;

use super::descriptor::{Feature, FeatureSet, InputDomain, SampleType};
use super::ffi;
use super::library::PluginLibrary;
use super::BlockConfig;

pub use rms::Rms;
pub use rolloff::SpectralRolloff;
pub use zero_crossings::ZeroCrossings;

/// Name of the in-process library; keys look like `builtin:rms`.
pub const LIBRARY_NAME: &str = "builtin";

pub struct ParameterSpec {
    pub identifier: &'static CStr,
    pub name: &'static CStr,
    pub description: &'static CStr,
    pub unit: &'static CStr,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub quantize_step: Option<f32>,
}

pub struct OutputSpec {
    pub identifier: &'static CStr,
    pub name: &'static CStr,
    pub description: &'static CStr,
    pub unit: &'static CStr,
    pub bin_count: Option<usize>,
    pub extents: Option<(f32, f32)>,
    pub quantize_step: Option<f32>,
    pub sample_type: SampleType,
    pub has_duration: bool,
}

impl OutputSpec {
    /// A single-valued output emitted once per block.
    pub const fn per_step(
        identifier: &'static CStr,
        name: &'static CStr,
        description: &'static CStr,
        unit: &'static CStr,
    ) -> Self {
        Self {
            identifier,
            name,
            description,
            unit,
            bin_count: Some(1),
            extents: None,
            quantize_step: None,
            sample_type: SampleType::OneSamplePerStep,
            has_duration: false,
        }
    }
}

/// A feature extractor that can be exposed through the Vamp ABI.
pub trait BuiltinPlugin: Send + 'static {
    const IDENTIFIER: &'static CStr;
    const NAME: &'static CStr;
    const DESCRIPTION: &'static CStr;
    const MAKER: &'static CStr = c"vamphost";
    const COPYRIGHT: &'static CStr = c"Freely redistributable (BSD license)";
    const VERSION: i32 = 1;
    const API_VERSION: u32 = ffi::VAMP_API_VERSION;
    const INPUT_DOMAIN: InputDomain = InputDomain::Time;
    const MIN_CHANNELS: usize = 1;

    fn parameters() -> Vec<ParameterSpec> {
        Vec::new()
    }

    fn programs() -> Vec<&'static CStr> {
        Vec::new()
    }

    fn new(input_sample_rate: f32) -> Self;

    fn outputs(&self) -> Vec<OutputSpec>;

    fn get_parameter(&self, _index: usize) -> f32 {
        0.0
    }

    fn set_parameter(&mut self, _index: usize, _value: f32) {}

    fn current_program(&self) -> usize {
        0
    }

    fn select_program(&mut self, _index: usize) {}

    /// 0 means no preference.
    fn preferred_block_size(&self) -> usize {
        0
    }

    fn preferred_step_size(&self) -> usize {
        0
    }

    fn initialise(&mut self, block_size: usize, step_size: usize) -> bool;

    fn reset(&mut self);

    /// `input` is one block of samples, or interleaved re/im spectrum bins
    /// for frequency-domain plugins.
    fn process(&mut self, input: &[f32], timestamp: Duration) -> FeatureSet;

    fn remaining_features(&mut self) -> FeatureSet {
        vec![Vec::new(); self.outputs().len()]
    }
}

fn domain_to_raw(domain: InputDomain) -> ffi::VampInputDomain {
    match domain {
        InputDomain::Time => ffi::VAMP_TIME_DOMAIN,
        InputDomain::Frequency => ffi::VAMP_FREQUENCY_DOMAIN,
    }
}

fn duration_to_raw(d: Duration) -> (c_int, c_int) {
    (
        c_int::try_from(d.as_secs()).unwrap_or(c_int::MAX),
        d.subsec_nanos() as c_int,
    )
}

/// Per-instance state behind a `VampPluginHandle`. Owns the buffers backing
/// the most recently returned feature set, which stay valid until the next
/// `process` or `getRemainingFeatures` call.
struct Instance<T> {
    plugin: T,
    input_len: usize,
    lists: Vec<ffi::VampFeatureList>,
    features: Vec<Vec<ffi::VampFeatureUnion>>,
    values: Vec<Vec<f32>>,
    labels: Vec<CString>,
}

impl<T: BuiltinPlugin> Instance<T> {
    fn export(&mut self, set: FeatureSet) -> *mut ffi::VampFeatureList {
        self.lists.clear();
        self.features.clear();
        self.values.clear();
        self.labels.clear();

        let output_count = self.plugin.outputs().len();
        for index in 0..output_count {
            let list = set.get(index).map(Vec::as_slice).unwrap_or_default();
            let mut v1 = Vec::with_capacity(list.len());
            let mut v2 = Vec::with_capacity(list.len());
            for feature in list {
                v1.push(ffi::VampFeatureUnion {
                    v1: self.export_feature(feature),
                });
                let (sec, nsec) = feature.duration.map(duration_to_raw).unwrap_or((0, 0));
                v2.push(ffi::VampFeatureUnion {
                    v2: ffi::VampFeatureV2 {
                        hasDuration: feature.duration.is_some() as c_int,
                        durationSec: sec,
                        durationNsec: nsec,
                    },
                });
            }
            v1.append(&mut v2);
            self.features.push(v1);
        }

        for features in &mut self.features {
            self.lists.push(ffi::VampFeatureList {
                featureCount: (features.len() / 2) as c_uint,
                features: if features.is_empty() {
                    ptr::null_mut()
                } else {
                    features.as_mut_ptr()
                },
            });
        }
        self.lists.as_mut_ptr()
    }

    fn export_feature(&mut self, feature: &Feature) -> ffi::VampFeature {
        let (sec, nsec) = feature.timestamp.map(duration_to_raw).unwrap_or((0, 0));

        let mut values = feature.values.clone();
        let values_ptr = if values.is_empty() {
            ptr::null_mut()
        } else {
            values.as_mut_ptr()
        };
        self.values.push(values);

        let label = feature
            .label
            .as_deref()
            .and_then(|l| CString::new(l).ok());
        let label_ptr = label
            .as_ref()
            .map_or(ptr::null_mut(), |l| l.as_ptr() as *mut c_char);
        self.labels.extend(label);

        ffi::VampFeature {
            hasTimestamp: feature.timestamp.is_some() as c_int,
            sec,
            nsec,
            valueCount: feature.values.len() as c_uint,
            values: values_ptr,
            label: label_ptr,
        }
    }
}

/// # Safety
/// `handle` must come from `instantiate::<T>` and not be cleaned up yet.
unsafe fn instance<'a, T>(handle: ffi::VampPluginHandle) -> &'a mut Instance<T> {
    unsafe { &mut *(handle as *mut Instance<T>) }
}

unsafe extern "C" fn instantiate<T: BuiltinPlugin>(
    _descriptor: *const ffi::VampPluginDescriptor,
    input_sample_rate: f32,
) -> ffi::VampPluginHandle {
    let instance = Instance {
        plugin: T::new(input_sample_rate),
        input_len: 0,
        lists: Vec::new(),
        features: Vec::new(),
        values: Vec::new(),
        labels: Vec::new(),
    };
    Box::into_raw(Box::new(instance)) as ffi::VampPluginHandle
}

unsafe extern "C" fn cleanup<T: BuiltinPlugin>(handle: ffi::VampPluginHandle) {
    drop(unsafe { Box::from_raw(handle as *mut Instance<T>) });
}

unsafe extern "C" fn initialise<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
    channels: c_uint,
    step_size: c_uint,
    block_size: c_uint,
) -> c_int {
    let instance = unsafe { instance::<T>(handle) };
    instance.input_len = 0;
    if (channels as usize) < T::MIN_CHANNELS || block_size == 0 || step_size == 0 {
        return 0;
    }
    let config = BlockConfig {
        block_size: block_size as usize,
        step_size: step_size as usize,
    };
    if !instance.plugin.initialise(config.block_size, config.step_size) {
        return 0;
    }
    instance.input_len = config.input_len(T::INPUT_DOMAIN);
    1
}

unsafe extern "C" fn reset<T: BuiltinPlugin>(handle: ffi::VampPluginHandle) {
    unsafe { instance::<T>(handle) }.plugin.reset();
}

unsafe extern "C" fn get_parameter<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
    index: c_int,
) -> f32 {
    unsafe { instance::<T>(handle) }
        .plugin
        .get_parameter(index as usize)
}

unsafe extern "C" fn set_parameter<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
    index: c_int,
    value: f32,
) {
    unsafe { instance::<T>(handle) }
        .plugin
        .set_parameter(index as usize, value);
}

unsafe extern "C" fn get_current_program<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
) -> c_uint {
    unsafe { instance::<T>(handle) }.plugin.current_program() as c_uint
}

unsafe extern "C" fn select_program<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
    index: c_uint,
) {
    unsafe { instance::<T>(handle) }
        .plugin
        .select_program(index as usize);
}

unsafe extern "C" fn get_preferred_step_size<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
) -> c_uint {
    unsafe { instance::<T>(handle) }.plugin.preferred_step_size() as c_uint
}

unsafe extern "C" fn get_preferred_block_size<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
) -> c_uint {
    unsafe { instance::<T>(handle) }.plugin.preferred_block_size() as c_uint
}

unsafe extern "C" fn get_min_channel_count<T: BuiltinPlugin>(
    _handle: ffi::VampPluginHandle,
) -> c_uint {
    T::MIN_CHANNELS as c_uint
}

unsafe extern "C" fn get_max_channel_count<T: BuiltinPlugin>(
    _handle: ffi::VampPluginHandle,
) -> c_uint {
    T::MIN_CHANNELS as c_uint
}

unsafe extern "C" fn get_output_count<T: BuiltinPlugin>(handle: ffi::VampPluginHandle) -> c_uint {
    unsafe { instance::<T>(handle) }.plugin.outputs().len() as c_uint
}

unsafe extern "C" fn get_output_descriptor<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
    index: c_uint,
) -> *mut ffi::VampOutputDescriptor {
    let outputs = unsafe { instance::<T>(handle) }.plugin.outputs();
    let Some(output) = outputs.get(index as usize) else {
        return ptr::null_mut();
    };

    let (sample_type, sample_rate) = match output.sample_type {
        SampleType::OneSamplePerStep => (ffi::VAMP_ONE_SAMPLE_PER_STEP, 0.0),
        SampleType::FixedSampleRate(rate) => (ffi::VAMP_FIXED_SAMPLE_RATE, rate),
        SampleType::VariableSampleRate(rate) => (ffi::VAMP_VARIABLE_SAMPLE_RATE, rate),
    };
    let (min_value, max_value) = output.extents.unwrap_or((0.0, 0.0));

    Box::into_raw(Box::new(ffi::VampOutputDescriptor {
        identifier: output.identifier.as_ptr(),
        name: output.name.as_ptr(),
        description: output.description.as_ptr(),
        unit: output.unit.as_ptr(),
        hasFixedBinCount: output.bin_count.is_some() as c_int,
        binCount: output.bin_count.unwrap_or(0) as c_uint,
        binNames: ptr::null(),
        hasKnownExtents: output.extents.is_some() as c_int,
        minValue: min_value,
        maxValue: max_value,
        isQuantized: output.quantize_step.is_some() as c_int,
        quantizeStep: output.quantize_step.unwrap_or(0.0),
        sampleType: sample_type,
        sampleRate: sample_rate,
        hasDuration: output.has_duration as c_int,
    }))
}

unsafe extern "C" fn release_output_descriptor(descriptor: *mut ffi::VampOutputDescriptor) {
    if !descriptor.is_null() {
        drop(unsafe { Box::from_raw(descriptor) });
    }
}

unsafe extern "C" fn process<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
    inputs: *const *const f32,
    sec: c_int,
    nsec: c_int,
) -> *mut ffi::VampFeatureList {
    let instance = unsafe { instance::<T>(handle) };
    if instance.input_len == 0 || inputs.is_null() {
        return ptr::null_mut();
    }
    let channel = unsafe { *inputs };
    if channel.is_null() {
        return ptr::null_mut();
    }
    let input = unsafe { std::slice::from_raw_parts(channel, instance.input_len) };
    let timestamp = if sec < 0 || nsec < 0 {
        Duration::ZERO
    } else {
        Duration::new(sec as u64, nsec as u32)
    };

    let set = instance.plugin.process(input, timestamp);
    instance.export(set)
}

unsafe extern "C" fn get_remaining_features<T: BuiltinPlugin>(
    handle: ffi::VampPluginHandle,
) -> *mut ffi::VampFeatureList {
    let instance = unsafe { instance::<T>(handle) };
    let set = instance.plugin.remaining_features();
    instance.export(set)
}

// Feature buffers are owned by the instance and reused on the next call.
unsafe extern "C" fn release_feature_set(_features: *mut ffi::VampFeatureList) {}

struct Entry {
    descriptor: Box<ffi::VampPluginDescriptor>,
    _parameters: Vec<Box<ffi::VampParameterDescriptor>>,
    _parameter_ptrs: Vec<*const ffi::VampParameterDescriptor>,
    _programs: Vec<*const c_char>,
}

/// The descriptor table behind an in-process entry point.
pub(crate) struct DescriptorTable {
    entries: Vec<Entry>,
}

// SAFETY: every pointer in the table refers to `'static` strings or to heap
// data owned by the table, and nothing mutates it after construction.
unsafe impl Send for DescriptorTable {}
unsafe impl Sync for DescriptorTable {}

impl DescriptorTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn with<T: BuiltinPlugin>(mut self) -> Self {
        let parameters: Vec<Box<ffi::VampParameterDescriptor>> = T::parameters()
            .into_iter()
            .map(|p| {
                Box::new(ffi::VampParameterDescriptor {
                    identifier: p.identifier.as_ptr(),
                    name: p.name.as_ptr(),
                    description: p.description.as_ptr(),
                    unit: p.unit.as_ptr(),
                    minValue: p.min_value,
                    maxValue: p.max_value,
                    defaultValue: p.default_value,
                    isQuantized: p.quantize_step.is_some() as c_int,
                    quantizeStep: p.quantize_step.unwrap_or(0.0),
                    valueNames: ptr::null(),
                })
            })
            .collect();
        let parameter_ptrs: Vec<*const ffi::VampParameterDescriptor> = parameters
            .iter()
            .map(|p| &**p as *const ffi::VampParameterDescriptor)
            .collect();
        let programs: Vec<*const c_char> = T::programs().iter().map(|p| p.as_ptr()).collect();

        let descriptor = Box::new(ffi::VampPluginDescriptor {
            vampApiVersion: T::API_VERSION,
            identifier: T::IDENTIFIER.as_ptr(),
            name: T::NAME.as_ptr(),
            description: T::DESCRIPTION.as_ptr(),
            maker: T::MAKER.as_ptr(),
            pluginVersion: T::VERSION,
            copyright: T::COPYRIGHT.as_ptr(),
            parameterCount: parameter_ptrs.len() as c_uint,
            parameters: if parameter_ptrs.is_empty() {
                ptr::null()
            } else {
                parameter_ptrs.as_ptr()
            },
            programCount: programs.len() as c_uint,
            programs: if programs.is_empty() {
                ptr::null()
            } else {
                programs.as_ptr()
            },
            inputDomain: domain_to_raw(T::INPUT_DOMAIN),
            instantiate: instantiate::<T>,
            cleanup: cleanup::<T>,
            initialise: initialise::<T>,
            reset: reset::<T>,
            getParameter: get_parameter::<T>,
            setParameter: set_parameter::<T>,
            getCurrentProgram: get_current_program::<T>,
            selectProgram: select_program::<T>,
            getPreferredStepSize: get_preferred_step_size::<T>,
            getPreferredBlockSize: get_preferred_block_size::<T>,
            getMinChannelCount: get_min_channel_count::<T>,
            getMaxChannelCount: get_max_channel_count::<T>,
            getOutputCount: get_output_count::<T>,
            getOutputDescriptor: get_output_descriptor::<T>,
            releaseOutputDescriptor: release_output_descriptor,
            process: process::<T>,
            getRemainingFeatures: get_remaining_features::<T>,
            releaseFeatureSet: release_feature_set,
        });

        self.entries.push(Entry {
            descriptor,
            _parameters: parameters,
            _parameter_ptrs: parameter_ptrs,
            _programs: programs,
        });
        self
    }

    /// Lookup with the semantics of `vampGetPluginDescriptor`.
    pub(crate) fn get(&self, version: c_uint, index: c_uint) -> *const ffi::VampPluginDescriptor {
        if version < 1 {
            return ptr::null();
        }
        self.entries
            .get(index as usize)
            .map_or(ptr::null(), |e| &*e.descriptor as *const _)
    }
}

static TABLE: OnceLock<DescriptorTable> = OnceLock::new();

unsafe extern "C" fn builtin_entry_point(
    version: c_uint,
    index: c_uint,
) -> *const ffi::VampPluginDescriptor {
    TABLE
        .get_or_init(|| {
            DescriptorTable::new()
                .with::<Rms>()
                .with::<ZeroCrossings>()
                .with::<SpectralRolloff>()
        })
        .get(version, index)
}

/// The library of plugins compiled into the host.
pub fn library() -> PluginLibrary {
    // SAFETY: the table lives in a static and is never modified.
    unsafe { PluginLibrary::from_entry_point(LIBRARY_NAME, builtin_entry_point) }
}
