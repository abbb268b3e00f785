use std::time::Duration;

use super::ffi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDomain {
    Time,
    Frequency,
}

impl InputDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputDomain::Time => "time",
            InputDomain::Frequency => "frequency",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub quantize_step: Option<f32>,
    pub value_names: Vec<String>,
}

impl ParameterDescriptor {
    /// Clamp `value` into `[min_value, max_value]`.
    pub fn clamp(&self, value: f32) -> f32 {
        value.max(self.min_value).min(self.max_value)
    }

    /// # Safety
    /// `raw` must come from a live plugin descriptor.
    pub(crate) unsafe fn from_raw(raw: &ffi::VampParameterDescriptor) -> Self {
        unsafe {
            Self {
                identifier: ffi::string_from(raw.identifier),
                name: ffi::string_from(raw.name),
                description: ffi::string_from(raw.description),
                unit: ffi::string_from(raw.unit),
                min_value: raw.minValue,
                max_value: raw.maxValue,
                default_value: raw.defaultValue,
                quantize_step: (raw.isQuantized != 0).then_some(raw.quantizeStep),
                value_names: if raw.isQuantized != 0 {
                    ffi::terminated_strings_from(raw.valueNames)
                } else {
                    Vec::new()
                },
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleType {
    /// One feature per process call, stamped with the block timestamp.
    OneSamplePerStep,
    /// Features at a fixed rate (Hz) independent of the block rate.
    FixedSampleRate(f32),
    /// Features carry their own timestamps.
    VariableSampleRate(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub unit: String,
    /// `None` when the bin count varies from feature to feature.
    pub bin_count: Option<usize>,
    pub bin_names: Vec<String>,
    /// `(min, max)` when the plugin declares known extents.
    pub extents: Option<(f32, f32)>,
    pub quantize_step: Option<f32>,
    pub sample_type: SampleType,
    pub has_duration: bool,
}

impl OutputDescriptor {
    /// # Safety
    /// `raw` must come from `getOutputDescriptor` of a plugin with the given
    /// API version and not yet be released.
    pub(crate) unsafe fn from_raw(raw: &ffi::VampOutputDescriptor, api_version: u32) -> Self {
        let bin_count = (raw.hasFixedBinCount != 0).then_some(raw.binCount as usize);

        // Bin names are dropped entirely when none of them is set.
        let bin_names = match bin_count {
            Some(count) => {
                let names = unsafe { ffi::strings_from(raw.binNames, count) };
                if names.iter().any(Option::is_some) {
                    names.into_iter().map(Option::unwrap_or_default).collect()
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        let sample_type = match raw.sampleType {
            ffi::VAMP_FIXED_SAMPLE_RATE => SampleType::FixedSampleRate(raw.sampleRate),
            ffi::VAMP_VARIABLE_SAMPLE_RATE => SampleType::VariableSampleRate(raw.sampleRate),
            _ => SampleType::OneSamplePerStep,
        };

        unsafe {
            Self {
                identifier: ffi::string_from(raw.identifier),
                name: ffi::string_from(raw.name),
                description: ffi::string_from(raw.description),
                unit: ffi::string_from(raw.unit),
                bin_count,
                bin_names,
                extents: (raw.hasKnownExtents != 0).then_some((raw.minValue, raw.maxValue)),
                quantize_step: (raw.isQuantized != 0).then_some(raw.quantizeStep),
                sample_type,
                has_duration: api_version >= 2 && raw.hasDuration != 0,
            }
        }
    }
}

/// Static plugin metadata, readable without creating an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub maker: String,
    pub copyright: String,
    pub plugin_version: i32,
    pub vamp_api_version: u32,
    pub input_domain: InputDomain,
    pub parameters: Vec<ParameterDescriptor>,
    pub programs: Vec<String>,
}

impl PluginDescriptor {
    /// # Safety
    /// `raw` must be a descriptor returned by a library entry point that is
    /// still loaded.
    pub(crate) unsafe fn from_raw(raw: &ffi::VampPluginDescriptor) -> Self {
        let parameters = if raw.parameters.is_null() {
            Vec::new()
        } else {
            let ptrs = unsafe {
                std::slice::from_raw_parts(raw.parameters, raw.parameterCount as usize)
            };
            ptrs.iter()
                .filter(|p| !p.is_null())
                .map(|&p| unsafe { ParameterDescriptor::from_raw(&*p) })
                .collect()
        };
        let programs = unsafe { ffi::strings_from(raw.programs, raw.programCount as usize) }
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();

        unsafe {
            Self {
                identifier: ffi::string_from(raw.identifier),
                name: ffi::string_from(raw.name),
                description: ffi::string_from(raw.description),
                maker: ffi::string_from(raw.maker),
                copyright: ffi::string_from(raw.copyright),
                plugin_version: raw.pluginVersion,
                vamp_api_version: raw.vampApiVersion,
                input_domain: if raw.inputDomain == ffi::VAMP_FREQUENCY_DOMAIN {
                    InputDomain::Frequency
                } else {
                    InputDomain::Time
                },
                parameters,
                programs,
            }
        }
    }

    pub fn parameter(&self, identifier: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.identifier == identifier)
    }
}

/// Everything known about a plugin once instantiated at a sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginMetadata {
    pub key: super::PluginKey,
    pub descriptor: PluginDescriptor,
    pub outputs: Vec<OutputDescriptor>,
    pub preferred_block_size: Option<usize>,
    pub preferred_step_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub timestamp: Option<Duration>,
    pub duration: Option<Duration>,
    pub values: Vec<f32>,
    pub label: Option<String>,
}

impl Feature {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            timestamp: None,
            duration: None,
            values,
            label: None,
        }
    }
}

/// Features returned by one process call, one list per output.
pub type FeatureSet = Vec<Vec<Feature>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn raw_output(bin_names: *const *const std::ffi::c_char) -> ffi::VampOutputDescriptor {
        ffi::VampOutputDescriptor {
            identifier: std::ptr::null(),
            name: std::ptr::null(),
            description: std::ptr::null(),
            unit: std::ptr::null(),
            hasFixedBinCount: 1,
            binCount: 2,
            binNames: bin_names,
            hasKnownExtents: 1,
            minValue: -1.0,
            maxValue: 1.0,
            isQuantized: 0,
            quantizeStep: 0.0,
            sampleType: ffi::VAMP_VARIABLE_SAMPLE_RATE,
            sampleRate: 10.0,
            hasDuration: 1,
        }
    }

    #[test]
    fn all_null_bin_names_are_dropped() {
        let names = [std::ptr::null(), std::ptr::null()];
        let out = unsafe { OutputDescriptor::from_raw(&raw_output(names.as_ptr()), 2) };
        assert!(out.bin_names.is_empty());
        assert_eq!(out.bin_count, Some(2));
        assert_eq!(out.extents, Some((-1.0, 1.0)));
        assert_eq!(out.sample_type, SampleType::VariableSampleRate(10.0));
        assert!(out.has_duration);
    }

    #[test]
    fn partial_bin_names_are_padded() {
        let left = CString::new("left").unwrap();
        let names = [left.as_ptr(), std::ptr::null()];
        let out = unsafe { OutputDescriptor::from_raw(&raw_output(names.as_ptr()), 2) };
        assert_eq!(out.bin_names, vec!["left".to_string(), String::new()]);
    }

    #[test]
    fn duration_ignored_for_api_v1() {
        let out = unsafe { OutputDescriptor::from_raw(&raw_output(std::ptr::null()), 1) };
        assert!(!out.has_duration);
    }

    #[test]
    fn clamp_parameter() {
        let param = ParameterDescriptor {
            identifier: "gain".into(),
            name: "Gain".into(),
            description: String::new(),
            unit: "dB".into(),
            min_value: -6.0,
            max_value: 6.0,
            default_value: 0.0,
            quantize_step: None,
            value_names: Vec::new(),
        };
        assert_eq!(param.clamp(10.0), 6.0);
        assert_eq!(param.clamp(-10.0), -6.0);
        assert_eq!(param.clamp(1.5), 1.5);
    }
}
