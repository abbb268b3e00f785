//! `#[repr(C)]` mirror of the Vamp plugin ABI (`vamp/vamp.h`).

#![allow(non_snake_case)]

use std::ffi::{CStr, c_char, c_int, c_uint, c_void};

/// Highest ABI version this host understands.
pub const VAMP_API_VERSION: c_uint = 2;

/// Symbol every Vamp library exports.
pub const ENTRY_POINT: &[u8] = b"vampGetPluginDescriptor";

pub type VampPluginHandle = *mut c_void;

pub type VampSampleType = c_int;
pub const VAMP_ONE_SAMPLE_PER_STEP: VampSampleType = 0;
pub const VAMP_FIXED_SAMPLE_RATE: VampSampleType = 1;
pub const VAMP_VARIABLE_SAMPLE_RATE: VampSampleType = 2;

pub type VampInputDomain = c_int;
pub const VAMP_TIME_DOMAIN: VampInputDomain = 0;
pub const VAMP_FREQUENCY_DOMAIN: VampInputDomain = 1;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VampParameterDescriptor {
    pub identifier: *const c_char,
    pub name: *const c_char,
    pub description: *const c_char,
    pub unit: *const c_char,
    pub minValue: f32,
    pub maxValue: f32,
    pub defaultValue: f32,
    pub isQuantized: c_int,
    pub quantizeStep: f32,
    pub valueNames: *const *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VampOutputDescriptor {
    pub identifier: *const c_char,
    pub name: *const c_char,
    pub description: *const c_char,
    pub unit: *const c_char,
    pub hasFixedBinCount: c_int,
    pub binCount: c_uint,
    pub binNames: *const *const c_char,
    pub hasKnownExtents: c_int,
    pub minValue: f32,
    pub maxValue: f32,
    pub isQuantized: c_int,
    pub quantizeStep: f32,
    pub sampleType: VampSampleType,
    pub sampleRate: f32,
    /// API version 2 only.
    pub hasDuration: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VampFeature {
    pub hasTimestamp: c_int,
    pub sec: c_int,
    pub nsec: c_int,
    pub valueCount: c_uint,
    pub values: *mut f32,
    pub label: *mut c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VampFeatureV2 {
    pub hasDuration: c_int,
    pub durationSec: c_int,
    pub durationNsec: c_int,
}

/// For API version 2 the feature array holds `featureCount` v1 entries
/// followed by `featureCount` v2 entries.
#[repr(C)]
#[derive(Clone, Copy)]
pub union VampFeatureUnion {
    pub v1: VampFeature,
    pub v2: VampFeatureV2,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VampFeatureList {
    pub featureCount: c_uint,
    pub features: *mut VampFeatureUnion,
}

#[repr(C)]
pub struct VampPluginDescriptor {
    pub vampApiVersion: c_uint,
    pub identifier: *const c_char,
    pub name: *const c_char,
    pub description: *const c_char,
    pub maker: *const c_char,
    pub pluginVersion: c_int,
    pub copyright: *const c_char,
    pub parameterCount: c_uint,
    pub parameters: *const *const VampParameterDescriptor,
    pub programCount: c_uint,
    pub programs: *const *const c_char,
    pub inputDomain: VampInputDomain,

    pub instantiate:
        unsafe extern "C" fn(*const VampPluginDescriptor, f32) -> VampPluginHandle,
    pub cleanup: unsafe extern "C" fn(VampPluginHandle),
    pub initialise: unsafe extern "C" fn(VampPluginHandle, c_uint, c_uint, c_uint) -> c_int,
    pub reset: unsafe extern "C" fn(VampPluginHandle),
    pub getParameter: unsafe extern "C" fn(VampPluginHandle, c_int) -> f32,
    pub setParameter: unsafe extern "C" fn(VampPluginHandle, c_int, f32),
    pub getCurrentProgram: unsafe extern "C" fn(VampPluginHandle) -> c_uint,
    pub selectProgram: unsafe extern "C" fn(VampPluginHandle, c_uint),
    pub getPreferredStepSize: unsafe extern "C" fn(VampPluginHandle) -> c_uint,
    pub getPreferredBlockSize: unsafe extern "C" fn(VampPluginHandle) -> c_uint,
    pub getMinChannelCount: unsafe extern "C" fn(VampPluginHandle) -> c_uint,
    pub getMaxChannelCount: unsafe extern "C" fn(VampPluginHandle) -> c_uint,
    pub getOutputCount: unsafe extern "C" fn(VampPluginHandle) -> c_uint,
    pub getOutputDescriptor:
        unsafe extern "C" fn(VampPluginHandle, c_uint) -> *mut VampOutputDescriptor,
    pub releaseOutputDescriptor: unsafe extern "C" fn(*mut VampOutputDescriptor),
    pub process: unsafe extern "C" fn(
        VampPluginHandle,
        *const *const f32,
        c_int,
        c_int,
    ) -> *mut VampFeatureList,
    pub getRemainingFeatures: unsafe extern "C" fn(VampPluginHandle) -> *mut VampFeatureList,
    pub releaseFeatureSet: unsafe extern "C" fn(*mut VampFeatureList),
}

pub type VampGetPluginDescriptorFunction =
    unsafe extern "C" fn(c_uint, c_uint) -> *const VampPluginDescriptor;

/// Copy a nullable C string, treating null as empty.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub unsafe fn string_from(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Copy `count` entries of a nullable C string array. Null entries become
/// `None`; a null array yields an empty vector.
///
/// # Safety
/// `ptr` must be null or point to at least `count` string pointers.
pub unsafe fn strings_from(ptr: *const *const c_char, count: usize) -> Vec<Option<String>> {
    if ptr.is_null() {
        return Vec::new();
    }
    let entries = unsafe { std::slice::from_raw_parts(ptr, count) };
    entries
        .iter()
        .map(|&s| (!s.is_null()).then(|| unsafe { string_from(s) }))
        .collect()
}

/// Collect a null-terminated C string array (as used for `valueNames`).
///
/// # Safety
/// `ptr` must be null or point to an array terminated by a null pointer.
pub unsafe fn terminated_strings_from(ptr: *const *const c_char) -> Vec<String> {
    let mut names = Vec::new();
    if ptr.is_null() {
        return names;
    }
    let mut i = 0;
    loop {
        let s = unsafe { *ptr.add(i) };
        if s.is_null() {
            break;
        }
        names.push(unsafe { string_from(s) });
        i += 1;
    }
    names
}
