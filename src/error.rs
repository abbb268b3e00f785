use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load plugin library {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin identifier {identifier:?} is ambiguous (matches {})", .candidates.join(", "))]
    AmbiguousIdentifier {
        identifier: String,
        candidates: Vec<String>,
    },

    #[error("Invalid configuration for {plugin}: {reason}")]
    InvalidConfiguration { plugin: String, reason: String },

    #[error("Unknown parameter {parameter:?} for {plugin}")]
    UnknownParameter { plugin: String, parameter: String },

    #[error("Unknown program {program:?} for {plugin}")]
    UnknownProgram { plugin: String, program: String },

    #[error("Invalid plugin key: {0:?} (expected <library>:<identifier>)")]
    InvalidKey(String),

    #[error("Invalid block for {plugin}: expected {expected} values, got {actual}")]
    InvalidBlock {
        plugin: String,
        expected: usize,
        actual: usize,
    },

    #[error("{0} must be initialised before processing")]
    NotInitialised(String),

    #[error("Plugin {plugin} not supported: {reason}")]
    Unsupported { plugin: String, reason: String },

    #[error("Plugin {0} was already added")]
    DuplicatePlugin(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_lists_candidates() {
        let err = Error::AmbiguousIdentifier {
            identifier: "rms".into(),
            candidates: vec!["a:rms".into(), "b:rms".into()],
        };
        assert_eq!(
            err.to_string(),
            "Plugin identifier \"rms\" is ambiguous (matches a:rms, b:rms)"
        );
    }

    #[test]
    fn load_error_names_path() {
        let err = Error::Load {
            path: PathBuf::from("/tmp/missing.so"),
            reason: "file does not exist".into(),
        };
        assert!(err.to_string().contains("/tmp/missing.so"));
    }
}
