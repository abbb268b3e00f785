use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identifies a plugin uniquely on the current system: `<library>:<identifier>`.
///
/// The library part is the file stem of the plugin binary, e.g. the key
/// `example-plugin:rms` refers to plugin `rms` in `example-plugin.so`.
#[derive(Debug, Clone)]
pub struct PluginKey {
    key: String,
    pos: usize,
}

impl PluginKey {
    pub fn new(library: &str, identifier: &str) -> Result<Self> {
        if library.is_empty() || identifier.is_empty() || library.contains(':') {
            return Err(Error::InvalidKey(format!("{library}:{identifier}")));
        }
        Ok(Self {
            key: format!("{library}:{identifier}"),
            pos: library.len(),
        })
    }

    pub fn parse(key: &str) -> Result<Self> {
        match key.find(':') {
            Some(pos) if pos > 0 && pos < key.len() - 1 => Ok(Self {
                key: key.to_string(),
                pos,
            }),
            _ => Err(Error::InvalidKey(key.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn library(&self) -> &str {
        &self.key[..self.pos]
    }

    pub fn identifier(&self) -> &str {
        &self.key[self.pos + 1..]
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for PluginKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Equality, ordering and hashing follow the textual form so that maps keyed
// by `PluginKey` can be queried with `&str`.
impl PartialEq for PluginKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PluginKey {}

impl PartialOrd for PluginKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for PluginKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Borrow<str> for PluginKey {
    fn borrow(&self) -> &str {
        &self.key
    }
}

impl AsRef<str> for PluginKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys() {
        assert!(PluginKey::parse("x:y").is_ok());
        assert!(PluginKey::parse("library:y").is_ok());
        assert!(PluginKey::parse("x:identifier").is_ok());
    }

    #[test]
    fn invalid_keys() {
        for key in ["", "invalid", ":invalid", "invalid:"] {
            assert!(
                matches!(PluginKey::parse(key), Err(Error::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
        assert!(PluginKey::new("", "").is_err());
        assert!(PluginKey::new("lib", "").is_err());
    }

    #[test]
    fn decompose() {
        let key: PluginKey = "library:identifier".parse().unwrap();
        assert_eq!(key.as_str(), "library:identifier");
        assert_eq!(key.library(), "library");
        assert_eq!(key.identifier(), "identifier");
    }

    #[test]
    fn compose() {
        let key = PluginKey::new("library", "identifier").unwrap();
        assert_eq!(key.to_string(), "library:identifier");
        assert_eq!(key.library(), "library");
        assert_eq!(key.identifier(), "identifier");
    }

    #[test]
    fn identifier_may_contain_colon() {
        let key = PluginKey::parse("lib:a:b").unwrap();
        assert_eq!(key.library(), "lib");
        assert_eq!(key.identifier(), "a:b");
    }

    #[test]
    fn ordering() {
        assert_eq!(
            PluginKey::parse("a:b").unwrap(),
            PluginKey::new("a", "b").unwrap()
        );
        assert!(PluginKey::parse("a:b").unwrap() < PluginKey::parse("x:y").unwrap());
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(PluginKey::parse("lib:rms").unwrap(), 1);
        assert_eq!(map.get("lib:rms"), Some(&1));
        assert_eq!(map.get("lib:other"), None);
    }
}
