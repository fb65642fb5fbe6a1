//! User-maintained country preferences.
//!
//! A country can be marked as supported, boycotted, both or neither. The
//! lists are shown next to lookup results; they never affect the quota.
//! Only assigned ISO 3166-1 alpha-2 codes can be marked.

use crate::ledger::{is_known_country, read_json, write_json_atomic, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while changing preferences.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreferencesError {
    #[error("unknown country code {0:?}")]
    UnknownCountry(String),
}

/// How the user has marked a country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryStance {
    Neutral,
    Supported,
    Boycotted,
    /// Marked on both lists.
    Conflicted,
}

/// Supported and boycotted country codes, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryPreferences {
    #[serde(default)]
    supported: Vec<String>,
    #[serde(default)]
    boycotted: Vec<String>,
}

fn set_membership(
    list: &mut Vec<String>,
    code: &str,
    member: bool,
) -> Result<(), PreferencesError> {
    let code = code.trim().to_ascii_uppercase();
    if !is_known_country(&code) {
        return Err(PreferencesError::UnknownCountry(code));
    }
    if member {
        if !list.contains(&code) {
            list.push(code);
        }
    } else {
        list.retain(|c| *c != code);
    }
    Ok(())
}

impl CountryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads preferences from a JSON file; a missing file yields empty lists.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        Ok(read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.supported.iter().any(|c| c.eq_ignore_ascii_case(code.trim()))
    }

    pub fn is_boycotted(&self, code: &str) -> bool {
        self.boycotted.iter().any(|c| c.eq_ignore_ascii_case(code.trim()))
    }

    pub fn set_supported(&mut self, code: &str, supported: bool) -> Result<(), PreferencesError> {
        set_membership(&mut self.supported, code, supported)
    }

    pub fn set_boycotted(&mut self, code: &str, boycotted: bool) -> Result<(), PreferencesError> {
        set_membership(&mut self.boycotted, code, boycotted)
    }

    /// Flips the supported mark. Returns the new value.
    pub fn toggle_supported(&mut self, code: &str) -> Result<bool, PreferencesError> {
        let next = !self.is_supported(code);
        self.set_supported(code, next)?;
        Ok(next)
    }

    /// Flips the boycotted mark. Returns the new value.
    pub fn toggle_boycotted(&mut self, code: &str) -> Result<bool, PreferencesError> {
        let next = !self.is_boycotted(code);
        self.set_boycotted(code, next)?;
        Ok(next)
    }

    pub fn stance(&self, code: &str) -> CountryStance {
        match (self.is_supported(code), self.is_boycotted(code)) {
            (false, false) => CountryStance::Neutral,
            (true, false) => CountryStance::Supported,
            (false, true) => CountryStance::Boycotted,
            (true, true) => CountryStance::Conflicted,
        }
    }

    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    pub fn boycotted(&self) -> &[String] {
        &self.boycotted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_idempotent_and_case_insensitive() {
        let mut prefs = CountryPreferences::new();
        prefs.set_supported("de", true).unwrap();
        prefs.set_supported("DE", true).unwrap();
        assert_eq!(prefs.supported(), ["DE"]);
        assert!(prefs.is_supported("de"));

        prefs.set_supported("De", false).unwrap();
        assert!(prefs.supported().is_empty());
    }

    #[test]
    fn test_unknown_code_rejected() {
        let mut prefs = CountryPreferences::new();
        assert_eq!(
            prefs.set_boycotted("xx", true),
            Err(PreferencesError::UnknownCountry("XX".to_string()))
        );
        assert!(prefs.toggle_supported("").is_err());
        assert!(prefs.toggle_supported("USA").is_err());
        assert!(prefs.supported().is_empty());
        assert!(prefs.boycotted().is_empty());
    }

    #[test]
    fn test_toggle_and_stance() {
        let mut prefs = CountryPreferences::new();
        assert_eq!(prefs.stance("FR"), CountryStance::Neutral);
        assert!(prefs.toggle_boycotted("FR").unwrap());
        assert_eq!(prefs.stance("FR"), CountryStance::Boycotted);
        assert!(prefs.toggle_supported("FR").unwrap());
        assert_eq!(prefs.stance("FR"), CountryStance::Conflicted);
        assert!(!prefs.toggle_boycotted("FR").unwrap());
        assert_eq!(prefs.stance("FR"), CountryStance::Supported);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("origin-scan-{}", uuid::Uuid::new_v4()));
        let path = dir.join("preferences.json");

        assert_eq!(CountryPreferences::load(&path).unwrap(), CountryPreferences::new());

        let mut prefs = CountryPreferences::new();
        prefs.set_supported("JP", true).unwrap();
        prefs.set_boycotted("KP", true).unwrap();
        prefs.save(&path).unwrap();

        assert_eq!(CountryPreferences::load(&path).unwrap(), prefs);
        let _ = std::fs::remove_dir_all(dir);
    }
}
