//! Scan history records and resolved countries.

use super::countries::country_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Offset from an ASCII capital letter to its regional indicator symbol.
const REGIONAL_INDICATOR_OFFSET: u32 = 0x1F1E6 - 'A' as u32;

/// Builds the flag emoji for an ISO 3166-1 alpha-2 code.
///
/// Each letter maps to its regional indicator symbol; characters that are
/// not ASCII letters are skipped.
pub fn flag_glyph(country_code: &str) -> String {
    country_code
        .chars()
        .filter(char::is_ascii_alphabetic)
        .filter_map(|c| char::from_u32(c.to_ascii_uppercase() as u32 + REGIONAL_INDICATOR_OFFSET))
        .collect()
}

/// The country a barcode resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCountry {
    /// ISO 3166-1 alpha-2 code, upper case.
    pub code: String,
    /// Name in the primary (English) locale.
    pub name_primary: String,
    /// Name in the user's locale.
    pub name_localized: String,
}

impl ResolvedCountry {
    pub fn new(
        code: impl Into<String>,
        name_primary: impl Into<String>,
        name_localized: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into().trim().to_ascii_uppercase(),
            name_primary: name_primary.into(),
            name_localized: name_localized.into(),
        }
    }

    /// Names the country from the ISO 3166 table, or `None` for an
    /// unassigned code.
    pub fn resolve(code: &str) -> Option<Self> {
        country_name(code).map(|name| Self::new(code, name, name))
    }

    /// Like [`ResolvedCountry::resolve`], but an unknown code is used as its
    /// own name.
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        Self::resolve(&code).unwrap_or_else(|| {
            let code = code.trim().to_ascii_uppercase();
            Self::new(code.clone(), code.clone(), code)
        })
    }

    pub fn flag(&self) -> String {
        flag_glyph(&self.code)
    }
}

/// One accepted, entitlement-processed scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHistoryItem {
    pub id: Uuid,
    pub country_code: String,
    pub country_name_primary: String,
    pub country_name_localized: String,
    pub flag_glyph: String,
    pub barcode: String,
    pub scanned_at: DateTime<Utc>,
}

impl ScanHistoryItem {
    pub fn new(
        barcode: impl Into<String>,
        country: &ResolvedCountry,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            country_code: country.code.clone(),
            country_name_primary: country.name_primary.clone(),
            country_name_localized: country.name_localized.clone(),
            flag_glyph: country.flag(),
            barcode: barcode.into(),
            scanned_at,
        }
    }

    /// Returns the same entry with a new timestamp.
    pub fn refreshed(&self, scanned_at: DateTime<Utc>) -> Self {
        Self {
            scanned_at,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_glyph() {
        assert_eq!(flag_glyph("US"), "\u{1F1FA}\u{1F1F8}");
        assert_eq!(flag_glyph("de"), "\u{1F1E9}\u{1F1EA}");
        assert_eq!(flag_glyph(""), "");
    }

    #[test]
    fn test_from_code_normalises() {
        let country = ResolvedCountry::from_code(" fr ");
        assert_eq!(country.code, "FR");
        assert_eq!(country.name_primary, "France");
        assert_eq!(country.name_localized, "France");
        assert_eq!(country.flag(), "\u{1F1EB}\u{1F1F7}");
    }

    #[test]
    fn test_unknown_code_named_by_itself() {
        assert_eq!(ResolvedCountry::resolve("XX"), None);
        let country = ResolvedCountry::from_code("xx");
        assert_eq!(country.code, "XX");
        assert_eq!(country.name_primary, "XX");
    }

    #[test]
    fn test_refreshed_keeps_identity() {
        let country = ResolvedCountry::new("JP", "Japan", "Japan");
        let item = ScanHistoryItem::new("4901234567894", &country, Utc::now());
        let later = item.scanned_at + chrono::Duration::seconds(30);
        let refreshed = item.refreshed(later);

        assert_eq!(refreshed.id, item.id);
        assert_eq!(refreshed.barcode, item.barcode);
        assert_eq!(refreshed.scanned_at, later);
    }
}
