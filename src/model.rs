//! SiteRecord, SiteSet, NwisError, parameter codes and column aliases
//!
//! Core data types for the groundwater-level retrieval service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O: only types, the error enum and the
//! handful of ordering rules that belong to them.

use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Parameter codes
// ---------------------------------------------------------------------------

/// USGS parameter code for groundwater level above NAVD 1988, in feet.
pub const PARAM_GW_LEVEL_NAVD88: &str = "62611";

/// USGS parameter code for depth to water level below land surface, in feet.
pub const PARAM_DEPTH_BELOW_LAND: &str = "72019";

/// Parameter codes kept in the retriever's final output by default.
pub const DEFAULT_KEEP_PARAMETER_CODES: &[&str] = &[PARAM_GW_LEVEL_NAVD88, PARAM_DEPTH_BELOW_LAND];

/// Horizontal datum every located site must be expressed in.
pub const DEFAULT_REFERENCE_DATUM: &str = "NAD83";

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

/// Canonical site identifier column used in every table this crate emits.
pub const SITE_NO: &str = "site_no";

/// Names the identifier has been published under, in lookup order.
pub const SITE_ID_ALIASES: &[&str] = &[SITE_NO, "site_id", "monitoring_location_id"];

/// Parameter-code column in level data, primary name first.
pub const PARAMETER_CODE_ALIASES: &[&str] = &["parm_cd", "parameter_cd", "param_cd", "pcode"];

/// Site-info columns projected onto every measurement row.
pub const ALT_VALUE: &str = "alt_va";
pub const ALT_DATUM: &str = "alt_datum_cd";
pub const WELL_DEPTH_EXACT: &str = "well_depth_va";
pub const WELL_DEPTH_FRAGMENT: &str = "well_depth";

/// Output names for the joined metadata.
pub const LAND_SURFACE_ELEV: &str = "land_surface_elev";
pub const LAND_SURFACE_ELEV_DATUM: &str = "land_surface_elev_datum";
pub const WELL_DEPTH: &str = "well_depth";

/// Site directory RDB columns.
pub const DEC_LAT: &str = "dec_lat_va";
pub const DEC_LONG: &str = "dec_long_va";
pub const DEC_COORD_DATUM: &str = "dec_coord_datum_cd";

/// Header of the site locator's output file.
pub const SITE_FILE_HEADER: [&str; 3] = [SITE_NO, "lat_nad83", "lon_nad83"];

// ---------------------------------------------------------------------------
// Site types
// ---------------------------------------------------------------------------

/// One monitoring location from the USGS site directory.
///
/// `site_no` is opaque: it is kept exactly as the service sent it, since
/// identifiers routinely carry leading zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub site_no: String,
    pub lat: f64,
    pub lon: f64,
    pub datum: Option<String>,
}

impl SiteRecord {
    /// Ordering used for the site file: identifier, then latitude, then longitude.
    /// Signed zeros compare equal, so equal tuples always end up adjacent.
    pub fn sort_key_cmp(&self, other: &Self) -> Ordering {
        self.site_no
            .cmp(&other.site_no)
            .then_with(|| unsigned_zero(self.lat).total_cmp(&unsigned_zero(other.lat)))
            .then_with(|| unsigned_zero(self.lon).total_cmp(&unsigned_zero(other.lon)))
    }

    /// Whether two records describe the same (site_no, lat, lon) tuple.
    pub fn same_location(&self, other: &Self) -> bool {
        self.site_no == other.site_no && self.lat == other.lat && self.lon == other.lon
    }
}

fn unsigned_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

/// Deduplicated, sorted set of located sites.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSet {
    sites: Vec<SiteRecord>,
}

impl SiteSet {
    /// Builds the set from raw records: sorts by (site_no, lat, lon) and
    /// collapses duplicate tuples, keeping the first occurrence.
    pub fn from_records(mut records: Vec<SiteRecord>) -> Self {
        records.sort_by(SiteRecord::sort_key_cmp);
        records.dedup_by(|b, a| a.same_location(b));
        SiteSet { sites: records }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.iter()
    }

    pub fn site_codes(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.site_no.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or processing USGS NWIS data.
#[derive(Debug, PartialEq)]
pub enum NwisError {
    /// Invalid configuration or input, detected before any remote call.
    Config(String),
    /// A local file could not be read or written.
    Io { path: String, message: String },
    /// The request never produced a response (connect failure, timeout, ...).
    Request(String),
    /// Non-2xx HTTP response from the USGS API.
    HttpError(u16),
    /// The response body could not be interpreted.
    ParseError(String),
    /// Every batch for a table came back empty.
    NoDataReturned(String),
    /// A table operation (CSV read/write, join, stacking) failed.
    Table(String),
    /// A required column was absent under every known name.
    MissingColumn {
        table: String,
        logical: String,
        tried: Vec<String>,
    },
}

impl std::fmt::Display for NwisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NwisError::Config(msg) => write!(f, "Configuration error: {}", msg),
            NwisError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
            NwisError::Request(msg) => write!(f, "Request failed: {}", msg),
            NwisError::HttpError(code) => write!(f, "HTTP error: {}", code),
            NwisError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            NwisError::NoDataReturned(what) => write!(f, "No data returned: {}", what),
            NwisError::Table(msg) => write!(f, "Table error: {}", msg),
            NwisError::MissingColumn { table, logical, tried } => write!(
                f,
                "Missing column: {} table has no '{}' column (tried: {})",
                table,
                logical,
                tried.join(", ")
            ),
        }
    }
}

impl std::error::Error for NwisError {}

impl From<reqwest::Error> for NwisError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => NwisError::HttpError(status.as_u16()),
            None => NwisError::Request(err.to_string()),
        }
    }
}

impl From<polars::prelude::PolarsError> for NwisError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        NwisError::Table(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn site(site_no: &str, lat: f64, lon: f64) -> SiteRecord {
        SiteRecord {
            site_no: site_no.to_string(),
            lat,
            lon,
            datum: Some("NAD83".to_string()),
        }
    }

    #[test]
    fn test_site_set_collapses_identical_tuples() {
        let set = SiteSet::from_records(vec![
            site("382000120100001", 38.1, -120.2),
            site("382000120100001", 38.1, -120.2),
            site("382000120100001", 38.2, -120.2),
            site("381500120300001", 38.25, -120.3),
        ]);
        assert_eq!(set.len(), 3, "4 rows with 3 distinct tuples should give 3 sites");
    }

    #[test]
    fn test_signed_zero_coordinates_are_the_same_location() {
        let set = SiteSet::from_records(vec![
            site("001", -0.0, 0.7),
            site("001", 0.0, 0.5),
            site("001", 0.0, 0.7),
            site("001", 0.0, -0.0),
            site("001", -0.0, 0.0),
        ]);
        assert_eq!(set.len(), 3, "0.0 and -0.0 are one coordinate");
    }

    #[test]
    fn test_site_set_sorts_by_identifier_then_lat_then_lon() {
        let set = SiteSet::from_records(vec![
            site("B", 1.0, 5.0),
            site("A", 2.0, 1.0),
            site("A", 1.0, 9.0),
            site("A", 1.0, 3.0),
        ]);
        let order: Vec<(&str, f64, f64)> = set.iter().map(|s| (s.site_no.as_str(), s.lat, s.lon)).collect();
        assert_eq!(
            order,
            vec![("A", 1.0, 3.0), ("A", 1.0, 9.0), ("A", 2.0, 1.0), ("B", 1.0, 5.0)]
        );
    }

    #[test]
    fn test_site_numbers_keep_leading_zeros() {
        let set = SiteSet::from_records(vec![site("001", 0.5, 0.5)]);
        assert_eq!(set.site_codes(), vec!["001"]);
    }

    #[test]
    fn test_parameter_codes_are_valid_and_distinct() {
        assert_eq!(PARAM_GW_LEVEL_NAVD88.len(), 5);
        assert_eq!(PARAM_DEPTH_BELOW_LAND.len(), 5);
        assert!(PARAM_GW_LEVEL_NAVD88.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(PARAM_GW_LEVEL_NAVD88, PARAM_DEPTH_BELOW_LAND);
    }

    #[test]
    fn test_missing_column_message_names_logical_column() {
        let err = NwisError::MissingColumn {
            table: "groundwater levels".to_string(),
            logical: "parameter code".to_string(),
            tried: vec!["parm_cd".to_string(), "pcode".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("parameter code"), "got: {}", msg);
        assert!(msg.contains("parm_cd, pcode"), "got: {}", msg);
    }
}
