//! Site locator: find monitoring sites inside a polygon.
//!
//! One site-directory request covers the polygon's bounding box; the RDB
//! rows are then filtered by datum and by the polygon itself, collapsed to
//! distinct `(site_no, lat, lon)` tuples and written out sorted.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::ingest::rdb::{RdbDocument, parse_rdb};
use crate::ingest::usgs::WaterService;
use crate::logging::{self, DataSource};
use crate::model::{DEC_COORD_DATUM, DEC_LAT, DEC_LONG, NwisError, SITE_FILE_HEADER, SITE_NO, SiteRecord, SiteSet};
use crate::region::{BoundaryRule, Polygon};
use crate::table::io_error;

/// Filters applied to parsed site rows.
#[derive(Debug, Clone)]
pub struct SiteFilter<'a> {
    pub polygon: &'a Polygon,
    pub boundary: BoundaryRule,
    /// Required horizontal datum; rows without a datum are accepted.
    pub datum: &'a str,
}

impl SiteFilter<'_> {
    /// A record with a non-empty datum other than the reference is rejected.
    pub fn accepts_datum(&self, record: &SiteRecord) -> bool {
        match record.datum.as_deref() {
            Some(d) if !d.is_empty() => d == self.datum,
            _ => true,
        }
    }

    pub fn accepts(&self, record: &SiteRecord) -> bool {
        self.accepts_datum(record) && self.polygon.contains_point(record.lon, record.lat, self.boundary)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Turns a site-directory RDB body into records.
///
/// Rows without an identifier, or whose coordinates are missing or not
/// numeric, are dropped without failing the run.
pub fn parse_site_records(body: &str) -> Vec<SiteRecord> {
    let doc = parse_rdb(body);

    let (Some(site_idx), Some(lat_idx), Some(lon_idx)) = (
        doc.column_index(SITE_NO),
        doc.column_index(DEC_LAT),
        doc.column_index(DEC_LONG),
    ) else {
        return Vec::new();
    };
    let datum_idx = doc.column_index(DEC_COORD_DATUM);

    doc.rows
        .iter()
        .filter_map(|row| {
            let site_no = RdbDocument::field(row, site_idx).filter(|s| !s.is_empty())?;
            let lat = parse_coordinate(RdbDocument::field(row, lat_idx)?)?;
            let lon = parse_coordinate(RdbDocument::field(row, lon_idx)?)?;
            let datum = datum_idx
                .and_then(|i| RdbDocument::field(row, i))
                .filter(|d| !d.is_empty())
                .map(String::from);

            Some(SiteRecord {
                site_no: site_no.to_string(),
                lat,
                lon,
                datum,
            })
        })
        .collect()
}

fn parse_coordinate(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Applies the datum and polygon filters and builds the sorted set.
pub fn filter_sites(records: Vec<SiteRecord>, filter: &SiteFilter<'_>) -> SiteSet {
    SiteSet::from_records(records.into_iter().filter(|r| filter.accepts(r)).collect())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Coordinates are written in shortest round-trip form, always with a
/// fractional part (`38.0`, not `38`).
fn format_coordinate(value: f64) -> String {
    format!("{:?}", value)
}

pub fn render_site_file(sites: &SiteSet) -> String {
    let mut out = SITE_FILE_HEADER.join(",");
    out.push('\n');
    for site in sites.iter() {
        out.push_str(&format!(
            "{},{},{}\n",
            site.site_no,
            format_coordinate(site.lat),
            format_coordinate(site.lon)
        ));
    }
    out
}

pub fn write_site_file(path: &Path, sites: &SiteSet) -> Result<(), NwisError> {
    fs::write(path, render_site_file(sites)).map_err(|e| io_error(path, e))
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Queries the site directory and returns the filtered site set.
pub fn locate_sites(service: &dyn WaterService, config: &Config) -> Result<SiteSet, NwisError> {
    let polygon = config.polygon()?;
    let bbox = polygon.bounding_box();
    let query = config.site_query(bbox);

    logging::debug(
        DataSource::SiteDirectory,
        None,
        &format!("Querying sites in bBox {}", bbox.to_query_value()),
    );
    let body = service.site_directory(&query)?;

    let records = parse_site_records(&body);
    let parsed = records.len();
    let filter = SiteFilter {
        polygon: &polygon,
        boundary: config.locator.boundary,
        datum: &config.locator.datum,
    };
    let sites = filter_sites(records, &filter);

    logging::debug(
        DataSource::SiteDirectory,
        None,
        &format!("{} rows parsed, {} distinct sites inside polygon", parsed, sites.len()),
    );
    Ok(sites)
}

/// Locates sites and writes the site file; returns the number written.
pub fn run(service: &dyn WaterService, config: &Config) -> Result<usize, NwisError> {
    let sites = locate_sites(service, config)?;
    write_site_file(&config.locator.output, &sites)?;
    logging::debug(
        DataSource::File,
        None,
        &format!("Site file written to {}", config.locator.output.display()),
    );
    Ok(sites.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
