//! Measurement retriever: groundwater levels plus site metadata.
//!
//! Site numbers are requested in fixed-size batches so each URL stays
//! within service limits. Batch results are stacked, the site metadata is
//! left-joined onto the level rows, and only the wanted parameter codes are
//! written out.
//!
//! Output columns are the level columns followed by `land_surface_elev`,
//! `land_surface_elev_datum` and `well_depth`, whether or not the service
//! publishes those fields for the requested sites.

use std::path::Path;

use crate::config::{BatchErrorPolicy, Config};
use crate::ingest::usgs::{DateRange, WaterService};
use crate::logging::{self, DataSource};
use crate::model::{
    ALT_DATUM, ALT_VALUE, LAND_SURFACE_ELEV, LAND_SURFACE_ELEV_DATUM, NwisError, PARAMETER_CODE_ALIASES,
    SITE_NO, WELL_DEPTH, WELL_DEPTH_EXACT, WELL_DEPTH_FRAGMENT,
};
use crate::report::{BatchCounts, RunSummary};
use crate::table::Table;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Site numbers from a site file, in file order, as written (no numeric
/// interpretation). Blank cells are skipped.
pub fn site_ids_from_table(table: &Table, source: &str) -> Result<Vec<String>, NwisError> {
    let values = table.column_values(SITE_NO).ok_or_else(|| NwisError::MissingColumn {
        table: source.to_string(),
        logical: "site number".to_string(),
        tried: vec![SITE_NO.to_string()],
    })?;

    let ids: Vec<String> = values
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();

    if ids.is_empty() {
        return Err(NwisError::Config(format!("No site numbers found in {}", source)));
    }
    Ok(ids)
}

pub fn read_site_ids(path: &Path) -> Result<Vec<String>, NwisError> {
    let table = Table::read_csv(path)?;
    site_ids_from_table(&table, &path.display().to_string())
}

/// Contiguous batches of at most `size` ids, in input order.
pub fn make_batches(ids: &[String], size: usize) -> Result<Vec<&[String]>, NwisError> {
    if size == 0 {
        return Err(NwisError::Config("batch_size must be at least 1".to_string()));
    }
    Ok(ids.chunks(size).collect())
}

fn batch_label(index: usize, total: usize, batch: &[String]) -> String {
    match (batch.first(), batch.last()) {
        (Some(first), Some(last)) if batch.len() > 1 => {
            format!("batch {}/{} {}..{}", index + 1, total, first, last)
        }
        (Some(only), _) => format!("batch {}/{} {}", index + 1, total, only),
        _ => format!("batch {}/{}", index + 1, total),
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// What to ask the levels service for.
#[derive(Debug, Clone)]
pub struct LevelsRequest<'a> {
    pub parameter_cd: &'a str,
    pub range: DateRange,
}

/// Non-empty tables gathered from all batches.
#[derive(Debug, Default)]
pub struct BatchResults {
    pub levels: Vec<Table>,
    pub site_info: Vec<Table>,
    pub levels_counts: BatchCounts,
    pub site_info_counts: BatchCounts,
    pub skipped: Vec<String>,
}

/// Applies the batch failure policy to one call's result. `Ok(None)` means
/// the failure was logged and skipped.
fn settle(
    result: Result<Table, NwisError>,
    policy: BatchErrorPolicy,
    source: DataSource,
    label: &str,
    operation: &str,
    counts: &mut BatchCounts,
) -> Result<Option<Table>, NwisError> {
    match result {
        Ok(table) => Ok(Some(table)),
        Err(err) => {
            logging::log_batch_failure(source, label, operation, &err);
            match policy {
                BatchErrorPolicy::Abort => Err(err),
                BatchErrorPolicy::Skip => {
                    counts.failed += 1;
                    Ok(None)
                }
            }
        }
    }
}

/// Requests levels and site metadata for every batch, one batch at a time.
/// Empty tables are dropped; they are never an error by themselves.
pub fn fetch_batches(
    service: &dyn WaterService,
    batches: &[&[String]],
    request: &LevelsRequest<'_>,
    policy: BatchErrorPolicy,
) -> Result<BatchResults, NwisError> {
    let mut results = BatchResults::default();
    results.levels_counts.total = batches.len();
    results.site_info_counts.total = batches.len();

    for (i, batch) in batches.iter().enumerate() {
        let label = batch_label(i, batches.len(), batch);
        logging::debug(DataSource::GroundwaterLevels, Some(&label), &format!("Requesting {} sites", batch.len()));

        let levels = settle(
            service.groundwater_levels(batch, request.parameter_cd, &request.range),
            policy,
            DataSource::GroundwaterLevels,
            &label,
            "groundwater levels",
            &mut results.levels_counts,
        )?;
        let info = settle(
            service.site_info(batch),
            policy,
            DataSource::SiteInfo,
            &label,
            "site info",
            &mut results.site_info_counts,
        )?;

        if levels.is_none() || info.is_none() {
            results.skipped.push(label.clone());
        }

        if let Some(table) = levels.filter(|t| !t.is_empty()) {
            results.levels_counts.with_data += 1;
            results.levels.push(table);
        }
        if let Some(table) = info.filter(|t| !t.is_empty()) {
            results.site_info_counts.with_data += 1;
            results.site_info.push(table);
        }
    }

    logging::log_batch_summary(
        DataSource::GroundwaterLevels,
        results.levels_counts.total,
        results.levels_counts.with_data,
        results.levels_counts.failed,
    );
    logging::log_batch_summary(
        DataSource::SiteInfo,
        results.site_info_counts.total,
        results.site_info_counts.with_data,
        results.site_info_counts.failed,
    );

    Ok(results)
}

/// Stacks batch tables; at least one must be present.
pub fn combine_batches(tables: Vec<Table>, what: &str) -> Result<Table, NwisError> {
    if tables.is_empty() {
        return Err(NwisError::NoDataReturned(format!("no {} returned for any site batch", what)));
    }
    Table::concat(tables)?.normalize_site_column(what)
}

// ---------------------------------------------------------------------------
// Metadata projections
// ---------------------------------------------------------------------------

/// `site_no`, `land_surface_elev`, `land_surface_elev_datum`.
///
/// At least one of the altitude fields must be published; a missing one
/// comes out as an all-missing column.
pub fn elevation_projection(site_info: &Table) -> Result<Table, NwisError> {
    if !site_info.has_column(SITE_NO) || !(site_info.has_column(ALT_VALUE) || site_info.has_column(ALT_DATUM)) {
        return Err(NwisError::MissingColumn {
            table: "site info".to_string(),
            logical: "land-surface elevation".to_string(),
            tried: vec![ALT_VALUE.to_string(), ALT_DATUM.to_string()],
        });
    }
    site_info.project(&[
        (SITE_NO, SITE_NO),
        (ALT_VALUE, LAND_SURFACE_ELEV),
        (ALT_DATUM, LAND_SURFACE_ELEV_DATUM),
    ])
}

/// First site-info column that looks like a well depth.
pub fn find_well_depth_column(site_info: &Table) -> Option<String> {
    site_info.columns().into_iter().find(|c| {
        let lower = c.to_lowercase();
        lower.contains(WELL_DEPTH_FRAGMENT) || lower == WELL_DEPTH_EXACT
    })
}

/// `site_no`, `well_depth`. When the service publishes no well depth the
/// column is still present, all missing.
pub fn well_depth_projection(site_info: &Table) -> Result<Table, NwisError> {
    match find_well_depth_column(site_info) {
        Some(col) => site_info.project(&[(SITE_NO, SITE_NO), (col.as_str(), WELL_DEPTH)]),
        None => {
            logging::debug(DataSource::SiteInfo, None, "No well depth column; filling well_depth with missing values");
            let mut projected = site_info.project(&[(SITE_NO, SITE_NO)])?;
            projected.push_missing_column(WELL_DEPTH)?;
            Ok(projected)
        }
    }
}

/// Left-joins elevation and well depth onto the level rows.
pub fn merge_site_info(levels: &Table, site_info: &Table) -> Result<Table, NwisError> {
    let elevation = elevation_projection(site_info)?;
    let well_depth = well_depth_projection(site_info)?;
    levels.left_join(&elevation, SITE_NO)?.left_join(&well_depth, SITE_NO)
}

/// Keeps rows whose parameter code is in `keep`.
pub fn filter_parameter_codes(joined: &Table, keep: &[String]) -> Result<Table, NwisError> {
    let column = joined.find_column("groundwater levels", "parameter code", PARAMETER_CODE_ALIASES)?;
    joined.filter_in(column, keep)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Tables produced by one retrieval, before anything is written.
#[derive(Debug)]
pub struct Retrieval {
    /// Level rows with metadata, all parameter codes.
    pub joined: Table,
    /// `joined` restricted to the kept parameter codes.
    pub filtered: Table,
    pub summary: RunSummary,
}

/// Fetches, merges and filters levels for `site_ids`.
pub fn retrieve_levels(
    service: &dyn WaterService,
    config: &Config,
    site_ids: &[String],
) -> Result<Retrieval, NwisError> {
    let retriever = &config.retriever;
    let request = LevelsRequest {
        parameter_cd: &retriever.parameter_cd,
        range: config.date_range()?,
    };
    let batches = make_batches(site_ids, retriever.batch_size)?;

    let mut summary = RunSummary::new(site_ids.len(), retriever.batch_size);
    let results = fetch_batches(service, &batches, &request, retriever.on_batch_error)?;
    summary.levels = results.levels_counts;
    summary.site_info = results.site_info_counts;
    summary.skipped_batches = results.skipped;

    let levels = combine_batches(results.levels, "groundwater data")?;
    let site_info = combine_batches(results.site_info, "site info")?;

    let joined = merge_site_info(&levels, &site_info)?;
    let filtered = filter_parameter_codes(&joined, &retriever.keep_parameter_codes)?;

    summary.rows_joined = joined.len();
    summary.rows_written = filtered.len();
    summary.output = retriever.output.display().to_string();

    Ok(Retrieval { joined, filtered, summary })
}

/// Reads the site file, retrieves levels and writes the output file(s).
pub fn run(service: &dyn WaterService, config: &Config) -> Result<RunSummary, NwisError> {
    let retriever = &config.retriever;
    let site_ids = read_site_ids(&retriever.sites_file)?;
    logging::info(
        DataSource::File,
        None,
        &format!("Read {} site numbers from {}", site_ids.len(), retriever.sites_file.display()),
    );

    let retrieval = retrieve_levels(service, config, &site_ids)?;

    if let Some(path) = &retriever.full_output {
        retrieval.joined.write_csv(path)?;
        logging::info(
            DataSource::File,
            None,
            &format!("Wrote {} rows to {}", retrieval.joined.len(), path.display()),
        );
    }
    retrieval.filtered.write_csv(&retriever.output)?;

    Ok(retrieval.summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_text_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter().map(|r| r.iter().map(|v| v.to_string()).collect()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_batches_preserve_order_and_split_remainder() {
        let sites = ids(&["001", "002", "003"]);
        let batches = make_batches(&sites, 2).unwrap();
        assert_eq!(batches, vec![&sites[0..2], &sites[2..3]]);
    }

    #[test]
    fn test_batches_cover_every_id_once_for_any_size() {
        let sites: Vec<String> = (0..17).map(|i| format!("{:03}", i)).collect();
        for size in 1..=20 {
            let flattened: Vec<String> = make_batches(&sites, size).unwrap().concat();
            assert_eq!(flattened, sites, "batch size {} lost or repeated ids", size);
        }
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        assert!(matches!(make_batches(&ids(&["001"]), 0), Err(NwisError::Config(_))));
    }

    #[test]
    fn test_site_ids_keep_leading_zeros_and_skip_blanks() {
        let t = table(&["site_no", "lat_nad83"], &[&["001", "0.5"], &["", "0.1"], &["0200", "0.7"]]);
        assert_eq!(site_ids_from_table(&t, "sites.csv").unwrap(), ids(&["001", "0200"]));
    }

    #[test]
    fn test_site_file_without_site_no_is_rejected() {
        let t = table(&["station", "lat"], &[&["001", "0.5"]]);
        let err = site_ids_from_table(&t, "sites.csv").unwrap_err();
        assert!(matches!(err, NwisError::MissingColumn { .. }), "got {:?}", err);
    }

    #[test]
    fn test_site_file_without_rows_is_rejected() {
        let t = table(&["site_no", "lat_nad83", "lon_nad83"], &[]);
        assert!(matches!(site_ids_from_table(&t, "sites.csv"), Err(NwisError::Config(_))));
    }

    #[test]
    fn test_combine_fails_when_every_batch_was_empty() {
        let err = combine_batches(Vec::new(), "groundwater data").unwrap_err();
        assert!(matches!(err, NwisError::NoDataReturned(_)));
    }

    #[test]
    fn test_elevation_projection_renames_altitude_fields() {
        let info = table(&["site_no", "alt_va", "alt_datum_cd"], &[&["001", "512.3", "NAVD88"]]);
        let elev = elevation_projection(&info).unwrap();
        assert_eq!(elev.columns(), &["site_no", "land_surface_elev", "land_surface_elev_datum"].map(String::from));
        assert_eq!(elev.column_values("land_surface_elev_datum").unwrap(), vec![Some("NAVD88")]);
    }

    #[test]
    fn test_elevation_projection_with_only_datum_column() {
        let info = table(&["site_no", "alt_datum_cd"], &[&["001", "NGVD29"]]);
        let elev = elevation_projection(&info).unwrap();
        assert_eq!(elev.column_values("land_surface_elev").unwrap(), vec![None]);
    }

    #[test]
    fn test_elevation_projection_requires_an_altitude_field() {
        let info = table(&["site_no", "station_nm"], &[&["001", "a well"]]);
        assert!(matches!(elevation_projection(&info), Err(NwisError::MissingColumn { .. })));
    }

    #[test]
    fn test_well_depth_column_is_found_by_fragment() {
        let info = table(&["site_no", "Well_Depth_ft"], &[&["001", "120"]]);
        assert_eq!(find_well_depth_column(&info).as_deref(), Some("Well_Depth_ft"));
        let wd = well_depth_projection(&info).unwrap();
        assert_eq!(wd.column_values("well_depth").unwrap(), vec![Some("120")]);
    }

    #[test]
    fn test_missing_well_depth_is_synthesized() {
        let info = table(&["site_no", "alt_va"], &[&["001", "512"], &["002", "600"]]);
        let wd = well_depth_projection(&info).unwrap();
        assert_eq!(wd.columns(), &["site_no", "well_depth"].map(String::from));
        assert_eq!(wd.column_values("well_depth").unwrap(), vec![None, None]);
        assert_eq!(wd.column_values("site_no").unwrap(), vec![Some("001"), Some("002")]);
    }

    #[test]
    fn test_merge_keeps_unmatched_level_rows() {
        let levels = table(
            &["site_no", "lev_va", "parm_cd"],
            &[&["001", "10.1", "62611"], &["002", "11.2", "62611"], &["001", "10.5", "72019"]],
        );
        let info = table(&["site_no", "alt_va", "alt_datum_cd", "well_depth_va"], &[&["001", "512", "NAVD88", "150"]]);
        let joined = merge_site_info(&levels, &info).unwrap();

        assert_eq!(joined.len(), 3, "every level row is kept exactly once");
        assert_eq!(
            joined.columns(),
            &["site_no", "lev_va", "parm_cd", "land_surface_elev", "land_surface_elev_datum", "well_depth"]
                .map(String::from)
        );
        assert_eq!(joined.column_values("well_depth").unwrap(), vec![Some("150"), None, Some("150")]);
    }

    #[test]
    fn test_parameter_filter_keeps_allow_list() {
        let joined = table(&["site_no", "parameter_cd"], &[&["001", "62611"], &["001", "72019"], &["001", "72150"]]);
        let kept = filter_parameter_codes(&joined, &ids(&["62611", "72019"])).unwrap();
        assert_eq!(kept.column_values("parameter_cd").unwrap(), vec![Some("62611"), Some("72019")]);
    }

    #[test]
    fn test_parameter_filter_without_code_column_fails() {
        let joined = table(&["site_no", "lev_va"], &[&["001", "1.0"]]);
        let err = filter_parameter_codes(&joined, &ids(&["62611"])).unwrap_err();
        assert!(
            matches!(err, NwisError::MissingColumn { ref logical, .. } if logical == "parameter code"),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_batch_label_names_first_and_last_site() {
        assert_eq!(batch_label(0, 2, &ids(&["001", "002"])), "batch 1/2 001..002");
        assert_eq!(batch_label(1, 2, &ids(&["003"])), "batch 2/2 003");
    }
}
