//! Run configuration.
//!
//! One immutable `Config` is built at start-up and handed to each pipeline.
//! Values are layered: built-in defaults, then the TOML file, then
//! environment variables (a `.env` file is honoured), then CLI flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ingest::usgs::{DEFAULT_GWLEVELS_URL, DEFAULT_SITE_URL, DateRange, SiteQuery};
use crate::model::{DEFAULT_KEEP_PARAMETER_CODES, DEFAULT_REFERENCE_DATUM, NwisError, PARAM_GW_LEVEL_NAVD88};
use crate::region::{BoundaryRule, BoundingBox, Polygon};
use crate::table::io_error;

/// Environment variable naming the config file.
pub const ENV_CONFIG_PATH: &str = "GWMON_CONFIG";
pub const ENV_SITE_URL: &str = "GWMON_SITE_URL";
pub const ENV_GWLEVELS_URL: &str = "GWMON_GWLEVELS_URL";
pub const ENV_TIMEOUT_SECS: &str = "GWMON_TIMEOUT_SECS";

const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub locator: LocatorConfig,
    pub retriever: RetrieverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub site_url: String,
    pub gwlevels_url: String,
    /// Per-request timeout, applied to every remote call.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            site_url: DEFAULT_SITE_URL.to_string(),
            gwlevels_url: DEFAULT_GWLEVELS_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Area of interest as `[lon, lat]` vertices.
    pub polygon: Vec<[f64; 2]>,
    pub output: PathBuf,
    /// NWIS site type code, e.g. "GW" or "ST". Empty for all.
    pub site_type: String,
    /// Only sites with data of this type, e.g. "gw". Empty for all.
    pub data_type: String,
    /// Agency code, e.g. "USGS". Empty for all.
    pub agency: String,
    /// Horizontal datum a site's coordinates must be in.
    pub datum: String,
    pub boundary: BoundaryRule,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        LocatorConfig {
            polygon: vec![[-120.5, 38.0], [-120.0, 38.0], [-120.0, 38.5], [-120.5, 38.5]],
            output: PathBuf::from("find-sites-output.csv"),
            site_type: "GW".to_string(),
            data_type: "gw".to_string(),
            agency: String::new(),
            datum: DEFAULT_REFERENCE_DATUM.to_string(),
            boundary: BoundaryRule::Exclusive,
        }
    }
}

/// What to do when one batch request fails outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchErrorPolicy {
    /// The first failing batch aborts the run.
    #[default]
    Abort,
    /// Log the failure and carry on with the next batch.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub sites_file: PathBuf,
    pub output: PathBuf,
    /// Joined table before the parameter-code filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_output: Option<PathBuf>,
    /// Inclusive `YYYY-MM-DD` bounds; unset bounds are left out of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Sites per request, to keep URLs within service limits.
    pub batch_size: usize,
    /// Parameter code requested from the levels service.
    pub parameter_cd: String,
    pub keep_parameter_codes: Vec<String>,
    pub on_batch_error: BatchErrorPolicy,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        RetrieverConfig {
            sites_file: PathBuf::from("find-sites-output.csv"),
            output: PathBuf::from("get-gw-levels-out-NAVD88.csv"),
            full_output: None,
            start_date: None,
            end_date: None,
            batch_size: 100,
            parameter_cd: PARAM_GW_LEVEL_NAVD88.to_string(),
            keep_parameter_codes: DEFAULT_KEEP_PARAMETER_CODES.iter().map(|c| c.to_string()).collect(),
            on_batch_error: BatchErrorPolicy::Abort,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses TOML; any field left out keeps its default.
    pub fn from_toml_str(text: &str) -> Result<Config, NwisError> {
        toml::from_str(text).map_err(|e| NwisError::Config(format!("invalid config file: {}", e)))
    }

    /// Loads the file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Config, NwisError> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
                Config::from_toml_str(&text)
            }
            None => Ok(Config::default()),
        }
    }

    /// Applies environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), NwisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SITE_URL) {
            self.service.site_url = url;
        }
        if let Some(url) = lookup(ENV_GWLEVELS_URL) {
            self.service.gwlevels_url = url;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.service.timeout_secs = secs.trim().parse().map_err(|_| {
                NwisError::Config(format!("{} must be a whole number of seconds, got '{}'", ENV_TIMEOUT_SECS, secs))
            })?;
        }
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), NwisError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn to_toml_string(&self) -> Result<String, NwisError> {
        toml::to_string_pretty(self).map_err(|e| NwisError::Config(format!("cannot render config: {}", e)))
    }

    // -----------------------------------------------------------------------
    // Validation and derived values
    // -----------------------------------------------------------------------

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), NwisError> {
        self.polygon()?;
        self.date_range()?;

        if self.service.timeout_secs == 0 {
            return Err(NwisError::Config("timeout_secs must be at least 1".to_string()));
        }
        if self.retriever.batch_size == 0 {
            return Err(NwisError::Config("batch_size must be at least 1".to_string()));
        }
        if self.retriever.keep_parameter_codes.is_empty() {
            return Err(NwisError::Config("keep_parameter_codes must not be empty".to_string()));
        }
        if self.retriever.parameter_cd.trim().is_empty() {
            return Err(NwisError::Config("parameter_cd must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn polygon(&self) -> Result<Polygon, NwisError> {
        Polygon::new(self.locator.polygon.iter().map(|[lon, lat]| (*lon, *lat)).collect())
    }

    pub fn date_range(&self) -> Result<DateRange, NwisError> {
        let start = parse_date("start_date", self.retriever.start_date.as_deref())?;
        let end = parse_date("end_date", self.retriever.end_date.as_deref())?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(NwisError::Config(format!("start_date {} is after end_date {}", s, e)));
            }
        }
        Ok(DateRange { start, end })
    }

    pub fn site_query(&self, bbox: BoundingBox) -> SiteQuery {
        SiteQuery {
            bbox,
            site_type: non_empty(&self.locator.site_type),
            data_type: non_empty(&self.locator.data_type),
            agency: non_empty(&self.locator.agency),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, NwisError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, DATE_FORMAT)
            .map(Some)
            .map_err(|_| NwisError::Config(format!("{} must be YYYY-MM-DD, got '{}'", field, v))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("built-in defaults should validate");
        assert_eq!(config.retriever.batch_size, 100);
        assert_eq!(config.retriever.keep_parameter_codes, vec!["62611", "72019"]);
        assert_eq!(config.locator.datum, "NAD83");
        assert_eq!(config.locator.boundary, BoundaryRule::Exclusive);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [retriever]
            batch_size = 25
            start_date = "1990-01-01"
            on_batch_error = "skip"

            [locator]
            boundary = "inclusive"
            polygon = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            "#,
        )
        .expect("valid TOML should parse");

        assert_eq!(config.retriever.batch_size, 25);
        assert_eq!(config.retriever.on_batch_error, BatchErrorPolicy::Skip);
        assert_eq!(config.locator.boundary, BoundaryRule::Inclusive);
        assert_eq!(config.retriever.parameter_cd, "62611", "untouched fields keep defaults");
        assert_eq!(config.service.timeout_secs, 60);

        let range = config.date_range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(1990, 1, 1));
        assert_eq!(range.end, None);
    }

    #[test]
    fn test_unknown_boundary_rule_is_rejected() {
        let result = Config::from_toml_str("[locator]\nboundary = \"fuzzy\"\n");
        assert!(matches!(result, Err(NwisError::Config(_))));
    }

    #[test]
    fn test_env_overrides_service_settings() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SITE_URL, "http://localhost:8080/site/"),
            (ENV_TIMEOUT_SECS, "5"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .expect("overrides should apply");
        assert_eq!(config.service.site_url, "http://localhost:8080/site/");
        assert_eq!(config.service.gwlevels_url, DEFAULT_GWLEVELS_URL);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_bad_timeout_env_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()));
        assert!(matches!(result, Err(NwisError::Config(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut config = Config::default();
        config.retriever.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_date_is_rejected() {
        let mut config = Config::default();
        config.retriever.end_date = Some("2020/12/31".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reversed_date_range_is_rejected() {
        let mut config = Config::default();
        config.retriever.start_date = Some("2021-01-01".to_string());
        config.retriever.end_date = Some("2020-01-01".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_degenerate_polygon_is_rejected() {
        let mut config = Config::default();
        config.locator.polygon = vec![[0.0, 0.0], [1.0, 1.0]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_filters_are_dropped_from_site_query() {
        let mut config = Config::default();
        config.locator.agency = "  ".to_string();
        let bbox = config.polygon().unwrap().bounding_box();
        let query = config.site_query(bbox);
        assert_eq!(query.agency, None);
        assert_eq!(query.site_type.as_deref(), Some("GW"));
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let mut config = Config::default();
        config.retriever.full_output = Some(PathBuf::from("all.csv"));
        let text = config.to_toml_string().expect("config should render");
        let parsed = Config::from_toml_str(&text).expect("rendered config should parse");
        assert_eq!(parsed, config);
    }
}
