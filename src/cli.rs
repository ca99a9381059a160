use std::path::PathBuf;

use crate::config::{BatchErrorPolicy, Config};
use crate::region::BoundaryRule;

/// Groundwater site and level retrieval from USGS NWIS
#[derive(clap::Parser, Debug)]
#[command(name = "gwmon", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v for debug messages)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// TOML configuration file (defaults to $GWMON_CONFIG, then built-in values)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Append log entries to this file
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Find sites inside the configured polygon and write the site file
    FindSites(FindSitesArgs),

    /// Fetch groundwater levels for the sites in a site file
    GetLevels(GetLevelsArgs),

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(clap::Args, Debug, Default)]
pub struct FindSitesArgs {
    /// Output site file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Treatment of sites exactly on the polygon outline
    #[arg(long, value_enum)]
    pub boundary: Option<BoundaryRule>,

    /// Agency code filter, e.g. USGS
    #[arg(long)]
    pub agency: Option<String>,

    /// Site type filter, e.g. GW
    #[arg(long)]
    pub site_type: Option<String>,
}

#[derive(clap::Args, Debug, Default)]
pub struct GetLevelsArgs {
    /// Site file with a site_no column
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub sites_file: Option<PathBuf>,

    /// Filtered output CSV
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Also write every joined row, before the parameter-code filter
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub full_output: Option<PathBuf>,

    /// First measurement date, YYYY-MM-DD
    #[arg(long)]
    pub start: Option<String>,

    /// Last measurement date, YYYY-MM-DD
    #[arg(long)]
    pub end: Option<String>,

    /// Sites per request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Log and skip batches whose request fails instead of aborting
    #[arg(long)]
    pub skip_failed_batches: bool,

    /// Write a JSON run summary here
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub summary_json: Option<PathBuf>,
}

impl FindSitesArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.locator.output = output.clone();
        }
        if let Some(boundary) = self.boundary {
            config.locator.boundary = boundary;
        }
        if let Some(agency) = &self.agency {
            config.locator.agency = agency.clone();
        }
        if let Some(site_type) = &self.site_type {
            config.locator.site_type = site_type.clone();
        }
    }
}

impl GetLevelsArgs {
    pub fn apply(&self, config: &mut Config) {
        let retriever = &mut config.retriever;
        if let Some(path) = &self.sites_file {
            retriever.sites_file = path.clone();
        }
        if let Some(path) = &self.output {
            retriever.output = path.clone();
        }
        if let Some(path) = &self.full_output {
            retriever.full_output = Some(path.clone());
        }
        if let Some(start) = &self.start {
            retriever.start_date = Some(start.clone());
        }
        if let Some(end) = &self.end {
            retriever.end_date = Some(end.clone());
        }
        if let Some(size) = self.batch_size {
            retriever.batch_size = size;
        }
        if self.skip_failed_batches {
            retriever.on_batch_error = BatchErrorPolicy::Skip;
        }
    }
}
