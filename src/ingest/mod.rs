//! Remote data ingestion.
//!
//! Submodules:
//! - `rdb`: USGS tab-delimited response parsing.
//! - `usgs`: NWIS site and groundwater-level services: URL construction,
//!   HTTP client and the `WaterService` seam.

pub mod rdb;
pub mod usgs;
