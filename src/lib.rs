//! gwmon_service: groundwater-level retrieval from USGS NWIS.
//!
//! # Module structure
//!
//! ```text
//! gwmon_service
//! ├── model      shared data types (SiteRecord, SiteSet, NwisError, column aliases, …)
//! ├── config     layered run configuration (defaults, TOML, env, CLI)
//! ├── region     search polygon, bounding box, point-in-polygon rule
//! ├── table      canonical tabular type: concat, left join, CSV
//! ├── ingest
//! │   ├── rdb    USGS RDB response parsing
//! │   └── usgs   NWIS site and gwlevels services, `WaterService` seam
//! ├── locate     site locator pipeline (polygon → site file)
//! ├── retrieve   measurement retriever pipeline (site file → levels CSV)
//! ├── report     run summary
//! ├── logging    structured console/file logging
//! └── cli        command line schema
//! ```

pub mod cli;
pub mod config;
pub mod ingest;
pub mod locate;
pub mod logging;
pub mod model;
pub mod region;
pub mod report;
pub mod retrieve;
pub mod table;
