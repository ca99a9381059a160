//! Search region for the site locator.
//!
//! A `Polygon` is the area of interest; its `BoundingBox` is what the USGS
//! site service understands (`bBox=west,south,east,north`). The service
//! returns everything in the box, and the polygon test trims it down.

use std::fmt;

use geo::{Contains, Intersects};
use serde::{Deserialize, Serialize};

use crate::model::NwisError;

/// How a point lying exactly on the polygon outline is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryRule {
    /// Points on an edge or vertex are outside.
    #[default]
    Exclusive,
    /// Points on an edge or vertex are inside.
    Inclusive,
}

impl fmt::Display for BoundaryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryRule::Exclusive => write!(f, "exclusive"),
            BoundaryRule::Inclusive => write!(f, "inclusive"),
        }
    }
}

/// Axis-aligned box around a polygon, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Value for the site service's `bBox` parameter.
    pub fn to_query_value(&self) -> String {
        format!("{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }

    /// Closed-interval test on both axes.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Simple (non-self-intersecting) polygon of `(lon, lat)` vertices.
#[derive(Debug, Clone)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
    shape: geo::Polygon<f64>,
    bbox: BoundingBox,
}

impl Polygon {
    /// Builds a polygon from its vertices. The ring does not need to repeat
    /// the first vertex at the end.
    pub fn new(vertices: Vec<(f64, f64)>) -> Result<Self, NwisError> {
        if vertices.len() < 3 {
            return Err(NwisError::Config(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if let Some((lon, lat)) = vertices.iter().find(|(lon, lat)| !lon.is_finite() || !lat.is_finite()) {
            return Err(NwisError::Config(format!(
                "polygon vertex ({}, {}) is not a finite coordinate",
                lon, lat
            )));
        }

        let bbox = compute_bbox(&vertices);
        let shape = geo::Polygon::new(geo::LineString::from(vertices.clone()), vec![]);

        Ok(Polygon { vertices, shape, bbox })
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Point-in-polygon test for a `(lon, lat)` point.
    ///
    /// Anything outside the bounding box is rejected before the polygon is
    /// consulted, so that property holds for every rule.
    pub fn contains_point(&self, lon: f64, lat: f64, rule: BoundaryRule) -> bool {
        if !self.bbox.covers(lon, lat) {
            return false;
        }
        let point = geo::Point::new(lon, lat);
        match rule {
            BoundaryRule::Exclusive => self.shape.contains(&point),
            BoundaryRule::Inclusive => self.shape.intersects(&point),
        }
    }
}

fn compute_bbox(vertices: &[(f64, f64)]) -> BoundingBox {
    let mut bbox = BoundingBox {
        min_lon: f64::INFINITY,
        min_lat: f64::INFINITY,
        max_lon: f64::NEG_INFINITY,
        max_lat: f64::NEG_INFINITY,
    };
    for &(lon, lat) in vertices {
        bbox.min_lon = bbox.min_lon.min(lon);
        bbox.min_lat = bbox.min_lat.min(lat);
        bbox.max_lon = bbox.max_lon.max(lon);
        bbox.max_lat = bbox.max_lat.max(lat);
    }
    bbox
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
