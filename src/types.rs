use chrono::{DateTime, Utc};
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Geographic lon/lat reference system used by the catalog index
pub const GEOGRAPHIC_EPSG: u32 = 4326;

/// Attribution carried by the upstream velocity data products
pub const VELOCITY_DATA_ATTRIBUTION: &str =
    "ITS_LIVE velocity data (https://its-live.jpl.nasa.gov) \
     with funding provided by NASA MEaSUREs.";

/// Geospatial transformation parameters (GDAL sextuple)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Center coordinates of the cell at pixel index (col, row)
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.top_left_x + (col as f64 + 0.5) * self.pixel_width,
            self.top_left_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Transform for a subgrid extracted from this grid.
    ///
    /// The new origin is the upper-left corner of the upper-left cell of the
    /// subgrid (coordinate vectors hold cell centers, so the corner sits half
    /// a cell out); cell size and rotation are inherited from the parent.
    pub fn for_subgrid(&self, xs: &[f64], ys: &[f64]) -> GeoTransform {
        let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        GeoTransform {
            top_left_x: min_x - self.pixel_width / 2.0,
            pixel_width: self.pixel_width,
            rotation_x: self.rotation_x,
            top_left_y: max_y - self.pixel_height / 2.0,
            rotation_y: self.rotation_y,
            pixel_height: self.pixel_height,
        }
    }
}

/// Time series extracted at a single grid cell (point mode).
///
/// `values` holds one 1-D array per requested variable, all sampled at the
/// grid cell whose center is (`grid_x`, `grid_y`) in EPSG:`epsg`.
#[derive(Debug, Clone)]
pub struct PointSeries {
    pub values: HashMap<String, Array1<f32>>,
    pub grid_x: f64,
    pub grid_y: f64,
    pub times: Option<Vec<DateTime<Utc>>>,
    pub epsg: u32,
}

/// In-memory subcube extracted over a coordinate window (window/bbox mode).
///
/// Arrays are (time, y, x); `x`/`y` are cell-center coordinate vectors in
/// EPSG:`epsg` and `geo_transform` is recomputed for the extracted extent so
/// the subcube stays self-describing.
#[derive(Debug, Clone)]
pub struct Subcube {
    pub values: HashMap<String, Array3<f32>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub times: Option<Vec<DateTime<Utc>>>,
    pub geo_transform: GeoTransform,
    pub epsg: u32,
}

/// Error types for datacube discovery and extraction
#[derive(Debug, thiserror::Error)]
pub enum CubeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data format: {0}")]
    InvalidFormat(String),

    #[error("projection error: {0}")]
    Projection(String),

    #[error("projection mismatch: {0}")]
    ProjectionMismatch(String),

    #[error("boundary resolution failed: {0}")]
    BoundaryResolution(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Result type for datacube operations
pub type CubeResult<T> = Result<T, CubeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cell_center() {
        let gt = GeoTransform {
            top_left_x: -200000.0,
            pixel_width: 120.0,
            rotation_x: 0.0,
            top_left_y: 100000.0,
            rotation_y: 0.0,
            pixel_height: -120.0,
        };
        let (x, y) = gt.cell_center(0, 0);
        assert_relative_eq!(x, -199940.0);
        assert_relative_eq!(y, 99940.0);
        let (x, y) = gt.cell_center(2, 1);
        assert_relative_eq!(x, -199700.0);
        assert_relative_eq!(y, 99820.0);
    }

    #[test]
    fn test_subgrid_transform_keeps_cell_size() {
        let parent = GeoTransform {
            top_left_x: 0.0,
            pixel_width: 120.0,
            rotation_x: 0.0,
            top_left_y: 0.0,
            rotation_y: 0.0,
            pixel_height: -120.0,
        };
        // cells centered at x = 1860..2340, y = -1860..-2100
        let xs = vec![1860.0, 1980.0, 2100.0, 2220.0, 2340.0];
        let ys = vec![-1860.0, -1980.0, -2100.0];
        let sub = parent.for_subgrid(&xs, &ys);
        assert_relative_eq!(sub.pixel_width, 120.0);
        assert_relative_eq!(sub.pixel_height, -120.0);
        assert_relative_eq!(sub.top_left_x, 1800.0);
        assert_relative_eq!(sub.top_left_y, -1800.0);
        // the recomputed origin must land on the parent cell lattice
        let offset_cols = (sub.top_left_x - parent.top_left_x) / parent.pixel_width;
        assert_relative_eq!(offset_cols, offset_cols.round());
    }

    #[test]
    fn test_geotransform_gdal_round_trip() {
        let gt = [12.5, 120.0, 0.0, -37.25, 0.0, -120.0];
        assert_eq!(GeoTransform::from_gdal(&gt).to_gdal(), gt);
    }
}
