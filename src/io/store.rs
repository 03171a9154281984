use crate::io::catalog::CubeFootprint;
use crate::types::{CubeError, CubeResult, GeoTransform, PointSeries, Subcube};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use gdal::{Dataset, Metadata};
use ndarray::{Array1, Array3};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Process-wide cache of opened datacube handles, keyed by normalized store
/// location.
///
/// The first open for a location inserts a handle; every later open returns
/// the same `Arc`. Entries are never evicted for the life of the store, which
/// is acceptable for interactive and batch use against a small catalog.
pub struct CubeStore {
    open_cubes: Mutex<HashMap<String, Arc<Datacube>>>,
}

impl CubeStore {
    pub fn new() -> Self {
        Self {
            open_cubes: Mutex::new(HashMap::new()),
        }
    }

    /// Handle for the cube behind a catalog footprint
    pub fn open(&self, footprint: &CubeFootprint) -> Arc<Datacube> {
        self.open_location(&footprint.location, footprint.epsg)
    }

    /// Handle for an explicit store location; datasets underneath open
    /// lazily on first read
    pub fn open_location(&self, location: &str, epsg: u32) -> Arc<Datacube> {
        let mut cubes = self
            .open_cubes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cube) = cubes.get(location) {
            log::debug!("reusing open datacube at {}", location);
            return Arc::clone(cube);
        }
        let cube = Arc::new(Datacube::new(location.to_string(), epsg));
        cubes.insert(location.to_string(), Arc::clone(&cube));
        cube
    }

    pub fn len(&self) -> usize {
        self.open_cubes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CubeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one remote datacube.
///
/// Each requested variable maps to a GDAL dataset (time steps as bands),
/// opened on first use and kept for the life of the handle. Reads pull only
/// the requested pixel window per band.
pub struct Datacube {
    location: String,
    epsg: u32,
    variables: Mutex<HashMap<String, CubeVariable>>,
}

impl Datacube {
    fn new(location: String, epsg: u32) -> Self {
        Self {
            location,
            epsg,
            variables: Mutex::new(HashMap::new()),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Full time series of each variable at the grid cell nearest to
    /// `native_point` (cube-projection coordinates)
    pub fn point_series(
        &self,
        variables: &[&str],
        native_point: (f64, f64),
    ) -> CubeResult<PointSeries> {
        let mut values = HashMap::new();
        let mut cell = None;
        let mut times = None;

        for &name in variables {
            self.with_variable(name, |var| {
                let col = nearest_index(&var.x, native_point.0);
                let row = nearest_index(&var.y, native_point.1);
                let (Some(col), Some(row)) = (col, row) else {
                    return Err(CubeError::InvalidFormat(format!(
                        "variable {name} has an empty grid"
                    )));
                };
                if cell.is_none() {
                    cell = Some((var.x[col], var.y[row]));
                    times = var.times.clone();
                }
                values.insert(name.to_string(), var.read_series(col, row)?);
                Ok(())
            })?;
        }

        let (grid_x, grid_y) = cell.ok_or_else(|| {
            CubeError::InvalidFormat("no variables requested".to_string())
        })?;
        Ok(PointSeries {
            values,
            grid_x,
            grid_y,
            times,
            epsg: self.epsg,
        })
    }

    /// Subcube of all grid cells strictly within `half_distance` of
    /// `center` (cube-projection coordinates)
    pub fn window_around(
        &self,
        variables: &[&str],
        center: (f64, f64),
        half_distance: f64,
    ) -> CubeResult<Subcube> {
        self.read_subcube(
            variables,
            center.0 - half_distance,
            center.0 + half_distance,
            center.1 - half_distance,
            center.1 + half_distance,
            false,
        )
    }

    /// Subcube of all grid cells inside `bbox = [min_x, min_y, max_x, max_y]`
    /// (cube-projection coordinates, bounds inclusive)
    pub fn window_within(&self, variables: &[&str], bbox: [f64; 4]) -> CubeResult<Subcube> {
        let [min_x, min_y, max_x, max_y] = bbox;
        self.read_subcube(variables, min_x, max_x, min_y, max_y, true)
    }

    fn read_subcube(
        &self,
        variables: &[&str],
        lo_x: f64,
        hi_x: f64,
        lo_y: f64,
        hi_y: f64,
        inclusive: bool,
    ) -> CubeResult<Subcube> {
        let mut values = HashMap::new();
        let mut grid = None;

        for &name in variables {
            self.with_variable(name, |var| {
                let (col0, ncols) = window_indices(&var.x, lo_x, hi_x, inclusive);
                let (row0, nrows) = window_indices(&var.y, lo_y, hi_y, inclusive);
                if ncols == 0 || nrows == 0 {
                    return Err(CubeError::InvalidFormat(format!(
                        "window x [{lo_x}, {hi_x}] y [{lo_y}, {hi_y}] selects no cells of variable {name}"
                    )));
                }
                if grid.is_none() {
                    let xs = var.x[col0..col0 + ncols].to_vec();
                    let ys = var.y[row0..row0 + nrows].to_vec();
                    let geo_transform = var.geo.for_subgrid(&xs, &ys);
                    grid = Some((xs, ys, geo_transform, var.times.clone()));
                }
                values.insert(name.to_string(), var.read_window(col0, row0, ncols, nrows)?);
                Ok(())
            })?;
        }

        let (x, y, geo_transform, times) = grid.ok_or_else(|| {
            CubeError::InvalidFormat("no variables requested".to_string())
        })?;
        Ok(Subcube {
            values,
            x,
            y,
            times,
            geo_transform,
            epsg: self.epsg,
        })
    }

    fn with_variable<R>(
        &self,
        name: &str,
        f: impl FnOnce(&CubeVariable) -> CubeResult<R>,
    ) -> CubeResult<R> {
        let mut variables = self
            .variables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let var = match variables.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(CubeVariable::open(&self.location, name)?)
            }
        };
        f(var)
    }
}

/// One variable of a cube: an opened GDAL dataset plus the grid metadata
/// derived from it
struct CubeVariable {
    dataset: Dataset,
    geo: GeoTransform,
    bands: isize,
    /// Cell-center x coordinates, one per column (ascending)
    x: Vec<f64>,
    /// Cell-center y coordinates, one per row (descending for north-up grids)
    y: Vec<f64>,
    /// Per-band timestamps, present only when every band carries one
    times: Option<Vec<DateTime<Utc>>>,
}

impl CubeVariable {
    fn open(location: &str, name: &str) -> CubeResult<Self> {
        let path = variable_path(location, name);
        log::debug!("opening variable {} at {}", name, path);
        let start = Instant::now();

        let dataset = Dataset::open(Path::new(&path))?;
        let geo = GeoTransform::from_gdal(&dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let bands = dataset.raster_count();
        if width == 0 || height == 0 || bands < 1 {
            return Err(CubeError::InvalidFormat(format!(
                "variable {name} at {path} has an empty raster"
            )));
        }

        let x = (0..width).map(|col| geo.cell_center(col, 0).0).collect();
        let y = (0..height).map(|row| geo.cell_center(0, row).1).collect();
        let times = read_band_times(&dataset, bands);
        if times.is_none() {
            log::warn!("variable {} has no parseable time axis", name);
        }

        log::debug!(
            "opened {} ({}x{} cells, {} bands) in {:.2}s",
            name,
            width,
            height,
            bands,
            start.elapsed().as_secs_f64()
        );
        Ok(Self {
            dataset,
            geo,
            bands,
            x,
            y,
            times,
        })
    }

    /// Load the full time series of the cell at (col, row)
    fn read_series(&self, col: usize, row: usize) -> CubeResult<Array1<f32>> {
        let mut samples = Vec::with_capacity(self.bands as usize);
        for b in 1..=self.bands {
            let band = self.dataset.rasterband(b)?;
            let nodata = band.no_data_value();
            let buffer =
                band.read_as::<f32>((col as isize, row as isize), (1, 1), (1, 1), None)?;
            samples.push(mask_nodata(buffer.data[0], nodata));
        }
        Ok(Array1::from_vec(samples))
    }

    /// Load a (time, y, x) block covering the given pixel window
    fn read_window(
        &self,
        col0: usize,
        row0: usize,
        ncols: usize,
        nrows: usize,
    ) -> CubeResult<Array3<f32>> {
        let mut data = Vec::with_capacity(self.bands as usize * nrows * ncols);
        for b in 1..=self.bands {
            let band = self.dataset.rasterband(b)?;
            let nodata = band.no_data_value();
            let buffer = band.read_as::<f32>(
                (col0 as isize, row0 as isize),
                (ncols, nrows),
                (ncols, nrows),
                None,
            )?;
            data.extend(buffer.data.iter().map(|&v| mask_nodata(v, nodata)));
        }
        Array3::from_shape_vec((self.bands as usize, nrows, ncols), data).map_err(|e| {
            CubeError::InvalidFormat(format!("failed to reshape window data: {e}"))
        })
    }
}

/// GDAL-openable path of one variable of a store.
///
/// Zarr stores go through the ZARR driver with the array name as the inner
/// path, remote URIs through the matching virtual filesystem; any other
/// location is a directory holding one single-variable raster per variable.
fn variable_path(location: &str, variable: &str) -> String {
    if location.contains(".zarr") {
        let base = if let Some(rest) = location.strip_prefix("s3://") {
            format!("/vsis3/{rest}")
        } else if location.starts_with("http://") || location.starts_with("https://") {
            format!("/vsicurl/{location}")
        } else {
            location.to_string()
        };
        format!("ZARR:\"{base}\":/{variable}")
    } else {
        format!("{}/{}.tif", location.trim_end_matches('/'), variable)
    }
}

fn mask_nodata(value: f32, nodata: Option<f64>) -> f32 {
    match nodata {
        Some(nd) if f64::from(value) == nd => f32::NAN,
        _ => value,
    }
}

fn read_band_times(dataset: &Dataset, bands: isize) -> Option<Vec<DateTime<Utc>>> {
    let mut times = Vec::with_capacity(bands as usize);
    for b in 1..=bands {
        let band = dataset.rasterband(b).ok()?;
        let stamp = band
            .metadata_item("mid_date", "")
            .or_else(|| band.description().ok().filter(|d| !d.is_empty()))?;
        times.push(parse_time(stamp.trim())?);
    }
    Some(times)
}

fn parse_time(stamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(stamp) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(stamp, format) {
            return Some(Utc.from_utc_datetime(&t));
        }
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(stamp, format) {
            return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

fn nearest_index(coords: &[f64], value: f64) -> Option<usize> {
    let mut best = None;
    let mut best_distance = f64::INFINITY;
    for (i, c) in coords.iter().enumerate() {
        let distance = (c - value).abs();
        if distance < best_distance {
            best_distance = distance;
            best = Some(i);
        }
    }
    best
}

/// Contiguous index run of `coords` falling inside [lo, hi].
///
/// Coordinates are monotonic (ascending x or descending y), so the matching
/// indices form one run; returns (start, count).
fn window_indices(coords: &[f64], lo: f64, hi: f64, inclusive: bool) -> (usize, usize) {
    let mut start = 0;
    let mut count = 0;
    for (i, &c) in coords.iter().enumerate() {
        let inside = if inclusive {
            c >= lo && c <= hi
        } else {
            c > lo && c < hi
        };
        if inside {
            if count == 0 {
                start = i;
            }
            count += 1;
        }
    }
    (start, count)
}
