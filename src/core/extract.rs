use crate::core::locate::{CubeLocator, LocatedCube};
use crate::io::catalog::{Catalog, CatalogSource};
use crate::io::store::{CubeStore, Datacube};
use crate::types::{CubeError, CubeResult, PointSeries, Subcube};
use std::sync::Arc;
use std::time::Instant;

/// Point-mode extraction result: the open cube handle, the loaded series,
/// and the query point in the cube's projection
pub struct SeriesLookup {
    pub cube: Arc<Datacube>,
    pub series: PointSeries,
    pub native_point: (f64, f64),
}

/// Window-mode extraction result
pub struct SubcubeLookup {
    pub cube: Arc<Datacube>,
    pub subcube: Subcube,
    pub native_point: (f64, f64),
}

/// High-level client tying the locator to the open-cube store.
///
/// One instance owns the catalog and the cache of open cubes; repeated
/// queries against the same cube reuse its handle instead of re-reading the
/// store metadata.
pub struct CubeClient {
    locator: CubeLocator,
    store: CubeStore,
}

impl CubeClient {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            locator: CubeLocator::new(catalog),
            store: CubeStore::new(),
        }
    }

    /// Load the catalog described by `source` and build a client around it
    pub fn from_source(source: &CatalogSource) -> CubeResult<Self> {
        Ok(Self::new(Catalog::load(source)?))
    }

    pub fn locator(&self) -> &CubeLocator {
        &self.locator
    }

    pub fn store(&self) -> &CubeStore {
        &self.store
    }

    /// Resolve a point to a catalog footprint without touching the store
    pub fn locate(&self, point: (f64, f64), point_epsg: u32) -> CubeResult<Option<LocatedCube<'_>>> {
        self.locator.locate(point, point_epsg)
    }

    /// Load the time series of `variables` at the grid cell nearest to
    /// `point`.
    ///
    /// Returns `Ok(None)` when no catalog footprint covers the point.
    pub fn timeseries_at_point(
        &self,
        point: (f64, f64),
        point_epsg: u32,
        variables: &[&str],
    ) -> CubeResult<Option<SeriesLookup>> {
        let start = Instant::now();
        let Some(located) = self.locator.locate(point, point_epsg)? else {
            return Ok(None);
        };

        let cube = self.store.open(located.footprint);
        let series = cube.point_series(variables, located.native_point)?;
        log::info!(
            "time series at ({:.1}, {:.1}) EPSG:{} loaded in {:.2}s",
            located.native_point.0,
            located.native_point.1,
            located.footprint.epsg,
            start.elapsed().as_secs_f64()
        );
        Ok(Some(SeriesLookup {
            cube,
            series,
            native_point: located.native_point,
        }))
    }

    /// Load a subcube of all grid cells strictly within `half_distance`
    /// native units of `point` (clipped at the cube edge).
    pub fn subcube_around_point(
        &self,
        point: (f64, f64),
        point_epsg: u32,
        half_distance: f64,
        variables: &[&str],
    ) -> CubeResult<Option<SubcubeLookup>> {
        let start = Instant::now();
        let Some(located) = self.locator.locate(point, point_epsg)? else {
            return Ok(None);
        };

        let cube = self.store.open(located.footprint);
        let subcube = cube.window_around(variables, located.native_point, half_distance)?;
        log::info!(
            "subcube of {}x{} cells loaded in {:.2}s",
            subcube.y.len(),
            subcube.x.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(Some(SubcubeLookup {
            cube,
            subcube,
            native_point: located.native_point,
        }))
    }

    /// Load a subcube over an explicit bounding box
    /// `[min_x, min_y, max_x, max_y]` given in EPSG:`bbox_epsg` (clipped at
    /// the cube edge; bounds inclusive).
    ///
    /// The cube is located via the box's center point. The box must already
    /// be expressed in the located cube's native projection: the corners of
    /// a box do not reproject consistently, so a mismatch aborts with
    /// `ProjectionMismatch` instead of silently reprojecting.
    pub fn subcube_for_bbox(
        &self,
        bbox: [f64; 4],
        bbox_epsg: u32,
        variables: &[&str],
    ) -> CubeResult<Option<SubcubeLookup>> {
        let start = Instant::now();
        let [min_x, min_y, max_x, max_y] = bbox;
        let center = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

        let Some(located) = self.locator.locate(center, bbox_epsg)? else {
            return Ok(None);
        };
        if located.footprint.epsg != bbox_epsg {
            return Err(CubeError::ProjectionMismatch(format!(
                "bounding box is in EPSG:{bbox_epsg} but the datacube grid is EPSG:{}; \
                 supply the box in the datacube projection",
                located.footprint.epsg
            )));
        }

        let cube = self.store.open(located.footprint);
        let subcube = cube.window_within(variables, bbox)?;
        log::info!(
            "subcube of {}x{} cells loaded in {:.2}s",
            subcube.y.len(),
            subcube.x.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(Some(SubcubeLookup {
            cube,
            subcube,
            native_point: located.native_point,
        }))
    }
}
