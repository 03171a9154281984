use crate::io::catalog::{Catalog, CubeFootprint};
use crate::types::{CubeError, CubeResult, GEOGRAPHIC_EPSG};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal_sys::OSRAxisMappingStrategy;
use geo::Contains;
use geo_types::{Point, Rect};

/// How far (native units, typically meters) a boundary-violating point is
/// pushed past the violated edge before the retry search
const BOUNDARY_NUDGE: f64 = 10_000.0;

/// Inward step (native units) used when the point sits exactly on an edge
const EDGE_NUDGE: f64 = 1.0;

/// A query point resolved to one catalog footprint
#[derive(Debug, Clone)]
pub struct LocatedCube<'a> {
    pub footprint: &'a CubeFootprint,
    /// The query point in the footprint's native projection
    pub native_point: (f64, f64),
}

/// Resolves query points to catalog footprints.
///
/// The catalog indexes footprints by geographic (lon/lat) polygons, but each
/// cube's grid lives in its own native projection; near partition edges the
/// two disagree slightly, so a geographic hit is re-checked in native
/// coordinates and corrected with a single nudge-and-retry pass when it
/// falls just outside the native outline.
pub struct CubeLocator {
    catalog: Catalog,
}

impl CubeLocator {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Find the footprint containing `point` (given in EPSG:`point_epsg`)
    /// and the point's coordinates in that footprint's native projection.
    ///
    /// Returns `Ok(None)` when no footprint covers the point; that is a
    /// legitimate negative outcome, not an error. Containment is exclusive:
    /// a point exactly on a polygon edge counts as outside. The scan is a
    /// linear pass in catalog order and the first hit wins, so results are
    /// deterministic for a given catalog. No I/O happens here.
    pub fn locate(&self, point: (f64, f64), point_epsg: u32) -> CubeResult<Option<LocatedCube<'_>>> {
        let lonlat = reproject_point(point_epsg, GEOGRAPHIC_EPSG, point)?;

        let Some(footprint) = self.footprint_containing(lonlat) else {
            log::info!(
                "no data for point (lon, lat) ({:.6}, {:.6})",
                lonlat.0,
                lonlat.1
            );
            return Ok(None);
        };

        let native_point = reproject_point(point_epsg, footprint.epsg, point)?;
        log::debug!(
            "point {:?} EPSG:{} maps to ({:.1}, {:.1}) in datacube EPSG:{}",
            point,
            point_epsg,
            native_point.0,
            native_point.1,
            footprint.epsg
        );

        if footprint.native_outline.contains(&Point::new(native_point.0, native_point.1)) {
            return Ok(Some(LocatedCube {
                footprint,
                native_point,
            }));
        }

        // Geographic hit, but projection distortion left the native point
        // outside the cube's own grid outline: one nudge-and-retry pass.
        self.correct_boundary(point, point_epsg, footprint, native_point)
            .map(Some)
    }

    /// Single-retry boundary correction.
    ///
    /// The native point is moved 10 km further out past the violated edge
    /// (1 m inward when it sits exactly on an edge), the moved point is
    /// taken back to lon/lat, and the catalog is searched once more. A
    /// second candidate in the same projection adopts the nudged point; one
    /// in a different projection gets the original point reprojected
    /// instead. Anything still outside after that is a hard
    /// `BoundaryResolution` failure - there is no second retry.
    fn correct_boundary<'a>(
        &'a self,
        point: (f64, f64),
        point_epsg: u32,
        first: &CubeFootprint,
        native_point: (f64, f64),
    ) -> CubeResult<LocatedCube<'a>> {
        let nudged = nudge_off_boundary(native_point, &first.native_bounds);
        let retry_lonlat = reproject_point(first.epsg, GEOGRAPHIC_EPSG, nudged)?;

        let Some(second) = self.footprint_containing(retry_lonlat) else {
            return Err(CubeError::BoundaryResolution(format!(
                "point ({:.1}, {:.1}) is outside the EPSG:{} grid outline and no \
                 footprint covers the offset retry point",
                native_point.0, native_point.1, first.epsg
            )));
        };

        let candidate = if second.epsg == first.epsg {
            nudged
        } else {
            reproject_point(point_epsg, second.epsg, point)?
        };
        log::debug!(
            "retry: point {:?} EPSG:{} maps to ({:.1}, {:.1}) in datacube EPSG:{}",
            point,
            point_epsg,
            candidate.0,
            candidate.1,
            second.epsg
        );

        if second.native_outline.contains(&Point::new(candidate.0, candidate.1)) {
            Ok(LocatedCube {
                footprint: second,
                native_point: candidate,
            })
        } else {
            Err(CubeError::BoundaryResolution(format!(
                "point is inside the geographic outline but outside the EPSG:{} \
                 grid outline even after one offset retry",
                second.epsg
            )))
        }
    }

    /// First footprint whose geographic outline contains the lon/lat point,
    /// in catalog order
    fn footprint_containing(&self, lonlat: (f64, f64)) -> Option<&CubeFootprint> {
        let point = Point::new(lonlat.0, lonlat.1);
        self.catalog
            .footprints()
            .iter()
            .find(|footprint| footprint.outline.contains(&point))
    }
}

/// Forward-transform a point between two EPSG coordinate systems.
///
/// Axis order is forced to traditional GIS order (x = easting/longitude) on
/// both sides, so geographic coordinates are always (lon, lat). Equal source
/// and target codes short-circuit to the identity, avoiding float round-trip
/// error. Each call builds its own transform; nothing is shared between
/// calls.
pub fn reproject_point(
    src_epsg: u32,
    dst_epsg: u32,
    point: (f64, f64),
) -> CubeResult<(f64, f64)> {
    if src_epsg == dst_epsg {
        return Ok(point);
    }

    let src = spatial_ref(src_epsg)?;
    let dst = spatial_ref(dst_epsg)?;
    let transform = CoordTransform::new(&src, &dst).map_err(|e| {
        CubeError::Projection(format!("EPSG:{src_epsg} -> EPSG:{dst_epsg}: {e}"))
    })?;

    let mut xs = [point.0];
    let mut ys = [point.1];
    let mut zs: [f64; 0] = [];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| {
            CubeError::Projection(format!(
                "transforming ({}, {}) EPSG:{src_epsg} -> EPSG:{dst_epsg}: {e}",
                point.0, point.1
            ))
        })?;
    Ok((xs[0], ys[0]))
}

fn spatial_ref(epsg: u32) -> CubeResult<SpatialRef> {
    let srs = SpatialRef::from_epsg(epsg)
        .map_err(|e| CubeError::Projection(format!("unknown CRS EPSG:{epsg}: {e}")))?;
    srs.set_axis_mapping_strategy(OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

/// Move a point that failed the native-outline test.
///
/// Outside the bounding box of the outline: 10 km further out past the
/// violated edge (y edges checked before x edges). Exactly on an edge: 1 m
/// into the box instead, breaking the degeneracy deterministically. Inside
/// the box but on no edge (possible for non-rectangular outlines): returned
/// unchanged, which makes the retry re-find the same footprint and fail.
fn nudge_off_boundary(point: (f64, f64), bounds: &Rect<f64>) -> (f64, f64) {
    let (x, y) = point;
    let (min, max) = (bounds.min(), bounds.max());

    if y < min.y {
        (x, y - BOUNDARY_NUDGE)
    } else if y > max.y {
        (x, y + BOUNDARY_NUDGE)
    } else if x < min.x {
        (x - BOUNDARY_NUDGE, y)
    } else if x > max.x {
        (x + BOUNDARY_NUDGE, y)
    } else if y == min.y {
        (x, y + EDGE_NUDGE)
    } else if y == max.y {
        (x, y - EDGE_NUDGE)
    } else if x == min.x {
        (x + EDGE_NUDGE, y)
    } else if x == max.x {
        (x - EDGE_NUDGE, y)
    } else {
        point
    }
}
