use approx::assert_relative_eq;
use geo_types::{coord, Polygon, Rect};
use velocube::{reproject_point, Catalog, CubeClient, CubeError, CubeFootprint, CubeLocator};

/// Axis-aligned box polygon
fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }).to_polygon()
}

fn footprint(
    outline: Polygon<f64>,
    epsg: u32,
    native_outline: Polygon<f64>,
    location: &str,
) -> CubeFootprint {
    CubeFootprint::new(outline, epsg, native_outline, location.to_string())
        .expect("valid footprint")
}

/// Query point used throughout: central Greenland, well inside EPSG:3413
const BASE_LONLAT: (f64, f64) = (-45.0, 70.0);

fn base_native() -> (f64, f64) {
    reproject_point(4326, 3413, BASE_LONLAT).expect("reprojection to EPSG:3413")
}

#[test]
fn test_locate_inside_footprint_without_correction() {
    let _ = env_logger::try_init();
    let native = base_native();

    let catalog = Catalog::from_footprints(vec![footprint(
        square(-46.0, 69.0, -44.0, 71.0),
        3413,
        square(
            native.0 - 50_000.0,
            native.1 - 50_000.0,
            native.0 + 50_000.0,
            native.1 + 50_000.0,
        ),
        "cube-a",
    )]);
    let locator = CubeLocator::new(catalog);

    let located = locator
        .locate(BASE_LONLAT, 4326)
        .expect("locate")
        .expect("point is covered");
    assert_eq!(located.footprint.location, "cube-a");
    assert_relative_eq!(located.native_point.0, native.0, epsilon = 1e-6);
    assert_relative_eq!(located.native_point.1, native.1, epsilon = 1e-6);

    // querying in the cube's own projection skips reprojection entirely
    let located = locator
        .locate(native, 3413)
        .expect("locate")
        .expect("point is covered");
    assert_eq!(located.native_point, native);
}

#[test]
fn test_locate_outside_every_footprint_is_none() {
    let native = base_native();
    let catalog = Catalog::from_footprints(vec![footprint(
        square(-46.0, 69.0, -44.0, 71.0),
        3413,
        square(
            native.0 - 50_000.0,
            native.1 - 50_000.0,
            native.0 + 50_000.0,
            native.1 + 50_000.0,
        ),
        "cube-a",
    )]);
    let locator = CubeLocator::new(catalog);

    assert!(locator.locate((0.0, 0.0), 4326).expect("locate").is_none());
}

#[test]
fn test_locate_is_idempotent() {
    let native = base_native();
    let catalog = Catalog::from_footprints(vec![footprint(
        square(-46.0, 69.0, -44.0, 71.0),
        3413,
        square(
            native.0 - 50_000.0,
            native.1 - 50_000.0,
            native.0 + 50_000.0,
            native.1 + 50_000.0,
        ),
        "cube-a",
    )]);
    let locator = CubeLocator::new(catalog);

    let first = locator.locate(BASE_LONLAT, 4326).unwrap().unwrap();
    let second = locator.locate(BASE_LONLAT, 4326).unwrap().unwrap();
    assert_eq!(first.footprint.location, second.footprint.location);
    assert_eq!(first.native_point, second.native_point);
}

#[test]
fn test_catalog_order_breaks_overlap_ties() {
    let native = base_native();
    let outline = square(-46.0, 69.0, -44.0, 71.0);
    let native_outline = square(
        native.0 - 50_000.0,
        native.1 - 50_000.0,
        native.0 + 50_000.0,
        native.1 + 50_000.0,
    );

    let catalog = Catalog::from_footprints(vec![
        footprint(outline.clone(), 3413, native_outline.clone(), "cube-first"),
        footprint(outline, 3413, native_outline, "cube-second"),
    ]);
    let locator = CubeLocator::new(catalog);

    let located = locator.locate(BASE_LONLAT, 4326).unwrap().unwrap();
    assert_eq!(located.footprint.location, "cube-first");
}

#[test]
fn test_boundary_correction_adopts_nudged_point_for_same_projection() {
    let _ = env_logger::try_init();
    let native = base_native();

    // first hit: geographic outline covers the point, but the native
    // outline stops half a meter short of it in x
    let first = footprint(
        square(
            BASE_LONLAT.0 - 0.02,
            BASE_LONLAT.1 - 0.02,
            BASE_LONLAT.0 + 0.02,
            BASE_LONLAT.1 + 0.02,
        ),
        3413,
        square(
            native.0 - 100_000.0,
            native.1 - 50_000.0,
            native.0 - 0.5,
            native.1 + 50_000.0,
        ),
        "cube-short",
    );

    // the retry point sits 10 km past the crossed max-x edge
    let nudged = (native.0 + 10_000.0, native.1);
    let nudged_lonlat = reproject_point(3413, 4326, nudged).unwrap();
    let second = footprint(
        square(
            nudged_lonlat.0 - 0.02,
            nudged_lonlat.1 - 0.02,
            nudged_lonlat.0 + 0.02,
            nudged_lonlat.1 + 0.02,
        ),
        3413,
        square(
            native.0 - 50_000.0,
            native.1 - 50_000.0,
            native.0 + 50_000.0,
            native.1 + 50_000.0,
        ),
        "cube-neighbor",
    );

    let locator = CubeLocator::new(Catalog::from_footprints(vec![first, second]));
    let located = locator.locate(BASE_LONLAT, 4326).unwrap().unwrap();

    assert_eq!(located.footprint.location, "cube-neighbor");
    // same projection on both sides: the nudged point is adopted as-is
    assert_relative_eq!(located.native_point.0, nudged.0, epsilon = 1e-6);
    assert_relative_eq!(located.native_point.1, nudged.1, epsilon = 1e-6);
}

#[test]
fn test_boundary_correction_reprojects_original_for_other_projection() {
    let native = base_native();

    let first = footprint(
        square(
            BASE_LONLAT.0 - 0.02,
            BASE_LONLAT.1 - 0.02,
            BASE_LONLAT.0 + 0.02,
            BASE_LONLAT.1 + 0.02,
        ),
        3413,
        square(
            native.0 - 100_000.0,
            native.1 - 50_000.0,
            native.0 - 0.5,
            native.1 + 50_000.0,
        ),
        "cube-short",
    );

    let nudged_lonlat = reproject_point(3413, 4326, (native.0 + 10_000.0, native.1)).unwrap();
    // neighbor cube lives in UTM zone 23N instead
    let in_utm = reproject_point(4326, 32623, BASE_LONLAT).unwrap();
    let second = footprint(
        square(
            nudged_lonlat.0 - 0.02,
            nudged_lonlat.1 - 0.02,
            nudged_lonlat.0 + 0.02,
            nudged_lonlat.1 + 0.02,
        ),
        32623,
        square(
            in_utm.0 - 1_000_000.0,
            in_utm.1 - 1_000_000.0,
            in_utm.0 + 1_000_000.0,
            in_utm.1 + 1_000_000.0,
        ),
        "cube-utm",
    );

    let locator = CubeLocator::new(Catalog::from_footprints(vec![first, second]));
    let located = locator.locate(BASE_LONLAT, 4326).unwrap().unwrap();

    assert_eq!(located.footprint.location, "cube-utm");
    // different projection: the original point is reprojected, the nudge
    // never leaks into the result
    assert_relative_eq!(located.native_point.0, in_utm.0, epsilon = 1e-3);
    assert_relative_eq!(located.native_point.1, in_utm.1, epsilon = 1e-3);
}

#[test]
fn test_boundary_correction_resolves_exact_edge_inward() {
    let native = base_native();

    // native outline whose max-x edge passes exactly through the point
    let catalog = Catalog::from_footprints(vec![footprint(
        square(-46.0, 69.0, -44.0, 71.0),
        3413,
        square(
            native.0 - 100_000.0,
            native.1 - 50_000.0,
            native.0,
            native.1 + 50_000.0,
        ),
        "cube-edge",
    )]);
    let locator = CubeLocator::new(catalog);

    let located = locator.locate(native, 3413).unwrap().unwrap();
    assert_eq!(located.footprint.location, "cube-edge");
    // the degenerate on-edge point is stepped 1 m into the grid
    assert_relative_eq!(located.native_point.0, native.0 - 1.0, epsilon = 1e-9);
    assert_relative_eq!(located.native_point.1, native.1, epsilon = 1e-9);
}

#[test]
fn test_boundary_correction_fails_after_single_retry() {
    let native = base_native();

    // generous geographic outline: the retry point re-finds the same
    // footprint, whose native outline still excludes it
    let catalog = Catalog::from_footprints(vec![footprint(
        square(-46.0, 69.0, -44.0, 71.0),
        3413,
        square(
            native.0 - 100_000.0,
            native.1 - 50_000.0,
            native.0 - 0.5,
            native.1 + 50_000.0,
        ),
        "cube-short",
    )]);
    let locator = CubeLocator::new(catalog);

    let err = locator.locate(BASE_LONLAT, 4326).unwrap_err();
    assert!(matches!(err, CubeError::BoundaryResolution(_)));
}

#[test]
fn test_boundary_correction_fails_when_retry_finds_no_candidate() {
    let native = base_native();

    // tight geographic outline: the retry point escapes the catalog entirely
    let catalog = Catalog::from_footprints(vec![footprint(
        square(
            BASE_LONLAT.0 - 0.02,
            BASE_LONLAT.1 - 0.02,
            BASE_LONLAT.0 + 0.02,
            BASE_LONLAT.1 + 0.02,
        ),
        3413,
        square(
            native.0 - 100_000.0,
            native.1 - 50_000.0,
            native.0 - 0.5,
            native.1 + 50_000.0,
        ),
        "cube-short",
    )]);
    let locator = CubeLocator::new(catalog);

    let err = locator.locate(BASE_LONLAT, 4326).unwrap_err();
    assert!(matches!(err, CubeError::BoundaryResolution(_)));
}

#[test]
fn test_bbox_in_foreign_projection_is_a_mismatch() {
    let native = base_native();

    // the catalog cube's grid is EPSG:3413, but the caller hands a bounding
    // box in UTM 23N coordinates
    let client = CubeClient::new(Catalog::from_footprints(vec![footprint(
        square(-46.0, 69.0, -44.0, 71.0),
        3413,
        square(
            native.0 - 100_000.0,
            native.1 - 100_000.0,
            native.0 + 100_000.0,
            native.1 + 100_000.0,
        ),
        "cube-a",
    )]));

    let in_utm = reproject_point(4326, 32623, BASE_LONLAT).unwrap();
    let bbox = [
        in_utm.0 - 1_000.0,
        in_utm.1 - 1_000.0,
        in_utm.0 + 1_000.0,
        in_utm.1 + 1_000.0,
    ];
    let err = client.subcube_for_bbox(bbox, 32623, &["v"]).unwrap_err();
    assert!(matches!(err, CubeError::ProjectionMismatch(_)));
}
