use crate::types::{CubeError, CubeResult};
use geo::BoundingRect;
use geo_types::{Polygon, Rect};
use geojson::GeoJson;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default catalog of datacube footprints, one GeoJSON feature per cube
pub const DEFAULT_CATALOG_URL: &str =
    "https://its-live-data.s3.amazonaws.com/datacubes/catalog_v02.json";

const FETCH_TIMEOUT_SECS: u64 = 60;

/// Where to load the footprint catalog from
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Url(String),
    File(PathBuf),
}

impl Default for CatalogSource {
    fn default() -> Self {
        CatalogSource::Url(DEFAULT_CATALOG_URL.to_string())
    }
}

/// One catalog entry: a datacube footprint plus the store it points at.
///
/// `outline` and `native_outline` describe the same physical region in two
/// coordinate systems; after reprojection they do not coincide exactly, which
/// is what the locator's boundary correction compensates for.
#[derive(Debug, Clone)]
pub struct CubeFootprint {
    /// Footprint polygon in geographic lon/lat (EPSG:4326)
    pub outline: Polygon<f64>,
    /// Native projection of the cube grid
    pub epsg: u32,
    /// Footprint polygon in the native projection
    pub native_outline: Polygon<f64>,
    /// Axis-aligned bounds of `native_outline`, cached at load time
    pub native_bounds: Rect<f64>,
    /// Normalized URI of the cube's array store
    pub location: String,
}

impl CubeFootprint {
    pub fn new(
        outline: Polygon<f64>,
        epsg: u32,
        native_outline: Polygon<f64>,
        location: String,
    ) -> CubeResult<Self> {
        let native_bounds = native_outline.bounding_rect().ok_or_else(|| {
            CubeError::InvalidFormat(format!("footprint {location} has an empty native outline"))
        })?;
        Ok(Self {
            outline,
            epsg,
            native_outline,
            native_bounds,
            location,
        })
    }
}

/// Raw per-feature properties as they appear in the catalog document
#[derive(Debug, Deserialize)]
struct FootprintProperties {
    epsg: Option<u32>,
    data_epsg: Option<String>,
    geometry_epsg: geojson::Geometry,
    zarr_url: String,
}

impl FootprintProperties {
    /// Numeric EPSG code, from the `epsg` property or the `data_epsg`
    /// "EPSG:nnnn" string
    fn native_epsg(&self) -> Option<u32> {
        self.epsg.or_else(|| {
            self.data_epsg
                .as_deref()
                .and_then(|s| s.rsplit(':').next())
                .and_then(|s| s.parse().ok())
        })
    }
}

/// Immutable, ordered collection of datacube footprints.
///
/// Loaded once; catalog order is the tie-break when footprints overlap.
#[derive(Debug, Clone)]
pub struct Catalog {
    footprints: Vec<CubeFootprint>,
}

impl Catalog {
    /// Build a catalog directly from footprints (used by tests and callers
    /// with their own index)
    pub fn from_footprints(footprints: Vec<CubeFootprint>) -> Self {
        Self { footprints }
    }

    /// Load a catalog according to `source`
    pub fn load(source: &CatalogSource) -> CubeResult<Self> {
        match source {
            CatalogSource::Url(url) => Self::fetch(url, Self::default_cache_dir().as_deref()),
            CatalogSource::File(path) => Self::from_file(path),
        }
    }

    /// Fetch the catalog document over HTTP, reusing a cached copy when one
    /// exists under `cache_dir`
    pub fn fetch(url: &str, cache_dir: Option<&Path>) -> CubeResult<Self> {
        let cache_path = cache_dir.map(|dir| dir.join(cache_file_name(url)));

        if let Some(path) = &cache_path {
            if path.exists() {
                log::info!("catalog already cached at {}, skipping download", path.display());
                return Self::from_file(path);
            }
        }

        log::info!("fetching datacube catalog from {}", url);
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        let body = client.get(url).send()?.error_for_status()?.text()?;

        if let Some(path) = &cache_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &body)?;
            log::debug!("cached catalog at {}", path.display());
        }

        Self::from_geojson_str(&body)
    }

    /// Read a catalog document from a local file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CubeResult<Self> {
        let body = std::fs::read_to_string(path.as_ref())?;
        Self::from_geojson_str(&body)
    }

    /// Parse a GeoJSON feature collection into footprints
    pub fn from_geojson_str(body: &str) -> CubeResult<Self> {
        let geojson: GeoJson = body
            .parse()
            .map_err(|e| CubeError::InvalidFormat(format!("catalog is not valid GeoJSON: {e}")))?;

        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => {
                return Err(CubeError::InvalidFormat(
                    "catalog document is not a feature collection".to_string(),
                ))
            }
        };

        let mut footprints = Vec::with_capacity(collection.features.len());
        for (i, feature) in collection.features.into_iter().enumerate() {
            let geometry = feature.geometry.ok_or_else(|| {
                CubeError::InvalidFormat(format!("catalog feature {i} has no geometry"))
            })?;
            let outline = Polygon::<f64>::try_from(geometry.value).map_err(|e| {
                CubeError::InvalidFormat(format!("catalog feature {i}: {e}"))
            })?;

            let properties = feature.properties.ok_or_else(|| {
                CubeError::InvalidFormat(format!("catalog feature {i} has no properties"))
            })?;
            let properties: FootprintProperties =
                serde_json::from_value(serde_json::Value::Object(properties)).map_err(|e| {
                    CubeError::InvalidFormat(format!("catalog feature {i}: {e}"))
                })?;

            let epsg = properties.native_epsg().ok_or_else(|| {
                CubeError::InvalidFormat(format!("catalog feature {i} has no usable EPSG code"))
            })?;
            let native_outline =
                Polygon::<f64>::try_from(properties.geometry_epsg.value).map_err(|e| {
                    CubeError::InvalidFormat(format!(
                        "catalog feature {i} native outline: {e}"
                    ))
                })?;

            footprints.push(CubeFootprint::new(
                outline,
                epsg,
                native_outline,
                normalize_location(&properties.zarr_url),
            )?);
        }

        log::info!("loaded catalog with {} datacube footprints", footprints.len());
        Ok(Self { footprints })
    }

    pub fn footprints(&self) -> &[CubeFootprint] {
        &self.footprints
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    /// Default on-disk location for cached catalog documents
    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("velocube"))
    }
}

/// Collapse virtual-hosted S3 HTTP URLs to the `s3://` form used as the
/// store location and cache key
pub(crate) fn normalize_location(url: &str) -> String {
    if url.contains(".s3.amazonaws.com") {
        url.replacen("https:", "s3:", 1)
            .replacen("http:", "s3:", 1)
            .replace(".s3.amazonaws.com", "")
    } else {
        url.to_string()
    }
}

fn cache_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("catalog.json")
        .to_string()
}
