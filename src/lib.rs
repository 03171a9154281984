//! velocube: A Fast, Lightweight Reader for Cloud-Hosted Glacier Velocity Datacubes
//!
//! This library discovers which pre-partitioned velocity datacube covers a
//! query point, corrects for projection distortion at partition boundaries,
//! and extracts point time series or in-memory subcubes from the remote
//! array store behind the matched catalog entry.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    CubeError, CubeResult, GeoTransform, PointSeries, Subcube, GEOGRAPHIC_EPSG,
    VELOCITY_DATA_ATTRIBUTION,
};

pub use io::{Catalog, CatalogSource, CubeFootprint, CubeStore, Datacube, DEFAULT_CATALOG_URL};

pub use crate::core::{
    reproject_point, CubeClient, CubeLocator, LocatedCube, SeriesLookup, SubcubeLookup,
};

#[cfg(feature = "python")]
mod python {
    use crate::types::CubeError;
    use crate::{CatalogSource, CubeClient, PointSeries, Subcube};
    use numpy::{IntoPyArray, PyArray1};
    use pyo3::prelude::*;
    use pyo3::types::PyDict;
    use std::path::PathBuf;

    fn runtime_err(e: CubeError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyCubeClient>()?;
        m.add_class::<PyPointSeries>()?;
        m.add_class::<PySubcube>()?;
        m.add("DEFAULT_CATALOG_URL", crate::DEFAULT_CATALOG_URL)?;
        m.add("VELOCITY_DATA_ATTRIBUTION", crate::VELOCITY_DATA_ATTRIBUTION)?;
        Ok(())
    }

    /// Python wrapper for CubeClient
    #[pyclass(name = "CubeClient")]
    struct PyCubeClient {
        inner: CubeClient,
    }

    #[pymethods]
    impl PyCubeClient {
        /// Build a client from a catalog file path, or from the default
        /// remote catalog when no path is given
        #[new]
        #[pyo3(signature = (catalog_path = None))]
        fn new(catalog_path: Option<PathBuf>) -> PyResult<Self> {
            let source = match catalog_path {
                Some(path) => CatalogSource::File(path),
                None => CatalogSource::default(),
            };
            let client = CubeClient::from_source(&source).map_err(runtime_err)?;
            Ok(PyCubeClient { inner: client })
        }

        /// Catalog entry covering (x, y); returns (store location, cube
        /// EPSG, point in cube projection) or None
        fn locate(&self, x: f64, y: f64, epsg: u32) -> PyResult<Option<(String, u32, (f64, f64))>> {
            let located = self.inner.locate((x, y), epsg).map_err(runtime_err)?;
            Ok(located.map(|l| {
                (
                    l.footprint.location.clone(),
                    l.footprint.epsg,
                    l.native_point,
                )
            }))
        }

        #[pyo3(signature = (x, y, epsg, variables = vec!["v".to_string()]))]
        fn get_timeseries(
            &self,
            x: f64,
            y: f64,
            epsg: u32,
            variables: Vec<String>,
        ) -> PyResult<Option<PyPointSeries>> {
            let names: Vec<&str> = variables.iter().map(String::as_str).collect();
            let lookup = self
                .inner
                .timeseries_at_point((x, y), epsg, &names)
                .map_err(runtime_err)?;
            Ok(lookup.map(|l| PyPointSeries { inner: l.series }))
        }

        #[pyo3(signature = (x, y, epsg, half_distance = 5000.0, variables = vec!["v".to_string()]))]
        fn get_subcube(
            &self,
            x: f64,
            y: f64,
            epsg: u32,
            half_distance: f64,
            variables: Vec<String>,
        ) -> PyResult<Option<PySubcube>> {
            let names: Vec<&str> = variables.iter().map(String::as_str).collect();
            let lookup = self
                .inner
                .subcube_around_point((x, y), epsg, half_distance, &names)
                .map_err(runtime_err)?;
            Ok(lookup.map(|l| PySubcube { inner: l.subcube }))
        }

        #[pyo3(signature = (bbox, epsg, variables = vec!["v".to_string()]))]
        fn get_subcube_for_bbox(
            &self,
            bbox: [f64; 4],
            epsg: u32,
            variables: Vec<String>,
        ) -> PyResult<Option<PySubcube>> {
            let names: Vec<&str> = variables.iter().map(String::as_str).collect();
            let lookup = self
                .inner
                .subcube_for_bbox(bbox, epsg, &names)
                .map_err(runtime_err)?;
            Ok(lookup.map(|l| PySubcube { inner: l.subcube }))
        }
    }

    /// Python wrapper for PointSeries
    #[pyclass(name = "PointSeries")]
    struct PyPointSeries {
        inner: PointSeries,
    }

    #[pymethods]
    impl PyPointSeries {
        /// Variable name -> 1-D numpy array
        fn values<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict> {
            let dict = PyDict::new(py);
            for (name, series) in &self.inner.values {
                dict.set_item(name, series.clone().into_pyarray(py))?;
            }
            Ok(dict)
        }

        #[getter]
        fn times(&self) -> Option<Vec<String>> {
            self.inner
                .times
                .as_ref()
                .map(|times| times.iter().map(|t| t.to_rfc3339()).collect())
        }

        #[getter]
        fn grid_x(&self) -> f64 {
            self.inner.grid_x
        }

        #[getter]
        fn grid_y(&self) -> f64 {
            self.inner.grid_y
        }

        #[getter]
        fn epsg(&self) -> u32 {
            self.inner.epsg
        }

        fn __repr__(&self) -> String {
            format!(
                "PointSeries(grid_x={}, grid_y={}, epsg={}, variables={:?})",
                self.inner.grid_x,
                self.inner.grid_y,
                self.inner.epsg,
                self.inner.values.keys().collect::<Vec<_>>()
            )
        }
    }

    /// Python wrapper for Subcube
    #[pyclass(name = "Subcube")]
    struct PySubcube {
        inner: Subcube,
    }

    #[pymethods]
    impl PySubcube {
        /// Variable name -> (time, y, x) numpy array
        fn values<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict> {
            let dict = PyDict::new(py);
            for (name, block) in &self.inner.values {
                dict.set_item(name, block.clone().into_pyarray(py))?;
            }
            Ok(dict)
        }

        fn x<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
            self.inner.x.clone().into_pyarray(py)
        }

        fn y<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
            self.inner.y.clone().into_pyarray(py)
        }

        #[getter]
        fn times(&self) -> Option<Vec<String>> {
            self.inner
                .times
                .as_ref()
                .map(|times| times.iter().map(|t| t.to_rfc3339()).collect())
        }

        #[getter]
        fn geo_transform(&self) -> [f64; 6] {
            self.inner.geo_transform.to_gdal()
        }

        #[getter]
        fn epsg(&self) -> u32 {
            self.inner.epsg
        }

        fn __repr__(&self) -> String {
            format!(
                "Subcube({}x{} cells, epsg={}, variables={:?})",
                self.inner.y.len(),
                self.inner.x.len(),
                self.inner.epsg,
                self.inner.values.keys().collect::<Vec<_>>()
            )
        }
    }
}
