//! I/O modules for the footprint catalog and remote array stores

pub mod catalog;
pub mod store;

pub use catalog::{Catalog, CatalogSource, CubeFootprint, DEFAULT_CATALOG_URL};
pub use store::{CubeStore, Datacube};
