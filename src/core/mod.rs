//! Core lookup and extraction modules

pub mod extract;
pub mod locate;

// Re-export main types
pub use extract::{CubeClient, SeriesLookup, SubcubeLookup};
pub use locate::{reproject_point, CubeLocator, LocatedCube};
