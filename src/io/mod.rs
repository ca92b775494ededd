//! Collaborator seams: scene catalogs and region reductions

pub mod catalog;
pub mod reducer;

pub use catalog::{join_cloud_probability, ImageCatalog, InMemoryCatalog};
pub use reducer::{LocalReducer, ReduceParams, RegionReducer};
